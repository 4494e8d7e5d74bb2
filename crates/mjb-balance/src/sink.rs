//! Output of selected variations: histograms, per-event records and
//! bootstrap toys.

use std::io::Write;

use mjb_core::{Error, Result};
use mjb_hist::{BootstrapToys, Histogram, Histogram2D};
use serde::Serialize;

use crate::jet::{BTagResult, JetCandidate};
use crate::observables::BalanceObservables;

/// Balance axis: 0 to 3 in steps of 0.01.
const BALANCE_BINS: usize = 300;
const BALANCE_MAX: f64 = 3.0;

/// Edges of the ptBal axis used by 2D histograms and bootstrap toys.
pub fn balance_edges() -> Vec<f64> {
    (0..=BALANCE_BINS).map(|i| BALANCE_MAX * i as f64 / BALANCE_BINS as f64).collect()
}

/// Where the outputs of selected variations go.
pub trait OutputSink {
    /// Fill the histograms of variation `var_index`.
    fn fill_histograms(
        &mut self,
        var_index: usize,
        jets: &[JetCandidate<'_>],
        observables: &BalanceObservables,
    ) -> Result<()>;

    /// Append a record to record stream `stream`.
    fn write_record(&mut self, stream: usize, record: BalanceRecord) -> Result<()>;

    /// Fill the bootstrap toys of `variation`.
    fn fill_bootstrap(
        &mut self,
        variation: &str,
        run_number: u32,
        event_number: u64,
        recoil_pt: f64,
        pt_bal: f64,
        weight: f64,
    ) -> Result<()>;
}

/// Per-jet part of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JetRecord {
    /// Transverse momentum.
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Energy.
    pub e: f64,
    /// Detector eta.
    pub det_eta: f64,
    /// JVT.
    pub jvt: f64,
    /// Calibrated over raw pt.
    pub jet_corr: f64,
    /// Δφ to the lead jet.
    pub beta: Option<f64>,
    /// Tile energy fraction.
    pub tile_frac: Option<f64>,
    /// B-tagging per working point.
    pub btag: Vec<BTagResult>,
}

impl From<&JetCandidate<'_>> for JetRecord {
    fn from(j: &JetCandidate<'_>) -> Self {
        Self {
            pt: j.momentum.pt,
            eta: j.momentum.eta,
            phi: j.momentum.phi,
            e: j.momentum.e,
            det_eta: j.det_eta,
            jvt: j.jvt,
            jet_corr: j.jet_corr,
            beta: j.beta,
            tile_frac: j.tile_frac,
            btag: j.btag.clone(),
        }
    }
}

/// One selected event of one variation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceRecord {
    /// Variation name.
    pub variation: String,
    /// Run number.
    pub run_number: u32,
    /// Event number.
    pub event_number: u64,
    /// Event observables and weights.
    #[serde(flatten)]
    pub observables: BalanceObservables,
    /// Selected jets, leading first.
    pub jets: Vec<JetRecord>,
}

/// Histograms of one variation.
#[derive(Debug, Clone, Serialize)]
pub struct VariationHistograms {
    /// Output directory name.
    pub directory: String,
    /// Recoil pt.
    pub recoil_pt: Histogram,
    /// Lead jet pt.
    pub lead_pt: Histogram,
    /// Recoil pt × ptBal.
    pub recoil_pt_bal: Histogram2D,
}

impl VariationHistograms {
    fn new(directory: String, pt_edges: &[f64]) -> Result<Self> {
        Ok(Self {
            recoil_pt: Histogram::new(format!("{directory}/recoilPt"), pt_edges.to_vec())?,
            lead_pt: Histogram::new(format!("{directory}/leadJetPt"), pt_edges.to_vec())?,
            recoil_pt_bal: Histogram2D::new(
                format!("{directory}/recoilPt_PtBal"),
                pt_edges.to_vec(),
                balance_edges(),
            )?,
            directory,
        })
    }
}

/// Sink that keeps everything in memory.
#[derive(Debug, Clone)]
pub struct InMemorySink {
    histograms: Vec<VariationHistograms>,
    records: Vec<Vec<BalanceRecord>>,
    bootstrap: Option<BootstrapToys>,
}

impl InMemorySink {
    /// One histogram set per entry of `directories`, `n_streams` record
    /// streams, and optional toys.
    pub fn new(
        directories: &[String],
        pt_edges: &[f64],
        n_streams: usize,
        bootstrap: Option<BootstrapToys>,
    ) -> Result<Self> {
        let histograms = directories
            .iter()
            .map(|d| VariationHistograms::new(d.clone(), pt_edges))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { histograms, records: vec![Vec::new(); n_streams], bootstrap })
    }

    /// Histograms in variation order.
    pub fn histograms(&self) -> &[VariationHistograms] {
        &self.histograms
    }

    /// Records of stream `stream`.
    pub fn records(&self, stream: usize) -> &[BalanceRecord] {
        self.records.get(stream).map_or(&[], Vec::as_slice)
    }

    /// Bootstrap toys, if booked.
    pub fn bootstrap(&self) -> Option<&BootstrapToys> {
        self.bootstrap.as_ref()
    }

    /// Write stream `stream` as JSON lines.
    pub fn write_json_lines(&self, stream: usize, mut out: impl Write) -> Result<()> {
        for record in self.records(stream) {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl OutputSink for InMemorySink {
    fn fill_histograms(
        &mut self,
        var_index: usize,
        jets: &[JetCandidate<'_>],
        observables: &BalanceObservables,
    ) -> Result<()> {
        let h = self.histograms.get_mut(var_index).ok_or_else(|| {
            Error::Histogram(format!("no histograms booked for variation {var_index}"))
        })?;
        let w = observables.weights.weight;
        let recoil_pt = observables.recoil.pt;
        h.recoil_pt.fill(recoil_pt, w);
        if let Some(lead) = jets.first() {
            h.lead_pt.fill(lead.pt(), w);
        }
        h.recoil_pt_bal.fill(recoil_pt, observables.pt_bal, w);
        Ok(())
    }

    fn write_record(&mut self, stream: usize, record: BalanceRecord) -> Result<()> {
        let records = self
            .records
            .get_mut(stream)
            .ok_or_else(|| Error::Histogram(format!("no record stream {stream}")))?;
        records.push(record);
        Ok(())
    }

    fn fill_bootstrap(
        &mut self,
        variation: &str,
        run_number: u32,
        event_number: u64,
        recoil_pt: f64,
        pt_bal: f64,
        weight: f64,
    ) -> Result<()> {
        match &mut self.bootstrap {
            Some(toys) => toys.fill(variation, run_number, event_number, recoil_pt, pt_bal, weight),
            None => Ok(()),
        }
    }
}
