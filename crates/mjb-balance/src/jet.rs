use std::collections::BTreeMap;

use mjb_core::{FourMomentum, JetView, Result};
use serde::{Deserialize, Serialize};

use crate::stages::EM_SCALE_KEY;

/// Calorimeter samplings counted as tile energy.
const TILE_SAMPLINGS: [usize; 3] = [12, 13, 14];
/// Number of samplings in the total energy sum.
const N_SAMPLINGS: usize = 24;

fn one() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

/// A reconstructed jet as delivered by the event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoJet {
    /// Kinematics as stored in the input.
    pub momentum: FourMomentum,
    /// Momenta recorded at each calibration stage, keyed by attribute name.
    #[serde(default)]
    pub scale_momenta: BTreeMap<String, FourMomentum>,
    /// Stored JVT value.
    #[serde(default)]
    pub jvt: f64,
    /// Jet-quality decision of the cleaning tool.
    #[serde(default = "yes")]
    pub is_clean: bool,
    /// Energy per calorimeter sampling.
    #[serde(default)]
    pub energy_per_sampling: Vec<f64>,
}

impl RecoJet {
    /// Jet with the given kinematics, clean, JVT 0 and no stage momenta.
    pub fn new(momentum: FourMomentum) -> Self {
        Self {
            momentum,
            scale_momenta: BTreeMap::new(),
            jvt: 0.0,
            is_clean: true,
            energy_per_sampling: Vec::new(),
        }
    }

    /// Record the momentum of a calibration stage.
    pub fn with_scale(mut self, key: impl Into<String>, p: FourMomentum) -> Self {
        self.scale_momenta.insert(key.into(), p);
        self
    }

    /// Set the stored JVT.
    pub fn with_jvt(mut self, jvt: f64) -> Self {
        self.jvt = jvt;
        self
    }

    /// Set the jet-quality flag.
    pub fn with_clean(mut self, is_clean: bool) -> Self {
        self.is_clean = is_clean;
        self
    }

    /// Set the per-sampling energies.
    pub fn with_samplings(mut self, energies: Vec<f64>) -> Self {
        self.energy_per_sampling = energies;
        self
    }

    /// Detector eta: EM-scale eta, else the raw-stage eta, else the stored eta.
    pub fn detector_eta(&self, raw_key: &str) -> f64 {
        self.scale_momenta
            .get(EM_SCALE_KEY)
            .or_else(|| self.scale_momenta.get(raw_key))
            .map_or(self.momentum.eta, |p| p.eta)
    }

    /// Tile energy fraction, `None` without sampling information.
    pub fn tile_fraction(&self) -> Option<f64> {
        if self.energy_per_sampling.len() < N_SAMPLINGS {
            return None;
        }
        let total: f64 = self.energy_per_sampling[..N_SAMPLINGS].iter().sum();
        let tile: f64 = TILE_SAMPLINGS.iter().map(|&i| self.energy_per_sampling[i]).sum();
        Some(tile / total)
    }
}

impl JetView for RecoJet {
    fn momentum(&self) -> FourMomentum {
        self.momentum
    }

    fn det_eta(&self) -> f64 {
        self.detector_eta(EM_SCALE_KEY)
    }

    fn jvt(&self) -> f64 {
        self.jvt
    }

    fn scale_momentum(&self, key: &str) -> Option<FourMomentum> {
        self.scale_momenta.get(key).copied()
    }
}

/// B-tagging outcome at one working point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BTagResult {
    /// Working point, e.g. `77`.
    pub working_point: String,
    /// Tagging decision.
    pub tagged: bool,
    /// Scale factor; `1` on data, `-2` when the tool failed.
    pub scale_factor: f64,
}

/// A jet inside one variation pass. Cloning is cheap; the reconstructed jet is
/// borrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct JetCandidate<'a> {
    /// Source jet.
    pub source: &'a RecoJet,
    /// Current kinematics.
    pub momentum: FourMomentum,
    /// Fully calibrated kinematics after the event-wide pre-cuts.
    pub baseline: FourMomentum,
    /// Detector eta.
    pub det_eta: f64,
    /// JVT value, refreshed by the JVT step.
    pub jvt: f64,
    /// Calibrated over raw pt.
    pub jet_corr: f64,
    /// Δφ to the lead jet, set by the beta step.
    pub beta: Option<f64>,
    /// Tile energy fraction.
    pub tile_frac: Option<f64>,
    /// Per working point b-tagging.
    pub btag: Vec<BTagResult>,
}

impl<'a> JetCandidate<'a> {
    /// Wrap `source` with calibrated momentum `calibrated`.
    pub fn new(source: &'a RecoJet, calibrated: FourMomentum, raw_key: &str) -> Self {
        let raw_pt = source.momentum.pt;
        Self {
            source,
            momentum: calibrated,
            baseline: calibrated,
            det_eta: source.detector_eta(raw_key),
            jvt: source.jvt,
            jet_corr: if raw_pt > 0.0 { calibrated.pt / raw_pt } else { 1.0 },
            beta: None,
            tile_frac: None,
            btag: Vec::new(),
        }
    }

    /// Current pt.
    pub fn pt(&self) -> f64 {
        self.momentum.pt
    }
}

impl JetView for JetCandidate<'_> {
    fn momentum(&self) -> FourMomentum {
        self.momentum
    }

    fn det_eta(&self) -> f64 {
        self.det_eta
    }

    fn jvt(&self) -> f64 {
        self.jvt
    }

    fn scale_momentum(&self, key: &str) -> Option<FourMomentum> {
        self.source.scale_momentum(key)
    }
}

/// Sort jets by descending pt.
pub fn sort_by_pt_desc(jets: &mut [JetCandidate<'_>]) {
    jets.sort_by(|a, b| b.pt().total_cmp(&a.pt()));
}

/// Decision of one trigger chain in an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDecision {
    /// Chain name.
    pub name: String,
    /// Whether the chain fired.
    pub passed: bool,
    /// Chain prescale.
    #[serde(default = "one")]
    pub prescale: f64,
}

/// One event from the event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    /// Run number.
    pub run_number: u32,
    /// Event number.
    pub event_number: u64,
    /// Simulation channel number.
    #[serde(default)]
    pub mc_channel_number: u32,
    /// Generator weight; ignored for data.
    #[serde(default = "one")]
    pub mc_event_weight: f64,
    /// Reconstructed jets of the input collection.
    pub jets: Vec<RecoJet>,
    /// Truth jet pts, leading first.
    #[serde(default)]
    pub truth_jet_pts: Vec<f64>,
    /// Trigger decisions.
    #[serde(default)]
    pub triggers: Vec<TriggerDecision>,
}

impl EventInput {
    /// Event with jets and no truth or trigger information.
    pub fn new(run_number: u32, event_number: u64, jets: Vec<RecoJet>) -> Self {
        Self {
            run_number,
            event_number,
            mc_channel_number: 0,
            mc_event_weight: 1.0,
            jets,
            truth_jet_pts: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// Decision for `chain`, if recorded.
    pub fn trigger(&self, chain: &str) -> Option<&TriggerDecision> {
        self.triggers.iter().find(|t| t.name == chain)
    }

    /// Parse newline-delimited JSON events, skipping blank lines.
    pub fn from_json_lines(text: &str) -> Result<Vec<Self>> {
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| Ok(serde_json::from_str(l)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn detector_eta_prefers_em_scale() {
        let j = RecoJet::new(FourMomentum::massless(100.0, 0.5, 0.0));
        assert_eq!(j.detector_eta("JetConstitScaleMomentum"), 0.5);
        let j = j.with_scale("JetConstitScaleMomentum", FourMomentum::massless(90.0, 0.6, 0.0));
        assert_eq!(j.detector_eta("JetConstitScaleMomentum"), 0.6);
        let j = j.with_scale(EM_SCALE_KEY, FourMomentum::massless(80.0, 0.7, 0.0));
        assert_eq!(j.detector_eta("JetConstitScaleMomentum"), 0.7);
    }

    #[test]
    fn tile_fraction_needs_all_samplings() {
        let j = RecoJet::new(FourMomentum::default()).with_samplings(vec![1.0; 10]);
        assert_eq!(j.tile_fraction(), None);
        let mut e = vec![1.0; 26];
        e[12] = 5.0;
        let j = j.with_samplings(e);
        // (5 + 1 + 1) / (23 + 5), samplings 24 and 25 excluded
        assert_relative_eq!(j.tile_fraction().unwrap(), 7.0 / 28.0);
    }

    #[test]
    fn candidate_records_calibration_ratio() {
        let reco = RecoJet::new(FourMomentum::massless(100.0, 0.1, 0.0)).with_jvt(0.9);
        let c = JetCandidate::new(&reco, FourMomentum::massless(120.0, 0.1, 0.0), EM_SCALE_KEY);
        assert_relative_eq!(c.jet_corr, 1.2);
        assert_eq!(c.jvt, 0.9);
        assert_eq!(c.baseline, c.momentum);
    }

    #[test]
    fn sort_descending() {
        let a = RecoJet::new(FourMomentum::massless(50.0, 0.0, 0.0));
        let b = RecoJet::new(FourMomentum::massless(150.0, 0.0, 0.0));
        let mut v = vec![
            JetCandidate::new(&a, a.momentum, EM_SCALE_KEY),
            JetCandidate::new(&b, b.momentum, EM_SCALE_KEY),
        ];
        sort_by_pt_desc(&mut v);
        assert_eq!(v[0].pt(), 150.0);
    }

    #[test]
    fn events_from_json_lines() {
        let text = r#"
{"run_number": 284000, "event_number": 1, "jets": [{"momentum": {"pt": 300.0, "eta": 0.1, "phi": 0.0, "e": 310.0}}], "triggers": [{"name": "HLT_j360", "passed": true}]}

{"run_number": 284000, "event_number": 2, "jets": []}
"#;
        let events = EventInput::from_json_lines(text).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].jets[0].is_clean);
        assert_eq!(events[0].trigger("HLT_j360").unwrap().prescale, 1.0);
        assert_eq!(events[1].mc_event_weight, 1.0);
        assert!(EventInput::from_json_lines("{").is_err());
    }
}
