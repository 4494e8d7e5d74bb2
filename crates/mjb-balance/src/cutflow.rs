use mjb_core::Result;
use mjb_hist::Histogram;
use serde::Serialize;

/// Selection steps in cutflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CutLabel {
    /// Enough jets in the input collection.
    NJets,
    /// Lead jet above 200 GeV.
    QuickTrigger,
    /// Lead jet detector eta within 1.2.
    CentralLead,
    /// Forward non-lead jets removed, enough jets left.
    DetEta,
    /// Simulation pileup check against truth jets.
    McCleaning,
    /// Subleading jet against the iteration threshold.
    PtSub,
    /// Jet pt threshold.
    PtThreshold,
    /// JVT removal of pileup jets.
    Jvt,
    /// Jet-quality requirement.
    CleanJet,
    /// Trigger bucket decision.
    TriggerEff,
    /// Subleading to recoil pt ratio.
    PtAsym,
    /// Lead jet back-to-back with the recoil system.
    Alpha,
    /// No recoil jet close in phi to the lead jet.
    Beta,
}

impl CutLabel {
    /// All labels in order.
    pub const ALL: [CutLabel; 13] = [
        CutLabel::NJets,
        CutLabel::QuickTrigger,
        CutLabel::CentralLead,
        CutLabel::DetEta,
        CutLabel::McCleaning,
        CutLabel::PtSub,
        CutLabel::PtThreshold,
        CutLabel::Jvt,
        CutLabel::CleanJet,
        CutLabel::TriggerEff,
        CutLabel::PtAsym,
        CutLabel::Alpha,
        CutLabel::Beta,
    ];

    /// Bin label.
    pub fn as_str(self) -> &'static str {
        match self {
            CutLabel::NJets => "njets",
            CutLabel::QuickTrigger => "QuickTrigger",
            CutLabel::CentralLead => "centralLead",
            CutLabel::DetEta => "detEta",
            CutLabel::McCleaning => "mcCleaning",
            CutLabel::PtSub => "ptSub",
            CutLabel::PtThreshold => "ptThreshold",
            CutLabel::Jvt => "JVT",
            CutLabel::CleanJet => "cleanJet",
            CutLabel::TriggerEff => "TriggerEff",
            CutLabel::PtAsym => "ptAsym",
            CutLabel::Alpha => "alpha",
            CutLabel::Beta => "beta",
        }
    }

    /// Bin position.
    pub fn position(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for CutLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unweighted and weighted pass counts for one variation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cutflow {
    /// Name of the unweighted counter.
    pub name: String,
    /// Name of the weighted counter.
    pub weighted_name: String,
    /// Events passing each step.
    pub counts: Vec<u64>,
    /// Sum of weights passing each step.
    pub weighted: Vec<f64>,
}

impl Cutflow {
    /// Empty cutflow with counter names `name` and `weighted_name`.
    pub fn new(name: impl Into<String>, weighted_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weighted_name: weighted_name.into(),
            counts: vec![0; CutLabel::ALL.len()],
            weighted: vec![0.0; CutLabel::ALL.len()],
        }
    }

    /// Record a pass of `label`.
    pub fn pass(&mut self, label: CutLabel, weight: f64) {
        let i = label.position();
        self.counts[i] += 1;
        self.weighted[i] += weight;
    }

    /// Unweighted count for `label`.
    pub fn count(&self, label: CutLabel) -> u64 {
        self.counts[label.position()]
    }

    /// Weighted count for `label`.
    pub fn weighted_count(&self, label: CutLabel) -> f64 {
        self.weighted[label.position()]
    }

    /// Copy under new counter names.
    pub fn renamed(&self, name: impl Into<String>, weighted_name: impl Into<String>) -> Self {
        Self { name: name.into(), weighted_name: weighted_name.into(), ..self.clone() }
    }

    /// Unweighted and weighted counters as histograms with one unit bin per label.
    pub fn to_histograms(&self) -> Result<(Histogram, Histogram)> {
        let edges: Vec<f64> = (0..=CutLabel::ALL.len()).map(|i| i as f64).collect();
        let counts = self.counts.iter().map(|&c| c as f64).collect();
        let unweighted = Histogram::from_contents(self.name.clone(), edges.clone(), counts, None)?;
        let weighted =
            Histogram::from_contents(self.weighted_name.clone(), edges, self.weighted.clone(), None)?;
        Ok((unweighted, weighted))
    }
}

/// One cutflow per variation, or nothing when disabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutflowSet {
    enabled: bool,
    cutflows: Vec<Cutflow>,
}

impl CutflowSet {
    /// Cutflows for `variations`, kept only when `enabled`.
    pub fn new<S: AsRef<str>>(variations: &[S], enabled: bool) -> Self {
        let cutflows = if enabled {
            variations
                .iter()
                .map(|v| {
                    let v = v.as_ref();
                    Cutflow::new(format!("cutflow_{v}"), format!("cutflow_weighted_{v}"))
                })
                .collect()
        } else {
            Vec::new()
        };
        Self { enabled, cutflows }
    }

    /// Record an event-wide pass for every variation.
    pub fn pass_all(&mut self, label: CutLabel, weight: f64) {
        for c in &mut self.cutflows {
            c.pass(label, weight);
        }
    }

    /// Record a pass for variation `var_index`.
    pub fn pass(&mut self, var_index: usize, label: CutLabel, weight: f64) {
        if let Some(c) = self.cutflows.get_mut(var_index) {
            c.pass(label, weight);
        }
    }

    /// Whether counting is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Per-variation cutflows.
    pub fn cutflows(&self) -> &[Cutflow] {
        &self.cutflows
    }

    /// Cutflow of variation `var_index`.
    pub fn get(&self, var_index: usize) -> Option<&Cutflow> {
        self.cutflows.get(var_index)
    }

    /// Copy of the nominal (else first) cutflow named after `tag`, the
    /// channel number on simulation or the run number on data.
    pub fn representative(&self, nominal: Option<usize>, tag: &str) -> Option<Cutflow> {
        let src = nominal.and_then(|i| self.cutflows.get(i)).or_else(|| self.cutflows.first())?;
        Some(src.renamed(format!("cutflow_{tag}"), format!("cutflow_weighted_{tag}")))
    }
}
