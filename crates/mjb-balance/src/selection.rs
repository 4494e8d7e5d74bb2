//! Event selection state machine.
//!
//! An event first goes through the event-wide pre-cuts, which build one
//! calibrated baseline candidate list. Each variation then replays the
//! per-variation cuts on its own copy of that list. A failed cut skips the
//! variation; an unclean jet aborts the remaining variations of the event.

use std::f64::consts::PI;

use mjb_core::FourMomentum;
use serde::Serialize;

use crate::config::PreparedConfig;
use crate::correction::CorrectionApplier;
use crate::cutflow::{CutLabel, CutflowSet};
use crate::jet::{EventInput, JetCandidate, sort_by_pt_desc};
use crate::observables::{BetaScan, alpha, beta_scan, recoil_system};
use crate::tools::JetTools;
use crate::variation::{Variation, VariationKind};

/// Minimum lead-jet pt (GeV) for the quick trigger check.
const QUICK_TRIGGER_PT: f64 = 200.0;
/// Maximum |detector eta| of the lead jet.
const CENTRAL_LEAD_ETA: f64 = 1.2;
/// Non-lead jets beyond this |detector eta| are dropped.
const MAX_DET_ETA: f64 = 2.8;
/// Maximum average-pt over truth-pt ratio in the simulation pileup check.
const MC_CLEANING_RATIO: f64 = 1.4;
/// JVT only applies below this pt (GeV).
const JVT_MAX_PT: f64 = 60.0;
/// JVT only applies within this |detector eta|.
const JVT_MAX_ETA: f64 = 2.4;

/// Outcome of one variation for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VariationOutcome {
    /// Passed every cut and was recorded.
    Selected,
    /// Failed a cut; the next variation runs.
    SkippedVariation(CutLabel),
    /// Failed a cut that stops the whole event.
    AbortedEvent(CutLabel),
}

/// Outcome of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventOutcome {
    /// The max-event limit was already reached; nothing was done.
    LimitReached,
    /// Rejected by an event-wide cut; `None` for the disjoint-spectrum guard,
    /// which has no cutflow label.
    Rejected(Option<CutLabel>),
    /// Went through the variation loop. Variations after an abort are absent.
    Processed(Vec<VariationOutcome>),
}

impl EventOutcome {
    /// Number of selected variations.
    pub fn selected_count(&self) -> usize {
        match self {
            EventOutcome::Processed(v) => {
                v.iter().filter(|o| **o == VariationOutcome::Selected).count()
            }
            _ => 0,
        }
    }
}

/// Cut values of one variation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionCuts {
    /// Maximum `π − alpha`.
    pub alpha: f64,
    /// Minimum beta.
    pub beta: f64,
    /// Maximum subleading over recoil pt.
    pub pt_asym: f64,
    /// Jet pt floor (GeV).
    pub pt_threshold: f64,
}

impl SelectionCuts {
    /// Nominal cuts, with the one varied by `variation` decoded from its index.
    pub fn for_variation(config: &PreparedConfig, variation: &Variation) -> Self {
        let mut cuts = Self {
            alpha: config.alpha,
            beta: config.beta,
            pt_asym: config.pt_asym,
            pt_threshold: config.pt_thresh,
        };
        let v = f64::from(variation.index);
        match variation.kind {
            VariationKind::MjbAlpha => cuts.alpha = v / 100.0,
            VariationKind::MjbBeta => cuts.beta = v / 10.0,
            VariationKind::MjbPtAsym => cuts.pt_asym = v / 100.0,
            VariationKind::MjbPtThreshold => cuts.pt_threshold = v,
            _ => {}
        }
        cuts
    }
}

/// Jets and selection values of a selected variation.
#[derive(Debug, Clone)]
pub struct Selection<'e> {
    /// Selected jets, leading first.
    pub jets: Vec<JetCandidate<'e>>,
    /// Sum of the non-lead jets.
    pub recoil: FourMomentum,
    /// Subleading over recoil pt.
    pub pt_asym: f64,
    /// `|Δφ(lead, recoil)|`.
    pub alpha: f64,
    /// Beta values.
    pub beta: BetaScan,
    /// Prescale of the deciding trigger, `1` without triggers.
    pub prescale: f64,
}

/// Result of one variation pass.
#[derive(Debug, Clone)]
pub enum VariationResult<'e> {
    /// Passed every cut.
    Selected(Box<Selection<'e>>),
    /// Failed `CutLabel`; continue with the next variation.
    Skipped(CutLabel),
    /// Failed `CutLabel`; stop the event.
    Aborted(CutLabel),
}

impl VariationResult<'_> {
    /// Tag without the payload.
    pub fn outcome(&self) -> VariationOutcome {
        match self {
            VariationResult::Selected(_) => VariationOutcome::Selected,
            VariationResult::Skipped(l) => VariationOutcome::SkippedVariation(*l),
            VariationResult::Aborted(l) => VariationOutcome::AbortedEvent(*l),
        }
    }
}

/// Result of the event-wide pre-cuts.
#[derive(Debug, Clone)]
pub enum PreSelection<'e> {
    /// Calibrated, pt-ordered baseline candidates.
    Passed(Vec<JetCandidate<'e>>),
    /// Rejected; `None` for the disjoint-spectrum guard.
    Rejected(Option<CutLabel>),
}

/// Applies the selection for one job.
#[derive(Debug, Clone, Copy)]
pub struct EventSelector<'a> {
    config: &'a PreparedConfig,
    applier: &'a CorrectionApplier,
    tools: &'a JetTools,
    raw_key: &'a str,
}

impl<'a> EventSelector<'a> {
    /// Selector using `raw_key` as the uncalibrated momentum attribute.
    pub fn new(
        config: &'a PreparedConfig,
        applier: &'a CorrectionApplier,
        tools: &'a JetTools,
        raw_key: &'a str,
    ) -> Self {
        Self { config, applier, tools, raw_key }
    }

    /// Weight used by the weighted cutflow.
    pub fn cutflow_weight(&self, event: &EventInput) -> f64 {
        if self.config.is_mc { event.mc_event_weight } else { 1.0 }
    }

    /// Event-wide cuts. Labels are recorded for every variation.
    ///
    /// Calibration failures keep the stored momentum and are added to `failures`.
    pub fn pre_select<'e>(
        &self,
        event: &'e EventInput,
        cutflows: &mut CutflowSet,
        failures: &mut u32,
    ) -> PreSelection<'e> {
        let cfg = self.config;
        let w = self.cutflow_weight(event);

        if event.jets.len() < cfg.num_jets {
            return PreSelection::Rejected(Some(CutLabel::NJets));
        }
        cutflows.pass_all(CutLabel::NJets, w);

        let mut jets: Vec<JetCandidate<'e>> = event
            .jets
            .iter()
            .map(|reco| {
                let calibrated = match self.tools.calibrator.calibrate(reco) {
                    Ok(p) => p,
                    Err(e) => {
                        log::debug!("calibration failed, keeping stored momentum: {e}");
                        *failures += 1;
                        reco.momentum
                    }
                };
                JetCandidate::new(reco, calibrated, self.raw_key)
            })
            .collect();
        sort_by_pt_desc(&mut jets);

        if jets[0].pt() < QUICK_TRIGGER_PT {
            return PreSelection::Rejected(Some(CutLabel::QuickTrigger));
        }
        cutflows.pass_all(CutLabel::QuickTrigger, w);

        if jets[0].det_eta.abs() > CENTRAL_LEAD_ETA {
            return PreSelection::Rejected(Some(CutLabel::CentralLead));
        }
        cutflows.pass_all(CutLabel::CentralLead, w);

        let mut index = 0;
        jets.retain(|j| {
            let keep = index == 0 || j.det_eta.abs() <= MAX_DET_ETA;
            index += 1;
            keep
        });
        if jets.len() < cfg.num_jets {
            return PreSelection::Rejected(Some(CutLabel::DetEta));
        }
        cutflows.pass_all(CutLabel::DetEta, w);

        if cfg.is_mc && cfg.use_mc_pileup_check {
            let avg = 0.5 * (jets[0].pt() + jets[1].pt());
            let pileup = match event.truth_jet_pts.first() {
                Some(&truth) => avg / truth > MC_CLEANING_RATIO,
                None => true,
            };
            if pileup {
                return PreSelection::Rejected(Some(CutLabel::McCleaning));
            }
        }
        cutflows.pass_all(CutLabel::McCleaning, w);

        // V+jet calibrated jets can migrate across the threshold, so the first
        // iteration cuts the subleading jet before any correction
        if cfg.vjet_calib && cfg.iteration == 0 && self.fails_subleading(jets[1].pt()) {
            return PreSelection::Rejected(None);
        }

        PreSelection::Passed(jets)
    }

    /// Per-variation cuts on a copy of `baseline`.
    pub fn select<'e>(
        &self,
        event: &'e EventInput,
        baseline: &[JetCandidate<'e>],
        var_index: usize,
        variation: &Variation,
        cutflows: &mut CutflowSet,
        failures: &mut u32,
    ) -> VariationResult<'e> {
        let cfg = self.config;
        let w = self.cutflow_weight(event);
        let cuts = SelectionCuts::for_variation(cfg, variation);

        let mut jets = baseline.to_vec();
        for (i, jet) in jets.iter_mut().enumerate() {
            *failures += self.applier.apply(jet, var_index, variation, i == 0, self.tools);
        }
        sort_by_pt_desc(&mut jets);

        if (cfg.iteration > 0 || !cfg.vjet_calib) && self.fails_subleading(jets[1].pt()) {
            return VariationResult::Skipped(CutLabel::PtSub);
        }
        cutflows.pass(var_index, CutLabel::PtSub, w);

        jets.retain(|j| j.pt() >= cuts.pt_threshold);
        if jets.len() < cfg.num_jets {
            return VariationResult::Skipped(CutLabel::PtThreshold);
        }
        cutflows.pass(var_index, CutLabel::PtThreshold, w);

        for jet in jets.iter_mut() {
            jet.jvt = self.tools.jvt.update_jvt(&*jet);
        }
        jets.retain(|j| {
            !(j.pt() < JVT_MAX_PT && j.det_eta.abs() < JVT_MAX_ETA && j.jvt < cfg.jvt_cut)
        });
        if jets.len() < cfg.num_jets {
            return VariationResult::Skipped(CutLabel::Jvt);
        }
        cutflows.pass(var_index, CutLabel::Jvt, w);

        if jets.iter().any(|j| !j.source.is_clean) {
            return VariationResult::Aborted(CutLabel::CleanJet);
        }
        cutflows.pass(var_index, CutLabel::CleanJet, w);

        let recoil = recoil_system(&jets);

        let Some(prescale) = self.trigger_prescale(event, recoil.pt) else {
            return VariationResult::Skipped(CutLabel::TriggerEff);
        };
        cutflows.pass(var_index, CutLabel::TriggerEff, w);

        let pt_asym = jets[1].pt() / recoil.pt;
        if pt_asym.is_nan() || pt_asym > cuts.pt_asym {
            return VariationResult::Skipped(CutLabel::PtAsym);
        }
        cutflows.pass(var_index, CutLabel::PtAsym, w);

        let alpha = alpha(&jets[0], &recoil);
        if PI - alpha > cuts.alpha {
            return VariationResult::Skipped(CutLabel::Alpha);
        }
        cutflows.pass(var_index, CutLabel::Alpha, w);

        let beta = beta_scan(&mut jets, cfg.all_jet_beta);
        if beta.smallest < cuts.beta {
            return VariationResult::Skipped(CutLabel::Beta);
        }
        cutflows.pass(var_index, CutLabel::Beta, w);

        VariationResult::Selected(Box::new(Selection {
            jets,
            recoil,
            pt_asym,
            alpha,
            beta,
            prescale,
        }))
    }

    /// Subleading pt on the wrong side of the iteration threshold.
    fn fails_subleading(&self, subleading_pt: f64) -> bool {
        let thr = self.config.subleading_threshold();
        if self.config.reverse_subleading { subleading_pt <= thr } else { subleading_pt > thr }
    }

    /// Prescale when the trigger requirement is met.
    ///
    /// The first bucket whose threshold lies below the recoil pt decides. No
    /// configured triggers always passes; no matching bucket fails.
    fn trigger_prescale(&self, event: &EventInput, recoil_pt: f64) -> Option<f64> {
        if self.config.triggers.is_empty() {
            return Some(1.0);
        }
        let bucket = self.config.triggers.iter().find(|b| recoil_pt > b.threshold)?;
        event.trigger(&bucket.name).filter(|d| d.passed).map(|d| d.prescale)
    }
}
