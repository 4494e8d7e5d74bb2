//! Jet kinematics under a variation.
//!
//! Every pass starts from the event baseline (or a stage momentum) and then
//! applies, depending on jet position and policy flags, the V+jet
//! calibration, an uncertainty shift or the previous iteration's MJB
//! correction. Out-of-range pt lookups read the nearest edge bin.

use mjb_hist::{FlowPolicy, Histogram};

use crate::config::PreparedConfig;
use crate::jet::JetCandidate;
use crate::stages::{CalibrationStageMap, GSC_SCALE_KEY};
use crate::tools::JetTools;
use crate::variation::{Sign, Variation, VariationKind};

/// Jets below this pt (GeV) get no V+jet calibration.
const VJET_MIN_PT: f64 = 20.0;

/// Applies calibration-stage swaps and correction factors to jets.
#[derive(Debug, Clone)]
pub struct CorrectionApplier {
    stage_keys: Vec<String>,
    corrections: Vec<Histogram>,
    vjet: Option<Histogram>,
    is_mc: bool,
    iteration: u32,
    closure_test: bool,
    leading_insitu: bool,
    no_limit_jes_pt: bool,
    first_threshold: f64,
}

impl CorrectionApplier {
    /// Build from the job configuration.
    ///
    /// `corrections` holds one MJB correction histogram per variation, in
    /// registry order, or nothing when no store is used.
    pub fn new(
        config: &PreparedConfig,
        stages: &CalibrationStageMap,
        corrections: Vec<Histogram>,
        vjet: Option<Histogram>,
    ) -> Self {
        Self {
            stage_keys: stages.stages().iter().map(|s| s.key.clone()).collect(),
            corrections,
            vjet,
            is_mc: config.is_mc,
            iteration: config.iteration,
            closure_test: config.closure_test,
            leading_insitu: config.leading_insitu,
            no_limit_jes_pt: config.no_limit_jes_pt,
            first_threshold: config.first_threshold(),
        }
    }

    /// MJB correction histograms in variation order.
    pub fn corrections(&self) -> &[Histogram] {
        &self.corrections
    }

    /// Set the kinematics of `jet` for variation `var_index`.
    ///
    /// Returns the number of correction failures (missing stage momenta or
    /// unusable correction values); the jet keeps its last valid kinematics.
    pub fn apply(
        &self,
        jet: &mut JetCandidate<'_>,
        var_index: usize,
        variation: &Variation,
        is_lead: bool,
        tools: &JetTools,
    ) -> u32 {
        let mut failures = 0;

        if variation.kind == VariationKind::CalibStage {
            let key = usize::try_from(variation.index).ok().and_then(|i| self.stage_keys.get(i));
            jet.momentum = match key.and_then(|k| jet.source.scale_momenta.get(k.as_str())) {
                Some(p) => *p,
                None => {
                    failures += 1;
                    jet.baseline
                }
            };
        } else if !is_lead || self.leading_insitu {
            jet.momentum = jet.baseline;
        } else {
            jet.momentum = match jet.source.scale_momenta.get(GSC_SCALE_KEY) {
                Some(p) => *p,
                None => {
                    failures += 1;
                    jet.baseline
                }
            };
        }

        if is_lead {
            if self.leading_insitu {
                self.apply_uncertainty(jet, variation, tools);
            } else if self.closure_test {
                failures += self.apply_mjb(jet, var_index, variation, true);
            }
        } else if self.no_limit_jes_pt || jet.pt() <= self.first_threshold {
            failures += self.apply_vjet(jet, variation);
            self.apply_uncertainty(jet, variation, tools);
        } else {
            failures += self.apply_mjb(jet, var_index, variation, false);
        }
        failures
    }

    fn apply_uncertainty(&self, jet: &mut JetCandidate<'_>, variation: &Variation, tools: &JetTools) {
        if self.is_mc || variation.kind != VariationKind::NamedShift {
            return;
        }
        if !self.no_limit_jes_pt && jet.pt() > self.first_threshold {
            return;
        }
        let component = usize::try_from(variation.index).unwrap_or_default();
        let u = tools.uncertainty.uncertainty(component, &*jet);
        let factor = match variation.sign {
            Sign::Up => 1.0 + u,
            _ => 1.0 - u,
        };
        jet.momentum = jet.momentum.scaled(factor);
    }

    fn apply_vjet(&self, jet: &mut JetCandidate<'_>, variation: &Variation) -> u32 {
        let Some(vjet) = &self.vjet else {
            return 0;
        };
        if self.is_mc || variation.kind == VariationKind::CalibStage || jet.pt() < VJET_MIN_PT {
            return 0;
        }
        match lookup(vjet, jet.pt()) {
            Some(c) => {
                jet.momentum = jet.momentum.scaled(1.0 / c);
                0
            }
            None => 1,
        }
    }

    fn apply_mjb(
        &self,
        jet: &mut JetCandidate<'_>,
        var_index: usize,
        variation: &Variation,
        is_lead: bool,
    ) -> u32 {
        if self.is_mc
            || (self.iteration == 0 && !self.closure_test)
            || (is_lead && !self.closure_test)
            || variation.kind == VariationKind::CalibStage
        {
            return 0;
        }
        let Some(hist) = self.corrections.get(var_index) else {
            return 1;
        };
        let Some(content) = lookup(hist, jet.pt()) else {
            return 1;
        };
        let factor = if variation.kind == VariationKind::MjbStat {
            let mut err = stat_bin_error(hist, variation.index);
            if variation.sign == Sign::Up {
                err = -err;
            }
            1.0 / (content * (1.0 + err))
        } else {
            1.0 / content
        };
        if !factor.is_finite() {
            return 1;
        }
        jet.momentum = jet.momentum.scaled(factor);
        0
    }
}

/// Correction value at `pt`, `None` when unusable as a divisor.
fn lookup(hist: &Histogram, pt: f64) -> Option<f64> {
    hist.content_at(pt, FlowPolicy::Fold).filter(|c| c.is_finite() && *c != 0.0)
}

/// Error of the bin `from_top` places below the last bin (1-based
/// `n_bins - from_top`); `0` outside the histogram.
fn stat_bin_error(hist: &Histogram, from_top: i32) -> f64 {
    let bin = hist.n_bins as i64 - i64::from(from_top);
    if bin >= 1 && bin <= hist.n_bins as i64 { hist.bin_error(bin as usize - 1) } else { 0.0 }
}
