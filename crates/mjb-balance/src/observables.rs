//! Recoil system, balance ratios, per-jet decorations and event weights.

use mjb_core::{FourMomentum, delta_phi};
use serde::Serialize;

use crate::jet::{BTagResult, JetCandidate};
use crate::tools::JetTools;

/// Jets tagged outside this |eta| get a unit scale factor.
const BTAG_MAX_ABS_ETA: f64 = 2.5;
/// Scale factor recorded when the b-tagging tool fails.
pub const BTAG_SF_FAILURE: f64 = -2.0;
/// Initial smallest beta, larger than any Δφ.
const NO_BETA: f64 = 10.0;
/// Fraction of the lead pt a jet needs to enter the beta cut.
const BETA_PT_FRACTION: f64 = 0.25;

/// Sum of all non-lead jets.
pub fn recoil_system(jets: &[JetCandidate<'_>]) -> FourMomentum {
    jets.iter().skip(1).map(|j| j.momentum).sum()
}

/// `|Δφ(lead, recoil)|`.
pub fn alpha(lead: &JetCandidate<'_>, recoil: &FourMomentum) -> f64 {
    delta_phi(lead.momentum.phi, recoil.phi)
}

/// Result of the beta scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaScan {
    /// Value compared with the beta cut.
    pub smallest: f64,
    /// Mean Δφ over non-lead jets.
    pub average: f64,
}

/// Compute Δφ(jet, lead) for every non-lead jet and decorate it.
///
/// The cut value is the smallest Δφ among jets above a quarter of the lead
/// pt, or the last jet's Δφ when `all_jet_beta` is set.
pub fn beta_scan(jets: &mut [JetCandidate<'_>], all_jet_beta: bool) -> BetaScan {
    let Some((lead, rest)) = jets.split_first_mut() else {
        return BetaScan { smallest: NO_BETA, average: 0.0 };
    };
    let mut smallest = NO_BETA;
    let mut sum = 0.0;
    for jet in rest.iter_mut() {
        let b = delta_phi(jet.momentum.phi, lead.momentum.phi);
        if all_jet_beta {
            smallest = b;
        } else if b < smallest && jet.pt() > lead.pt() * BETA_PT_FRACTION {
            smallest = b;
        }
        sum += b;
        jet.beta = Some(b);
    }
    let average = if rest.is_empty() { 0.0 } else { sum / rest.len() as f64 };
    BetaScan { smallest, average }
}

/// Decorate jets with b-tagging decisions and scale factors for every
/// working point. Returns the number of scale-factor failures.
pub fn tag_jets(
    jets: &mut [JetCandidate<'_>],
    working_points: &[String],
    tools: &JetTools,
    is_mc: bool,
) -> u32 {
    let mut failures = 0;
    for jet in jets.iter_mut() {
        jet.btag.clear();
    }
    for wp in working_points {
        for jet in jets.iter_mut() {
            let tagged = tools.btagger.accept(wp, &*jet);
            let mut scale_factor = 1.0;
            if is_mc && jet.momentum.eta.abs() < BTAG_MAX_ABS_ETA {
                let sf = if tagged {
                    tools.btagger.scale_factor(wp, &*jet)
                } else {
                    tools.btagger.inefficiency_scale_factor(wp, &*jet)
                };
                scale_factor = match sf {
                    Ok(v) => v,
                    Err(e) => {
                        log::debug!("b-tag scale factor failed at WP {wp}: {e}");
                        failures += 1;
                        BTAG_SF_FAILURE
                    }
                };
            }
            jet.btag.push(BTagResult { working_point: wp.clone(), tagged, scale_factor });
        }
    }
    failures
}

/// Decorate jets with their tile energy fraction.
pub fn fill_tile_fractions(jets: &mut [JetCandidate<'_>]) {
    for jet in jets.iter_mut() {
        jet.tile_frac = jet.source.tile_fraction();
    }
}

/// Event weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EventWeights {
    /// Generator weight, `1` on data.
    pub mc_event_weight: f64,
    /// Prescale of the deciding trigger.
    pub prescale: f64,
    /// Cross-section times acceptance.
    pub xs: f64,
    /// Final weight: `mc_event_weight * xs` on simulation, `prescale` on data.
    pub weight: f64,
}

impl EventWeights {
    /// Combine the weight ingredients.
    pub fn new(is_mc: bool, mc_event_weight: f64, prescale: f64, xs: f64, acceptance: f64) -> Self {
        let xs = xs * acceptance;
        let weight = if is_mc { mc_event_weight * xs } else { prescale };
        Self { mc_event_weight, prescale, xs, weight }
    }
}

/// Event-level observables of one selected variation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceObservables {
    /// Jets after selection.
    pub njet: usize,
    /// Recoil system.
    pub recoil: FourMomentum,
    /// Recoil invariant mass.
    pub recoil_mass: f64,
    /// `lead.pt / recoil.pt`.
    pub pt_bal: f64,
    /// `(lead.pt + recoil.pt) / (2 recoil.pt)`.
    pub pt_bal2: f64,
    /// Subleading over recoil pt.
    pub pt_asym: f64,
    /// `|Δφ(lead, recoil)|`.
    pub alpha: f64,
    /// Mean Δφ of non-lead jets to the lead jet.
    pub avg_beta: f64,
    /// Weights.
    pub weights: EventWeights,
}

impl BalanceObservables {
    /// Assemble observables from the selected jets and the selection values.
    pub fn build(
        jets: &[JetCandidate<'_>],
        recoil: FourMomentum,
        pt_asym: f64,
        alpha: f64,
        avg_beta: f64,
        weights: EventWeights,
    ) -> Self {
        let lead_pt = jets.first().map_or(0.0, |j| j.pt());
        Self {
            njet: jets.len(),
            recoil,
            recoil_mass: recoil.mass(),
            pt_bal: lead_pt / recoil.pt,
            pt_bal2: 0.5 * (lead_pt + recoil.pt) / recoil.pt,
            pt_asym,
            alpha,
            avg_beta,
            weights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jet::RecoJet;
    use crate::stages::EM_SCALE_KEY;
    use approx::assert_relative_eq;
    use mjb_core::{BTagger, Error, JetView, Result};
    use std::f64::consts::PI;

    fn reco(pt: f64, eta: f64, phi: f64) -> RecoJet {
        RecoJet::new(FourMomentum::massless(pt, eta, phi))
    }

    fn cands(jets: &[RecoJet]) -> Vec<JetCandidate<'_>> {
        jets.iter().map(|j| JetCandidate::new(j, j.momentum, EM_SCALE_KEY)).collect()
    }

    #[test]
    fn recoil_and_balance() {
        let jets = [reco(300.0, 0.0, 0.0), reco(150.0, 0.0, PI), reco(50.0, 0.0, PI)];
        let c = cands(&jets);
        let r = recoil_system(&c);
        assert_relative_eq!(r.pt, 200.0, epsilon = 1e-9);
        assert_relative_eq!(alpha(&c[0], &r), PI, epsilon = 1e-9);
        let w = EventWeights::new(false, 1.0, 2.0, 1.0, 1.0);
        let obs = BalanceObservables::build(&c, r, 0.75, PI, PI, w);
        assert_relative_eq!(obs.pt_bal, 1.5, epsilon = 1e-9);
        assert_relative_eq!(obs.pt_bal2, 1.25, epsilon = 1e-9);
        assert_relative_eq!(obs.recoil_mass, 0.0, epsilon = 1e-4);
        assert_eq!(obs.njet, 3);
        assert_eq!(obs.weights.weight, 2.0);
    }

    #[test]
    fn beta_ignores_soft_jets_unless_all_jet_beta() {
        let jets = [reco(400.0, 0.0, 0.0), reco(200.0, 0.0, 2.5), reco(60.0, 0.0, 0.4)];
        let mut c = cands(&jets);
        let scan = beta_scan(&mut c, false);
        assert_relative_eq!(scan.smallest, 2.5, epsilon = 1e-9);
        assert_relative_eq!(scan.average, 1.45, epsilon = 1e-9);
        assert_relative_eq!(c[2].beta.unwrap(), 0.4, epsilon = 1e-9);
        assert_eq!(c[0].beta, None);

        let scan = beta_scan(&mut c, true);
        assert_relative_eq!(scan.smallest, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn weights_by_mode() {
        let mc = EventWeights::new(true, 0.5, 3.0, 2.0e3, 0.01);
        assert_relative_eq!(mc.xs, 20.0);
        assert_relative_eq!(mc.weight, 10.0);
        let data = EventWeights::new(false, 0.5, 3.0, 1.0, 1.0);
        assert_eq!(data.weight, 3.0);
    }

    struct CentralTagger;

    impl BTagger for CentralTagger {
        fn name(&self) -> &str {
            "central"
        }
        fn accept(&self, wp: &str, jet: &dyn JetView) -> bool {
            wp == "77" && jet.momentum().eta.abs() < 1.0
        }
        fn scale_factor(&self, _wp: &str, _jet: &dyn JetView) -> Result<f64> {
            Ok(0.9)
        }
        fn inefficiency_scale_factor(&self, _wp: &str, jet: &dyn JetView) -> Result<f64> {
            if jet.momentum().pt < 100.0 {
                Err(Error::Correction("out of calibrated range".into()))
            } else {
                Ok(1.1)
            }
        }
    }

    #[test]
    fn btag_scale_factors() {
        let jets = [reco(300.0, 0.5, 0.0), reco(150.0, 1.5, 3.0), reco(50.0, 2.0, 3.0), reco(80.0, 3.0, 1.0)];
        let mut tools = JetTools::from_stored("JetInsituScaleMomentum");
        tools.btagger = Box::new(CentralTagger);
        let wps = vec!["77".to_string(), "85".to_string()];

        let mut c = cands(&jets);
        let failures = tag_jets(&mut c, &wps, &tools, true);
        assert_eq!(c[0].btag[0], BTagResult { working_point: "77".into(), tagged: true, scale_factor: 0.9 });
        assert_eq!(c[1].btag[0].scale_factor, 1.1);
        assert_eq!(c[2].btag[1].scale_factor, BTAG_SF_FAILURE);
        assert_eq!(c[3].btag[0].scale_factor, 1.0);
        // jet 2 fails at both working points
        assert_eq!(failures, 2);

        let mut c = cands(&jets);
        assert_eq!(tag_jets(&mut c, &wps, &tools, false), 0);
        assert!(c.iter().all(|j| j.btag.iter().all(|b| b.scale_factor == 1.0)));
    }

    #[test]
    fn tile_fractions_decorate() {
        let mut e = vec![0.0; 24];
        e[13] = 2.0;
        e[0] = 6.0;
        let jets = [reco(300.0, 0.0, 0.0).with_samplings(e), reco(100.0, 0.0, 3.0)];
        let mut c = cands(&jets);
        fill_tile_fractions(&mut c);
        assert_relative_eq!(c[0].tile_frac.unwrap(), 0.25);
        assert_eq!(c[1].tile_frac, None);
    }
}
