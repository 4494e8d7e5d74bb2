//! Bootstrap toys for the statistical uncertainty of the balance.
//!
//! Every selected event is filled into `n_toys` replicas of the
//! recoil-pt × balance histogram with an extra Poisson(1) weight. The toy
//! weights depend only on (run, event), so the same event carries the same
//! weights in every systematic variation and toy-by-toy differences between
//! a variation and the nominal are correlated the way the rebinning needs.

use std::collections::HashMap;

use mjb_core::{Error, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use serde::Serialize;

use crate::filler::Histogram2D;

/// Toy replicas for one variation.
#[derive(Debug, Clone, Serialize)]
pub struct ToySet {
    /// Variation name.
    pub variation: String,
    /// Histogram filled with the event weight only.
    pub central: Histogram2D,
    /// Poisson-reweighted replicas.
    pub toys: Vec<Histogram2D>,
}

/// Bootstrap toy accumulator keyed by variation name.
#[derive(Debug, Clone)]
pub struct BootstrapToys {
    sets: Vec<ToySet>,
    index: HashMap<String, usize>,
    n_toys: usize,
    poisson: Poisson<f64>,
    cached: Option<((u32, u64), Vec<f64>)>,
}

impl BootstrapToys {
    /// Create toy sets for each variation with the given recoil-pt and balance binning.
    pub fn new(
        variations: &[String],
        recoil_pt_edges: &[f64],
        balance_edges: &[f64],
        n_toys: usize,
    ) -> Result<Self> {
        if n_toys == 0 {
            return Err(Error::config("bootstrap needs at least one toy"));
        }
        let mut sets = Vec::with_capacity(variations.len());
        let mut index = HashMap::with_capacity(variations.len());
        for name in variations {
            let hist = |suffix: &str| {
                Histogram2D::new(
                    format!("{name}_recoilPt_PtBal{suffix}"),
                    recoil_pt_edges.to_vec(),
                    balance_edges.to_vec(),
                )
            };
            let central = hist("")?;
            let toys = (0..n_toys).map(|i| hist(&format!("_toy{i}"))).collect::<Result<Vec<_>>>()?;
            index.insert(name.clone(), sets.len());
            sets.push(ToySet { variation: name.clone(), central, toys });
        }
        let poisson =
            Poisson::new(1.0).map_err(|e| Error::Histogram(format!("poisson(1): {e}")))?;
        Ok(Self { sets, index, n_toys, poisson, cached: None })
    }

    /// Number of toys per variation.
    pub fn n_toys(&self) -> usize {
        self.n_toys
    }

    /// Fill one selected event for `variation`.
    pub fn fill(
        &mut self,
        variation: &str,
        run_number: u32,
        event_number: u64,
        recoil_pt: f64,
        pt_balance: f64,
        weight: f64,
    ) -> Result<()> {
        let slot = *self.index.get(variation).ok_or_else(|| {
            Error::Histogram(format!("no bootstrap toys booked for variation '{variation}'"))
        })?;
        let key = (run_number, event_number);
        if self.cached.as_ref().map(|(k, _)| *k) != Some(key) {
            let mut rng = StdRng::seed_from_u64(event_seed(run_number, event_number));
            let weights = (0..self.n_toys).map(|_| self.poisson.sample(&mut rng)).collect();
            self.cached = Some((key, weights));
        }
        let toy_weights: &[f64] = match &self.cached {
            Some((_, w)) => w,
            None => &[],
        };
        let set = &mut self.sets[slot];
        set.central.fill(recoil_pt, pt_balance, weight);
        for (toy, tw) in set.toys.iter_mut().zip(toy_weights) {
            if *tw > 0.0 {
                toy.fill(recoil_pt, pt_balance, weight * tw);
            }
        }
        Ok(())
    }

    /// Toy set for a variation.
    pub fn toy_set(&self, variation: &str) -> Option<&ToySet> {
        self.index.get(variation).map(|&i| &self.sets[i])
    }

    /// All toy sets in booking order.
    pub fn sets(&self) -> &[ToySet] {
        &self.sets
    }

    /// Consume the accumulator.
    pub fn into_sets(self) -> Vec<ToySet> {
        self.sets
    }
}

/// SplitMix64 finalizer over (run, event).
fn event_seed(run_number: u32, event_number: u64) -> u64 {
    let mut z = ((run_number as u64) << 32) ^ event_number;
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
