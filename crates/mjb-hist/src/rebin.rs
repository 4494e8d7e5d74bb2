//! Significance-driven rebinning from bootstrap toys.
//!
//! Walks the recoil-pt axis from the top down, merging bins until the
//! relative balance shift between a systematic variation and the nominal is
//! significant across the bootstrap toys. The merged ranges become the bins
//! of the next iteration's correction.

use mjb_core::{Error, Result};
use serde::Serialize;

use crate::filler::Histogram2D;

/// Maximum relative toy spread (`rms / |mean|`) accepted for a closed bin.
const MAX_RELATIVE_SPREAD: f64 = 0.316_227_766_016_837_94; // 1/sqrt(10)

/// Output of [`rebin_from_toys`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebinResult {
    /// New bin edges, ascending.
    pub bin_edges: Vec<f64>,
    /// Toy standard deviation of the relative shift in each new bin.
    pub rms: Vec<f64>,
}

/// Derive recoil-pt bin edges from paired systematic/nominal toys.
///
/// `systematic[i]` and `nominal[i]` are toy `i` of the variation and of the
/// nominal, with identical binning. Bins whose lower edge is at or above
/// `upper_edge` are ignored and the top edge is capped at `upper_edge`.
/// A bin is closed when `|mean| / rms > significance` and
/// `rms / |mean| < 1/sqrt(10)`, where `mean` and `rms` are the average and
/// sample standard deviation over toys of `(sys - nom) / sys` for the
/// toy-wise mean balance in the candidate range.
pub fn rebin_from_toys(
    systematic: &[Histogram2D],
    nominal: &[Histogram2D],
    upper_edge: f64,
    significance: f64,
) -> Result<RebinResult> {
    if systematic.is_empty() || systematic.len() != nominal.len() {
        return Err(Error::Histogram(format!(
            "need matching non-empty toy sets (systematic={}, nominal={})",
            systematic.len(),
            nominal.len()
        )));
    }
    let reference = &systematic[0];
    if systematic.iter().chain(nominal).any(|h| h.x_edges != reference.x_edges) {
        return Err(Error::Histogram("toy histograms have different recoil-pt binning".into()));
    }

    // Edge indices into `x_edges`; edge k is the upper edge of 0-based bin k-1.
    let mut top = reference.nx();
    while top > 0 && reference.x_low_edge(top - 1) >= upper_edge {
        top -= 1;
    }
    if top == 0 {
        return Err(Error::Histogram(format!(
            "no recoil-pt bins below upper edge {upper_edge}"
        )));
    }

    let mut edges = vec![top];
    let mut spreads = Vec::new();
    for low in (0..top).rev() {
        let high = edges[edges.len() - 1];
        let mut shifts = Vec::with_capacity(systematic.len());
        for (sys, nom) in systematic.iter().zip(nominal) {
            let sys_val = sys.projection_y(low, high - 1)?.mean();
            let nom_val = nom.projection_y(low, high - 1)?.mean();
            shifts.push((sys_val - nom_val) / sys_val);
        }
        let (mean, rms) = mean_and_std(&shifts);
        if rms > 0.0 && mean.abs() / rms > significance && rms / mean.abs() < MAX_RELATIVE_SPREAD {
            log::debug!(
                "closing recoil-pt bin at {} (mean shift {mean:.4}, rms {rms:.4})",
                reference.x_low_edge(low)
            );
            edges.push(low);
            spreads.push(rms);
        }
    }

    let bin_edges: Vec<f64> =
        edges.iter().rev().map(|&k| reference.x_edges[k].min(upper_edge)).collect();
    spreads.reverse();
    Ok(RebinResult { bin_edges, rms: spreads })
}

/// Mean and sample standard deviation (`n - 1` denominator).
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy(name: &str, fills: &[(f64, f64, f64)]) -> Histogram2D {
        let mut h = Histogram2D::new(
            name,
            vec![300.0, 400.0, 500.0, 600.0, 2000.0],
            vec![0.0, 0.5, 1.0, 1.5, 2.0],
        )
        .unwrap();
        for &(x, y, w) in fills {
            h.fill(x, y, w);
        }
        h
    }

    #[test]
    fn mismatched_inputs_rejected() {
        let a = toy("a", &[]);
        assert!(rebin_from_toys(&[a.clone()], &[], 600.0, 1.0).is_err());
        assert!(rebin_from_toys(&[], &[], 600.0, 1.0).is_err());
        assert!(rebin_from_toys(&[a.clone()], &[a], 250.0, 1.0).is_err());
    }

    #[test]
    fn significant_shift_closes_every_bin() {
        // Systematic shifted up by a varying but always clearly positive amount.
        let mut sys = Vec::new();
        let mut nom = Vec::new();
        for i in 0..10 {
            let bump = 0.5 + 0.05 * (i % 3) as f64;
            let mut s = Vec::new();
            let mut n = Vec::new();
            for x in [350.0, 450.0, 550.0] {
                n.push((x, 0.75, 1.0));
                s.push((x, 0.75, 1.0 - bump));
                s.push((x, 1.25, bump));
            }
            sys.push(toy("sys", &s));
            nom.push(toy("nom", &n));
        }
        let r = rebin_from_toys(&sys, &nom, 600.0, 2.0).unwrap();
        assert_eq!(r.bin_edges, vec![300.0, 400.0, 500.0, 600.0]);
        assert_eq!(r.rms.len(), 3);
        assert!(r.rms.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn identical_toys_never_close_a_bin() {
        let fills = [(350.0, 0.75, 1.0), (450.0, 1.25, 1.0)];
        let sys: Vec<_> = (0..5).map(|_| toy("sys", &fills)).collect();
        let nom = sys.clone();
        let r = rebin_from_toys(&sys, &nom, 1000.0, 1.0).unwrap();
        assert_eq!(r.bin_edges, vec![1000.0]);
        assert!(r.rms.is_empty());
    }

    #[test]
    fn sample_std() {
        let (m, s) = mean_and_std(&[1.0, 2.0, 3.0]);
        assert!((m - 2.0).abs() < 1e-12);
        assert!((s - 1.0).abs() < 1e-12);
    }
}
