//! Variable-width 1D histogram.

use mjb_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::filler::{FlowPolicy, find_bin};

/// A 1D histogram with explicit bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Histogram title.
    #[serde(default)]
    pub title: String,
    /// Number of bins (excluding under/overflow).
    pub n_bins: usize,
    /// Lower edge of first bin.
    pub x_min: f64,
    /// Upper edge of last bin.
    pub x_max: f64,
    /// Bin edges (length = n_bins + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents (length = n_bins, excluding under/overflow).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin (for statistical errors), if stored.
    pub sumw2: Option<Vec<f64>>,
    /// Sum of weights of entries below `x_min`.
    #[serde(default)]
    pub underflow: f64,
    /// Sum of weights of entries at or above `x_max`.
    #[serde(default)]
    pub overflow: f64,
    /// Total number of entries.
    pub entries: f64,
}

impl Histogram {
    /// Create an empty histogram. Edges must be strictly increasing with at least one bin.
    pub fn new(name: impl Into<String>, bin_edges: Vec<f64>) -> Result<Self> {
        let name = name.into();
        validate_edges(&name, &bin_edges)?;
        let n_bins = bin_edges.len() - 1;
        Ok(Self {
            title: name.clone(),
            name,
            n_bins,
            x_min: bin_edges[0],
            x_max: bin_edges[n_bins],
            bin_content: vec![0.0; n_bins],
            sumw2: Some(vec![0.0; n_bins]),
            bin_edges,
            underflow: 0.0,
            overflow: 0.0,
            entries: 0.0,
        })
    }

    /// Create a histogram from known contents and per-bin errors.
    pub fn from_contents(
        name: impl Into<String>,
        bin_edges: Vec<f64>,
        bin_content: Vec<f64>,
        bin_errors: Option<Vec<f64>>,
    ) -> Result<Self> {
        let mut h = Self::new(name, bin_edges)?;
        if bin_content.len() != h.n_bins {
            return Err(Error::Histogram(format!(
                "'{}': {} contents for {} bins",
                h.name,
                bin_content.len(),
                h.n_bins
            )));
        }
        h.sumw2 = match bin_errors {
            Some(errs) => {
                if errs.len() != h.n_bins {
                    return Err(Error::Histogram(format!(
                        "'{}': {} errors for {} bins",
                        h.name,
                        errs.len(),
                        h.n_bins
                    )));
                }
                Some(errs.iter().map(|e| e * e).collect())
            }
            None => None,
        };
        h.entries = bin_content.len() as f64;
        h.bin_content = bin_content;
        Ok(h)
    }

    /// Index of the in-range bin containing `x`, or `None` for under/overflow.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        find_bin(&self.bin_edges, x)
    }

    /// Statistical error of bin `i` (0-based). Falls back to `sqrt(content)`
    /// when no sum of squared weights is stored.
    pub fn bin_error(&self, i: usize) -> f64 {
        match &self.sumw2 {
            Some(w2) => w2.get(i).map(|v| v.sqrt()).unwrap_or(0.0),
            None => self.bin_content.get(i).map(|v| v.abs().sqrt()).unwrap_or(0.0),
        }
    }

    /// Content of the bin containing `x`.
    ///
    /// Out-of-range values either read the nearest edge bin
    /// ([`FlowPolicy::Fold`]) or yield `None` ([`FlowPolicy::Drop`]).
    pub fn content_at(&self, x: f64, policy: FlowPolicy) -> Option<f64> {
        self.bin_at(x, policy).map(|b| self.bin_content[b])
    }

    /// Bin index for `x` under the given flow policy.
    pub fn bin_at(&self, x: f64, policy: FlowPolicy) -> Option<usize> {
        if x.is_nan() {
            return None;
        }
        match (self.find_bin(x), policy) {
            (Some(b), _) => Some(b),
            (None, FlowPolicy::Drop) => None,
            (None, FlowPolicy::Fold) => Some(if x < self.x_min { 0 } else { self.n_bins - 1 }),
        }
    }

    /// Add `weight` at `x`. Out-of-range entries go to under/overflow.
    pub fn fill(&mut self, x: f64, weight: f64) {
        if x.is_nan() {
            return;
        }
        match self.find_bin(x) {
            Some(b) => {
                self.bin_content[b] += weight;
                if let Some(w2) = self.sumw2.as_mut() {
                    w2[b] += weight * weight;
                }
                self.entries += 1.0;
            }
            None if x < self.x_min => self.underflow += weight,
            None => self.overflow += weight,
        }
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Weighted mean of bin centres, `0.0` for an empty histogram.
    pub fn mean(&self) -> f64 {
        let mut sw = 0.0;
        let mut swx = 0.0;
        for (i, &w) in self.bin_content.iter().enumerate() {
            let centre = 0.5 * (self.bin_edges[i] + self.bin_edges[i + 1]);
            sw += w;
            swx += w * centre;
        }
        if sw == 0.0 { 0.0 } else { swx / sw }
    }
}

pub(crate) fn validate_edges(name: &str, edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Histogram(format!("'{name}': need at least two bin edges")));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::Histogram(format!(
            "'{name}': bin edges must be finite and strictly increasing"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correction() -> Histogram {
        Histogram::from_contents(
            "DoubleMJB",
            vec![300.0, 400.0, 600.0, 1000.0],
            vec![1.02, 1.01, 0.99],
            Some(vec![0.01, 0.02, 0.03]),
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_bad_edges() {
        assert!(Histogram::new("h", vec![1.0]).is_err());
        assert!(Histogram::new("h", vec![0.0, 2.0, 1.0]).is_err());
        assert!(Histogram::new("h", vec![0.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn from_contents_checks_lengths() {
        assert!(Histogram::from_contents("h", vec![0.0, 1.0], vec![1.0, 2.0], None).is_err());
        assert!(
            Histogram::from_contents("h", vec![0.0, 1.0], vec![1.0], Some(vec![0.1, 0.1])).is_err()
        );
    }

    #[test]
    fn lookup_and_errors() {
        let h = correction();
        assert_eq!(h.find_bin(450.0), Some(1));
        assert_eq!(h.content_at(450.0, FlowPolicy::Drop), Some(1.01));
        assert!((h.bin_error(2) - 0.03).abs() < 1e-12);
    }

    #[test]
    fn flow_policies() {
        let h = correction();
        assert_eq!(h.content_at(250.0, FlowPolicy::Drop), None);
        assert_eq!(h.content_at(250.0, FlowPolicy::Fold), Some(1.02));
        assert_eq!(h.content_at(5000.0, FlowPolicy::Fold), Some(0.99));
        assert_eq!(h.content_at(f64::NAN, FlowPolicy::Fold), None);
    }

    #[test]
    fn fill_tracks_flows() {
        let mut h = Histogram::new("h", vec![0.0, 1.0, 2.0]).unwrap();
        h.fill(0.5, 2.0);
        h.fill(-1.0, 1.0);
        h.fill(2.0, 3.0);
        assert_eq!(h.bin_content, vec![2.0, 0.0]);
        assert_eq!(h.sumw2, Some(vec![4.0, 0.0]));
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.overflow, 3.0);
        assert_eq!(h.entries, 1.0);
    }

    #[test]
    fn mean_of_bin_centres() {
        let mut h = Histogram::new("h", vec![0.0, 1.0, 2.0]).unwrap();
        assert_eq!(h.mean(), 0.0);
        h.fill(0.2, 1.0);
        h.fill(1.7, 3.0);
        assert!((h.mean() - 1.25).abs() < 1e-12);
    }
}
