//! Bin lookup and 2D filling for balance distributions.

use mjb_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::histogram::{Histogram, validate_edges};

/// Under/overflow handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowPolicy {
    /// Values outside the histogram range have no bin.
    Drop,
    /// Underflow reads the first bin and overflow reads the last bin.
    Fold,
}

/// A 2D histogram, x = recoil pt, y = balance ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram2D {
    /// Histogram name.
    pub name: String,
    /// X bin edges.
    pub x_edges: Vec<f64>,
    /// Y bin edges.
    pub y_edges: Vec<f64>,
    /// Bin contents, row-major over x (`content[ix * ny + iy]`).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin.
    pub sumw2: Vec<f64>,
    /// Entries that fell outside either axis.
    pub out_of_range: f64,
    /// Total in-range entries.
    pub entries: u64,
}

impl Histogram2D {
    /// Create an empty 2D histogram.
    pub fn new(name: impl Into<String>, x_edges: Vec<f64>, y_edges: Vec<f64>) -> Result<Self> {
        let name = name.into();
        validate_edges(&name, &x_edges)?;
        validate_edges(&name, &y_edges)?;
        let n = (x_edges.len() - 1) * (y_edges.len() - 1);
        Ok(Self {
            name,
            x_edges,
            y_edges,
            bin_content: vec![0.0; n],
            sumw2: vec![0.0; n],
            out_of_range: 0.0,
            entries: 0,
        })
    }

    /// Number of x bins.
    pub fn nx(&self) -> usize {
        self.x_edges.len() - 1
    }

    /// Number of y bins.
    pub fn ny(&self) -> usize {
        self.y_edges.len() - 1
    }

    /// Add `weight` at `(x, y)`.
    pub fn fill(&mut self, x: f64, y: f64, weight: f64) {
        match (find_bin(&self.x_edges, x), find_bin(&self.y_edges, y)) {
            (Some(ix), Some(iy)) => {
                let k = ix * self.ny() + iy;
                self.bin_content[k] += weight;
                self.sumw2[k] += weight * weight;
                self.entries += 1;
            }
            _ => self.out_of_range += weight,
        }
    }

    /// Content of bin `(ix, iy)`, both 0-based.
    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.bin_content[ix * self.ny() + iy]
    }

    /// Lower edge of x bin `ix`.
    pub fn x_low_edge(&self, ix: usize) -> f64 {
        self.x_edges[ix]
    }

    /// Upper edge of x bin `ix`.
    pub fn x_up_edge(&self, ix: usize) -> f64 {
        self.x_edges[ix + 1]
    }

    /// Project x bins `first..=last` (0-based, inclusive) onto the y axis.
    pub fn projection_y(&self, first: usize, last: usize) -> Result<Histogram> {
        if first > last || last >= self.nx() {
            return Err(Error::Histogram(format!(
                "'{}': invalid projection range {first}..={last} (nx={})",
                self.name,
                self.nx()
            )));
        }
        let mut proj = Histogram::new(format!("{}_py", self.name), self.y_edges.clone())?;
        let ny = self.ny();
        let w2 = proj.sumw2.get_or_insert_with(|| vec![0.0; ny]);
        for ix in first..=last {
            for iy in 0..ny {
                let k = ix * ny + iy;
                proj.bin_content[iy] += self.bin_content[k];
                w2[iy] += self.sumw2[k];
            }
        }
        proj.entries = proj.bin_content.iter().filter(|&&c| c != 0.0).count() as f64;
        Ok(proj)
    }

    /// Add another histogram with identical binning.
    pub fn add(&mut self, other: &Histogram2D) -> Result<()> {
        if self.x_edges != other.x_edges || self.y_edges != other.y_edges {
            return Err(Error::Histogram(format!(
                "cannot add '{}' to '{}': binning differs",
                other.name, self.name
            )));
        }
        for (a, b) in self.bin_content.iter_mut().zip(&other.bin_content) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.out_of_range += other.out_of_range;
        self.entries += other.entries;
        Ok(())
    }
}

/// Find the bin index for a value given sorted bin edges.
///
/// Returns `None` for underflow/overflow and NaN.
pub fn find_bin(edges: &[f64], val: f64) -> Option<usize> {
    if edges.len() < 2 || val.is_nan() || val < edges[0] || val >= edges[edges.len() - 1] {
        return None;
    }
    match edges.binary_search_by(|e| e.total_cmp(&val)) {
        Ok(i) => {
            if i >= edges.len() - 1 {
                None
            } else {
                Some(i)
            }
        }
        Err(i) => {
            if i == 0 || i >= edges.len() {
                None
            } else {
                Some(i - 1)
            }
        }
    }
}
