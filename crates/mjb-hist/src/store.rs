//! Calibration histogram store.
//!
//! Mirrors the directory layout written by the MJB fitting step:
//! top-level histograms plus `Iteration<N>_<variation>` directories, each
//! holding the correction histogram (`DoubleMJB` or `DoubleMJB_leadJet`).
//! Directory order is preserved because the registry rebind depends on it.

use std::path::Path;

use mjb_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::histogram::Histogram;

/// Directory-name marker for simulation-type variations that are never loaded.
const MC_TYPE_MARKER: &str = "MCType";

/// A histogram as serialized in a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredHistogram {
    /// Histogram name.
    pub name: String,
    /// Bin edges (length = n_bins + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents.
    pub bin_content: Vec<f64>,
    /// Per-bin statistical errors.
    #[serde(default)]
    pub bin_errors: Option<Vec<f64>>,
}

impl StoredHistogram {
    /// Convert to a [`Histogram`], validating the binning.
    pub fn to_histogram(&self) -> Result<Histogram> {
        Histogram::from_contents(
            self.name.clone(),
            self.bin_edges.clone(),
            self.bin_content.clone(),
            self.bin_errors.clone(),
        )
    }
}

/// One named directory of histograms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDirectory {
    /// Directory name, e.g. `Iteration0_Nominal`.
    pub name: String,
    /// Histograms in this directory.
    #[serde(default)]
    pub histograms: Vec<StoredHistogram>,
}

/// An ordered hierarchical histogram store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionStore {
    /// Histograms at the top level.
    #[serde(default)]
    pub histograms: Vec<StoredHistogram>,
    /// Directories, in file order.
    #[serde(default)]
    pub directories: Vec<StoredDirectory>,
}

impl CorrectionStore {
    /// Parse a store from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a store from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|e| {
            Error::Histogram(format!("reading correction store {}: {e}", path.display()))
        })
    }

    /// Fetch a histogram by path: `name` at the top level or `dir/name`.
    pub fn get(&self, path: &str) -> Result<Histogram> {
        let found = match path.split_once('/') {
            Some((dir, name)) => self
                .directories
                .iter()
                .find(|d| d.name == dir)
                .and_then(|d| d.histograms.iter().find(|h| h.name == name)),
            None => self.histograms.iter().find(|h| h.name == path),
        };
        found
            .ok_or_else(|| Error::Histogram(format!("histogram '{path}' not found in store")))?
            .to_histogram()
    }

    /// Load the correction histograms of one iteration.
    ///
    /// Every directory whose name contains `Iteration<iteration>_` contributes
    /// its `hist_name` histogram, renamed to the directory name with the
    /// iteration prefix removed. Directories mentioning `MCType` are skipped.
    /// Results keep directory order.
    pub fn iteration_corrections(&self, iteration: u32, hist_name: &str) -> Result<Vec<Histogram>> {
        let prefix = format!("Iteration{iteration}_");
        let mut out = Vec::new();
        for dir in &self.directories {
            let Some(pos) = dir.name.find(&prefix) else {
                continue;
            };
            let variation = &dir.name[pos + prefix.len()..];
            if variation.contains(MC_TYPE_MARKER) {
                continue;
            }
            let stored = dir.histograms.iter().find(|h| h.name == hist_name).ok_or_else(|| {
                Error::Histogram(format!("directory '{}' has no '{hist_name}' histogram", dir.name))
            })?;
            let mut h = stored.to_histogram()?;
            h.name = variation.to_string();
            h.title = variation.to_string();
            out.push(h);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"{
        "histograms": [
            {"name": "EMJES_R4_correction", "bin_edges": [20, 100, 1000], "bin_content": [1.01, 0.98]}
        ],
        "directories": [
            {"name": "Iteration0_Nominal", "histograms": [
                {"name": "DoubleMJB", "bin_edges": [300, 600, 2000], "bin_content": [1.0, 1.02], "bin_errors": [0.01, 0.02]}
            ]},
            {"name": "Iteration0_MCType_Herwig", "histograms": [
                {"name": "DoubleMJB", "bin_edges": [300, 600, 2000], "bin_content": [1.0, 1.0]}
            ]},
            {"name": "Iteration1_Nominal", "histograms": [
                {"name": "DoubleMJB", "bin_edges": [300, 600, 2000], "bin_content": [0.9, 0.9]}
            ]},
            {"name": "Iteration0_MJB_a20_neg", "histograms": [
                {"name": "DoubleMJB", "bin_edges": [300, 600, 2000], "bin_content": [1.01, 1.03]}
            ]}
        ]
    }"#;

    #[test]
    fn top_level_and_nested_lookup() {
        let store = CorrectionStore::from_json_str(STORE).unwrap();
        let v = store.get("EMJES_R4_correction").unwrap();
        assert_eq!(v.n_bins, 2);
        let n = store.get("Iteration1_Nominal/DoubleMJB").unwrap();
        assert_eq!(n.bin_content, vec![0.9, 0.9]);
        assert!(store.get("Iteration1_Nominal/DoubleMJB_leadJet").is_err());
        assert!(store.get("missing").is_err());
    }

    #[test]
    fn iteration_corrections_skip_mc_type_and_keep_order() {
        let store = CorrectionStore::from_json_str(STORE).unwrap();
        let hists = store.iteration_corrections(0, "DoubleMJB").unwrap();
        let names: Vec<&str> = hists.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Nominal", "MJB_a20_neg"]);
        assert!((hists[0].bin_error(1) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn missing_correction_histogram_is_an_error() {
        let store = CorrectionStore::from_json_str(STORE).unwrap();
        let err = store.iteration_corrections(0, "DoubleMJB_leadJet").unwrap_err();
        assert!(err.to_string().contains("DoubleMJB_leadJet"));
    }
}
