//! # mjb-hist
//!
//! Histogram layer for the multijet balance engine.
//!
//! - [`Histogram`]: variable-width 1D histogram with ROOT-style lookups
//! - [`Histogram2D`]: recoil-pt × balance histograms and their projections
//! - [`CorrectionStore`]: `Iteration<N>_<variation>/<hist>` calibration stores
//! - [`BootstrapToys`]: Poisson-weighted replicas per systematic variation
//! - [`rebin_from_toys`]: significance-driven rebinning from bootstrap toys
//!
//! ## Example
//!
//! ```
//! use mjb_hist::Histogram;
//!
//! let mut h = Histogram::new("recoilPt", vec![300.0, 360.0, 420.0]).unwrap();
//! h.fill(310.0, 1.0);
//! assert_eq!(h.bin_content, vec![1.0, 0.0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod filler;
pub mod histogram;
pub mod rebin;
pub mod store;

pub use bootstrap::{BootstrapToys, ToySet};
pub use filler::{FlowPolicy, Histogram2D};
pub use histogram::Histogram;
pub use rebin::{RebinResult, rebin_from_toys};
pub use store::{CorrectionStore, StoredDirectory, StoredHistogram};
