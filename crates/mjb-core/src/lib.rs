//! # mjb-core
//!
//! Core types and traits for the multijet balance engine.
//!
//! This crate provides:
//! - Error types
//! - `FourMomentum` kinematics (pt, eta, phi, E)
//! - Traits for the external jet tools (calibration, uncertainties, JVT, b-tagging)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod kinematics;
pub mod traits;

pub use error::{Error, Result};
pub use kinematics::{FourMomentum, delta_phi, phi_0_2pi, phi_mpi_pi};
pub use traits::{BTagger, JetCalibrator, JetView, JvtTagger, UncertaintyProvider};
