//! # mjb-balance
//!
//! Multijet balance event selection for the jet energy scale calibration.
//!
//! This crate provides:
//! - the variation registry (nominal, calibration-stage toggles, named
//!   uncertainty shifts, MJB cut variations)
//! - the per-event, per-variation selection state machine and cutflow
//! - corrections applied to jet kinematics under each variation
//! - balance observables, weights and the output sink
//!
//! ## Architecture
//!
//! Jet tools (calibration, uncertainties, JVT, b-tagging) are reached only
//! through the traits in `mjb-core`. Histogram storage, calibration stores and
//! bootstrap toys live in `mjb-hist`. The job driver [`MultijetBalance`] owns
//! the immutable configuration; per-job mutable state lives in an explicit
//! [`RunState`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Job configuration and derived mode flags.
pub mod config;
/// Correction factors applied to jets under a variation.
pub mod correction;
/// Per-variation cutflow counters.
pub mod cutflow;
/// Reconstructed jets, per-variation candidates and event input.
pub mod jet;
/// Cross-section and acceptance lookup.
pub mod lumi;
/// Recoil system and balance observables.
pub mod observables;
/// Job driver and run state.
pub mod run;
/// Event selection state machine.
pub mod selection;
/// Histogram, record and bootstrap output.
pub mod sink;
/// Calibration stage map.
pub mod stages;
/// Uncertainty component catalog.
pub mod systematics;
/// Default jet tool implementations and the tool bundle.
pub mod tools;
/// Variation descriptors and the variation registry.
pub mod variation;

pub use config::{MjbConfig, PreparedConfig, TriggerBucket};
pub use correction::CorrectionApplier;
pub use cutflow::{CutLabel, Cutflow, CutflowSet};
pub use jet::{EventInput, JetCandidate, RecoJet, TriggerDecision};
pub use lumi::XsAccTable;
pub use observables::{BalanceObservables, EventWeights};
pub use run::{MultijetBalance, RunState, RunSummary};
pub use selection::{EventOutcome, EventSelector, VariationOutcome};
pub use sink::{BalanceRecord, InMemorySink, OutputSink};
pub use stages::{CalibrationStage, CalibrationStageMap};
pub use systematics::{SystematicComponent, SystematicsCatalog};
pub use tools::JetTools;
pub use variation::{Sign, Variation, VariationContext, VariationKind, VariationRegistry};
