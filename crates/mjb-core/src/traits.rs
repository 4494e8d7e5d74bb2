//! Traits for the external jet tools.
//!
//! The selection engine never depends on a concrete calibration, uncertainty,
//! JVT or b-tagging implementation. Each tool is a pure function of the jet it
//! is handed (plus a systematic component or working point), so tests and
//! production drivers plug in whatever provider they have.

use crate::Result;
use crate::kinematics::FourMomentum;

/// Read-only view of a jet as the external tools see it.
pub trait JetView {
    /// Current kinematics.
    fn momentum(&self) -> FourMomentum;

    /// Detector-level pseudorapidity.
    fn det_eta(&self) -> f64;

    /// Stored jet-vertex-tagger value.
    fn jvt(&self) -> f64;

    /// Momentum recorded at a calibration stage, keyed by attribute name
    /// (e.g. `JetEMScaleMomentum`).
    fn scale_momentum(&self, key: &str) -> Option<FourMomentum>;
}

/// Full-chain jet calibration applied once per event.
pub trait JetCalibrator {
    /// Tool name used in diagnostics.
    fn name(&self) -> &str;

    /// Prepare the tool before the first event.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Return the calibrated momentum of `jet`.
    fn calibrate(&self, jet: &dyn JetView) -> Result<FourMomentum>;
}

/// Named jet energy scale uncertainty components.
pub trait UncertaintyProvider {
    /// Tool name used in diagnostics.
    fn name(&self) -> &str;

    /// Prepare the tool before the first event.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fractional uncertainty of component `component` (0-based) for `jet`.
    fn uncertainty(&self, component: usize, jet: &dyn JetView) -> f64;
}

/// Pileup jet discrimination.
pub trait JvtTagger {
    /// Tool name used in diagnostics.
    fn name(&self) -> &str;

    /// Prepare the tool before the first event.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Recompute the JVT discriminant for the jet's current kinematics.
    fn update_jvt(&self, jet: &dyn JetView) -> f64;
}

/// Flavour tagging decision and scale factors per working point.
pub trait BTagger {
    /// Tool name used in diagnostics.
    fn name(&self) -> &str;

    /// Prepare the tool for the configured working points.
    fn initialize(&mut self, _working_points: &[String]) -> Result<()> {
        Ok(())
    }

    /// Tagging decision at working point `wp` (e.g. `"77"`).
    fn accept(&self, wp: &str, jet: &dyn JetView) -> bool;

    /// Efficiency scale factor for a tagged jet.
    fn scale_factor(&self, wp: &str, jet: &dyn JetView) -> Result<f64>;

    /// Inefficiency scale factor for an untagged jet.
    fn inefficiency_scale_factor(&self, wp: &str, jet: &dyn JetView) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedJet(FourMomentum);

    impl JetView for FixedJet {
        fn momentum(&self) -> FourMomentum {
            self.0
        }
        fn det_eta(&self) -> f64 {
            self.0.eta
        }
        fn jvt(&self) -> f64 {
            1.0
        }
        fn scale_momentum(&self, _key: &str) -> Option<FourMomentum> {
            None
        }
    }

    struct HalfCalibrator;

    impl JetCalibrator for HalfCalibrator {
        fn name(&self) -> &str {
            "half"
        }

        fn calibrate(&self, jet: &dyn JetView) -> Result<FourMomentum> {
            Ok(jet.momentum().scaled(0.5))
        }
    }

    #[test]
    fn test_dummy_calibrator() {
        let mut cal = HalfCalibrator;
        assert!(cal.initialize().is_ok());
        let jet = FixedJet(FourMomentum::new(80.0, 0.1, 0.2, 90.0));
        let p = cal.calibrate(&jet).unwrap();
        assert!((p.pt - 40.0).abs() < 1e-9);
        assert_eq!(cal.name(), "half");
    }
}
