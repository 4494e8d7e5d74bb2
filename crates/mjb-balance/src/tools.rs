use mjb_core::{
    BTagger, Error, FourMomentum, JetCalibrator, JetView, JvtTagger, Result, UncertaintyProvider,
};

/// The external jet tools used by one job.
pub struct JetTools {
    /// Full-chain calibration.
    pub calibrator: Box<dyn JetCalibrator>,
    /// Named uncertainty components.
    pub uncertainty: Box<dyn UncertaintyProvider>,
    /// JVT recomputation.
    pub jvt: Box<dyn JvtTagger>,
    /// B-tagging.
    pub btagger: Box<dyn BTagger>,
}

impl std::fmt::Debug for JetTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetTools")
            .field("calibrator", &self.calibrator.name())
            .field("uncertainty", &self.uncertainty.name())
            .field("jvt", &self.jvt.name())
            .field("btagger", &self.btagger.name())
            .finish()
    }
}

impl JetTools {
    /// Bundle the given tools.
    pub fn new(
        calibrator: Box<dyn JetCalibrator>,
        uncertainty: Box<dyn UncertaintyProvider>,
        jvt: Box<dyn JvtTagger>,
        btagger: Box<dyn BTagger>,
    ) -> Self {
        Self { calibrator, uncertainty, jvt, btagger }
    }

    /// Tools that read everything from the input: calibrated momentum from
    /// the `calibrated_key` stage, zero uncertainties, stored JVT, no b-tagging.
    pub fn from_stored(calibrated_key: &str) -> Self {
        Self::new(
            Box::new(StageCalibrator::new(calibrated_key)),
            Box::new(FixedUncertainty::new(0.0)),
            Box::new(StoredJvt),
            Box::new(NoBTagging),
        )
    }

    /// Initialize every tool before the first event.
    pub fn initialize(&mut self, working_points: &[String]) -> Result<()> {
        wrap(self.calibrator.name().to_string(), self.calibrator.initialize())?;
        wrap(self.uncertainty.name().to_string(), self.uncertainty.initialize())?;
        wrap(self.jvt.name().to_string(), self.jvt.initialize())?;
        wrap(self.btagger.name().to_string(), self.btagger.initialize(working_points))?;
        Ok(())
    }
}

fn wrap(tool: String, r: Result<()>) -> Result<()> {
    r.map_err(|e| match e {
        e @ Error::ToolInitialization { .. } => e,
        other => Error::ToolInitialization { tool, detail: other.to_string() },
    })
}

/// Calibration that reads a stage momentum recorded on the jet.
#[derive(Debug, Clone)]
pub struct StageCalibrator {
    key: String,
}

impl StageCalibrator {
    /// Read the momentum stored under `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl JetCalibrator for StageCalibrator {
    fn name(&self) -> &str {
        "stage_calibrator"
    }

    fn calibrate(&self, jet: &dyn JetView) -> Result<FourMomentum> {
        jet.scale_momentum(&self.key)
            .ok_or_else(|| Error::Correction(format!("jet has no '{}' momentum", self.key)))
    }
}

/// The same fractional uncertainty for every component.
#[derive(Debug, Clone, Copy)]
pub struct FixedUncertainty {
    fraction: f64,
}

impl FixedUncertainty {
    /// Uncertainty `fraction` (e.g. `0.05`).
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }
}

impl UncertaintyProvider for FixedUncertainty {
    fn name(&self) -> &str {
        "fixed_uncertainty"
    }

    fn uncertainty(&self, _component: usize, _jet: &dyn JetView) -> f64 {
        self.fraction
    }
}

/// JVT as stored on the input jet.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredJvt;

impl JvtTagger for StoredJvt {
    fn name(&self) -> &str {
        "stored_jvt"
    }

    fn update_jvt(&self, jet: &dyn JetView) -> f64 {
        jet.jvt()
    }
}

/// Tags nothing; unit scale factors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBTagging;

impl BTagger for NoBTagging {
    fn name(&self) -> &str {
        "no_btagging"
    }

    fn accept(&self, _wp: &str, _jet: &dyn JetView) -> bool {
        false
    }

    fn scale_factor(&self, _wp: &str, _jet: &dyn JetView) -> Result<f64> {
        Ok(1.0)
    }

    fn inefficiency_scale_factor(&self, _wp: &str, _jet: &dyn JetView) -> Result<f64> {
        Ok(1.0)
    }
}
