use mjb_core::{Error, Result};
use serde::Serialize;

/// Attribute holding the GSC-stage momentum, used to reset the lead jet.
pub const GSC_SCALE_KEY: &str = "JetGSCScaleMomentum";
/// Attribute holding the EM-scale momentum, the source of detector eta.
pub const EM_SCALE_KEY: &str = "JetEMScaleMomentum";

const RAW_STAGE: &str = "RAW";

/// One calibration stage and the jet attribute that records its momentum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationStage {
    /// Stage token, `RAW` for the first stage.
    pub name: String,
    /// Jet attribute key; empty for tokens with no known attribute.
    pub key: String,
}

/// Ordered calibration stages derived from the input collection and the
/// calibration sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationStageMap {
    stages: Vec<CalibrationStage>,
}

impl CalibrationStageMap {
    /// Build the stage list for `container` and `sequence` (e.g.
    /// `JetArea_Residual_EtaJES_GSC_Insitu`).
    ///
    /// `Residual` tokens are skipped. Unknown tokens keep an empty key.
    pub fn build(container: &str, sequence: &str) -> Result<Self> {
        let raw_key = if container.contains("EMTopo") || container.contains("EMPFlow") {
            EM_SCALE_KEY
        } else if container.contains("LCTopo") {
            "JetConstitScaleMomentum"
        } else {
            return Err(Error::config(format!(
                "input jets '{container}' are not EMTopo, EMPFlow or LCTopo"
            )));
        };

        let mut stages = vec![CalibrationStage { name: RAW_STAGE.into(), key: raw_key.into() }];
        if !sequence.is_empty() {
            for token in sequence.split('_').filter(|t| !t.contains("Residual")) {
                stages.push(CalibrationStage { name: token.to_string(), key: stage_key(token).into() });
            }
        }
        Ok(Self { stages })
    }

    /// All stages, `RAW` first.
    pub fn stages(&self) -> &[CalibrationStage] {
        &self.stages
    }

    /// Stage at ordinal `index`.
    pub fn get(&self, index: usize) -> Option<&CalibrationStage> {
        self.stages.get(index)
    }

    /// Attribute key of the raw stage.
    pub fn raw_key(&self) -> &str {
        &self.stages[0].key
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when no stages are defined.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in order.
    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name.clone()).collect()
    }
}

fn stage_key(token: &str) -> &'static str {
    match token {
        "JetArea" => "JetPileupScaleMomentum",
        "Origin" => "JetOriginConstitScaleMomentum",
        "EtaJES" => "JetEtaJESScaleMomentum",
        "GSC" => GSC_SCALE_KEY,
        "Insitu" => "JetInsituScaleMomentum",
        _ => "",
    }
}
