use std::path::{Path, PathBuf};

use mjb_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Recoil-pt binning (GeV) used when none is configured.
pub const DEFAULT_BINNING: &str =
    "300,360,420,480,540,600,660,720,780,840,900,960,1020,1140,1260,1480,2000";

/// User-facing job configuration.
///
/// Field names follow the analysis option names; every field has a default so
/// partial JSON/YAML files are accepted. Energies are in GeV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MjbConfig {
    /// Input jet collection, e.g. `AntiKt4EMTopoJets`. Required.
    pub in_container_name: String,
    /// Comma-separated `trigger:recoilPtThreshold` buckets, checked in order.
    pub trigger_and_pt: String,
    /// MJB iteration index.
    pub mjb_iteration: u32,
    /// Comma-separated subleading-jet pt limits, one per iteration.
    pub mjb_iteration_threshold: String,
    /// Calibration store holding previous-iteration corrections.
    pub mjb_correction_file: Option<PathBuf>,
    /// Store holding the V+jet correction histogram; enables V+jet calibration.
    pub vjet_calib_file: Option<PathBuf>,
    /// Variation spec, `-` separated (e.g. `Nominal-MJB`).
    pub sys_variations: String,
    /// Add the MJB statistical variations on iterations above 0.
    pub mjb_stats_on: bool,
    /// Minimum number of jets.
    pub num_jets: usize,
    /// Maximum subleading-jet to recoil pt ratio.
    pub pt_asym: f64,
    /// Maximum `π - Δφ(lead, recoil)`.
    pub alpha: f64,
    /// Minimum `Δφ(lead, jet)` for jets above a quarter of the lead pt.
    pub beta: f64,
    /// Jet pt threshold in GeV.
    pub pt_thresh: f64,
    /// Use the last jet's Δφ for the beta cut.
    pub all_jet_beta: bool,
    /// Fill bootstrap toys.
    pub bootstrap: bool,
    /// Apply the in-situ calibration and uncertainties to the lead jet.
    pub leading_insitu: bool,
    /// Apply uncertainties to subleading jets beyond the first threshold.
    pub no_limit_jes_pt: bool,
    /// Apply the MJB correction to the lead jet.
    pub closure_test: bool,
    /// Read `DoubleMJB_leadJet` instead of `DoubleMJB` from the store.
    pub lead_jet_mjb_correction: bool,
    /// Require the subleading jet above the threshold instead of below.
    pub reverse_subleading: bool,
    /// Emit per-event records.
    pub write_tree: bool,
    /// Emit per-event records for the nominal variation only.
    pub write_nominal_tree: bool,
    /// Event limit, negative for no limit.
    pub max_event: i64,
    /// Truth jet collection for the simulation pileup check, `None` disables it.
    pub mc_pileup_check_container: String,
    /// Fill cutflow counters.
    pub use_cutflow: bool,
    /// Number of bootstrap toys.
    pub n_toys: usize,
    /// Comma-separated recoil-pt bin edges in GeV.
    pub binning: String,
    /// Comma-separated b-tagging working points.
    pub btag_wps: String,
    /// Calibration sequence, `_` separated (e.g. `JetArea_Residual_EtaJES_GSC`).
    pub jet_calib_sequence: String,
    /// JVT cut for low-pt central jets.
    pub jvt_cut: f64,
    /// Uncertainty provider configuration listing named components.
    pub jet_uncertainty_config: Option<PathBuf>,
    /// Cross-section and acceptance table.
    pub xs_acc_file: Option<PathBuf>,
}

impl Default for MjbConfig {
    fn default() -> Self {
        Self {
            in_container_name: String::new(),
            trigger_and_pt: String::new(),
            mjb_iteration: 0,
            mjb_iteration_threshold: String::new(),
            mjb_correction_file: None,
            vjet_calib_file: None,
            sys_variations: "Nominal".to_string(),
            mjb_stats_on: false,
            num_jets: 3,
            pt_asym: 0.8,
            alpha: 0.3,
            beta: 1.0,
            pt_thresh: 25.0,
            all_jet_beta: false,
            bootstrap: false,
            leading_insitu: false,
            no_limit_jes_pt: false,
            closure_test: false,
            lead_jet_mjb_correction: false,
            reverse_subleading: false,
            write_tree: false,
            write_nominal_tree: false,
            max_event: -1,
            mc_pileup_check_container: "AntiKt4TruthJets".to_string(),
            use_cutflow: true,
            n_toys: 100,
            binning: DEFAULT_BINNING.to_string(),
            btag_wps: "77,85".to_string(),
            jet_calib_sequence: String::new(),
            jvt_cut: 0.0,
            jet_uncertainty_config: None,
            xs_acc_file: None,
        }
    }
}

/// One trigger bucket: chain name and the recoil pt above which it decides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerBucket {
    /// Trigger chain name.
    pub name: String,
    /// Recoil pt threshold in GeV.
    pub threshold: f64,
}

/// Validated configuration with parsed lists and derived mode flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedConfig {
    /// Simulation input.
    pub is_mc: bool,
    /// Input jet collection.
    pub in_container_name: String,
    /// Trigger buckets in configured order.
    pub triggers: Vec<TriggerBucket>,
    /// MJB iteration index.
    pub iteration: u32,
    /// Subleading-jet pt limits per iteration (GeV).
    pub subleading_pt_thresholds: Vec<f64>,
    /// Previous-iteration calibration store.
    pub mjb_correction_file: Option<PathBuf>,
    /// V+jet calibration store.
    pub vjet_calib_file: Option<PathBuf>,
    /// Variation spec string.
    pub sys_variations: String,
    /// MJB statistical variations requested.
    pub mjb_stats_on: bool,
    /// Minimum number of jets.
    pub num_jets: usize,
    /// Nominal ptAsym cut.
    pub pt_asym: f64,
    /// Nominal alpha cut.
    pub alpha: f64,
    /// Nominal beta cut.
    pub beta: f64,
    /// Nominal jet pt threshold (GeV).
    pub pt_thresh: f64,
    /// Beta uses the last jet.
    pub all_jet_beta: bool,
    /// Bootstrap toys are filled.
    pub bootstrap: bool,
    /// Bootstrap requested at iteration > 0: no toys, cutflow or records, suffixed directories.
    pub iterate_bootstrap: bool,
    /// Lead jet gets in-situ calibration and uncertainties.
    pub leading_insitu: bool,
    /// Uncertainties are not limited to the first threshold.
    pub no_limit_jes_pt: bool,
    /// MJB correction on the lead jet.
    pub closure_test: bool,
    /// Use lead-jet binned corrections.
    pub lead_jet_mjb_correction: bool,
    /// Subleading jet must be above the threshold.
    pub reverse_subleading: bool,
    /// Records are emitted.
    pub write_tree: bool,
    /// Records only for the nominal variation.
    pub write_nominal_tree: bool,
    /// Cutflow counters are filled.
    pub use_cutflow: bool,
    /// Simulation truth-jet pileup check.
    pub use_mc_pileup_check: bool,
    /// Truth jet collection name.
    pub mc_pileup_check_container: String,
    /// Event limit.
    pub max_event: Option<u64>,
    /// Bootstrap toys per variation.
    pub n_toys: usize,
    /// Recoil-pt bin edges (GeV).
    pub bins: Vec<f64>,
    /// B-tagging working points.
    pub btag_wps: Vec<String>,
    /// Effective calibration sequence.
    pub jet_calib_sequence: String,
    /// JVT cut.
    pub jvt_cut: f64,
    /// V+jet calibration enabled.
    pub vjet_calib: bool,
    /// Uncertainty provider configuration.
    pub jet_uncertainty_config: Option<PathBuf>,
    /// Cross-section table.
    pub xs_acc_file: Option<PathBuf>,
}

impl MjbConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a YAML configuration.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml_ng::from_str(text).map_err(|e| Error::config(format!("YAML config: {e}")))
    }

    /// Read a configuration file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        if ext == "json" { Self::from_json_str(&text) } else { Self::from_yaml_str(&text) }
    }

    /// Validate and derive the run mode for simulation (`is_mc`) or data.
    pub fn prepare(&self, is_mc: bool) -> Result<PreparedConfig> {
        if self.in_container_name.is_empty() {
            return Err(Error::config("InputContainer is empty"));
        }
        if self.num_jets < 2 {
            return Err(Error::config(format!("num_jets must be at least 2, got {}", self.num_jets)));
        }

        let bins = parse_f64_list(&self.binning, "binning")?;
        if bins.len() < 2 || bins.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::config(format!(
                "binning '{}' needs at least two increasing edges",
                self.binning
            )));
        }
        log::info!("Setting binning to {}", self.binning);

        let btag_wps: Vec<String> = split_list(&self.btag_wps).map(str::to_string).collect();
        let triggers = parse_triggers(&self.trigger_and_pt)?;

        let mut bootstrap = self.bootstrap;
        let mut use_cutflow = self.use_cutflow;
        let mut write_tree = self.write_tree;
        let mut write_nominal_tree = self.write_nominal_tree;
        let iterate_bootstrap = self.bootstrap && self.mjb_iteration > 0;
        if iterate_bootstrap {
            log::info!(
                "Running bootstrap mode on subsequent iteration. Turning off cutflow, records and toys."
            );
            bootstrap = false;
            use_cutflow = false;
            write_tree = false;
            write_nominal_tree = false;
        }
        if write_nominal_tree {
            write_tree = true;
        }
        if bootstrap && self.n_toys == 0 {
            return Err(Error::config("bootstrap mode needs n_toys > 0"));
        }

        let subleading_pt_thresholds =
            parse_f64_list(&self.mjb_iteration_threshold, "mjb_iteration_threshold")?;
        if subleading_pt_thresholds.len() <= self.mjb_iteration as usize {
            return Err(Error::config(format!(
                "mjb_iteration_threshold '{}' has no entry for iteration {}",
                self.mjb_iteration_threshold, self.mjb_iteration
            )));
        }

        let mut jet_calib_sequence = self.jet_calib_sequence.clone();
        let has_insitu = jet_calib_sequence.contains("Insitu");
        if is_mc && has_insitu {
            return Err(Error::config(
                "Attempting to use an Insitu calibration sequence on simulation",
            ));
        }
        if !is_mc && !has_insitu {
            if jet_calib_sequence.is_empty() {
                jet_calib_sequence.push_str("Insitu");
            } else {
                jet_calib_sequence.push_str("_Insitu");
            }
            log::warn!("Adding _Insitu to data jet calibration sequence");
        }

        let max_event = u64::try_from(self.max_event).ok();

        Ok(PreparedConfig {
            is_mc,
            in_container_name: self.in_container_name.clone(),
            triggers,
            iteration: self.mjb_iteration,
            subleading_pt_thresholds,
            mjb_correction_file: self.mjb_correction_file.clone(),
            vjet_calib_file: self.vjet_calib_file.clone(),
            sys_variations: self.sys_variations.clone(),
            mjb_stats_on: self.mjb_stats_on,
            num_jets: self.num_jets,
            pt_asym: self.pt_asym,
            alpha: self.alpha,
            beta: self.beta,
            pt_thresh: self.pt_thresh,
            all_jet_beta: self.all_jet_beta,
            bootstrap,
            iterate_bootstrap,
            leading_insitu: self.leading_insitu,
            no_limit_jes_pt: self.no_limit_jes_pt,
            closure_test: self.closure_test,
            lead_jet_mjb_correction: self.lead_jet_mjb_correction,
            reverse_subleading: self.reverse_subleading,
            write_tree,
            write_nominal_tree,
            use_cutflow,
            use_mc_pileup_check: self.mc_pileup_check_container != "None",
            mc_pileup_check_container: self.mc_pileup_check_container.clone(),
            max_event,
            n_toys: self.n_toys,
            bins,
            btag_wps,
            jet_calib_sequence,
            jvt_cut: self.jvt_cut,
            vjet_calib: self.vjet_calib_file.is_some(),
            jet_uncertainty_config: self.jet_uncertainty_config.clone(),
            xs_acc_file: self.xs_acc_file.clone(),
        })
    }
}

impl PreparedConfig {
    /// Subleading pt limit for the configured iteration.
    pub fn subleading_threshold(&self) -> f64 {
        self.subleading_pt_thresholds[self.iteration as usize]
    }

    /// Subleading pt limit of iteration 0, the range of the external calibrations.
    pub fn first_threshold(&self) -> f64 {
        self.subleading_pt_thresholds[0]
    }

    /// Output directory name for a variation.
    pub fn hist_dir_name(&self, variation: &str) -> String {
        let mut name = format!("Iteration{}_{variation}", self.iteration);
        if self.bootstrap || self.iterate_bootstrap {
            name.push('_');
        }
        name
    }

    /// Iteration whose corrections are read from the store.
    pub fn correction_iteration(&self) -> Option<u32> {
        if self.is_mc {
            return None;
        }
        if self.closure_test {
            Some(self.iteration)
        } else {
            self.iteration.checked_sub(1)
        }
    }

    /// Name of the correction histogram inside each store directory.
    pub fn correction_hist_name(&self) -> &'static str {
        if self.lead_jet_mjb_correction { "DoubleMJB_leadJet" } else { "DoubleMJB" }
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn parse_f64_list(s: &str, what: &str) -> Result<Vec<f64>> {
    split_list(s)
        .map(|t| {
            t.parse::<f64>().map_err(|e| Error::config(format!("{what}: cannot parse '{t}': {e}")))
        })
        .collect()
}

fn parse_triggers(s: &str) -> Result<Vec<TriggerBucket>> {
    split_list(s)
        .map(|entry| {
            let (name, thr) = entry.split_once(':').ok_or_else(|| {
                Error::config(format!("trigger '{entry}' is not of the form name:threshold"))
            })?;
            let threshold = thr.trim().parse::<f64>().map_err(|e| {
                Error::config(format!("trigger '{entry}': bad threshold: {e}"))
            })?;
            Ok(TriggerBucket { name: name.trim().to_string(), threshold })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MjbConfig {
        MjbConfig {
            in_container_name: "AntiKt4EMTopoJets".into(),
            mjb_iteration_threshold: "949,1480".into(),
            jet_calib_sequence: "JetArea_Residual_EtaJES_GSC".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_analysis_options() {
        let c = MjbConfig::default();
        assert_eq!(c.num_jets, 3);
        assert_eq!(c.pt_asym, 0.8);
        assert_eq!(c.alpha, 0.3);
        assert_eq!(c.beta, 1.0);
        assert_eq!(c.pt_thresh, 25.0);
        assert_eq!(c.sys_variations, "Nominal");
        assert_eq!(c.n_toys, 100);
        assert!(c.use_cutflow);
        assert_eq!(c.max_event, -1);
    }

    #[test]
    fn empty_container_rejected() {
        let c = MjbConfig { in_container_name: String::new(), ..base() };
        assert!(matches!(c.prepare(false), Err(Error::Configuration(_))));
    }

    #[test]
    fn data_appends_insitu() {
        let p = base().prepare(false).unwrap();
        assert_eq!(p.jet_calib_sequence, "JetArea_Residual_EtaJES_GSC_Insitu");
        let p = base().prepare(true).unwrap();
        assert_eq!(p.jet_calib_sequence, "JetArea_Residual_EtaJES_GSC");
    }

    #[test]
    fn simulation_with_insitu_rejected() {
        let c = MjbConfig { jet_calib_sequence: "EtaJES_GSC_Insitu".into(), ..base() };
        assert!(c.prepare(true).is_err());
        assert!(c.prepare(false).is_ok());
    }

    #[test]
    fn triggers_and_lists_parse() {
        let c = MjbConfig {
            trigger_and_pt: "HLT_j360:480, HLT_j260:360,HLT_j200:300".into(),
            btag_wps: "77,85".into(),
            ..base()
        };
        let p = c.prepare(false).unwrap();
        assert_eq!(p.triggers.len(), 3);
        assert_eq!(p.triggers[1], TriggerBucket { name: "HLT_j260".into(), threshold: 360.0 });
        assert_eq!(p.btag_wps, vec!["77", "85"]);
        assert_eq!(p.subleading_pt_thresholds, vec![949.0, 1480.0]);
        assert_eq!(p.bins.first(), Some(&300.0));

        let bad = MjbConfig { trigger_and_pt: "HLT_j360".into(), ..base() };
        assert!(bad.prepare(false).is_err());
    }

    #[test]
    fn threshold_list_must_cover_iteration() {
        let c = MjbConfig { mjb_iteration: 2, ..base() };
        assert!(c.prepare(false).is_err());
        let c = MjbConfig { mjb_iteration: 1, ..base() };
        assert_eq!(c.prepare(false).unwrap().subleading_threshold(), 1480.0);
    }

    #[test]
    fn iterated_bootstrap_turns_off_outputs() {
        let c = MjbConfig {
            bootstrap: true,
            mjb_iteration: 1,
            write_nominal_tree: true,
            ..base()
        };
        let p = c.prepare(false).unwrap();
        assert!(p.iterate_bootstrap);
        assert!(!p.bootstrap && !p.use_cutflow && !p.write_tree && !p.write_nominal_tree);
        assert_eq!(p.hist_dir_name("Nominal"), "Iteration1_Nominal_");

        let c = MjbConfig { bootstrap: true, ..base() };
        let p = c.prepare(false).unwrap();
        assert!(p.bootstrap && !p.iterate_bootstrap);
        assert_eq!(p.hist_dir_name("Nominal"), "Iteration0_Nominal_");

        let p = base().prepare(false).unwrap();
        assert_eq!(p.hist_dir_name("Nominal"), "Iteration0_Nominal");
    }

    #[test]
    fn nominal_tree_implies_tree_and_flags_derive() {
        let c = MjbConfig {
            write_nominal_tree: true,
            mc_pileup_check_container: "None".into(),
            max_event: 10,
            ..base()
        };
        let p = c.prepare(true).unwrap();
        assert!(p.write_tree);
        assert!(!p.use_mc_pileup_check);
        assert_eq!(p.max_event, Some(10));
        assert!(!p.vjet_calib);
    }

    #[test]
    fn correction_iteration_rules() {
        let p = MjbConfig { mjb_iteration: 1, ..base() }.prepare(false).unwrap();
        assert_eq!(p.correction_iteration(), Some(0));
        let p = base().prepare(false).unwrap();
        assert_eq!(p.correction_iteration(), None);
        let p = MjbConfig { closure_test: true, ..base() }.prepare(false).unwrap();
        assert_eq!(p.correction_iteration(), Some(0));
        let p = MjbConfig { mjb_iteration: 1, ..base() }.prepare(true).unwrap();
        assert_eq!(p.correction_iteration(), None);
    }

    #[test]
    fn json_and_yaml_parse() {
        let j = MjbConfig::from_json_str(
            r#"{"in_container_name": "AntiKt4EMPFlowJets", "alpha": 0.2}"#,
        )
        .unwrap();
        assert_eq!(j.alpha, 0.2);
        assert_eq!(j.num_jets, 3);

        let y = MjbConfig::from_yaml_str(
            "in_container_name: AntiKt4LCTopoJets\nsys_variations: Nominal-MJB\nnum_jets: 2\n",
        )
        .unwrap();
        assert_eq!(y.sys_variations, "Nominal-MJB");
        assert_eq!(y.num_jets, 2);
        assert!(MjbConfig::from_yaml_str("num_jets: [").is_err());
    }
}
