//! Variation descriptors and the registry that expands a declarative spec
//! string (e.g. `Nominal-JetCalibSequence-Special-MJB`) into them.
//!
//! Matching policy: `Special` and `All<Suffix>` select uncertainty components
//! by case-sensitive substring; rebinding to a calibration store matches store
//! names against variation names by substring, first registry entry wins.

use mjb_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::systematics::SystematicsCatalog;

/// Component-name fragments selected by the `Special` token.
pub const SPECIAL_COMPONENTS: [&str; 4] = ["EtaIntercalibration", "Pileup", "Flavor", "PunchThrough"];

/// Spec used for `AllSystematics` on simulation.
pub const ALL_SYSTEMATICS_MC: &str = "Nominal-MJB";
/// Spec used for `AllSystematics` on data.
pub const ALL_SYSTEMATICS_DATA: &str = "Nominal-Special-MJB-AllZjet-AllGjet-AllLAr";

/// What a variation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariationKind {
    /// Reference selection.
    Nominal,
    /// Jets taken at an intermediate calibration stage; `index` is the stage ordinal.
    CalibStage,
    /// Uncertainty component shift; `index` is the component ordinal.
    NamedShift,
    /// Alpha cut, `index / 100`.
    MjbAlpha,
    /// Beta cut, `index / 10`.
    MjbBeta,
    /// ptAsym cut, `index / 100`.
    MjbPtAsym,
    /// Jet pt threshold, `index` GeV.
    MjbPtThreshold,
    /// MJB correction statistical shift; `index` counts bins from the top.
    MjbStat,
}

/// Direction of a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    /// Upward (`_pos`).
    Up,
    /// Downward (`_neg`).
    Down,
    /// No direction.
    NotApplicable,
}

/// One systematic variation of the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    /// Unique name, used for output directories.
    pub name: String,
    /// Variation kind.
    pub kind: VariationKind,
    /// Payload whose meaning depends on `kind`.
    pub index: i32,
    /// Shift direction.
    pub sign: Sign,
}

impl Variation {
    /// Create a variation.
    pub fn new(name: impl Into<String>, kind: VariationKind, index: i32, sign: Sign) -> Self {
        Self { name: name.into(), kind, index, sign }
    }

    /// The nominal variation.
    pub fn nominal() -> Self {
        Self::new("Nominal", VariationKind::Nominal, -1, Sign::NotApplicable)
    }
}

/// Inputs the registry needs besides the spec string.
#[derive(Debug, Clone, Copy)]
pub struct VariationContext<'a> {
    /// Simulation input; selects the `AllSystematics` expansion.
    pub is_mc: bool,
    /// Nominal alpha cut.
    pub alpha: f64,
    /// Nominal beta cut.
    pub beta: f64,
    /// Nominal ptAsym cut.
    pub pt_asym: f64,
    /// Nominal jet pt threshold (GeV).
    pub pt_threshold: f64,
    /// Calibration stage names, `RAW` first.
    pub calib_stages: &'a [String],
    /// Named uncertainty components.
    pub catalog: &'a SystematicsCatalog,
    /// Add MJB statistical variations.
    pub mjb_stats: bool,
    /// MJB iteration index.
    pub iteration: u32,
}

/// Ordered list of variations for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationRegistry {
    variations: Vec<Variation>,
    nominal_index: Option<usize>,
    dropped_tokens: Vec<String>,
}

impl VariationRegistry {
    /// Expand `spec` into variations.
    ///
    /// Unrecognized tokens are dropped and reported by [`Self::dropped_tokens`].
    pub fn build(spec: &str, ctx: &VariationContext<'_>) -> Self {
        let spec = if spec.contains("AllSystematics") {
            if ctx.is_mc { ALL_SYSTEMATICS_MC } else { ALL_SYSTEMATICS_DATA }
        } else {
            spec
        };

        let mut reg = Self { variations: Vec::new(), nominal_index: None, dropped_tokens: Vec::new() };
        for token in spec.split('-') {
            match token {
                "Nominal" => reg.push(Variation::nominal()),
                "JetCalibSequence" => {
                    if ctx.calib_stages.is_empty() {
                        log::error!(
                            "JetCalibSequence is empty. It will not be added to the systematics"
                        );
                    }
                    for (i, stage) in ctx.calib_stages.iter().enumerate() {
                        reg.push(Variation::new(
                            format!("JCS_{stage}"),
                            VariationKind::CalibStage,
                            i as i32,
                            Sign::NotApplicable,
                        ));
                    }
                }
                "Special" => reg.push_components(ctx.catalog, |n| {
                    SPECIAL_COMPONENTS.iter().any(|s| n.contains(s))
                }),
                "MJB" => reg.push_mjb(ctx),
                _ => match token.strip_prefix("All") {
                    Some(suffix) if !suffix.is_empty() => {
                        reg.push_components(ctx.catalog, |n| n.contains(suffix))
                    }
                    _ => reg.dropped_tokens.push(token.to_string()),
                },
            }
        }
        if !reg.dropped_tokens.is_empty() {
            log::warn!(
                "dropped unrecognized variation tokens: {}",
                reg.dropped_tokens.join(", ")
            );
        }
        reg
    }

    fn push(&mut self, v: Variation) {
        if self.variations.iter().any(|x| x.name == v.name) {
            log::warn!("duplicate variation '{}' ignored", v.name);
            return;
        }
        if v.kind == VariationKind::Nominal {
            self.nominal_index = Some(self.variations.len());
        }
        self.variations.push(v);
    }

    fn push_components<F: Fn(&str) -> bool>(&mut self, catalog: &SystematicsCatalog, pred: F) {
        let selected: Vec<_> = catalog.matching(pred).cloned().collect();
        for c in selected {
            let index = c.ordinal as i32;
            for (suffix, sign) in [("pos", Sign::Up), ("neg", Sign::Down)] {
                let name = format!("{}_{suffix}", c.name);
                self.push(Variation::new(name, VariationKind::NamedShift, index, sign));
            }
        }
    }

    fn push_mjb(&mut self, ctx: &VariationContext<'_>) {
        let shifts = [
            ("a", VariationKind::MjbAlpha, (ctx.alpha * 100.0).round() as i32, 10),
            ("b", VariationKind::MjbBeta, (ctx.beta * 10.0).round() as i32, 5),
            ("pta", VariationKind::MjbPtAsym, (ctx.pt_asym * 100.0).round() as i32, 10),
            ("ptt", VariationKind::MjbPtThreshold, ctx.pt_threshold.round() as i32, 5),
        ];
        for (tag, kind, centre, step) in shifts {
            let down = centre - step;
            let up = centre + step;
            self.push(Variation::new(format!("MJB_{tag}{down}_neg"), kind, down, Sign::Down));
            self.push(Variation::new(format!("MJB_{tag}{up}_pos"), kind, up, Sign::Up));
        }
        if ctx.mjb_stats && ctx.iteration > 0 {
            for i in 0..2 {
                for (suffix, sign) in [("pos", Sign::Up), ("neg", Sign::Down)] {
                    let name = format!("MJB_stat{i}_{suffix}");
                    self.push(Variation::new(name, VariationKind::MjbStat, i, sign));
                }
            }
        }
    }

    /// Replace the variations by those matching external correction names.
    ///
    /// Each name takes the kind, index and sign of the first variation whose
    /// name it contains. The nominal index moves to the first name containing
    /// `Nominal`, or becomes undefined.
    pub fn rebind<S: AsRef<str>>(&mut self, external_names: &[S]) -> Result<()> {
        let mut rebound = Vec::with_capacity(external_names.len());
        for name in external_names {
            let name = name.as_ref();
            let matched = self
                .variations
                .iter()
                .find(|v| name.contains(v.name.as_str()))
                .ok_or_else(|| {
                    Error::config(format!(
                        "can't find a systematic variation corresponding to MJB correction '{name}'"
                    ))
                })?;
            rebound.push(Variation { name: name.to_string(), ..matched.clone() });
        }
        self.nominal_index = rebound.iter().position(|v| v.name.contains("Nominal"));
        self.variations = rebound;
        Ok(())
    }

    /// Variations in order.
    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    /// Variation at `index`.
    pub fn get(&self, index: usize) -> Option<&Variation> {
        self.variations.get(index)
    }

    /// Number of variations.
    pub fn len(&self) -> usize {
        self.variations.len()
    }

    /// True when no variation is configured.
    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }

    /// Position of the nominal variation, if any.
    pub fn nominal_index(&self) -> Option<usize> {
        self.nominal_index
    }

    /// Position of the nominal variation, or a configuration error.
    pub fn require_nominal(&self) -> Result<usize> {
        self.nominal_index.ok_or_else(|| Error::config("no nominal variation configured"))
    }

    /// Tokens that matched no rule.
    pub fn dropped_tokens(&self) -> &[String] {
        &self.dropped_tokens
    }

    /// Variation names in order.
    pub fn names(&self) -> Vec<String> {
        self.variations.iter().map(|v| v.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systematics::SystematicComponent;

    fn catalog() -> SystematicsCatalog {
        SystematicsCatalog::new(vec![
            SystematicComponent { ordinal: 0, name: "EffectiveNP_1".into() },
            SystematicComponent { ordinal: 53, name: "EtaIntercalibration_Modelling".into() },
            SystematicComponent { ordinal: 54, name: "Zjet_Jvt".into() },
            SystematicComponent { ordinal: 55, name: "Gjet_Purity".into() },
            SystematicComponent { ordinal: 56, name: "LAr_Esmear".into() },
            SystematicComponent { ordinal: 57, name: "Pileup_OffsetMu".into() },
        ])
    }

    fn ctx<'a>(stages: &'a [String], cat: &'a SystematicsCatalog) -> VariationContext<'a> {
        VariationContext {
            is_mc: false,
            alpha: 0.3,
            beta: 1.0,
            pt_asym: 0.8,
            pt_threshold: 25.0,
            calib_stages: stages,
            catalog: cat,
            mjb_stats: false,
            iteration: 0,
        }
    }

    fn stages() -> Vec<String> {
        ["RAW", "JetArea", "Origin", "EtaJES", "GSC"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nominal_only() {
        let cat = catalog();
        let st = stages();
        let reg = VariationRegistry::build("Nominal", &ctx(&st, &cat));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.nominal_index(), Some(0));
        assert_eq!(reg.get(0).unwrap().kind, VariationKind::Nominal);
    }

    #[test]
    fn calib_sequence_adds_one_per_stage() {
        let cat = catalog();
        let st = stages();
        let reg = VariationRegistry::build("Nominal-JetCalibSequence", &ctx(&st, &cat));
        assert_eq!(reg.len(), 6);
        assert_eq!(reg.get(5).unwrap(), &Variation::new("JCS_GSC", VariationKind::CalibStage, 4, Sign::NotApplicable));

        let reg = VariationRegistry::build("JetCalibSequence", &ctx(&[], &cat));
        assert!(reg.is_empty());
        assert_eq!(reg.nominal_index(), None);
    }

    #[test]
    fn special_pairs_share_index() {
        let cat = catalog();
        let st = stages();
        let reg = VariationRegistry::build("Special", &ctx(&st, &cat));
        assert_eq!(
            reg.names(),
            vec![
                "EtaIntercalibration_Modelling_pos",
                "EtaIntercalibration_Modelling_neg",
                "Pileup_OffsetMu_pos",
                "Pileup_OffsetMu_neg"
            ]
        );
        for pair in reg.variations().chunks(2) {
            assert_eq!(pair[0].index, pair[1].index);
            assert_eq!((pair[0].sign, pair[1].sign), (Sign::Up, Sign::Down));
        }
        assert_eq!(reg.get(0).unwrap().index, 53);
    }

    #[test]
    fn mjb_shifts_in_order() {
        let cat = catalog();
        let st = stages();
        let reg = VariationRegistry::build("MJB", &ctx(&st, &cat));
        assert_eq!(
            reg.names(),
            vec![
                "MJB_a20_neg", "MJB_a40_pos", "MJB_b5_neg", "MJB_b15_pos", "MJB_pta70_neg",
                "MJB_pta90_pos", "MJB_ptt20_neg", "MJB_ptt30_pos"
            ]
        );
        let pta = reg.get(4).unwrap();
        assert_eq!((pta.kind, pta.index, pta.sign), (VariationKind::MjbPtAsym, 70, Sign::Down));
    }

    #[test]
    fn mjb_stats_only_after_first_iteration() {
        let cat = catalog();
        let st = stages();
        let mut c = ctx(&st, &cat);
        c.mjb_stats = true;
        assert_eq!(VariationRegistry::build("MJB", &c).len(), 8);
        c.iteration = 1;
        let reg = VariationRegistry::build("MJB", &c);
        assert_eq!(reg.len(), 12);
        assert_eq!(reg.get(8).unwrap(), &Variation::new("MJB_stat0_pos", VariationKind::MjbStat, 0, Sign::Up));
        assert_eq!(reg.get(11).unwrap().name, "MJB_stat1_neg");
    }

    #[test]
    fn all_systematics_expands_by_mode() {
        let cat = catalog();
        let st = stages();
        let mut c = ctx(&st, &cat);
        let data = VariationRegistry::build("AllSystematics", &c);
        // Nominal + Special(2 comps) + MJB(8) + Zjet + Gjet + LAr
        assert_eq!(data.len(), 1 + 4 + 8 + 2 + 2 + 2);
        assert!(data.names().contains(&"LAr_Esmear_neg".to_string()));
        c.is_mc = true;
        let mc = VariationRegistry::build("AllSystematics", &c);
        assert_eq!(mc.len(), 9);
    }

    #[test]
    fn unknown_tokens_are_counted() {
        let cat = catalog();
        let st = stages();
        let reg = VariationRegistry::build("Nominal-Bogus-All", &ctx(&st, &cat));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.dropped_tokens(), &["Bogus".to_string(), "All".to_string()]);
    }

    #[test]
    fn duplicate_names_ignored() {
        let cat = catalog();
        let st = stages();
        let reg = VariationRegistry::build("Nominal-Nominal", &ctx(&st, &cat));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.nominal_index(), Some(0));
    }

    #[test]
    fn rebind_follows_store_order() {
        let cat = catalog();
        let st = stages();
        let mut reg = VariationRegistry::build("Nominal-MJB", &ctx(&st, &cat));
        reg.rebind(&["MJB_a20_neg", "Nominal", "MJB_ptt30_pos"]).unwrap();
        assert_eq!(reg.names(), vec!["MJB_a20_neg", "Nominal", "MJB_ptt30_pos"]);
        assert_eq!(reg.nominal_index(), Some(1));
        assert_eq!(reg.get(2).unwrap().kind, VariationKind::MjbPtThreshold);

        reg.rebind(&["MJB_a20_neg"]).unwrap();
        assert_eq!(reg.nominal_index(), None);
        assert!(reg.require_nominal().is_err());
    }

    #[test]
    fn rebind_rejects_unmatched_name() {
        let cat = catalog();
        let st = stages();
        let mut reg = VariationRegistry::build("Nominal", &ctx(&st, &cat));
        let before = reg.clone();
        let err = reg.rebind(&["Nominal", "unknown_xyz"]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(reg, before);
    }
}
