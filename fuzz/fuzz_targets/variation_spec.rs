#![no_main]

use libfuzzer_sys::fuzz_target;
use mjb_balance::{SystematicsCatalog, VariationContext, VariationRegistry};

const COMPONENTS: &str = "\
JESComponent.1.Name: EtaIntercalibration_Modelling
JESComponent.2.Name: Zjet_MuScale
JESComponent.3.Name: Gjet_Veto
";

fuzz_target!(|data: &[u8]| {
    let Ok(spec) = std::str::from_utf8(data) else {
        return;
    };

    let stages = ["RAW", "JetArea", "EtaJES", "GSC"].map(String::from);
    let catalog = SystematicsCatalog::parse(COMPONENTS);
    let ctx = VariationContext {
        is_mc: data.len() % 2 == 0,
        alpha: 0.3,
        beta: 1.0,
        pt_asym: 0.8,
        pt_threshold: 25.0,
        calib_stages: &stages,
        catalog: &catalog,
        mjb_stats: data.first().is_some_and(|b| b & 1 == 1),
        iteration: 1,
    };

    let reg = VariationRegistry::build(spec, &ctx);
    let names = reg.names();
    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), names.len());
    if let Some(i) = reg.nominal_index() {
        assert_eq!(reg.variations()[i].name, "Nominal");
    }
});
