#![no_main]

use libfuzzer_sys::fuzz_target;
use mjb_balance::MjbConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parse errors and rejected values are fine; panics are not.
    if let Ok(cfg) = MjbConfig::from_yaml_str(text) {
        let _ = cfg.prepare(true);
        let _ = cfg.prepare(false);
    }
});
