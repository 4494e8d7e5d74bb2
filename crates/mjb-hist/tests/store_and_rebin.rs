//! Integration tests: correction stores on disk and the bootstrap-to-rebin chain.

use approx::assert_relative_eq;
use mjb_hist::{BootstrapToys, CorrectionStore, FlowPolicy, rebin_from_toys};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn iteration_corrections_from_file() {
    let store = CorrectionStore::from_path(fixture_path("mjb_iterations.json")).unwrap();

    let it0 = store.iteration_corrections(0, "DoubleMJB").unwrap();
    let names: Vec<_> = it0.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["Nominal", "MJB_a20_neg"]);
    assert_relative_eq!(it0[0].bin_error(0), 0.004, epsilon = 1e-12);
    assert_eq!(it0[0].content_at(550.0, FlowPolicy::Drop), Some(0.99));
    assert_eq!(it0[0].content_at(5000.0, FlowPolicy::Fold), Some(1.01));

    let lead = store.iteration_corrections(0, "DoubleMJB_leadJet").unwrap();
    assert_eq!(lead.len(), 2);
    assert_eq!(lead[1].bin_content, vec![0.97, 0.98, 1.0]);

    let it1 = store.iteration_corrections(1, "DoubleMJB").unwrap();
    assert_eq!(it1.len(), 1);
    assert!(store.iteration_corrections(2, "DoubleMJB").unwrap().is_empty());

    let vjet = store.get("Vjet_Nominal").unwrap();
    assert_eq!(vjet.content_at(150.0, FlowPolicy::Fold), Some(1.01));
}

#[test]
fn missing_store_file_is_an_error() {
    assert!(CorrectionStore::from_path(fixture_path("does_not_exist.json")).is_err());
}

#[test]
fn shifted_variation_rebins_every_bin() {
    let variations = vec!["Nominal".to_string(), "MJB_a20_neg".to_string()];
    let balance_edges: Vec<f64> = (0..=20).map(|i| i as f64 * 0.1).collect();
    let mut toys =
        BootstrapToys::new(&variations, &[300.0, 400.0, 500.0, 600.0], &balance_edges, 20).unwrap();

    for i in 0..1500u64 {
        let recoil_pt = 300.0 + (i % 300) as f64 + 0.5;
        let nominal = if i % 2 == 0 { 0.95 } else { 1.05 };
        toys.fill("Nominal", 284_000, i, recoil_pt, nominal, 1.0).unwrap();
        toys.fill("MJB_a20_neg", 284_000, i, recoil_pt, nominal + 0.1, 1.0).unwrap();
    }

    let nom = toys.toy_set("Nominal").unwrap();
    let sys = toys.toy_set("MJB_a20_neg").unwrap();
    assert_relative_eq!(nom.central.bin_content.iter().sum::<f64>(), 1500.0);

    let result = rebin_from_toys(&sys.toys, &nom.toys, 600.0, 2.0).unwrap();
    assert_eq!(result.bin_edges, vec![300.0, 400.0, 500.0, 600.0]);
    assert_eq!(result.rms.len(), 3);
}
