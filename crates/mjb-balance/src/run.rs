//! Job driver: builds the variation list and corrections once, then runs the
//! selection over events and hands selected variations to an output sink.
//!
//! Job-level mutable state lives in [`RunState`], created by
//! [`MultijetBalance::start`] and consumed by [`MultijetBalance::finalize`].

use mjb_core::{Error, Result};
use mjb_hist::{BootstrapToys, CorrectionStore, Histogram};
use serde::Serialize;

use crate::config::PreparedConfig;
use crate::correction::CorrectionApplier;
use crate::cutflow::{Cutflow, CutflowSet};
use crate::jet::EventInput;
use crate::lumi::XsAccTable;
use crate::observables::{BalanceObservables, EventWeights, fill_tile_fractions, tag_jets};
use crate::selection::{EventOutcome, EventSelector, PreSelection, VariationResult};
use crate::sink::{BalanceRecord, InMemorySink, JetRecord, OutputSink, balance_edges};
use crate::stages::CalibrationStageMap;
use crate::systematics::SystematicsCatalog;
use crate::tools::JetTools;
use crate::variation::{VariationContext, VariationRegistry};

/// Progress is logged every this many events.
const PROGRESS_INTERVAL: u64 = 100_000;

/// Container fragments and the V+jet correction type they map to.
const VJET_CONTAINER_TYPES: [(&str, &str); 4] = [
    ("AntiKt4EMTopo", "EMJES_R4"),
    ("AntiKt6EMTopo", "EMJES_R6"),
    ("AntiKt4LCTopo", "LCJES_R4"),
    ("AntiKt6LCTopo", "LCJES_R6"),
];

/// Files a job reads before the first event.
#[derive(Debug, Clone, Default)]
pub struct JobResources {
    /// Uncertainty components.
    pub catalog: SystematicsCatalog,
    /// MJB corrections of previous iterations.
    pub corrections: Option<CorrectionStore>,
    /// V+jet calibration.
    pub vjet: Option<CorrectionStore>,
    /// Cross-section table.
    pub xs_table: Option<XsAccTable>,
}

impl JobResources {
    /// Read every file named by the configuration.
    pub fn load(config: &PreparedConfig) -> Result<Self> {
        let catalog = match &config.jet_uncertainty_config {
            Some(p) => SystematicsCatalog::from_path(p)?,
            None => SystematicsCatalog::default(),
        };
        let corrections = match (&config.mjb_correction_file, config.correction_iteration()) {
            (Some(p), Some(_)) => Some(CorrectionStore::from_path(p)?),
            _ => None,
        };
        let vjet = config.vjet_calib_file.as_ref().map(CorrectionStore::from_path).transpose()?;
        let xs_table = match &config.xs_acc_file {
            Some(p) if config.is_mc => Some(XsAccTable::from_path(p)?),
            _ => None,
        };
        Ok(Self { catalog, corrections, vjet, xs_table })
    }
}

/// Sample normalisation fixed by the first event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleInfo {
    /// Channel number (simulation) or run number (data).
    pub tag: String,
    /// Cross-section, `1` on data.
    pub xs: f64,
    /// Acceptance, `1` on data.
    pub acceptance: f64,
}

/// Mutable state of one job.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Per-variation cutflows.
    pub cutflows: CutflowSet,
    /// Events handed to the driver, including those past the limit.
    pub events_seen: u64,
    /// Events that went through the selection.
    pub events_processed: u64,
    /// Selected events per variation.
    pub selected: Vec<u64>,
    /// Correction and scale-factor failures.
    pub correction_failures: u64,
    /// Normalisation, set by the first event.
    pub sample: Option<SampleInfo>,
}

/// Selected count of one variation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationCount {
    /// Variation name.
    pub variation: String,
    /// Selected events.
    pub selected: u64,
}

/// End-of-job summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Events that went through the selection.
    pub events_processed: u64,
    /// Selected events per variation, in registry order.
    pub selected: Vec<VariationCount>,
    /// Correction and scale-factor failures.
    pub correction_failures: u64,
    /// Variation-spec tokens that were not recognized.
    pub dropped_tokens: Vec<String>,
    /// Normalisation of the sample.
    pub sample: Option<SampleInfo>,
    /// Per-variation cutflows.
    pub cutflows: Vec<Cutflow>,
    /// Nominal cutflow named after the channel or run.
    pub representative_cutflow: Option<Cutflow>,
}

impl RunSummary {
    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Multijet balance job.
#[derive(Debug)]
pub struct MultijetBalance {
    config: PreparedConfig,
    tools: JetTools,
    stages: CalibrationStageMap,
    registry: VariationRegistry,
    applier: CorrectionApplier,
    xs_table: Option<XsAccTable>,
    nominal_only_records: bool,
}

impl MultijetBalance {
    /// Set up a job: calibration stages, variation list, corrections and tools.
    pub fn new(config: PreparedConfig, mut tools: JetTools, resources: JobResources) -> Result<Self> {
        let stages =
            CalibrationStageMap::build(&config.in_container_name, &config.jet_calib_sequence)?;
        let stage_names = stages.names();
        let ctx = VariationContext {
            is_mc: config.is_mc,
            alpha: config.alpha,
            beta: config.beta,
            pt_asym: config.pt_asym,
            pt_threshold: config.pt_thresh,
            calib_stages: &stage_names,
            catalog: &resources.catalog,
            mjb_stats: config.mjb_stats_on,
            iteration: config.iteration,
        };
        let mut registry = VariationRegistry::build(&config.sys_variations, &ctx);

        let mut corrections = Vec::new();
        if let Some(iteration) = config.correction_iteration() {
            let store = resources.corrections.as_ref().ok_or_else(|| {
                Error::config(format!(
                    "iteration {} needs MJB corrections from iteration {iteration}, \
                     but no correction file is set",
                    config.iteration
                ))
            })?;
            corrections = store.iteration_corrections(iteration, config.correction_hist_name())?;
            let names: Vec<&str> = corrections.iter().map(|h| h.name.as_str()).collect();
            registry.rebind(names.as_slice())?;
            log::info!("loaded {} MJB corrections from iteration {iteration}", corrections.len());
        }

        let vjet = if config.vjet_calib {
            let store = resources
                .vjet
                .as_ref()
                .ok_or_else(|| Error::config("V+jet calibration enabled without a calibration file"))?;
            Some(load_vjet(store, &config.in_container_name)?)
        } else {
            None
        };

        if registry.is_empty() {
            return Err(Error::config(format!(
                "variation spec '{}' produced no variations",
                config.sys_variations
            )));
        }

        let mut nominal_only_records = config.write_nominal_tree;
        if nominal_only_records && registry.nominal_index().is_none() {
            log::warn!("no Nominal variation; writing records for every variation");
            nominal_only_records = false;
        }

        tools.initialize(&config.btag_wps)?;
        let applier = CorrectionApplier::new(&config, &stages, corrections, vjet);
        log::info!("configured {} variations: {}", registry.len(), registry.names().join(" "));

        Ok(Self {
            config,
            tools,
            stages,
            registry,
            applier,
            xs_table: resources.xs_table,
            nominal_only_records,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &PreparedConfig {
        &self.config
    }

    /// The variation list.
    pub fn registry(&self) -> &VariationRegistry {
        &self.registry
    }

    /// The calibration stages.
    pub fn stages(&self) -> &CalibrationStageMap {
        &self.stages
    }

    /// The correction applier.
    pub fn applier(&self) -> &CorrectionApplier {
        &self.applier
    }

    /// Histogram directory name of every variation.
    pub fn directory_names(&self) -> Vec<String> {
        self.registry.variations().iter().map(|v| self.config.hist_dir_name(&v.name)).collect()
    }

    /// Number of record streams: none without record output, one when only
    /// the nominal variation is written, otherwise one per variation.
    pub fn record_streams(&self) -> usize {
        match (self.config.write_tree, self.nominal_only_records) {
            (false, _) => 0,
            (true, true) => 1,
            (true, false) => self.registry.len(),
        }
    }

    /// An in-memory sink booked for this job.
    pub fn in_memory_sink(&self) -> Result<InMemorySink> {
        let toys = if self.config.bootstrap {
            Some(BootstrapToys::new(
                &self.registry.names(),
                &self.config.bins,
                &balance_edges(),
                self.config.n_toys,
            )?)
        } else {
            None
        };
        InMemorySink::new(&self.directory_names(), &self.config.bins, self.record_streams(), toys)
    }

    /// Fresh run state.
    pub fn start(&self) -> RunState {
        RunState {
            cutflows: CutflowSet::new(self.registry.names().as_slice(), self.config.use_cutflow),
            events_seen: 0,
            events_processed: 0,
            selected: vec![0; self.registry.len()],
            correction_failures: 0,
            sample: None,
        }
    }

    /// Run one event through every variation.
    pub fn process_event(
        &self,
        state: &mut RunState,
        event: &EventInput,
        sink: &mut dyn OutputSink,
    ) -> Result<EventOutcome> {
        if self.config.max_event.is_some_and(|max| state.events_processed >= max) {
            state.events_seen += 1;
            return Ok(EventOutcome::LimitReached);
        }
        state.events_seen += 1;
        state.events_processed += 1;
        if state.events_processed % PROGRESS_INTERVAL == 0 {
            log::info!("{} events processed", state.events_processed);
        }

        if state.sample.is_none() {
            state.sample = Some(self.sample_info(event)?);
        }
        let (xs, acceptance) = match &state.sample {
            Some(s) => (s.xs, s.acceptance),
            None => (1.0, 1.0),
        };

        let selector =
            EventSelector::new(&self.config, &self.applier, &self.tools, self.stages.raw_key());
        let mut failures = 0;
        let baseline = match selector.pre_select(event, &mut state.cutflows, &mut failures) {
            PreSelection::Passed(jets) => jets,
            PreSelection::Rejected(label) => {
                state.correction_failures += u64::from(failures);
                return Ok(EventOutcome::Rejected(label));
            }
        };

        let mut outcomes = Vec::with_capacity(self.registry.len());
        for (i, variation) in self.registry.variations().iter().enumerate() {
            let result =
                selector.select(event, &baseline, i, variation, &mut state.cutflows, &mut failures);
            outcomes.push(result.outcome());
            let mut selection = match result {
                VariationResult::Selected(s) => s,
                VariationResult::Skipped(_) => continue,
                VariationResult::Aborted(_) => break,
            };

            let wps = &self.config.btag_wps;
            failures += tag_jets(&mut selection.jets, wps, &self.tools, self.config.is_mc);
            fill_tile_fractions(&mut selection.jets);
            let weights = EventWeights::new(
                self.config.is_mc,
                if self.config.is_mc { event.mc_event_weight } else { 1.0 },
                selection.prescale,
                xs,
                acceptance,
            );
            let observables = BalanceObservables::build(
                &selection.jets,
                selection.recoil,
                selection.pt_asym,
                selection.alpha,
                selection.beta.average,
                weights,
            );

            sink.fill_histograms(i, &selection.jets, &observables)?;
            if let Some(stream) = self.record_stream(i) {
                let record = BalanceRecord {
                    variation: variation.name.clone(),
                    run_number: event.run_number,
                    event_number: event.event_number,
                    observables,
                    jets: selection.jets.iter().map(JetRecord::from).collect(),
                };
                sink.write_record(stream, record)?;
            }
            if self.config.bootstrap {
                sink.fill_bootstrap(
                    &variation.name,
                    event.run_number,
                    event.event_number,
                    observables.recoil.pt,
                    observables.pt_bal,
                    weights.weight,
                )?;
            }
            state.selected[i] += 1;
        }

        state.correction_failures += u64::from(failures);
        Ok(EventOutcome::Processed(outcomes))
    }

    /// Summarize the job.
    pub fn finalize(&self, state: RunState) -> RunSummary {
        let representative = state
            .sample
            .as_ref()
            .and_then(|s| state.cutflows.representative(self.registry.nominal_index(), &s.tag));
        if state.correction_failures > 0 {
            log::warn!("{} jet correction failures during the job", state.correction_failures);
        }
        RunSummary {
            events_processed: state.events_processed,
            selected: self
                .registry
                .variations()
                .iter()
                .zip(&state.selected)
                .map(|(v, &n)| VariationCount { variation: v.name.clone(), selected: n })
                .collect(),
            correction_failures: state.correction_failures,
            dropped_tokens: self.registry.dropped_tokens().to_vec(),
            sample: state.sample,
            cutflows: state.cutflows.cutflows().to_vec(),
            representative_cutflow: representative,
        }
    }

    fn record_stream(&self, var_index: usize) -> Option<usize> {
        if !self.config.write_tree {
            return None;
        }
        if self.nominal_only_records {
            (self.registry.nominal_index() == Some(var_index)).then_some(0)
        } else {
            Some(var_index)
        }
    }

    fn sample_info(&self, event: &EventInput) -> Result<SampleInfo> {
        if !self.config.is_mc {
            return Ok(SampleInfo { tag: event.run_number.to_string(), xs: 1.0, acceptance: 1.0 });
        }
        let table = self
            .xs_table
            .as_ref()
            .ok_or_else(|| Error::config("simulation input needs a cross-section file"))?;
        let (xs, acceptance) = table.lookup(event.mc_channel_number)?;
        log::info!("channel {}: xs {xs}, acceptance {acceptance}", event.mc_channel_number);
        Ok(SampleInfo { tag: event.mc_channel_number.to_string(), xs, acceptance })
    }
}

/// V+jet correction histogram for the jet collection.
fn load_vjet(store: &CorrectionStore, container: &str) -> Result<Histogram> {
    let (_, kind) = VJET_CONTAINER_TYPES
        .iter()
        .find(|(fragment, _)| container.contains(fragment))
        .ok_or_else(|| {
            Error::config(format!("no V+jet calibration for jet collection '{container}'"))
        })?;
    store.get(&format!("{kind}_correction"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mjb_hist::StoredHistogram;

    #[test]
    fn vjet_histogram_by_container() {
        let store = CorrectionStore {
            histograms: vec![StoredHistogram {
                name: "LCJES_R6_correction".into(),
                bin_edges: vec![20.0, 2000.0],
                bin_content: vec![1.02],
                bin_errors: None,
            }],
            directories: vec![],
        };
        assert_eq!(load_vjet(&store, "AntiKt6LCTopoJets").unwrap().bin_content, vec![1.02]);
        assert!(matches!(load_vjet(&store, "AntiKt4EMPFlowJets"), Err(Error::Configuration(_))));
        assert!(matches!(load_vjet(&store, "AntiKt4EMTopoJets"), Err(Error::Histogram(_))));
    }
}
