//! Pipeline orchestration: completion, then correlation per model.

use crate::config::ForgeConfig;
use anyhow::{Context, Result};
use lib_ibis::{complete, write_ibis_file, CompletionReport};
use lib_spice::{
    build_correlation, deck_stem, decode_waveform_file, CommandRunner, CorrelationContext,
    CorrelationResult, CorrelationStatus, DeckTemplate, SimulatorRunner,
};
use lib_types::{IbisGraph, ModelId, WaveformSet};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;

/// Per-signal extent of a decoded waveform.
#[derive(Clone, Debug, Serialize)]
pub struct SignalSummary {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

/// Compact description of a decoded waveform.
#[derive(Clone, Debug, Serialize)]
pub struct WaveformSummary {
    pub samples: usize,
    pub duration: f64,
    pub signals: Vec<SignalSummary>,
}

impl WaveformSummary {
    pub fn from_set(set: &WaveformSet) -> Self {
        let signals = set
            .iter()
            .map(|(name, _, values)| {
                let (min, max) = set.range_of(name).unwrap_or((f64::NAN, f64::NAN));
                SignalSummary {
                    name: name.to_string(),
                    min,
                    max,
                    last: values.last().copied().unwrap_or(f64::NAN),
                }
            })
            .collect();

        Self {
            samples: set.len(),
            duration: set.duration(),
            signals,
        }
    }
}

/// One model's correlation result plus the decoded waveform, if any.
#[derive(Clone, Debug, Serialize)]
pub struct CorrelationOutcome {
    #[serde(flatten)]
    pub result: CorrelationResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<WaveformSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl CorrelationOutcome {
    pub fn is_failure(&self) -> bool {
        self.result.status.is_failure() || self.decode_error.is_some()
    }
}

/// Pipeline orchestrator.
pub struct Orchestrator {
    config: ForgeConfig,
    graph: IbisGraph,
    report: Option<CompletionReport>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: ForgeConfig) -> Self {
        let graph = config.graph();
        Self {
            config,
            graph,
            report: None,
        }
    }

    pub fn graph(&self) -> &IbisGraph {
        &self.graph
    }

    /// Run data completion once; later calls return the first report.
    pub fn complete(&mut self) -> &CompletionReport {
        let Self {
            config,
            graph,
            report,
        } = self;

        report.get_or_insert_with(|| {
            tracing::info!("Completing model data for '{}'", config.name);
            let report = complete(&config.globals, graph);
            for error in &report.errors {
                tracing::error!("{}", error);
            }
            tracing::info!(
                "Completion: {} pins linked, {} slots filled, {} errors",
                report.linked_pins,
                report.filled_slots,
                report.errors.len()
            );
            report
        })
    }

    /// Write the completed graph as a model-description file.
    pub fn emit(&mut self, path: &Path) -> Result<()> {
        self.complete();
        write_ibis_file(path, &self.graph, &self.config.globals, &self.config.header)
            .with_context(|| format!("Failed to write model description {:?}", path))
    }

    /// Build (and with `run`, simulate) a correlation deck for every model.
    pub fn correlate(&mut self, output_dir: &Path, run: bool) -> Result<Vec<CorrelationOutcome>> {
        self.complete();

        let settings = &self.config.correlation;
        let template = match &settings.template {
            Some(path) => DeckTemplate::from_file(path)
                .with_context(|| format!("Failed to load deck template {:?}", path))?,
            None => DeckTemplate::builtin(),
        };
        let ctx = CorrelationContext::new(template, settings.tline_file.clone());

        let command = CommandRunner::new(settings.simulator.clone());
        let runner: Option<&dyn SimulatorRunner> = if run { Some(&command) } else { None };

        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

        let ids: Vec<ModelId> = (0..self.graph.models.len()).map(ModelId).collect();
        let graph = &self.graph;

        let outcomes = if settings.parallel {
            tracing::info!("Correlating {} models in parallel", ids.len());
            ids.into_par_iter()
                .map(|id| {
                    let dir = output_dir.join(deck_stem(graph.model(id)));
                    correlate_one(graph, id, &ctx, &dir, runner)
                })
                .collect()
        } else {
            ids.into_iter()
                .map(|id| correlate_one(graph, id, &ctx, output_dir, runner))
                .collect()
        };

        Ok(outcomes)
    }
}

fn correlate_one(
    graph: &IbisGraph,
    id: ModelId,
    ctx: &CorrelationContext,
    output_dir: &Path,
    runner: Option<&dyn SimulatorRunner>,
) -> CorrelationOutcome {
    let result = build_correlation(graph, id, ctx, output_dir, runner);

    let mut outcome = CorrelationOutcome {
        result,
        waveform: None,
        decode_error: None,
    };

    if let CorrelationStatus::Completed { waveform } = &outcome.result.status {
        match decode_waveform_file(waveform) {
            Ok(set) => outcome.waveform = Some(WaveformSummary::from_set(&set)),
            Err(e) => {
                tracing::warn!("Model '{}': waveform decode failed: {}", outcome.result.model, e);
                outcome.decode_error = Some(e.to_string());
            }
        }
    }

    outcome
}
