//! Run configuration.

use anyhow::{Context, Result};
use lib_ibis::IbisHeader;
use lib_spice::RunnerConfig;
use lib_types::{Component, GlobalDefaults, IbisGraph, Model};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Complete run configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Run name.
    #[serde(default)]
    pub name: String,

    /// Process-wide defaults.
    #[serde(default)]
    pub globals: GlobalDefaults,

    #[serde(default)]
    pub models: Vec<Model>,

    #[serde(default)]
    pub components: Vec<Component>,

    /// Header keywords for emitted model-description files.
    #[serde(default)]
    pub header: IbisHeader,

    #[serde(default)]
    pub correlation: CorrelationConfig,
}

/// Correlation deck and simulator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Simulator command, arguments and timeout.
    #[serde(default)]
    pub simulator: RunnerConfig,

    /// Where decks, wrappers and simulator outputs go.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Transmission-line data referenced by every deck.
    #[serde(default = "default_tline_file")]
    pub tline_file: PathBuf,

    /// Deck template; the built-in one when absent.
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Run independent models concurrently, each in its own sub-directory.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            simulator: RunnerConfig::default(),
            output_dir: default_output_dir(),
            tline_file: default_tline_file(),
            template: None,
            parallel: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("correlation")
}

fn default_tline_file() -> PathBuf {
    PathBuf::from("tline.rlgc")
}

impl ForgeConfig {
    /// Build the model graph. Pins stay unlinked until completion runs.
    pub fn graph(&self) -> IbisGraph {
        IbisGraph::new(self.models.clone(), self.components.clone())
    }

    /// Make relative file references relative to `base` (the config file's
    /// directory) instead of the working directory.
    fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        for model in &mut self.models {
            if let Some(p) = model.spice_file.as_mut() {
                rebase(p);
            }
        }
        for component in &mut self.components {
            if let Some(p) = component.spice_file.as_mut() {
                rebase(p);
            }
        }
        if let Some(p) = self.correlation.template.as_mut() {
            rebase(p);
        }
        rebase(&mut self.correlation.tline_file);
    }
}

/// Load configuration from a TOML file, or JSON when the extension says so.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: ForgeConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config as JSON: {:?}", path))?
    } else {
        toml::from_str(&content).with_context(|| format!("Failed to parse config as TOML: {:?}", path))?
    };

    if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        config.resolve_paths(base);
    }

    validate_config(&config)?;

    tracing::info!(
        "Loaded config '{}': {} models, {} components",
        config.name,
        config.models.len(),
        config.components.len()
    );
    Ok(config)
}

/// Validate configuration.
fn validate_config(config: &ForgeConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for model in &config.models {
        let key = model.name.trim().to_lowercase();
        if key.is_empty() {
            anyhow::bail!("Model with an empty name in configuration");
        }
        if !seen.insert(key) {
            anyhow::bail!("Duplicate model name: '{}'", model.name);
        }
    }

    // Decks and run outputs are named after the stem.
    let mut stems: HashMap<String, &str> = HashMap::new();
    for model in &config.models {
        if let Some(other) = stems.insert(lib_spice::deck_stem(model), &model.name) {
            anyhow::bail!(
                "Models '{}' and '{}' share output name '{}'",
                other,
                model.name,
                lib_spice::deck_stem(model)
            );
        }
    }

    if config.correlation.simulator.timeout_secs == 0 {
        anyhow::bail!("correlation.simulator.timeout_secs must be greater than zero");
    }

    // Missing netlists only matter to correlation; completion still works.
    for model in &config.models {
        if let Some(path) = &model.spice_file {
            if !path.exists() {
                tracing::warn!("Model '{}': netlist not found: {:?}", model.name, path);
            }
        }
    }
    for component in &config.components {
        if let Some(path) = &component.spice_file {
            if !path.exists() {
                tracing::warn!("Component '{}': netlist not found: {:?}", component.name, path);
            }
        }
    }

    if let Some(template) = &config.correlation.template {
        if !template.exists() {
            anyhow::bail!("Deck template not found: {:?}", template);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::ModelType;

    const SAMPLE: &str = r#"
name = "demo"

[globals.electrical]
voltage_range = [3.3, 3.0, 3.6]
temp_range = ["27", "100", "0"]
r_load = "50"

[globals.parasitics]
r_pkg = [0.2, 0.1, 0.3]

[[models]]
name = "DQ"
model_type = "I/O"
enable = "Active-Low"
spice_file = "dq.sp"

[models.electrical]
c_comp = ["2p", "1.8p", "2.2p"]

[[models]]
name = "CLK_IN"
model_type = "Input"

[[components]]
name = "chip"
spice_file = "chip.sp"

[[components.pins]]
name = "1"
signal_name = "DQ0"
model_name = "DQ"

[[components.pins]]
name = "2"
signal_name = "VDD"
model_name = "POWER"

[correlation]
output_dir = "out"
parallel = true

[correlation.simulator]
executable = "ngspice"
timeout_secs = 30
"#;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "run.toml", SAMPLE);

        let config = load_config(&path).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].model_type, ModelType::IO);
        assert!((config.models[0].electrical.c_comp.typ - 2e-12).abs() < 1e-24);
        assert!((config.globals.electrical.temp_range.min - 100.0).abs() < 1e-12);
        assert_eq!(config.globals.electrical.r_load, 50.0);
        assert_eq!(config.components[0].pins.len(), 2);

        // Relative paths follow the config file.
        assert_eq!(config.models[0].spice_file.as_deref(), Some(dir.path().join("dq.sp").as_path()));
        assert_eq!(config.correlation.tline_file, dir.path().join("tline.rlgc"));
        assert_eq!(config.correlation.output_dir, PathBuf::from("out"));

        assert!(config.correlation.parallel);
        assert_eq!(config.correlation.simulator.executable, "ngspice");
        assert_eq!(config.correlation.simulator.timeout_secs, 30);
        assert_eq!(config.correlation.simulator.waveform_ext, "tr0");
    }

    #[test]
    fn test_load_json_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "run.json",
            r#"{"models": [{"name": "OUT", "model_type": "3-state"}]}"#,
        );

        let config = load_config(&path).unwrap();
        assert_eq!(config.models[0].model_type, ModelType::ThreeState);
        assert!(config.globals.electrical.voltage_range.is_unset());
        assert_eq!(config.correlation.simulator.timeout_secs, 600);
        assert!(!config.correlation.parallel);
        assert!(config.header.source.starts_with("ibis-forge"));
    }

    #[test]
    fn test_duplicate_model_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dup.toml",
            "[[models]]\nname = \"DQ\"\n[[models]]\nname = \"dq\"\n",
        );

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate model name"));
    }

    #[test]
    fn test_colliding_output_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "stem.toml",
            "[[models]]\nname = \"DQ-IO\"\n[[models]]\nname = \"DQ_IO\"\n",
        );

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("share output name 'corr_dq_io'"));
    }

    #[test]
    fn test_missing_template_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "t.toml", "[correlation]\ntemplate = \"nope.sp\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_bad_model_type_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.toml", "[[models]]\nname = \"X\"\nmodel_type = \"bogus\"\n");
        assert!(load_config(&path).is_err());
        assert!(load_config(&dir.path().join("absent.toml")).is_err());
    }
}
