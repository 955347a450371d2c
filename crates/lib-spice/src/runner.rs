//! External simulator execution.
//!
//! The simulator is an opaque command: it gets a deck and an output
//! basename, and is expected to write `<base>.<waveform_ext>` and, usually,
//! a message log `<base>.<log_ext>`. When it does not write a log itself,
//! its console output becomes the log.

use crate::error::{SpiceError, SpiceResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Artifacts of a successful run.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub waveform: PathBuf,
    pub log: PathBuf,
    pub elapsed: Duration,
}

/// Something that can execute a correlation deck.
pub trait SimulatorRunner: Send + Sync {
    /// Run `deck`, writing outputs under `output_base` (no extension).
    ///
    /// A non-zero exit is [`SpiceError::Simulation`]; exceeding the time
    /// budget is [`SpiceError::Timeout`].
    fn run(&self, deck: &Path, output_base: &Path) -> SpiceResult<RunOutput>;

    /// Where the message log for `output_base` ends up.
    fn log_path(&self, output_base: &Path) -> PathBuf;

    /// Where the transient waveform for `output_base` ends up.
    fn waveform_path(&self, output_base: &Path) -> PathBuf;
}

/// Configuration for [`CommandRunner`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Simulator executable, looked up on PATH if not absolute.
    pub executable: String,

    /// Arguments; `{deck}` and `{output}` are substituted.
    pub args: Vec<String>,

    /// Kill the simulator after this many seconds.
    pub timeout_secs: u64,

    pub log_ext: String,
    pub waveform_ext: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            executable: "hspice".to_string(),
            args: vec!["-i".into(), "{deck}".into(), "-o".into(), "{output}".into()],
            timeout_secs: 600,
            log_ext: "lis".to_string(),
            waveform_ext: "tr0".to_string(),
        }
    }
}

/// Runs the simulator as a child process.
#[derive(Clone, Debug, Default)]
pub struct CommandRunner {
    config: RunnerConfig,
}

impl CommandRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn expand_args(&self, deck: &Path, output_base: &Path) -> Vec<String> {
        let deck = deck.display().to_string();
        let output = output_base.display().to_string();
        self.config
            .args
            .iter()
            .map(|a| a.replace("{deck}", &deck).replace("{output}", &output))
            .collect()
    }

    fn wait_with_timeout(&self, mut child: Child) -> SpiceResult<ExitStatus> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let start = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SpiceError::Timeout {
                            secs: self.config.timeout_secs,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(SpiceError::Launch {
                        executable: self.config.executable.clone(),
                        source: e,
                    })
                }
            }
        }
    }
}

fn with_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

impl SimulatorRunner for CommandRunner {
    fn run(&self, deck: &Path, output_base: &Path) -> SpiceResult<RunOutput> {
        let console_path = with_suffix(output_base, "console");
        let console = File::create(&console_path).map_err(|e| SpiceError::io(&console_path, e))?;
        let console_err = console
            .try_clone()
            .map_err(|e| SpiceError::io(&console_path, e))?;

        let args = self.expand_args(deck, output_base);
        tracing::info!("Running {} {}", self.config.executable, args.join(" "));

        let start = Instant::now();
        let child = Command::new(&self.config.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(console)
            .stderr(console_err)
            .spawn()
            .map_err(|e| SpiceError::Launch {
                executable: self.config.executable.clone(),
                source: e,
            })?;

        let status = self.wait_with_timeout(child);

        let log = self.log_path(output_base);
        if log.exists() {
            if let Err(e) = std::fs::remove_file(&console_path) {
                tracing::debug!("Could not remove console capture {:?}: {}", console_path, e);
            }
        } else {
            std::fs::rename(&console_path, &log).map_err(|e| SpiceError::io(&log, e))?;
        }

        let status = status?;
        let elapsed = start.elapsed();
        if !status.success() {
            return Err(SpiceError::Simulation {
                code: status.code().unwrap_or(-1),
                log,
            });
        }

        let waveform = self.waveform_path(output_base);
        if !waveform.exists() {
            tracing::warn!("Simulator succeeded but {:?} was not written", waveform);
        }
        Ok(RunOutput {
            waveform,
            log,
            elapsed,
        })
    }

    fn log_path(&self, output_base: &Path) -> PathBuf {
        with_suffix(output_base, &self.config.log_ext)
    }

    fn waveform_path(&self, output_base: &Path) -> PathBuf {
        with_suffix(output_base, &self.config.waveform_ext)
    }
}
