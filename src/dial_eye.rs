use crate::config::Config;
use crate::error::AcquisitionError;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Exit status and captured stdout of one reader invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
}

/// Source of raw dial readings.
pub trait DialReader: Send + Sync + 'static {
    /// Reads the dial once and prints the raw value on stdout.
    fn sample(&self) -> impl Future<Output = Result<CommandOutput, AcquisitionError>> + Send;

    /// Refreshes the dial image shown on the status page.
    fn render_image(&self)
        -> impl Future<Output = Result<CommandOutput, AcquisitionError>> + Send;
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Sample,
    RenderImage,
}

impl Mode {
    fn flag(self) -> &'static str {
        match self {
            Mode::Sample => "-s",
            Mode::RenderImage => "-r",
        }
    }
}

/// Runs the external dialEye tool as a child process.
#[derive(Debug, Clone)]
pub struct DialEye {
    python: String,
    script: PathBuf,
    conf_file: PathBuf,
    meter_id: String,
    image_url: String,
    web_static_dir: PathBuf,
    timeout: Duration,
}

impl DialEye {
    pub fn new(config: &Config) -> Self {
        Self {
            python: config.dialeye_python.clone(),
            script: config.dialeye.clone(),
            conf_file: config.conf_file.clone(),
            meter_id: config.meter_id.clone(),
            image_url: config.image_url.clone(),
            web_static_dir: config.web_static_dir.clone(),
            timeout: config.timeout,
        }
    }

    fn command(&self, mode: Mode) -> Command {
        let mut command = Command::new(&self.python);
        command
            .arg(&self.script)
            .arg("-f")
            .arg(&self.conf_file)
            .arg(mode.flag())
            .arg("-u")
            .arg(&self.meter_id)
            .arg(&self.image_url)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Mode::RenderImage = mode {
            command.current_dir(&self.web_static_dir);
        }
        command
    }

    async fn execute(&self, mode: Mode) -> Result<CommandOutput, AcquisitionError> {
        let start = Instant::now();
        let output = timeout(self.timeout, self.command(mode).output())
            .await
            .map_err(|_| AcquisitionError::Timeout(self.timeout))??;

        let result = CommandOutput {
            // Killed by a signal, no exit code.
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        };
        debug!(
            "DialEye {:?} result (status={}, time={:?}): {}",
            mode,
            result.status,
            start.elapsed(),
            result.stdout.trim()
        );
        Ok(result)
    }
}

impl DialReader for DialEye {
    async fn sample(&self) -> Result<CommandOutput, AcquisitionError> {
        self.execute(Mode::Sample).await
    }

    async fn render_image(&self) -> Result<CommandOutput, AcquisitionError> {
        self.execute(Mode::RenderImage).await
    }
}
