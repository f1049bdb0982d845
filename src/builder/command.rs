use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{BuildError, BuildJob, BuildOutcome, ReportBuilder};
use crate::consts::{DEFAULT_BUILD_TIMEOUT, DEFAULT_BUILDER_PROGRAM, MAX_OUTPUT_BYTES};
use crate::request::ReportFormat;

/// Environment variables passed through to the builder. Everything else is stripped.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "TZ",
    "TMPDIR",
    "NODE_PATH",
    "NODE_OPTIONS",
];

/// Configuration for the external builder process.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub program: String,
    /// Arguments placed before the `build`/`pdf` subcommand.
    pub args: Vec<String>,
    /// Working directory; inherited from the worker when `None`.
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_BUILDER_PROGRAM.to_string(),
            args: Vec::new(),
            working_dir: None,
            timeout: DEFAULT_BUILD_TIMEOUT,
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

/// Runs the external document builder, one process per report.
///
/// The process is spawned directly, never through a shell:
///
/// ```text
/// <program> [args..] build <templateDir> <outputPath>report/
/// <program> [args..] pdf   <templateDir> <outputPath>report.pdf
/// ```
pub struct CommandBuilder {
    config: CommandConfig,
}

impl CommandBuilder {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// Builder arguments for a validated job.
    pub fn command_args(&self, format: ReportFormat, job: &BuildJob) -> Vec<OsString> {
        let (subcommand, destination) = match format {
            ReportFormat::Html => ("build", format!("{}report/", job.output_path)),
            ReportFormat::Pdf => ("pdf", format!("{}report.pdf", job.output_path)),
        };
        let mut args: Vec<OsString> = self.config.args.iter().map(OsString::from).collect();
        args.push(subcommand.into());
        args.push(job.template_dir().into_os_string());
        args.push(destination.into());
        args
    }

    fn truncate_output(output: &str, max_bytes: usize) -> String {
        if output.len() <= max_bytes {
            return output.to_string();
        }
        let mut end = max_bytes;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}\n\n[truncated: showing {}/{} bytes]",
            &output[..end],
            end,
            output.len()
        )
    }

    fn filtered_env() -> Vec<(String, String)> {
        SAFE_ENV_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|val| (key.to_string(), val)))
            .collect()
    }
}

#[async_trait]
impl ReportBuilder for CommandBuilder {
    async fn build(&self, job: &BuildJob) -> BuildOutcome {
        let Some(format) = ReportFormat::parse(&job.format) else {
            return BuildOutcome::rejected(BuildError::InvalidReportType(job.format.clone()));
        };
        if !job.template.is_safe() {
            return BuildOutcome::rejected(BuildError::UnsafeTemplateName(
                job.template.to_string(),
            ));
        }

        let args = self.command_args(format, job);
        debug!(program = %self.config.program, ?args, "spawning report builder");

        let mut command = Command::new(&self.config.program);
        command
            .args(&args)
            .env_clear()
            .envs(Self::filtered_env())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.config.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program = %self.config.program, error = %e, "failed to spawn report builder");
                return BuildOutcome::rejected(BuildError::Spawn(e.to_string()));
            }
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "report builder timed out");
                return BuildOutcome::rejected(BuildError::Timeout(self.config.timeout));
            }
        };

        let max = self.config.max_output_bytes;
        let stdout = Self::truncate_output(&String::from_utf8_lossy(&output.stdout), max);
        let stderr = Self::truncate_output(&String::from_utf8_lossy(&output.stderr), max);

        if output.status.success() {
            BuildOutcome::success(stdout)
        } else {
            BuildOutcome::failure(BuildError::Exit(output.status.code()), stdout, stderr)
        }
    }
}
