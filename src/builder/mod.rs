pub mod command;
pub mod mock;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::request::ReportRequest;
use crate::template::{self, TemplateDirName};

/// Why a build did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid Report Type: {0:?}")]
    InvalidReportType(String),
    #[error("unsafe template directory name: {0:?}")]
    UnsafeTemplateName(String),
    #[error("failed to spawn builder: {0}")]
    Spawn(String),
    #[error("builder exited with code {}", describe_code(.0))]
    Exit(Option<i32>),
    #[error("builder timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Result of one builder invocation. Errors are information, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildOutcome {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<BuildError>,
}

impl BuildOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failure(error: BuildError, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: Some(error),
        }
    }

    /// A failure detected before any process was spawned. The error text
    /// doubles as the stderr shown to the requester.
    pub fn rejected(error: BuildError) -> Self {
        let stderr = error.to_string();
        Self::failure(error, "", stderr)
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.error, Some(BuildError::Timeout(_)))
    }
}

/// Everything the builder needs for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    /// Raw requested format; validated by the builder.
    pub format: String,
    pub template_root: PathBuf,
    pub template: TemplateDirName,
    /// Destination prefix; `report/` or `report.pdf` is appended verbatim.
    pub output_path: String,
}

impl BuildJob {
    /// Derive a job from a decoded request. The questionnaire identifier is
    /// only ever carried forward in its resolved form, and templates always
    /// live under the worker's own `template_root`; the request's
    /// `templatePath` is not trusted.
    pub fn from_request(request: &ReportRequest, template_root: &Path) -> Self {
        Self {
            format: request.format.clone(),
            template_root: template_root.to_path_buf(),
            template: template::resolve(&request.questionnaire_id),
            output_path: request.output_path.clone(),
        }
    }

    pub fn template_dir(&self) -> PathBuf {
        self.template.under(&self.template_root)
    }
}

/// Renders report artifacts.
#[async_trait]
pub trait ReportBuilder: Send + Sync {
    async fn build(&self, job: &BuildJob) -> BuildOutcome;
}
