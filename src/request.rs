//! Inbound report requests and the header decoder.

use std::collections::HashMap;
use std::fmt;

use crate::consts::{DEFAULT_OUTPUT_PATH, DEFAULT_TEMPLATE_PATH};
use crate::message::HEADER_STATUS;

pub const HEADER_QUESTIONNAIRE_ID: &str = "questionnaireID";
pub const HEADER_SURVEY_ID: &str = "surveyID";
pub const HEADER_FORMAT: &str = "format";
pub const HEADER_TEMPLATE_PATH: &str = "templatePath";
pub const HEADER_OUTPUT_PATH: &str = "outputPath";

/// Headers of which at least one must be present for a message to count as
/// a report request.
const REQUEST_HEADERS: &[&str] = &[HEADER_QUESTIONNAIRE_ID, HEADER_SURVEY_ID, HEADER_FORMAT];

/// Report artifact kinds the builder knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Pdf,
}

impl ReportFormat {
    /// Parse a wire value. Matching is exact; anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "html" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A report request as decoded from message headers.
///
/// `format` is kept raw: rejecting unknown formats is the builder's job, so
/// an invalid request still produces a `fail` result on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub questionnaire_id: String,
    pub survey_id: String,
    pub format: String,
    /// As requested. Builds always use the configured template root.
    pub template_path: String,
    pub output_path: String,
}

/// Configured paths. `template_path` is the root every build uses and the
/// value decoded for requests without a `templatePath` header;
/// `output_path` is the fallback output prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDefaults {
    pub template_path: String,
    pub output_path: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            template_path: DEFAULT_TEMPLATE_PATH.to_string(),
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
        }
    }
}

impl ReportRequest {
    /// Whether `headers` describe a report request. Result messages carry a
    /// status header and audit notices carry no request headers at all;
    /// neither is a request.
    pub fn is_request(headers: &HashMap<String, String>) -> bool {
        !headers.contains_key(HEADER_STATUS)
            && REQUEST_HEADERS.iter().any(|key| headers.contains_key(*key))
    }

    /// Decode a request from message headers. Never fails: missing required
    /// fields decode as empty strings and missing paths take the defaults.
    pub fn decode(headers: &HashMap<String, String>, defaults: &RequestDefaults) -> Self {
        let field = |key: &str| headers.get(key).cloned().unwrap_or_default();
        let path = |key: &str, fallback: &str| {
            headers
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            questionnaire_id: field(HEADER_QUESTIONNAIRE_ID),
            survey_id: field(HEADER_SURVEY_ID),
            format: field(HEADER_FORMAT),
            template_path: path(HEADER_TEMPLATE_PATH, &defaults.template_path),
            output_path: path(HEADER_OUTPUT_PATH, &defaults.output_path),
        }
    }
}
