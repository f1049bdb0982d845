//! Outbound messages: build results and audit notices.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::builder::BuildOutcome;
use crate::request::ReportRequest;

/// Header carrying the result status (`success` or `fail`).
pub const HEADER_STATUS: &str = "error";

/// Reported for every successful build. Consumers of the result feed key on
/// this value, so it stays `html` regardless of the requested format.
pub const SUCCESS_REPORT_TYPE: &str = "html";

/// Result of one report request, published once per request.
///
/// The wire discriminator is called `error` and takes the values
/// `success` or `fail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "lowercase")]
pub enum ResultMessage {
    Success {
        message: String,
        #[serde(rename = "type")]
        report_type: String,
        #[serde(rename = "outputPath")]
        output_path: String,
    },
    Fail {
        message: String,
    },
}

impl ResultMessage {
    /// Encode a build outcome for the request it answers.
    pub fn encode(outcome: &BuildOutcome, request: &ReportRequest) -> Self {
        if outcome.succeeded() {
            Self::Success {
                message: outcome.stdout.clone(),
                report_type: SUCCESS_REPORT_TYPE.to_string(),
                output_path: request.output_path.clone(),
            }
        } else {
            Self::Fail {
                message: outcome.stderr.clone(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Fail { .. } => "fail",
        }
    }

    /// The result fields as string headers.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::from([(HEADER_STATUS.to_string(), self.status().to_string())]);
        match self {
            Self::Success {
                message,
                report_type,
                output_path,
            } => {
                headers.insert("message".to_string(), message.clone());
                headers.insert("type".to_string(), report_type.clone());
                headers.insert("outputPath".to_string(), output_path.clone());
            }
            Self::Fail { message } => {
                headers.insert("message".to_string(), message.clone());
            }
        }
        headers
    }
}

/// Side-channel notice published for every request the surrounding HTTP
/// application serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditNotice {
    pub message: String,
}

/// A message ready for the bus: string headers plus a JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    pub fn report(result: &ResultMessage) -> serde_json::Result<Self> {
        Ok(Self {
            headers: result.headers(),
            body: serde_json::to_vec(result)?,
        })
    }

    pub fn audit(url: &str) -> serde_json::Result<Self> {
        let notice = AuditNotice {
            message: url.to_string(),
        };
        Ok(Self {
            headers: BTreeMap::new(),
            body: serde_json::to_vec(&notice)?,
        })
    }
}
