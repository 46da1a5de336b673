//! The structured outcome of one research call.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::sources::extract_sources;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub topic: String,
    pub report: String,
    pub sources: Vec<String>,
    /// RFC 3339 / ISO-8601 UTC timestamp of when the result was packaged.
    pub timestamp: String,
    /// Present (and true) only for failed research calls.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    /// Set when the step budget ran out before the model gave a final answer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

impl ResearchResult {
    /// Package a finished report, extracting its cited sources.
    pub fn completed(topic: impl Into<String>, report: impl Into<String>) -> Self {
        let report = report.into();
        Self {
            topic: topic.into(),
            sources: extract_sources(&report),
            report,
            timestamp: now_timestamp(),
            error: false,
            incomplete: false,
        }
    }

    /// Package a report cut short by the step budget. Not an error.
    pub fn partial(topic: impl Into<String>, report: impl Into<String>) -> Self {
        Self {
            incomplete: true,
            ..Self::completed(topic, report)
        }
    }

    /// Package a failed research call.
    pub fn failed(topic: impl Into<String>, error: &Error) -> Self {
        let report = match error {
            Error::Cancelled => "Research cancelled by user.".to_string(),
            other => format!("Research failed: {}", other),
        };
        Self {
            topic: topic.into(),
            report,
            sources: Vec::new(),
            timestamp: now_timestamp(),
            error: true,
            incomplete: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_completed_extracts_sources() {
        let result = ResearchResult::completed(
            "remote work",
            "Rents shifted (https://a.example/rents). See also https://b.example.",
        );
        assert_eq!(result.topic, "remote work");
        assert_eq!(result.sources, vec!["https://a.example/rents", "https://b.example"]);
        assert!(!result.error);
        assert!(!result.incomplete);
    }

    #[test]
    fn test_timestamp_is_iso8601() {
        let result = ResearchResult::completed("t", "r");
        assert!(DateTime::parse_from_rfc3339(&result.timestamp).is_ok());
    }

    #[test]
    fn test_failed_result() {
        let result = ResearchResult::failed("topic", &Error::auth("invalid key"));
        assert!(result.error);
        assert!(result.sources.is_empty());
        assert!(result.report.starts_with("Research failed:"));
        assert!(result.report.contains("invalid key"));
        assert_eq!(result.topic, "topic");
    }

    #[test]
    fn test_cancelled_result() {
        let result = ResearchResult::failed("topic", &Error::Cancelled);
        assert!(result.error);
        assert_eq!(result.report, "Research cancelled by user.");
    }

    #[test]
    fn test_error_flag_only_serialized_on_failure() {
        let ok = serde_json::to_value(ResearchResult::completed("t", "r")).unwrap();
        assert!(ok.get("error").is_none());
        assert!(ok.get("incomplete").is_none());

        let failed = serde_json::to_value(ResearchResult::failed("t", &Error::network("down"))).unwrap();
        assert_eq!(failed["error"], serde_json::Value::Bool(true));
        assert_eq!(failed["sources"], serde_json::json!([]));
    }
}
