//! Worker wire protocol
//!
//! Every message is one JSON object on one line, tagged by `kind`.
//!
//! ```text
//! server → worker   {"kind":"fullScan"}
//!                   {"kind":"fileChanged","filePath":"/abs/src/app.module.ts"}
//!                   {"kind":"shutdown"}
//! worker → server   {"kind":"ready"}
//!                   {"kind":"result","diagnostics":[...],"elapsedMs":12,"scanType":"full"}
//!                   {"kind":"error","message":"..."}
//!                   {"kind":"missing","filePath":"/abs/src/gone.ts"}
//! ```

use crate::models::{Diagnostic, RuleErrorInfo};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerRequest {
    FullScan,
    #[serde(rename_all = "camelCase")]
    FileChanged {
        file_path: String,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Full,
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerResponse {
    Ready,
    #[serde(rename_all = "camelCase")]
    Result {
        diagnostics: Vec<Diagnostic>,
        elapsed_ms: u64,
        scan_type: ScanType,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rule_errors: Vec<RuleErrorInfo>,
    },
    Error {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Missing {
        file_path: String,
    },
}

impl WorkerResponse {
    pub fn error(message: impl Into<String>) -> Self {
        WorkerResponse::Error {
            message: message.into(),
        }
    }
}

/// Serialize one message without the trailing newline
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message).context("Failed to encode worker message")
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim()).with_context(|| format!("Invalid worker message: {}", line.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req: WorkerRequest =
            decode_line(r#"{"kind":"fileChanged","filePath":"src/a.ts"}"#).unwrap();
        assert_eq!(
            req,
            WorkerRequest::FileChanged {
                file_path: "src/a.ts".to_string()
            }
        );
        assert_eq!(encode_line(&WorkerRequest::FullScan).unwrap(), r#"{"kind":"fullScan"}"#);
        assert!(decode_line::<WorkerRequest>(r#"{"kind":"rescanEverything"}"#).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let value = serde_json::to_value(WorkerResponse::Result {
            diagnostics: Vec::new(),
            elapsed_ms: 7,
            scan_type: ScanType::Incremental,
            rule_errors: Vec::new(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"kind": "result", "diagnostics": [], "elapsedMs": 7, "scanType": "incremental"})
        );

        let missing = serde_json::to_value(WorkerResponse::Missing {
            file_path: "src/gone.ts".to_string(),
        })
        .unwrap();
        assert_eq!(missing, json!({"kind": "missing", "filePath": "src/gone.ts"}));
        assert_eq!(encode_line(&WorkerResponse::Ready).unwrap(), r#"{"kind":"ready"}"#);
    }
}
