//! Kuro API envelope and widget payload parsing.

use chrono::{DateTime, Utc};
use reminder_core::types::{FetchError, Snapshot};
use serde::Deserialize;
use serde_json::Value;

/// Code the API returns on success.
pub const CODE_OK: i64 = 200;

/// Standard `{code, msg, data}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct KuroResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl KuroResponse {
    /// Parse a response body. `data` is sometimes a JSON document encoded as a string.
    pub fn parse(body: &str) -> Result<Self, String> {
        let mut resp: KuroResponse =
            serde_json::from_str(body).map_err(|e| format!("malformed response: {e}"))?;
        if let Value::String(s) = &resp.data {
            if let Ok(inner) = serde_json::from_str::<Value>(s) {
                resp.data = inner;
            }
        }
        Ok(resp)
    }

    pub fn message(&self) -> &str {
        self.msg.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
struct EnergyData {
    cur: u32,
    #[serde(default)]
    total: Option<u32>,
}

/// What one HTTP exchange amounts to.
#[derive(Debug)]
pub enum Outcome {
    Snapshot(Snapshot),
    /// Definite failure, do not retry.
    Failed(FetchError),
    /// Transport or decoding trouble, worth another attempt.
    Retry(String),
}

/// Classify an HTTP status plus body.
pub fn classify(
    status: u16,
    body: &str,
    invalid_credential_codes: &[i64],
    now: DateTime<Utc>,
) -> Outcome {
    if status == 401 || status == 403 {
        return Outcome::Failed(FetchError::invalid_credential(format!("HTTP {status}")));
    }

    let resp = match KuroResponse::parse(body) {
        Ok(r) => r,
        Err(e) => return Outcome::Retry(format!("HTTP {status}: {e}")),
    };

    if invalid_credential_codes.contains(&resp.code) {
        return Outcome::Failed(FetchError::invalid_credential(format!(
            "code {}: {}",
            resp.code,
            resp.message()
        )));
    }
    if resp.code != CODE_OK {
        return Outcome::Failed(FetchError::transient(format!(
            "code {}: {}",
            resp.code,
            resp.message()
        )));
    }

    let energy = resp
        .data
        .get("energyData")
        .cloned()
        .and_then(|v| serde_json::from_value::<EnergyData>(v).ok());
    match energy {
        Some(energy) => Outcome::Snapshot(Snapshot {
            value: energy.cur,
            observed_at: now,
            capacity: energy.total,
            raw: Some(resp.data),
        }),
        None => Outcome::Failed(FetchError::transient("response has no energyData")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminder_core::types::FetchFailureKind;

    const INVALID: &[i64] = &[220];

    #[test]
    fn test_parse_plain_object_data() {
        let body = r#"{"code":200,"msg":"ok","data":{"energyData":{"cur":180,"total":240}}}"#;
        match classify(200, body, INVALID, Utc::now()) {
            Outcome::Snapshot(s) => {
                assert_eq!(s.value, 180);
                assert_eq!(s.capacity, Some(240));
                assert!(s.raw.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_string_encoded_data() {
        let body = r#"{"code":200,"msg":"ok","data":"{\"energyData\":{\"cur\":231,\"total\":240}}"}"#;
        match classify(200, body, INVALID, Utc::now()) {
            Outcome::Snapshot(s) => assert_eq!(s.value, 231),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_credential_code() {
        let body = r#"{"code":220,"msg":"登录已过期","data":null}"#;
        match classify(200, body, INVALID, Utc::now()) {
            Outcome::Failed(e) => assert_eq!(e.kind, FetchFailureKind::InvalidCredential),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_http_unauthorized_is_invalid_credential() {
        match classify(401, "", INVALID, Utc::now()) {
            Outcome::Failed(e) => assert_eq!(e.kind, FetchFailureKind::InvalidCredential),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_other_codes_are_transient() {
        let body = r#"{"code":10902,"msg":"busy"}"#;
        match classify(200, body, INVALID, Utc::now()) {
            Outcome::Failed(e) => {
                assert_eq!(e.kind, FetchFailureKind::Transient);
                assert!(e.detail.contains("busy"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_garbage_body_is_retried() {
        assert!(matches!(
            classify(502, "<html>bad gateway</html>", INVALID, Utc::now()),
            Outcome::Retry(_)
        ));
    }

    #[test]
    fn test_missing_energy_is_transient() {
        let body = r#"{"code":200,"data":{"roleName":"Rover"}}"#;
        match classify(200, body, INVALID, Utc::now()) {
            Outcome::Failed(e) => assert_eq!(e.kind, FetchFailureKind::Transient),
            other => panic!("unexpected {other:?}"),
        }
    }
}
