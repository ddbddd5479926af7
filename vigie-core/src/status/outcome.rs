//! Classification of probe outcomes into canonical status strings.
//!
//! The rendered string is persisted and compared across runs, so `classify`
//! is total and depends on nothing but its input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rendered in place of the destination of a redirect lacking `Location`.
pub const MISSING_LOCATION: &str = "(but no Location in headers)";

static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("Invalid parenthesized detail regex"));

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("Invalid bracketed detail regex"));

/// What ended a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// `200` response
    Success { reason: Vec<u8> },
    /// Redirect response that was not followed
    Redirect {
        code: u16,
        reason: Vec<u8>,
        location: Option<String>,
    },
    /// Any other HTTP response
    Response { code: u16, reason: Vec<u8> },
    /// Peer closed the connection before answering
    Disconnected,
    /// Connection, TLS or protocol failure
    ConnectFailure {
        message: String,
        /// Innermost cause, preferred over `message` when present
        detail: Option<String>,
    },
    Timeout,
    /// Anything else, rendered as `"<kind>: <message>"`
    Other { kind: String, message: String },
}

impl Outcome {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Redirect { .. } => "redirect",
            Outcome::Response { .. } => "response",
            Outcome::Disconnected => "disconnected",
            Outcome::ConnectFailure { .. } => "connect_failure",
            Outcome::Timeout => "timeout",
            Outcome::Other { .. } => "other",
        }
    }
}

/// Renders the canonical status string of an outcome.
pub fn classify(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Success { reason } => format!("200 {}", sanitize_reason(reason))
            .trim_end()
            .to_string(),
        Outcome::Redirect {
            code,
            reason,
            location,
        } => format!(
            "{} {} {}",
            code,
            sanitize_reason(reason),
            location.as_deref().unwrap_or(MISSING_LOCATION)
        ),
        Outcome::Response { code, reason } => format!("{} {}", code, sanitize_reason(reason))
            .trim_end()
            .to_string(),
        Outcome::Disconnected => "Server disconnected".to_string(),
        Outcome::ConnectFailure { message, detail } => {
            clean_client_error(detail.as_deref().unwrap_or(message))
        }
        Outcome::Timeout => "Timeout".to_string(),
        Outcome::Other { kind, message } => format!("{}: {}", kind, message),
    }
}

/// Decodes a reason phrase, escaping invalid bytes as `\xNN`.
pub fn sanitize_reason(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        out.push_str(chunk.valid());
        for byte in chunk.invalid() {
            out.push_str(&format!("\\x{:02x}", byte));
        }
    }
    out
}

/// Shortens a client error message to its leading phrase.
fn clean_client_error(message: &str) -> String {
    let cleaned = PARENTHESIZED.replace_all(message, "");
    let cleaned = BRACKETED.replace_all(&cleaned, "");
    let head = cleaned.split(':').next().unwrap_or("").trim();

    if head.contains("Cannot connect to host") {
        "Cannot connect".to_string()
    } else if head.contains("Connect call failed") {
        "Connection failed".to_string()
    } else if head.is_empty() {
        // An empty status would read back as "never checked"
        "Connection error".to_string()
    } else {
        head.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_failure(message: &str, detail: Option<&str>) -> Outcome {
        Outcome::ConnectFailure {
            message: message.to_string(),
            detail: detail.map(String::from),
        }
    }

    #[test]
    fn test_success() {
        let outcome = Outcome::Success {
            reason: b"OK".to_vec(),
        };
        assert_eq!(classify(&outcome), "200 OK");
        // Same input, same string
        assert_eq!(classify(&outcome.clone()), classify(&outcome));

        let empty = Outcome::Success { reason: Vec::new() };
        assert_eq!(classify(&empty), "200");
    }

    #[test]
    fn test_success_with_invalid_reason_bytes() {
        let outcome = Outcome::Success {
            reason: b"OK \xe9t\xff".to_vec(),
        };
        assert_eq!(classify(&outcome), "200 OK \\xe9t\\xff");
        assert_eq!(sanitize_reason("Créé".as_bytes()), "Créé");
    }

    #[test]
    fn test_redirect_with_and_without_location() {
        let with = Outcome::Redirect {
            code: 302,
            reason: b"Found".to_vec(),
            location: Some("https://ailleurs.example/".to_string()),
        };
        assert_eq!(classify(&with), "302 Found https://ailleurs.example/");

        let without = Outcome::Redirect {
            code: 301,
            reason: b"Moved Permanently".to_vec(),
            location: None,
        };
        assert_eq!(
            classify(&without),
            "301 Moved Permanently (but no Location in headers)"
        );
    }

    #[test]
    fn test_other_response() {
        let outcome = Outcome::Response {
            code: 404,
            reason: b"Not Found".to_vec(),
        };
        assert_eq!(classify(&outcome), "404 Not Found");
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(classify(&Outcome::Disconnected), "Server disconnected");
        assert_eq!(classify(&Outcome::Timeout), "Timeout");
    }

    #[test]
    fn test_client_error_canonical_phrases() {
        let outcome = connect_failure(
            "Cannot connect to host example.fr:443 ssl:default [Name or service not known]",
            None,
        );
        assert_eq!(classify(&outcome), "Cannot connect");

        let outcome = connect_failure(
            "Cannot connect to host example.fr:443",
            Some("Connect call failed ('192.0.2.1', 443)"),
        );
        assert_eq!(classify(&outcome), "Connection failed");
    }

    #[test]
    fn test_client_error_strips_annotations() {
        let outcome = connect_failure(
            "tls handshake",
            Some("[SSL: CERTIFICATE_VERIFY_FAILED] certificate verify failed: unable to get local issuer certificate (_ssl.c:1006)"),
        );
        assert_eq!(classify(&outcome), "certificate verify failed");

        let outcome = connect_failure("Connection refused (os error 111)", None);
        assert_eq!(classify(&outcome), "Connection refused");

        let outcome = connect_failure("(nothing) [at all]", None);
        assert_eq!(classify(&outcome), "Connection error");
    }

    #[test]
    fn test_fallback() {
        let outcome = Outcome::Other {
            kind: "InvalidUrl".to_string(),
            message: "invalid international domain name".to_string(),
        };
        assert_eq!(
            classify(&outcome),
            "InvalidUrl: invalid international domain name"
        );
        assert_eq!(outcome.kind_name(), "other");
    }

    #[test]
    fn test_serde_keeps_error_kind_field() {
        let outcome = Outcome::Other {
            kind: "InvalidUrl".to_string(),
            message: "bad host".to_string(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "other");
        assert_eq!(value["kind"], "InvalidUrl");

        let back: Outcome = serde_json::from_value(value).unwrap();
        assert_eq!(back, outcome);

        let value = serde_json::to_value(Outcome::Timeout).unwrap();
        assert_eq!(value, serde_json::json!({ "outcome": "timeout" }));
    }
}
