//! Credential diagnosis from a completed probe run.

use serde::Serialize;

use crate::probe::ModelProbeResult;

/// Substrings that mark an upstream failure as an authentication rejection.
/// Matched case-sensitively. These follow OpenAI's error phrasing; another
/// upstream needs its own list.
pub const AUTH_ERROR_MARKERS: [&str; 3] = ["authentication", "API key", "401"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub total: usize,
    #[serde(rename = "working")]
    pub working_count: usize,
    #[serde(rename = "failed")]
    pub failed_count: usize,
    #[serde(rename = "apiKeyValid")]
    pub credential_valid: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyVerdict {
    /// Every model rejected the credential.
    Invalid,
    /// Credential accepted but no model answered, e.g. tier or quota limits.
    Restricted,
    Working,
}

impl AggregateSummary {
    pub fn verdict(&self) -> KeyVerdict {
        if !self.credential_valid {
            KeyVerdict::Invalid
        } else if self.working_count == 0 {
            KeyVerdict::Restricted
        } else {
            KeyVerdict::Working
        }
    }
}

pub fn is_auth_failure(error: &str) -> bool {
    AUTH_ERROR_MARKERS.iter().any(|m| error.contains(m))
}

/// Splits results into (working, failed), preserving order.
pub fn partition(results: &[ModelProbeResult]) -> (Vec<&ModelProbeResult>, Vec<&ModelProbeResult>) {
    results.iter().partition(|r| r.success())
}

/// The credential is judged invalid only when every probe failed and every
/// failure reads as an auth rejection. Anything else, including no results,
/// counts as valid.
pub fn analyze(results: &[ModelProbeResult]) -> AggregateSummary {
    let (working, failed) = partition(results);
    let unanimous_auth_failure = !results.is_empty()
        && failed.len() == results.len()
        && failed
            .iter()
            .all(|r| r.error().map(is_auth_failure).unwrap_or(false));
    AggregateSummary {
        total: results.len(),
        working_count: working.len(),
        failed_count: failed.len(),
        credential_valid: !unanimous_auth_failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(model: &str) -> ModelProbeResult {
        ModelProbeResult::succeeded(model, "hello", 10)
    }

    fn fail(model: &str, err: &str) -> ModelProbeResult {
        ModelProbeResult::failed(model, err)
    }

    #[test]
    fn unanimous_auth_failure_is_invalid() {
        let s = analyze(&[
            fail("a", "401 invalid API key"),
            fail("b", "authentication failed"),
        ]);
        assert!(!s.credential_valid);
        assert_eq!(s.verdict(), KeyVerdict::Invalid);
    }

    #[test]
    fn any_success_is_valid() {
        let s = analyze(&[ok("a"), fail("b", "401")]);
        assert!(s.credential_valid);
        assert_eq!((s.working_count, s.failed_count), (1, 1));
        assert_eq!(s.verdict(), KeyVerdict::Working);
    }

    #[test]
    fn unrelated_failures_are_valid() {
        let s = analyze(&[fail("a", "timeout"), fail("b", "model not found")]);
        assert!(s.credential_valid);
        assert_eq!(s.verdict(), KeyVerdict::Restricted);
    }

    #[test]
    fn one_non_auth_failure_keeps_key_valid() {
        let s = analyze(&[fail("a", "401 Unauthorized"), fail("b", "429 Rate limit reached")]);
        assert!(s.credential_valid);
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert!(!is_auth_failure("Authentication required"));
        assert!(!is_auth_failure("api key missing"));
        assert!(is_auth_failure("Incorrect API key provided"));
    }

    #[test]
    fn empty_run_is_vacuously_valid() {
        let s = analyze(&[]);
        assert_eq!(
            s,
            AggregateSummary {
                total: 0,
                working_count: 0,
                failed_count: 0,
                credential_valid: true,
            }
        );
    }

    #[test]
    fn counts_add_up() {
        let results = vec![ok("a"), fail("b", "x"), ok("c"), fail("d", "y"), fail("e", "z")];
        let s = analyze(&results);
        assert_eq!(s.working_count + s.failed_count, s.total);
        assert_eq!(s.total, results.len());
    }

    #[test]
    fn partition_keeps_order() {
        let results = vec![ok("a"), fail("b", "x"), ok("c")];
        let (working, failed) = partition(&results);
        let names: Vec<&str> = working.iter().map(|r| r.model()).collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(failed[0].model(), "b");
    }

    #[test]
    fn summary_wire_shape() {
        let v = serde_json::to_value(analyze(&[ok("a")])).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"total": 1, "working": 1, "failed": 0, "apiKeyValid": true})
        );
    }
}
