//! Post-apply probe of the delivery front. A bucket policy whose source
//! condition does not match the distribution still deploys cleanly; it only
//! shows up as a 403 once the site is requested.

use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::error::{Result, StackError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests `url` and returns the response status when it is a success.
#[instrument]
pub fn check_endpoint(url: &str, timeout: Duration) -> Result<u16> {
    match ureq::get(url).timeout(timeout).call() {
        Ok(resp) => {
            let status = resp.status();
            debug!(status, "endpoint responded");
            classify_status(url, status)?;
            info!(status, "endpoint reachable");
            Ok(status)
        }
        Err(ureq::Error::Status(status, _)) => {
            classify_status(url, status)?;
            // ureq only reports 4xx and 5xx as errors
            Err(StackError::Probe {
                url: url.to_string(),
                reason: format!("unexpected status {status}"),
            })
        }
        Err(ureq::Error::Transport(e)) => Err(StackError::Probe {
            url: url.to_string(),
            reason: e.to_string(),
        }),
    }
}

pub fn classify_status(url: &str, status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        403 => Err(StackError::AccessDenied { url: url.to_string() }),
        other => Err(StackError::Probe {
            url: url.to_string(),
            reason: format!("status {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        ok = { 200, "ok" },
        no_content = { 204, "ok" },
        forbidden = { 403, "denied" },
        not_found = { 404, "probe" },
        server_error = { 502, "probe" },
    )]
    fn statuses(status: u16, expected: &str) {
        let outcome = classify_status("https://d111111abcdef8.cloudfront.net", status);
        let kind = match outcome {
            Ok(()) => "ok",
            Err(StackError::AccessDenied { .. }) => "denied",
            Err(StackError::Probe { .. }) => "probe",
            Err(other) => panic!("unexpected error {other}"),
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn access_denied_names_the_condition() {
        let err = classify_status("https://d111111abcdef8.cloudfront.net", 403).unwrap_err();
        assert!(err.to_string().contains("bucket policy condition"), "{err}");
    }

    #[test]
    fn unreachable_host_is_a_probe_failure() {
        // port 9 on localhost refuses connections
        let err = check_endpoint("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap_err();
        assert!(matches!(err, StackError::Probe { .. }), "{err}");
    }
}
