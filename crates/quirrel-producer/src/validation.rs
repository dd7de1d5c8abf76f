//! Synchronous input validation.
//!
//! Everything here is rejected before any write: bad input is never
//! stored. Negative delays cannot be expressed at all — the wire layer
//! deserializes `delay` into an unsigned integer.

use url::Url;

use quirrel_core::error::AppError;
use quirrel_core::result::AppResult;
use quirrel_entity::{EnqueueRequest, Schedule};
use quirrel_scheduler::validate_repeat;

/// Require an absolute http(s) endpoint URL.
pub fn validate_endpoint(endpoint: &str) -> AppResult<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| AppError::validation(format!("Endpoint must be an absolute URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::validation(format!(
            "Endpoint must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(AppError::validation("Endpoint URL has no host"));
    }
    Ok(())
}

/// Validate an enqueue request and build the stored schedule, if any.
pub fn validate_request(request: &EnqueueRequest) -> AppResult<Option<Schedule>> {
    request
        .repeat
        .as_ref()
        .map(validate_repeat)
        .transpose()
        .map_err(|e| AppError::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quirrel_entity::RepeatRequest;

    #[test]
    fn test_relative_endpoint_rejected() {
        assert!(validate_endpoint("/hooks/a").is_err());
        assert!(validate_endpoint("example.com/hooks").is_err());
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        assert!(validate_endpoint("ftp://example.com/hooks").is_err());
    }

    #[test]
    fn test_absolute_http_endpoint_accepted() {
        assert!(validate_endpoint("https://example.com/hooks/a").is_ok());
        assert!(validate_endpoint("http://localhost:3000/api").is_ok());
    }

    #[test]
    fn test_zero_times_rejected() {
        let request = EnqueueRequest {
            repeat: Some(RepeatRequest {
                every: Some(1_000),
                times: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.kind, quirrel_core::error::ErrorKind::Validation);
    }
}
