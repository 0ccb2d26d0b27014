use hyper::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// The four kinds of failure the gateway distinguishes (see error handling
/// design): validation is rejected before any network call and never
/// retried; transport-retryable is handled entirely inside the REST
/// transport; venue-terminal surfaces a classified business error; cancellation
/// propagates a typed cancellation error. Bracket orchestration never retries
/// a leg itself -- partial-failure reporting is preferred to blind retry,
/// which could double-place an order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Venue(#[from] VenueError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("rate limiter deadline exceeded")]
    DeadlineExceeded,
}

impl GatewayError {
    pub fn message(&self) -> String {
        match self {
            GatewayError::Validation(msg) => msg.clone(),
            GatewayError::Venue(err) => err.message.clone(),
            GatewayError::Cancelled => "operation cancelled".to_owned(),
            GatewayError::DeadlineExceeded => "rate limiter deadline exceeded".to_owned(),
        }
    }
}

/// A venue error as returned over REST: a numeric `code`, a human `message`,
/// and the HTTP status the response carried. Retryability and business
/// classification are derived from `code`/`http_status` by [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueError {
    pub code: i64,
    pub message: String,
    pub http_status: u16,
}

impl std::fmt::Display for VenueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "venue error {} (http {}): {}",
            self.code, self.http_status, self.message
        )
    }
}

#[derive(Debug, Deserialize)]
struct VenueErrorBody {
    code: i64,
    msg: String,
}

impl VenueError {
    pub fn new(code: i64, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            http_status,
        }
    }

    /// Parse a REST error body. Accepts an empty body (synthesized from the
    /// HTTP status), a JSON `{code, msg}` object, or a non-JSON body (wrapped
    /// with the HTTP status alone).
    pub fn parse(body: &str, status: StatusCode) -> Self {
        if body.is_empty() {
            return VenueError::new(
                status.as_u16() as i64,
                format!("empty body, http status {status}"),
                status.as_u16(),
            );
        }

        match serde_json::from_str::<VenueErrorBody>(body) {
            Ok(parsed) => VenueError::new(parsed.code, parsed.msg, status.as_u16()),
            Err(_) => VenueError::new(status.as_u16() as i64, body.to_owned(), status.as_u16()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.http_status, 429 | 500 | 502 | 503 | 504)
            || matches!(self.code, -1003 | -1021)
            // synthetic code used by the REST transport for network-level
            // failures (connection reset/refused, DNS, timeout)
            || self.code == 599
    }

    pub fn is_rate_limit(&self) -> bool {
        self.code == -1003 || self.http_status == 429
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self.code, -1022 | -2014 | -2015) || self.http_status == 401
    }

    pub fn is_order_error(&self) -> bool {
        matches!(self.code, -2010 | -2011 | -2013)
    }

    pub fn is_timestamp_skew(&self) -> bool {
        self.code == -1021
    }
}

/// Whether a lower-level transport failure (connection reset/refused, DNS
/// failure, I/O timeout) should be retried by the REST transport.
pub fn is_network_retryable(err: &hyper::Error) -> bool {
    err.is_connect() || err.is_closed() || err.is_incomplete_message() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_body_from_status() {
        let err = VenueError::parse("", StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.http_status, 503);
        assert!(err.is_retryable());
    }

    #[test]
    fn parses_json_error_object() {
        let err = VenueError::parse(
            r#"{"code":-2010,"msg":"insufficient balance"}"#,
            StatusCode::BAD_REQUEST,
        );
        assert_eq!(err.code, -2010);
        assert_eq!(err.message, "insufficient balance");
        assert!(err.is_order_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn wraps_non_json_body_with_status() {
        let err = VenueError::parse("upstream bad gateway", StatusCode::BAD_GATEWAY);
        assert_eq!(err.http_status, 502);
        assert!(err.is_retryable());
    }

    #[test]
    fn rate_limit_and_timestamp_skew_are_retryable() {
        let rate_limited = VenueError::new(-1003, "too many requests", 418);
        assert!(rate_limited.is_retryable());
        assert!(rate_limited.is_rate_limit());

        let skewed = VenueError::new(-1021, "timestamp outside recvWindow", 400);
        assert!(skewed.is_retryable());
        assert!(skewed.is_timestamp_skew());
    }

    #[test]
    fn auth_errors_are_not_retryable() {
        let err = VenueError::new(-2015, "invalid api key", 401);
        assert!(err.is_auth_error());
        assert!(!err.is_retryable());
    }
}
