use std::time::Duration;

use hyper::client::HttpConnector;
use hyper::http::uri::{Parts, PathAndQuery};
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use rand::Rng;

use gateway_utils::cancellation_token::CancellationToken;

use crate::error::{is_network_retryable, GatewayError, VenueError};
use crate::rate_limiter::RateLimiter;
use crate::signer::Signer;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// `delay = min(base * 2^attempt, max)` with +/- 20% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(32));
        let capped = exp.min(self.max_delay.as_millis());

        let jitter_fraction = rand::thread_rng().gen_range(-0.2..=0.2);
        let jittered = (capped as f64) * (1.0 + jitter_fraction);
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl RequestMethod {
    fn to_hyper(self) -> Method {
        match self {
            RequestMethod::Get => Method::GET,
            RequestMethod::Post => Method::POST,
            RequestMethod::Put => Method::PUT,
            RequestMethod::Delete => Method::DELETE,
        }
    }
}

/// Signed REST transport (C3): builds, signs, sends, retries, and parses
/// venue responses. All parameters (including POST/DELETE) go in the query
/// string per venue convention; the body is always empty.
pub struct RestTransport {
    client: Client<HttpsConnector<HttpConnector>>,
    host: String,
    api_key: Option<String>,
    signer: Signer,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl RestTransport {
    pub fn new(
        host: impl Into<String>,
        api_key: Option<String>,
        signer: Signer,
        rate_limiter: RateLimiter,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_only()
            .enable_http1()
            .enable_http2()
            .build();

        Self {
            client: Client::builder().build(https),
            host: host.into(),
            api_key,
            signer,
            rate_limiter,
            retry,
            request_timeout,
        }
    }

    /// Algorithm per the REST transport spec: rate-limit wait, optional
    /// signing, build and send with a per-request deadline, classify the
    /// response, retry on retryable outcomes until attempts are exhausted.
    pub async fn do_request(
        &self,
        method: RequestMethod,
        path: &str,
        params: Vec<(String, String)>,
        signed: bool,
        cancellation_token: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let mut attempt = 0u32;
        loop {
            self.rate_limiter.wait(cancellation_token).await?;
            cancellation_token.error_if_cancellation_requested().map_err(|_| GatewayError::Cancelled)?;

            let params = if signed {
                self.signer.sign(params.clone())
            } else {
                params.clone()
            };

            let uri = self.build_uri(path, &params);
            let request = self.build_request(method, uri);

            let deadline = self.request_timeout;
            let outcome = tokio::select! {
                res = self.send(request) => res,
                _ = tokio::time::sleep(deadline) => Err(GatewayError::Venue(VenueError::new(598, "request deadline exceeded", 598))),
                _ = cancellation_token.when_cancelled() => Err(GatewayError::Cancelled),
            };

            match outcome {
                Ok(body) => return Ok(body),
                Err(err) => {
                    let retryable = matches!(&err, GatewayError::Venue(v) if v.is_retryable());
                    if !retryable || attempt >= self.retry.max_retries {
                        return Err(err);
                    }

                    let delay = self.retry.backoff_delay(attempt);
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancellation_token.when_cancelled() => return Err(GatewayError::Cancelled),
                    }
                }
            }
        }
    }

    fn build_uri(&self, path: &str, params: &[(String, String)]) -> Uri {
        let query = crate::signer::encode_params(params);
        let path_and_query = if query.is_empty() {
            path.to_owned()
        } else {
            format!("{path}?{query}")
        };

        let mut parts = Parts::default();
        parts.scheme = Some("https".try_into().expect("static scheme"));
        parts.authority = Some(self.host.as_str().try_into().expect("valid host"));
        parts.path_and_query =
            Some(PathAndQuery::try_from(path_and_query).expect("valid path and query"));

        Uri::from_parts(parts).expect("uri built from valid parts")
    }

    fn build_request(&self, method: RequestMethod, uri: Uri) -> Request<Body> {
        let mut builder = Request::builder().method(method.to_hyper()).uri(uri);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("X-MBX-APIKEY", api_key);
        }
        builder
            .body(Body::empty())
            .expect("request built from valid parts")
    }

    async fn send(&self, request: Request<Body>) -> Result<String, GatewayError> {
        let response = self.client.request(request).await.map_err(|err| {
            if is_network_retryable(&err) {
                GatewayError::Venue(VenueError::new(599, err.to_string(), 503))
            } else {
                GatewayError::Venue(VenueError::new(598, err.to_string(), 500))
            }
        })?;

        let status = response.status();
        let body_bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|err| GatewayError::Venue(VenueError::new(598, err.to_string(), 500)))?;
        let body = String::from_utf8_lossy(&body_bytes).into_owned();

        if status.is_success() {
            return Ok(body);
        }

        Err(GatewayError::Venue(classify_status(status, &body)))
    }
}

fn classify_status(status: StatusCode, body: &str) -> VenueError {
    VenueError::parse(body, status)
}
