//! Retrying HTTP client: bounded retries, exponential backoff, and
//! provider-specific status handling, composed explicitly instead of hidden
//! behind call-site wrappers.

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::FetchError;

/// Outcome of a single attempt, before the retry loop decides what to do.
enum AttemptError {
    /// Must not be retried (401, 404).
    Terminal(FetchError),
    /// Worth another attempt. `rate_limited` selects the fixed 429 cooldown
    /// instead of the exponential table.
    Retryable { detail: String, rate_limited: bool },
}

/// Provider-agnostic GET-and-decode with the pipeline's retry policy.
///
/// Callers supply the URL and query parameters; the decoded payload type
/// carries the per-endpoint wire shape.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    http: Client,
    max_retries: u32,
    retry_delays: Vec<Duration>,
    rate_limit_cooldown: Duration,
}

impl RetryingClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            max_retries: config.max_retries,
            retry_delays: config.retry_delays(),
            rate_limit_cooldown: config.rate_limit_cooldown(),
        })
    }

    /// Fetch `url` and decode the JSON body into `T`.
    ///
    /// Policy: up to `max_retries` attempts. 200 decodes and returns; 401 and
    /// 404 are terminal; 429 sleeps the fixed cooldown and retries; any other
    /// status, transport error, or undecodable body advances through the
    /// backoff table. Exhaustion yields `RateLimited` if the last attempt was
    /// a 429, otherwise `RequestFailed` with the last observed detail.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        let mut last_detail = String::from("no attempts were made");
        let mut last_was_rate_limit = false;

        for attempt in 0..self.max_retries {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            tracing::debug!(url, attempt = attempt + 1, "sending request");

            match self.try_once::<T>(url, query).await {
                Ok(payload) => return Ok(payload),
                Err(AttemptError::Terminal(err)) => return Err(err),
                Err(AttemptError::Retryable { detail, rate_limited }) => {
                    tracing::warn!(
                        url,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        detail,
                        "request attempt failed"
                    );
                    last_detail = detail;
                    last_was_rate_limit = rate_limited;

                    // No point sleeping after the final attempt.
                    if attempt + 1 < self.max_retries {
                        let delay = if rate_limited {
                            tracing::warn!(
                                cooldown = ?self.rate_limit_cooldown,
                                "provider rate limited, cooling down"
                            );
                            self.rate_limit_cooldown
                        } else {
                            self.backoff_delay(attempt)
                        };
                        self.sleep_or_cancel(delay, cancel).await?;
                    }
                }
            }
        }

        tracing::error!(url, attempts = self.max_retries, last_detail, "retries exhausted");

        if last_was_rate_limit {
            Err(FetchError::RateLimited { attempts: self.max_retries })
        } else {
            Err(FetchError::RequestFailed { attempts: self.max_retries, detail: last_detail })
        }
    }

    async fn try_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, AttemptError> {
        let response = self.http.get(url).query(query).send().await.map_err(|err| {
            let detail = if err.is_timeout() {
                format!("request timed out: {err}")
            } else if err.is_connect() {
                format!("connection error: {err}")
            } else {
                format!("transport error: {err}")
            };
            AttemptError::Retryable { detail, rate_limited: false }
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response.text().await.map_err(|err| AttemptError::Retryable {
                    detail: format!("failed to read response body: {err}"),
                    rate_limited: false,
                })?;

                serde_json::from_str::<T>(&body).map_err(|err| AttemptError::Retryable {
                    detail: format!("failed to decode body: {err}: {}", truncate_body(&body)),
                    rate_limited: false,
                })
            }
            StatusCode::UNAUTHORIZED => {
                tracing::error!("provider rejected API key");
                Err(AttemptError::Terminal(FetchError::Unauthorized))
            }
            StatusCode::NOT_FOUND => Err(AttemptError::Terminal(FetchError::NotFound)),
            StatusCode::TOO_MANY_REQUESTS => Err(AttemptError::Retryable {
                detail: "HTTP 429 Too Many Requests".to_string(),
                rate_limited: true,
            }),
            other => {
                let body = response.text().await.unwrap_or_default();
                Err(AttemptError::Retryable {
                    detail: format!("HTTP {other}: {}", truncate_body(&body)),
                    rate_limited: false,
                })
            }
        }
    }

    /// Delay for the given zero-based attempt, clamped to the table's last
    /// entry.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let index = (attempt as usize).min(self.retry_delays.len() - 1);
        self.retry_delays[index]
    }

    async fn sleep_or_cancel(
        &self,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        tokio::select! {
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Cap an error-detail body at roughly 200 bytes, backing up to a UTF-8
/// character boundary so multi-byte text never splits mid-character.
fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Payload {
        answer: i32,
    }

    fn test_client() -> RetryingClient {
        let cfg = Config {
            // Millisecond delays keep the timing tests fast while preserving
            // the 1:2 backoff shape.
            retry_delays_secs: vec![0.01, 0.02, 0.04],
            rate_limit_cooldown_secs: 0.05,
            ..Config::with_api_key("KEY")
        };
        RetryingClient::new(&cfg).expect("client should build")
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": 42
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let payload: Payload =
            client.get_json(&format!("{}/data", server.uri()), &[], &cancel).await.unwrap();

        assert_eq!(payload.answer, 42);
    }

    #[tokio::test]
    async fn retries_through_backoff_then_succeeds() {
        let server = MockServer::start().await;
        // Two failures, then success: the client must sleep twice and come
        // back for the third attempt.
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": 7
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let start = std::time::Instant::now();
        let payload: Payload =
            client.get_json(&format!("{}/data", server.uri()), &[], &cancel).await.unwrap();

        assert_eq!(payload.answer, 7);
        // Slept through delays[0] + delays[1] = 10ms + 20ms.
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn unauthorized_is_terminal_with_zero_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let err = client
            .get_json::<Payload>(&format!("{}/data", server.uri()), &[], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Unauthorized));
    }

    #[tokio::test]
    async fn not_found_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let err = client
            .get_json::<Payload>(&format!("{}/data", server.uri()), &[], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NotFound));
    }

    #[tokio::test]
    async fn rate_limit_cooldown_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let start = std::time::Instant::now();
        let payload: Payload =
            client.get_json(&format!("{}/data", server.uri()), &[], &cancel).await.unwrap();

        assert_eq!(payload.answer, 1);
        // The fixed cooldown (50ms here) applies instead of the backoff table.
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn exhausted_429s_surface_as_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let err = client
            .get_json::<Payload>(&format!("{}/data", server.uri()), &[], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::RateLimited { attempts: 3 }));
    }

    #[tokio::test]
    async fn exhausted_server_errors_surface_as_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let err = client
            .get_json::<Payload>(&format!("{}/data", server.uri()), &[], &cancel)
            .await
            .unwrap_err();

        match err {
            FetchError::RequestFailed { attempts, detail } => {
                assert_eq!(attempts, 3);
                assert!(detail.contains("503"), "detail should carry the last status: {detail}");
            }
            other => panic!("expected RequestFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": 9
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let payload: Payload =
            client.get_json(&format!("{}/data", server.uri()), &[], &cancel).await.unwrap();

        assert_eq!(payload.answer, 9);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        assert_eq!(truncate_body("short"), "short");

        // 67 three-byte characters = 201 bytes; byte 200 falls inside the
        // last character and must not be sliced through.
        let multibyte = "日".repeat(67);
        let truncated = truncate_body(&multibyte);
        assert!(truncated.ends_with("..."));
        assert!(multibyte.starts_with(truncated.trim_end_matches("...")));

        let ascii = "x".repeat(500);
        assert_eq!(truncate_body(&ascii).len(), 203);
    }

    #[tokio::test]
    async fn non_ascii_error_body_degrades_to_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(503).set_body_string("錯誤".repeat(40)))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client();
        let cancel = CancellationToken::new();
        let err = client
            .get_json::<Payload>(&format!("{}/data", server.uri()), &[], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::RequestFailed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_mid_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cfg = Config {
            // Long enough that the test would time out if cancellation did
            // not cut the backoff short.
            retry_delays_secs: vec![30.0],
            ..Config::with_api_key("KEY")
        };
        let client = RetryingClient::new(&cfg).unwrap();
        let cancel = CancellationToken::new();

        let url = format!("{}/data", server.uri());
        let task = {
            let cancel = cancel.clone();
            let client = client.clone();
            tokio::spawn(async move { client.get_json::<Payload>(&url, &[], &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }

    #[tokio::test]
    async fn pre_cancelled_token_returns_immediately() {
        let client = test_client();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .get_json::<Payload>("http://127.0.0.1:1/data", &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
