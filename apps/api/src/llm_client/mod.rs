/// LLM Client: the single point of entry for all chat-completion calls in the screener.
///
/// ARCHITECTURAL RULE: No other module may call the model provider directly.
/// Engines receive an `LlmClient` by injection; there is no process-wide client.
///
/// Every call asks for structured output (`StructuredOutput`), is bounded by a
/// per-call timeout, and is retried a fixed number of times on transient failures
/// and on schema-invalid output.
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub mod prompts;
pub mod structured;
pub mod transport;

pub use structured::StructuredOutput;
pub use transport::{ChatRequest, ChatTransport, HttpChatTransport, TransportError};

use structured::parse_structured;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Retries after the first attempt. A call is attempted at most `MAX_RETRIES + 1` times.
pub const MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a model call ultimately failed. Carried into failed records for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientFailure,
    SchemaValidation,
    Rejected,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model unreachable after {attempts} attempts: {reason}")]
    TransientFailure { attempts: u32, reason: String },

    #[error("model output did not match `{schema}` after {attempts} attempts: {reason}")]
    SchemaValidation {
        schema: &'static str,
        attempts: u32,
        reason: String,
        /// Last raw model text, kept for diagnostics.
        raw: String,
    },

    #[error("API rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LlmError::TransientFailure { .. } => FailureKind::TransientFailure,
            LlmError::SchemaValidation { .. } => FailureKind::SchemaValidation,
            LlmError::Rejected { .. } => FailureKind::Rejected,
        }
    }
}

/// Injected model configuration.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_retries: MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

enum AttemptFailure {
    Transient(String),
    Schema { reason: String, raw: String },
}

impl AttemptFailure {
    fn label(&self) -> &'static str {
        match self {
            AttemptFailure::Transient(_) => "transient",
            AttemptFailure::Schema { .. } => "schema_invalid",
        }
    }

    fn reason(&self) -> &str {
        match self {
            AttemptFailure::Transient(reason) => reason,
            AttemptFailure::Schema { reason, .. } => reason,
        }
    }
}

/// The single LLM client used by all screening engines.
/// Cheap to clone; the transport is shared read-only across tasks.
#[derive(Clone)]
pub struct LlmClient {
    transport: Arc<dyn ChatTransport>,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn ChatTransport>, settings: LlmSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Requests a `T` from the model and returns it only once it parses and validates.
    ///
    /// Retries up to `max_retries` times with a fixed delay. After the last attempt
    /// the kind of the last failure decides the error: schema problems become
    /// `SchemaValidation` (with the raw text), everything else `TransientFailure`.
    /// Non-retryable API errors return `Rejected` immediately.
    pub async fn complete<T: StructuredOutput>(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<T, LlmError> {
        let request = ChatRequest::structured::<T>(&self.settings.model, system, prompt);
        let max_attempts = self.settings.max_retries + 1;
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.settings.retry_delay).await;
            }

            let started = Instant::now();
            let sent =
                tokio::time::timeout(self.settings.call_timeout, self.transport.send(&request))
                    .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let failure = match sent {
                Err(_) => AttemptFailure::Transient(
                    TransportError::Timeout(self.settings.call_timeout).to_string(),
                ),
                Ok(Err(TransportError::Api { status, message }))
                    if !transport::is_retryable_status(status) =>
                {
                    warn!(
                        schema = T::SCHEMA_NAME,
                        attempt,
                        elapsed_ms,
                        outcome = "rejected",
                        status,
                        "LLM call attempt"
                    );
                    return Err(LlmError::Rejected { status, message });
                }
                Ok(Err(err)) => AttemptFailure::Transient(err.to_string()),
                Ok(Ok(raw)) => match parse_structured::<T>(&raw) {
                    Ok(value) => {
                        info!(
                            schema = T::SCHEMA_NAME,
                            attempt,
                            elapsed_ms,
                            outcome = "ok",
                            "LLM call attempt"
                        );
                        return Ok(value);
                    }
                    Err(reason) => AttemptFailure::Schema { reason, raw },
                },
            };

            warn!(
                schema = T::SCHEMA_NAME,
                attempt,
                elapsed_ms,
                outcome = failure.label(),
                reason = failure.reason(),
                "LLM call attempt"
            );
            last_failure = Some(failure);
        }

        Err(match last_failure {
            Some(AttemptFailure::Schema { reason, raw }) => LlmError::SchemaValidation {
                schema: T::SCHEMA_NAME,
                attempts: max_attempts,
                reason,
                raw,
            },
            Some(AttemptFailure::Transient(reason)) => LlmError::TransientFailure {
                attempts: max_attempts,
                reason,
            },
            None => LlmError::TransientFailure {
                attempts: 0,
                reason: "no attempt was made".to_string(),
            },
        })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::structured::{object_schema, StructuredOutput};
    use super::testing::{client_with, fast_settings, SequenceTransport, StubTransport};
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Echo {
        value: u32,
    }

    impl StructuredOutput for Echo {
        const SCHEMA_NAME: &'static str = "echo";

        fn json_schema() -> Value {
            object_schema(json!({ "value": { "type": "integer" } }))
        }
    }

    #[tokio::test]
    async fn test_first_valid_response_is_returned() {
        let transport = Arc::new(StubTransport::new(|_| Ok(r#"{"value": 7}"#.to_string())));
        let client = client_with(transport.clone());

        let echo: Echo = client.complete("system", "prompt").await.unwrap();
        assert_eq!(echo, Echo { value: 7 });
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_json_is_retried_exactly_max_retries_plus_one() {
        let transport = Arc::new(StubTransport::new(|_| Ok("not json at all".to_string())));
        let client = client_with(transport.clone());

        let err = client.complete::<Echo>("system", "prompt").await.unwrap_err();
        assert_eq!(transport.calls(), (MAX_RETRIES + 1) as usize);
        match err {
            LlmError::SchemaValidation { raw, attempts, schema, .. } => {
                assert_eq!(raw, "not json at all");
                assert_eq!(attempts, MAX_RETRIES + 1);
                assert_eq!(schema, "echo");
            }
            other => panic!("expected schema validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failures_exhaust_into_transient_failure() {
        let transport = Arc::new(StubTransport::new(|_| {
            Err(TransportError::Api {
                status: 503,
                message: "overloaded".to_string(),
            })
        }));
        let client = client_with(transport.clone());

        let err = client.complete::<Echo>("system", "prompt").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TransientFailure);
        assert_eq!(transport.calls(), 3);
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let transport = Arc::new(SequenceTransport::new(vec![
            Err(TransportError::Api {
                status: 429,
                message: "slow down".to_string(),
            }),
            Ok(r#"{"value": 1}"#.to_string()),
        ]));
        let client = client_with(transport.clone());

        let echo: Echo = client.complete("system", "prompt").await.unwrap();
        assert_eq!(echo.value, 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_last_failure_kind_decides_error() {
        let transport = Arc::new(SequenceTransport::new(vec![
            Ok("{broken".to_string()),
            Ok("{broken".to_string()),
            Err(TransportError::EmptyContent),
        ]));
        let client = client_with(transport);

        let err = client.complete::<Echo>("system", "prompt").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TransientFailure);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = Arc::new(StubTransport::new(|_| {
            Err(TransportError::Api {
                status: 401,
                message: "bad key".to_string(),
            })
        }));
        let client = client_with(transport.clone());

        let err = client.complete::<Echo>("system", "prompt").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Rejected);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_extra_fields_count_as_schema_violation() {
        let transport = Arc::new(StubTransport::new(|_| {
            Ok(r#"{"value": 2, "confidence": 0.9}"#.to_string())
        }));
        let client = client_with(transport);

        let err = client.complete::<Echo>("system", "prompt").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::SchemaValidation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_as_transient() {
        let transport = Arc::new(
            StubTransport::new(|_| Ok(r#"{"value": 3}"#.to_string()))
                .with_latency(Duration::from_secs(30)),
        );
        let settings = LlmSettings {
            call_timeout: Duration::from_secs(1),
            ..fast_settings()
        };
        let client = LlmClient::new(transport.clone(), settings);

        let err = client.complete::<Echo>("system", "prompt").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TransientFailure);
        assert!(err.to_string().contains("timed out"));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_request_carries_schema_and_model() {
        let transport = Arc::new(StubTransport::new(|_| Ok(r#"{"value": 0}"#.to_string())));
        let client = client_with(transport.clone());

        let _: Echo = client.complete("be precise", "the prompt").await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "stub-model");
        assert_eq!(requests[0].schema_name(), "echo");
        assert_eq!(requests[0].user_prompt(), "the prompt");
        assert_eq!(requests[0].messages[0].content, "be precise");
    }
}
