//! Call executor: the single choke point for provider calls
//!
//! Every remote call made by routing, sequences and workflows goes through
//! [`CallExecutor::invoke`], which:
//! - serves fresh results from the [`ResultCache`] with zero execution time
//! - resolves the provider's endpoint target in the registry
//! - races the invoker against the call deadline and cancellation token
//! - caches successful data
//! - tries a rule's fallback exactly once when the primary call fails
//!
//! Failures never escape as `Err`; they become `CallResult { success: false }`.

use crate::cache::{CacheKey, ResultCache};
use crate::capability::CapabilityRegistry;
use crate::context::CallResult;
use crate::invoker::{InvokeError, Invoker};
use crate::payload::{into_object, merge_shallow};
use crate::routing::FallbackCall;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-request execution context (passed through executor and engine)
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Id correlating every log line of one request
    pub correlation_id: String,

    /// Deadline for each provider call, overriding the executor default
    pub timeout: Option<Duration>,

    /// Cancellation token
    pub cancellation: Option<CancellationToken>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

impl CallContext {
    /// Create a context with a correlation id
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            timeout: None,
            cancellation: None,
        }
    }

    /// Set per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}

/// Why a single channel call did not produce data
#[derive(Debug, Error)]
enum CallFailure {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// Executes provider calls with caching, fallback and deadlines
pub struct CallExecutor {
    registry: Arc<CapabilityRegistry>,
    invoker: Arc<dyn Invoker>,
    cache: Arc<ResultCache>,
    default_timeout: Option<Duration>,
    concurrency: Option<Semaphore>,
}

impl std::fmt::Debug for CallExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallExecutor")
            .field("providers", &self.registry.len())
            .field("cache_enabled", &self.cache.is_enabled())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl CallExecutor {
    /// Create an executor with no default timeout and unbounded concurrency
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        invoker: Arc<dyn Invoker>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            registry,
            invoker,
            cache,
            default_timeout: None,
            concurrency: None,
        }
    }

    /// Deadline applied to calls whose context sets none
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Cap the number of in-flight channel calls across all requests
    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.concurrency = (max > 0).then(|| Semaphore::new(max));
        self
    }

    /// The shared result cache
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// The provider registry
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Perform one call, trying `fallback` once if the primary call fails.
    ///
    /// The fallback's params are shallow-merged over the original payload and
    /// the fallback itself has no further fallback. Cancellation skips it.
    pub async fn invoke(
        &self,
        provider: &str,
        tool: &str,
        payload: Value,
        ctx: &CallContext,
        fallback: Option<&FallbackCall>,
    ) -> CallResult {
        let Some(fallback) = fallback else {
            return self.invoke_once(provider, tool, payload, ctx).await;
        };

        let primary = self.invoke_once(provider, tool, payload.clone(), ctx).await;
        if primary.success || ctx.is_cancelled() {
            return primary;
        }

        tracing::warn!(
            correlation_id = %ctx.correlation_id,
            provider = %provider,
            tool = %tool,
            fallback_provider = %fallback.provider,
            fallback_tool = %fallback.tool,
            error = primary.error.as_deref().unwrap_or_default(),
            "primary call failed, trying fallback"
        );

        let mut request = into_object(payload);
        merge_shallow(&mut request, &fallback.params);
        self.invoke_once(&fallback.provider, &fallback.tool, Value::Object(request), ctx)
            .await
            .via_fallback()
    }

    async fn invoke_once(
        &self,
        provider: &str,
        tool: &str,
        payload: Value,
        ctx: &CallContext,
    ) -> CallResult {
        let key = CacheKey::new(provider, tool, &payload);
        if let Some(data) = self.cache.get(&key).await {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                provider = %provider,
                tool = %tool,
                "served from cache"
            );
            return CallResult::cache_hit(provider, tool, data);
        }

        let started = Instant::now();
        let outcome = self.call_channel(provider, tool, payload, ctx).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(data) => {
                tracing::debug!(
                    correlation_id = %ctx.correlation_id,
                    provider = %provider,
                    tool = %tool,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "call succeeded"
                );
                self.cache.put(key, data.clone()).await;
                CallResult::success(provider, tool, data, elapsed)
            }
            Err(failure) => {
                tracing::debug!(
                    correlation_id = %ctx.correlation_id,
                    provider = %provider,
                    tool = %tool,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %failure,
                    "call failed"
                );
                CallResult::failure(provider, tool, failure.to_string(), elapsed)
            }
        }
    }

    async fn call_channel(
        &self,
        provider: &str,
        tool: &str,
        payload: Value,
        ctx: &CallContext,
    ) -> Result<Value, CallFailure> {
        let target = self
            .registry
            .endpoint_target(provider)
            .ok_or_else(|| CallFailure::UnknownProvider(provider.to_string()))?;
        let limit = ctx.timeout.or(self.default_timeout);

        let call = async {
            let _permit = match &self.concurrency {
                Some(semaphore) => Some(
                    semaphore
                        .acquire()
                        .await
                        .map_err(|_| CallFailure::Cancelled)?,
                ),
                None => None,
            };
            self.invoker
                .invoke(target, tool, payload)
                .await
                .map_err(CallFailure::from)
        };
        // the deadline covers waiting for a permit too
        let call = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .map_err(|_| CallFailure::TimedOut(limit))?,
                None => call.await,
            }
        };

        match &ctx.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(CallFailure::Cancelled),
                result = call => result,
            },
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ManualClock};
    use crate::capability::CapabilityProvider;
    use crate::invoker::ScriptedInvoker;
    use serde_json::json;

    fn registry() -> Arc<CapabilityRegistry> {
        Arc::new(CapabilityRegistry::from_providers([
            CapabilityProvider::new("p1", "Primary"),
            CapabilityProvider::new("p2", "Secondary"),
            CapabilityProvider::new("p3", "Tertiary"),
        ]))
    }

    fn executor(invoker: Arc<ScriptedInvoker>) -> (CallExecutor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ResultCache::with_clock(
            CacheConfig {
                enabled: true,
                ttl: Duration::from_secs(60),
            },
            clock.clone(),
        ));
        (CallExecutor::new(registry(), invoker, cache), clock)
    }

    fn fallback(provider: &str, tool: &str, params: Value) -> FallbackCall {
        FallbackCall {
            provider: provider.to_string(),
            tool: tool.to_string(),
            params: into_object(params),
        }
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let invoker = Arc::new(ScriptedInvoker::new().with_response("p1", "ask", json!("answer")));
        let (executor, _clock) = executor(invoker.clone());
        let ctx = CallContext::default();

        let first = executor.invoke("p1", "ask", json!({"q": "x"}), &ctx, None).await;
        let second = executor.invoke("p1", "ask", json!({"q": "x"}), &ctx, None).await;

        assert!(first.success && !first.cached);
        assert!(second.success && second.cached);
        assert_eq!(second.execution_time_ms, 0);
        assert_eq!(second.data, Some(json!("answer")));
        assert_eq!(invoker.call_count("p1", "ask"), 1);
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let (executor, clock) = executor(invoker.clone());
        let ctx = CallContext::default();

        executor.invoke("p1", "ask", json!({"q": "x"}), &ctx, None).await;
        clock.advance(Duration::from_secs(61));
        let again = executor.invoke("p1", "ask", json!({"q": "x"}), &ctx, None).await;

        assert!(!again.cached);
        assert_eq!(invoker.call_count("p1", "ask"), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.push_failure("p1", "ask", "flaky");
        let (executor, _clock) = executor(invoker.clone());
        let ctx = CallContext::default();

        let failed = executor.invoke("p1", "ask", json!({}), &ctx, None).await;
        let retried = executor.invoke("p1", "ask", json!({}), &ctx, None).await;

        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("p1/ask failed: flaky"));
        assert!(retried.success && !retried.cached);
        assert_eq!(invoker.call_count("p1", "ask"), 2);
    }

    #[tokio::test]
    async fn test_fallback_used_once_with_merged_params() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .with_failure("p1", "ask", "down")
                .with_response("p2", "ask_alt", json!("alt answer")),
        );
        let (executor, _clock) = executor(invoker.clone());
        let fb = fallback("p2", "ask_alt", json!({"mode": "fast"}));

        let result = executor
            .invoke("p1", "ask", json!({"q": "x", "mode": "slow"}), &CallContext::default(), Some(&fb))
            .await;

        assert!(result.success);
        assert!(result.used_fallback);
        assert_eq!(result.provider, "p2");
        assert_eq!(result.data, Some(json!("alt answer")));

        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].payload, json!({"q": "x", "mode": "fast"}));
    }

    #[tokio::test]
    async fn test_failing_fallback_is_final() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .with_failure("p1", "ask", "down")
                .with_failure("p2", "ask_alt", "also down"),
        );
        let (executor, _clock) = executor(invoker.clone());
        let fb = fallback("p2", "ask_alt", json!({}));

        let result = executor
            .invoke("p1", "ask", json!({}), &CallContext::default(), Some(&fb))
            .await;

        assert!(!result.success);
        assert!(result.used_fallback);
        assert_eq!(result.error.as_deref(), Some("p2/ask_alt failed: also down"));
        assert_eq!(invoker.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_a_failed_result() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let (executor, _clock) = executor(invoker.clone());

        let result = executor
            .invoke("ghost", "ask", json!({}), &CallContext::default(), None)
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unknown provider 'ghost'"));
        assert_eq!(invoker.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggers_fallback() {
        let invoker = Arc::new(
            ScriptedInvoker::new().with_delay("p1", "slow", Duration::from_secs(10)),
        );
        let (executor, _clock) = executor(invoker.clone());
        let executor = executor.with_default_timeout(Duration::from_secs(1));
        let fb = fallback("p3", "quick", json!({}));

        let result = executor
            .invoke("p1", "slow", json!({}), &CallContext::default(), Some(&fb))
            .await;

        assert!(result.success);
        assert!(result.used_fallback);
        assert_eq!(result.provider, "p3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_timeout_overrides_default() {
        let invoker = Arc::new(
            ScriptedInvoker::new().with_delay("p1", "slow", Duration::from_secs(5)),
        );
        let (executor, _clock) = executor(invoker);
        let executor = executor.with_default_timeout(Duration::from_secs(10));
        let ctx = CallContext::default().with_timeout(Duration::from_secs(2));

        let result = executor.invoke("p1", "slow", json!({}), &ctx, None).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timed out after 2s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_covers_waiting_for_a_permit() {
        let invoker = Arc::new(
            ScriptedInvoker::new().with_delay("p1", "slow", Duration::from_secs(10)),
        );
        let (executor, _clock) = executor(invoker.clone());
        let executor = Arc::new(executor.with_max_concurrent_calls(1));

        let holder = tokio::spawn({
            let executor = executor.clone();
            async move {
                executor
                    .invoke("p1", "slow", json!({}), &CallContext::default(), None)
                    .await
            }
        });
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        let ctx = CallContext::default().with_timeout(Duration::from_secs(1));
        let result = executor.invoke("p2", "ask", json!({}), &ctx, None).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timed out after 1s"));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(invoker.call_count("p2", "ask"), 0);
        assert!(holder.await.unwrap().success);
    }

    #[tokio::test]
    async fn test_cancelled_call_skips_fallback() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let (executor, _clock) = executor(invoker.clone());
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallContext::default().with_cancellation(token);
        let fb = fallback("p2", "ask_alt", json!({}));

        let result = executor.invoke("p1", "ask", json!({}), &ctx, Some(&fb)).await;

        assert!(!result.success);
        assert!(!result.used_fallback);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(invoker.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_calls() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let executor = CallExecutor::new(registry(), invoker.clone(), Arc::new(ResultCache::disabled()))
            .with_max_concurrent_calls(2);
        let ctx = CallContext::default();

        executor.invoke("p1", "ask", json!({}), &ctx, None).await;
        executor.invoke("p1", "ask", json!({}), &ctx, None).await;

        assert_eq!(invoker.call_count("p1", "ask"), 2);
    }
}
