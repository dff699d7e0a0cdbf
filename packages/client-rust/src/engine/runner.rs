//! Submit → acknowledge → poll state machine for one logical operation.
//!
//! `run_once` performs a single cycle: submission (repeated on ignorable
//! errors), then polling on the [`PollSchedule`](regsync_core::PollSchedule)
//! until a terminal result arrives. Restartable operations give up polling
//! with [`RegistryError::RestartTimeout`] once the restart timeout has
//! elapsed; `run` answers that by resubmitting from scratch.

use std::sync::Arc;
use std::time::Duration;

use regsync_core::{
    Acknowledgment, ClockSource, OperationResult, RegistryError, RemoteRequest, RequestHeader,
    Submission, SystemClock,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{call_or_cancel, sleep_or_cancel};
use crate::config::ClientConfig;
use crate::gateway::RemoteGateway;

// ---------------------------------------------------------------------------
// OperationOptions
// ---------------------------------------------------------------------------

/// Per-operation behaviour of the runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationOptions {
    /// Resubmitting the same request is safe (reads, idempotent writes).
    pub can_restart: bool,
    /// The result is expected quickly; the first poll uses the short delay.
    pub lightweight: bool,
    /// Overrides the configured restart timeout.
    pub restart_timeout: Option<Duration>,
    /// Hard wait limit for operations that cannot be restarted. Without it
    /// such operations poll until a result arrives or they are cancelled.
    pub wait_limit: Option<Duration>,
}

impl OperationOptions {
    #[must_use]
    pub fn restartable() -> Self {
        Self {
            can_restart: true,
            ..Self::default()
        }
    }

    /// Options for an operation that must be submitted at most once per
    /// logical call.
    #[must_use]
    pub fn single_shot() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lightweight(mut self) -> Self {
        self.lightweight = true;
        self
    }

    #[must_use]
    pub fn with_restart_timeout(mut self, timeout: Duration) -> Self {
        self.restart_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_wait_limit(mut self, limit: Duration) -> Self {
        self.wait_limit = Some(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// AsyncOperationRunner
// ---------------------------------------------------------------------------

/// Drives requests through a [`RemoteGateway`]. Holds no per-operation state;
/// one runner serves any number of concurrent operations.
pub struct AsyncOperationRunner<G> {
    gateway: Arc<G>,
    config: Arc<ClientConfig>,
    clock: Arc<dyn ClockSource>,
}

impl<G: RemoteGateway> AsyncOperationRunner<G> {
    #[must_use]
    pub fn new(gateway: Arc<G>, config: Arc<ClientConfig>) -> Self {
        Self {
            gateway,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the wall clock used for request header dates.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Runs `request` to a terminal payload, resubmitting restartable
    /// operations whenever their restart timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not absorbed by the retry policy,
    /// wrapped with the operation kind and run number.
    /// [`RegistryError::Cancelled`] is returned unwrapped.
    pub async fn run(
        &self,
        request: &G::Request,
        options: &OperationOptions,
        cancel: &CancellationToken,
    ) -> Result<G::Payload, RegistryError> {
        let kind = request.kind();
        let span = info_span!(
            "remote_operation",
            kind = kind,
            restartable = options.can_restart,
            lightweight = options.lightweight,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let mut run = 1u32;
            let result = loop {
                match self.run_once(request, options, cancel).await {
                    Err(RegistryError::RestartTimeout { timeout, .. }) if options.can_restart => {
                        warn!(run, timeout_secs = timeout.as_secs(), "restart timeout elapsed, resubmitting");
                        run += 1;
                    }
                    Err(RegistryError::RestartTimeout { operation, timeout }) => {
                        break Err(RegistryError::WaitLimitExceeded {
                            operation,
                            source: Arc::new(RegistryError::RestartTimeout { operation, timeout }),
                        });
                    }
                    other => break other,
                }
            };

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome = if result.is_ok() { "ok" } else { "error" };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            info!(kind, runs = run, duration_ms, outcome, "operation complete");

            result.map_err(|err| match err {
                RegistryError::Cancelled => err,
                other => other.context(format!("{kind} failed on run {run}")),
            })
        }
        .instrument(span)
        .await
    }

    /// One submit/poll cycle.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::RestartTimeout`] when a restartable operation waited
    ///   longer than its restart timeout.
    /// - [`RegistryError::WaitLimitExceeded`] when a non-restartable operation
    ///   exceeded its explicit wait limit.
    /// - [`RegistryError::RetriesExhausted`] when an ignorable error kept
    ///   recurring past the resubmission cap.
    /// - The first remote fault of a ready result.
    /// - Any other gateway error that is not ignorable.
    pub async fn run_once(
        &self,
        request: &G::Request,
        options: &OperationOptions,
        cancel: &CancellationToken,
    ) -> Result<G::Payload, RegistryError> {
        let ack = self.submit_with_retries(request, options, cancel).await?;
        let result = self.wait_for_result(request.kind(), &ack, options, cancel).await?;
        result.into_payload()
    }

    fn header(&self) -> RequestHeader {
        RequestHeader::new(&self.config.identity, self.clock.now_ms())
    }

    async fn submit_with_retries(
        &self,
        request: &G::Request,
        options: &OperationOptions,
        cancel: &CancellationToken,
    ) -> Result<Acknowledgment, RegistryError> {
        let endpoint = request.endpoint();
        if !endpoint.is_async() {
            return Err(RegistryError::protocol(format!(
                "{} targets synchronous endpoint {endpoint}",
                request.kind()
            )));
        }
        let uri = self.config.stand.endpoint_uri(endpoint);
        let mut attempt = 1u32;
        loop {
            let header = self.header();
            debug!(attempt, uri = %uri, message_id = %header.message_id, "submitting request");

            let start = Instant::now();
            let submission = Submission {
                header,
                uri: uri.clone(),
                request,
            };
            match call_or_cancel(self.gateway.submit(submission), cancel).await {
                Ok(ack) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    info!(elapsed_ms, correlation_id = %ack, "request acknowledged");
                    return Ok(ack);
                }
                Err(err) => {
                    let delay =
                        self.retry_delay(err, request.kind(), "submit", attempt, options.can_restart)?;
                    sleep_or_cancel(delay, cancel).await?;
                    attempt += 1;
                }
            }
        }
    }

    async fn wait_for_result(
        &self,
        kind: &'static str,
        ack: &Acknowledgment,
        options: &OperationOptions,
        cancel: &CancellationToken,
    ) -> Result<OperationResult<G::Payload>, RegistryError> {
        let engine = &self.config.engine;
        let restart_timeout = options.restart_timeout.unwrap_or(engine.restart_timeout);
        let started = Instant::now();
        let budget = if options.can_restart {
            Some(restart_timeout)
        } else {
            options.wait_limit
        };
        let mut failures = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);
            if cancel.is_cancelled() {
                return Err(RegistryError::Cancelled);
            }

            let elapsed = started.elapsed();
            if options.can_restart && elapsed > restart_timeout {
                return Err(RegistryError::RestartTimeout {
                    operation: kind,
                    timeout: restart_timeout,
                });
            }
            if let Some(limit) = options.wait_limit.filter(|_| !options.can_restart) {
                if elapsed > limit {
                    return Err(RegistryError::WaitLimitExceeded {
                        operation: kind,
                        source: Arc::new(RegistryError::RestartTimeout {
                            operation: kind,
                            timeout: limit,
                        }),
                    });
                }
            }

            let delay = engine.poll.delay_for(attempt, options.lightweight);
            debug!(
                attempt,
                delay_secs = delay.as_secs(),
                elapsed_secs = elapsed.as_secs(),
                "waiting before poll"
            );
            sleep_or_cancel(delay, cancel).await?;

            match call_or_cancel(self.gateway.poll_once(self.header(), ack), cancel).await {
                Ok(Some(result)) if result.ready_state.is_terminal() => {
                    info!(attempt, correlation_id = %ack, "result received");
                    return Ok(result);
                }
                Ok(_) => failures = 0,
                Err(err) => {
                    failures += 1;
                    // Polling is a read; repeating it is always safe.
                    let delay = self.retry_delay(err, kind, "poll", failures, true)?;
                    // Never wait past the restart timeout or wait limit.
                    let remaining = budget.map_or(delay, |b| b.saturating_sub(started.elapsed()));
                    sleep_or_cancel(delay.min(remaining), cancel).await?;
                }
            }
        }
    }

    /// Decides whether failed attempt `attempt` may be repeated. Returns the
    /// resubmission delay when it may, the error (or `RetriesExhausted`) when
    /// it may not.
    fn retry_delay(
        &self,
        err: RegistryError,
        kind: &'static str,
        stage: &'static str,
        attempt: u32,
        idempotent: bool,
    ) -> Result<Duration, RegistryError> {
        let engine = &self.config.engine;
        let classification = engine.classifier.classify(&err);
        if !classification.allows_retry(idempotent) {
            return Err(err);
        }
        if !engine.resubmit.allows_another(attempt) {
            return Err(RegistryError::RetriesExhausted {
                operation: kind,
                attempts: attempt,
                source: Arc::new(err),
            });
        }

        let delay = engine.resubmit.delay_for(attempt);
        warn!(
            stage,
            attempt,
            marker = classification.marker.as_deref().unwrap_or_default(),
            delay_secs = delay.as_secs(),
            error = %err,
            "ignoring transient error"
        );
        Ok(delay)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
