//! Access-log facade for request handlers.
//!
//! Handlers describe each operation with a PREPARE record when it starts and
//! a COMMIT record when it finishes; both carry the same correlation id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::logger::AsyncLogger;
use crate::record::{Operation, Outcome, OutcomeCode, Record};

/// Writes PREPARE/COMMIT records for one service endpoint.
#[derive(Clone)]
pub struct AccessLogger {
    logger: Arc<AsyncLogger>,
    local_endpoint: String,
}

impl AccessLogger {
    /// Log through `logger`, tagging records with `local_endpoint` as the
    /// destination
    pub fn new(logger: Arc<AsyncLogger>, local_endpoint: impl Into<String>) -> Self {
        Self {
            logger,
            local_endpoint: local_endpoint.into(),
        }
    }

    /// Fresh random correlation id (UUID v4, hyphenated)
    pub fn new_correlation_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Underlying logger
    pub fn logger(&self) -> &Arc<AsyncLogger> {
        &self.logger
    }

    /// Endpoint written as every record's destination
    pub fn local_endpoint(&self) -> &str {
        &self.local_endpoint
    }

    /// Record that `operation` from `peer` has been accepted
    pub fn log_prepare(&self, correlation_id: &str, operation: Operation, peer: &str, params: &str) {
        self.logger.append(Record::prepare(
            correlation_id,
            operation,
            peer,
            self.local_endpoint.as_str(),
            params,
        ));
    }

    /// Record that `operation` finished with `code`
    #[allow(clippy::too_many_arguments)]
    pub fn log_commit(
        &self,
        correlation_id: &str,
        operation: Operation,
        peer: &str,
        params: &str,
        code: OutcomeCode,
        duration: Duration,
        error: Option<&str>,
    ) {
        let outcome = Outcome {
            code,
            duration,
            error: error.filter(|e| !e.is_empty()).map(str::to_string),
        };
        self.logger.append(Record::commit(
            correlation_id,
            operation,
            peer,
            self.local_endpoint.as_str(),
            params,
            outcome,
        ));
    }

    /// Record that `operation` was abandoned; a commit with `reason` as the
    /// error text and no parameters
    pub fn log_abort(
        &self,
        correlation_id: &str,
        operation: Operation,
        peer: &str,
        code: OutcomeCode,
        reason: &str,
        duration: Duration,
    ) {
        self.log_commit(
            correlation_id,
            operation,
            peer,
            "",
            code,
            duration,
            Some(reason),
        );
    }

    /// Log PREPARE now and return a span that logs COMMIT with the elapsed
    /// time when finished
    pub fn begin(
        &self,
        operation: Operation,
        peer: impl Into<String>,
        params: impl Into<String>,
    ) -> AccessSpan<'_> {
        let span = AccessSpan {
            access: self,
            correlation_id: Self::new_correlation_id(),
            operation,
            peer: peer.into(),
            params: params.into(),
            started: Instant::now(),
            finished: false,
        };
        self.log_prepare(
            &span.correlation_id,
            span.operation.clone(),
            &span.peer,
            &span.params,
        );
        span
    }
}

/// One in-flight operation started with [`AccessLogger::begin`].
///
/// Dropping an unfinished span logs an abort with [`OutcomeCode::CANCELLED`].
pub struct AccessSpan<'a> {
    access: &'a AccessLogger,
    correlation_id: String,
    operation: Operation,
    peer: String,
    params: String,
    started: Instant,
    finished: bool,
}

impl AccessSpan<'_> {
    /// Correlation id shared by this operation's records
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Time since the PREPARE record
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log a successful COMMIT
    pub fn commit(mut self) {
        self.finish(OutcomeCode::OK, None);
    }

    /// Log a failed COMMIT
    pub fn fail(mut self, code: OutcomeCode, error: &str) {
        self.finish(code, Some(error));
    }

    fn finish(&mut self, code: OutcomeCode, error: Option<&str>) {
        self.finished = true;
        self.access.log_commit(
            &self.correlation_id,
            self.operation.clone(),
            &self.peer,
            &self.params,
            code,
            self.started.elapsed(),
            error,
        );
    }
}

impl Drop for AccessSpan<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.access.log_abort(
                &self.correlation_id,
                self.operation.clone(),
                &self.peer,
                OutcomeCode::CANCELLED,
                "dropped before completion",
                self.started.elapsed(),
            );
        }
    }
}
