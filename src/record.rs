//! Structured access-log records
//!
//! A [`Record`] is built once by a producer and then moved through the queue
//! into the writer's batch; it is never mutated after construction.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};

/// Severity of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Severity {
    /// Diagnostic detail
    Debug = 0,
    /// Normal operation
    #[default]
    Info = 1,
    /// Unexpected but handled
    Warn = 2,
    /// Failed operation
    Error = 3,
}

impl Severity {
    /// Get the severity as its log-line label
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the operation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RecordKind {
    /// Operation accepted, not yet finished
    Prepare,
    /// Operation finished (successfully or not); carries an outcome
    Commit,
    /// Free-form event not tied to an operation
    #[default]
    Event,
}

impl RecordKind {
    /// Get the kind as its log-line label
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Prepare => "PREPARE",
            RecordKind::Commit => "COMMIT",
            RecordKind::Event => "EVENT",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation category tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Operation {
    /// File upload
    Upload,
    /// File download
    Download,
    /// File deletion
    Delete,
    /// No specific operation
    #[default]
    General,
    /// Caller-defined category
    Custom(String),
}

impl Operation {
    /// Get the operation as its log-line label
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Upload => "UPLOAD",
            Operation::Download => "DOWNLOAD",
            Operation::Delete => "DELETE",
            Operation::General => "GENERAL",
            Operation::Custom(name) => name,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome code of a finished operation, numbered like canonical RPC status
/// codes (0 = OK).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OutcomeCode(pub u32);

impl OutcomeCode {
    /// Success
    pub const OK: Self = Self(0);
    /// Cancelled by the caller
    pub const CANCELLED: Self = Self(1);
    /// Unknown error
    pub const UNKNOWN: Self = Self(2);
    /// Client supplied an invalid argument
    pub const INVALID_ARGUMENT: Self = Self(3);
    /// Deadline expired before completion
    pub const DEADLINE_EXCEEDED: Self = Self(4);
    /// Requested entity not found
    pub const NOT_FOUND: Self = Self(5);
    /// Entity already exists
    pub const ALREADY_EXISTS: Self = Self(6);
    /// Caller lacks permission
    pub const PERMISSION_DENIED: Self = Self(7);
    /// Some resource has been exhausted
    pub const RESOURCE_EXHAUSTED: Self = Self(8);
    /// System not in a state required for the operation
    pub const FAILED_PRECONDITION: Self = Self(9);
    /// Operation aborted
    pub const ABORTED: Self = Self(10);
    /// Operation attempted past the valid range
    pub const OUT_OF_RANGE: Self = Self(11);
    /// Operation not implemented
    pub const UNIMPLEMENTED: Self = Self(12);
    /// Internal error
    pub const INTERNAL: Self = Self(13);
    /// Service unavailable
    pub const UNAVAILABLE: Self = Self(14);
    /// Unrecoverable data loss
    pub const DATA_LOSS: Self = Self(15);
    /// Missing or invalid credentials
    pub const UNAUTHENTICATED: Self = Self(16);

    /// Check if the code is success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        self.0 == 0
    }

    /// Canonical name, if the code is a known one
    pub const fn name(&self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "OK",
            1 => "CANCELLED",
            2 => "UNKNOWN",
            3 => "INVALID_ARGUMENT",
            4 => "DEADLINE_EXCEEDED",
            5 => "NOT_FOUND",
            6 => "ALREADY_EXISTS",
            7 => "PERMISSION_DENIED",
            8 => "RESOURCE_EXHAUSTED",
            9 => "FAILED_PRECONDITION",
            10 => "ABORTED",
            11 => "OUT_OF_RANGE",
            12 => "UNIMPLEMENTED",
            13 => "INTERNAL",
            14 => "UNAVAILABLE",
            15 => "DATA_LOSS",
            16 => "UNAUTHENTICATED",
            _ => return None,
        })
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "CODE_{}", self.0),
        }
    }
}

/// Result attached to a completion record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    /// Outcome code
    pub code: OutcomeCode,
    /// Time the operation took
    pub duration: Duration,
    /// Error text, if the operation failed
    pub error: Option<String>,
}

impl Outcome {
    /// Successful outcome
    pub fn ok(duration: Duration) -> Self {
        Self {
            code: OutcomeCode::OK,
            duration,
            error: None,
        }
    }

    /// Failed outcome with error text
    pub fn failed(code: OutcomeCode, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            code,
            duration,
            error: Some(error.into()),
        }
    }
}

/// A structured log record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    timestamp: DateTime<Local>,
    correlation_id: String,
    severity: Severity,
    kind: RecordKind,
    operation: Operation,
    origin: String,
    destination: String,
    outcome: Option<Outcome>,
    message: String,
}

impl Record {
    /// Start building a record of the given kind
    pub fn builder(kind: RecordKind) -> RecordBuilder {
        RecordBuilder::new(kind)
    }

    /// Free-form event record
    pub fn event(severity: Severity, message: impl Into<String>) -> Self {
        RecordBuilder::new(RecordKind::Event)
            .with_severity(severity)
            .with_message(message)
            .build()
    }

    /// Record that an operation has been accepted
    pub fn prepare(
        correlation_id: impl Into<String>,
        operation: Operation,
        origin: impl Into<String>,
        destination: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        RecordBuilder::new(RecordKind::Prepare)
            .with_correlation_id(correlation_id)
            .with_operation(operation)
            .with_endpoints(origin, destination)
            .with_message(params)
            .build()
    }

    /// Record that an operation finished.
    ///
    /// Severity is `Info` for an OK outcome and `Error` otherwise.
    pub fn commit(
        correlation_id: impl Into<String>,
        operation: Operation,
        origin: impl Into<String>,
        destination: impl Into<String>,
        params: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        let severity = if outcome.code.is_ok() {
            Severity::Info
        } else {
            Severity::Error
        };
        RecordBuilder::new(RecordKind::Commit)
            .with_correlation_id(correlation_id)
            .with_operation(operation)
            .with_endpoints(origin, destination)
            .with_message(params)
            .with_severity(severity)
            .with_outcome(outcome)
            .build()
    }

    /// Creation time
    pub fn timestamp(&self) -> &DateTime<Local> {
        &self.timestamp
    }

    /// Correlation id shared by the records of one operation
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Severity
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Kind
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Operation tag
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Origin endpoint
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Destination endpoint
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Outcome, present on completion records
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Free-text message or request parameters
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Builder for [`Record`]
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    timestamp: Option<DateTime<Local>>,
    correlation_id: String,
    severity: Severity,
    kind: RecordKind,
    operation: Operation,
    origin: String,
    destination: String,
    outcome: Option<Outcome>,
    message: String,
}

impl RecordBuilder {
    /// Create a builder for the given kind
    pub fn new(kind: RecordKind) -> Self {
        Self {
            timestamp: None,
            correlation_id: String::new(),
            severity: Severity::default(),
            kind,
            operation: Operation::default(),
            origin: String::new(),
            destination: String::new(),
            outcome: None,
            message: String::new(),
        }
    }

    /// Override the timestamp (defaults to the time of `build`)
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the correlation id
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the operation tag
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Set origin and destination endpoints
    pub fn with_endpoints(
        mut self,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        self.origin = origin.into();
        self.destination = destination.into();
        self
    }

    /// Attach an outcome
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Set the message text
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Finish the record
    pub fn build(self) -> Record {
        Record {
            timestamp: self.timestamp.unwrap_or_else(Local::now),
            correlation_id: self.correlation_id,
            severity: self.severity,
            kind: self.kind,
            operation: self.operation,
            origin: self.origin,
            destination: self.destination,
            outcome: self.outcome,
            message: self.message,
        }
    }
}
