// crates/state-store-sql/src/logging.rs
// ============================================================================
// Module: Statement Logging
// Description: Optional hook observing every statement the store executes.
// Purpose: Let callers trace SQL activity without coupling to a log backend.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Statement logging is off by default. When enabled it either emits
//! `tracing` events or forwards each statement and its elapsed time to a
//! caller-supplied [`StatementLogger`]. Statement text never includes bound
//! values, so keys and payloads stay out of the log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tracing target for executed statements.
pub const STATEMENT_TARGET: &str = "state_store_sql::statement";
/// Tracing target for session lifecycle events.
pub const SESSION_TARGET: &str = "state_store_sql::session";

// ============================================================================
// SECTION: Logger Trait
// ============================================================================

/// Sink for executed statements.
pub trait StatementLogger: Send + Sync {
    /// Records one executed statement and how long it took.
    fn log_statement(&self, statement: &str, elapsed: Duration);
}

impl<F> StatementLogger for F
where
    F: Fn(&str, Duration) + Send + Sync,
{
    fn log_statement(&self, statement: &str, elapsed: Duration) {
        self(statement, elapsed);
    }
}

// ============================================================================
// SECTION: Logging Mode
// ============================================================================

/// Statement logging mode.
///
/// Deserializes from a boolean: `true` selects [`StatementLogging::Tracing`],
/// `false` selects [`StatementLogging::Disabled`]. Custom loggers can only be
/// installed from code.
#[derive(Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(from = "bool", into = "bool")]
pub enum StatementLogging {
    /// No statement logging.
    #[default]
    Disabled,
    /// Emit `tracing` debug events.
    Tracing,
    /// Forward statements to a caller-supplied logger.
    Custom(Arc<dyn StatementLogger>),
}

impl StatementLogging {
    /// Wraps a caller-supplied logger.
    #[must_use]
    pub fn custom(logger: impl StatementLogger + 'static) -> Self {
        Self::Custom(Arc::new(logger))
    }

    /// Returns true when statements are observed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Records an executed statement.
    pub fn record(&self, statement: &str, elapsed: Duration) {
        match self {
            Self::Disabled => {}
            Self::Tracing => {
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(target: STATEMENT_TARGET, statement, elapsed_ms, "statement executed");
            }
            Self::Custom(logger) => logger.log_statement(statement, elapsed),
        }
    }

    /// Runs `operation` and records `statement` with its elapsed time,
    /// whether or not the operation succeeded.
    pub fn timed<T>(&self, statement: &str, operation: impl FnOnce() -> T) -> T {
        if !self.is_enabled() {
            return operation();
        }
        let started = Instant::now();
        let result = operation();
        self.record(statement, started.elapsed());
        result
    }

    /// Emits a session lifecycle event when tracing is selected.
    pub(crate) fn lifecycle(&self, event: &'static str, collection: &str) {
        if matches!(self, Self::Tracing) {
            tracing::debug!(target: SESSION_TARGET, collection, "{event}");
        }
    }
}

impl From<bool> for StatementLogging {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Tracing } else { Self::Disabled }
    }
}

impl From<StatementLogging> for bool {
    fn from(logging: StatementLogging) -> Self {
        logging.is_enabled()
    }
}

impl PartialEq for StatementLogging {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Disabled, Self::Disabled) | (Self::Tracing, Self::Tracing) => true,
            (Self::Custom(left), Self::Custom(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl fmt::Debug for StatementLogging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Tracing => f.write_str("Tracing"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
