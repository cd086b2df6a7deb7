use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::Level;

use crate::error::{BridgeError, BridgeResult};

/// The log target used for messages reported by scripts.
pub const SCRIPT_LOG_TARGET: &str = "sail_lua_fdw::script";

/// Report severities, numbered the way scripts see them in the `fdw` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug5 = 10,
    Debug4 = 11,
    Debug3 = 12,
    Debug2 = 13,
    Debug1 = 14,
    Log = 15,
    Info = 17,
    Notice = 18,
    Warning = 19,
    Error = 20,
    Fatal = 21,
    Panic = 22,
}

impl Severity {
    pub const ALL: [Severity; 12] = [
        Severity::Debug5,
        Severity::Debug4,
        Severity::Debug3,
        Severity::Debug2,
        Severity::Debug1,
        Severity::Log,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
        Severity::Panic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Severity::Debug5 => "DEBUG5",
            Severity::Debug4 => "DEBUG4",
            Severity::Debug3 => "DEBUG3",
            Severity::Debug2 => "DEBUG2",
            Severity::Debug1 => "DEBUG1",
            Severity::Log => "LOG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Panic => "PANIC",
        }
    }

    pub fn code(&self) -> i64 {
        *self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Whether a report at this severity aborts the running operation.
    pub fn aborts(&self) -> bool {
        *self >= Severity::Error
    }

    fn log_level(&self) -> Level {
        match self {
            Severity::Debug5 | Severity::Debug4 | Severity::Debug3 => Level::Trace,
            Severity::Debug2 | Severity::Debug1 => Level::Debug,
            Severity::Log | Severity::Info | Severity::Notice => Level::Info,
            Severity::Warning => Level::Warn,
            Severity::Error | Severity::Fatal | Severity::Panic => Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A flag the embedding host sets to cancel the running script call.
///
/// The flag is checked whenever the script calls back into the host, so a
/// script that never reports anything runs to completion.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Withdraws a pending interrupt.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> BridgeResult<()> {
        if self.is_interrupted() {
            Err(BridgeError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Handles a report requested by a script.
pub(crate) fn ereport(
    severity: Severity,
    message: &str,
    interrupt: &InterruptHandle,
) -> BridgeResult<()> {
    interrupt.check()?;
    if severity.aborts() {
        return Err(BridgeError::ScriptLogRequest {
            severity,
            message: message.to_string(),
        });
    }
    log::log!(target: SCRIPT_LOG_TARGET, severity.log_level(), "{message}");
    Ok(())
}
