//! Script sessions: one running script engine bound to one table.

mod host;
mod lua;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

pub use host::{InterruptHandle, Severity, SCRIPT_LOG_TARGET};
use log::{debug, warn};
pub use lua::{LuaEngine, HOST_NAMESPACE};
use sail_lua_common::config::SessionConfig;

use crate::binding::ScriptSource;
use crate::error::{BridgeError, BridgeResult};
use crate::value::ScriptValue;

/// The optional global functions a table script may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    EstimateRowCount,
    EstimateRowWidth,
    EstimateStartupCost,
    EstimateTotalCost,
    ScanStart,
    ScanIterate,
    ScanRestart,
    ScanEnd,
    ScanExplain,
    BeginForeignModify,
    ExecForeignInsert,
    ExecForeignUpdate,
    ExecForeignDelete,
    EndForeignModify,
    ExplainForeignModify,
}

impl Hook {
    pub const ALL: [Hook; 15] = [
        Hook::EstimateRowCount,
        Hook::EstimateRowWidth,
        Hook::EstimateStartupCost,
        Hook::EstimateTotalCost,
        Hook::ScanStart,
        Hook::ScanIterate,
        Hook::ScanRestart,
        Hook::ScanEnd,
        Hook::ScanExplain,
        Hook::BeginForeignModify,
        Hook::ExecForeignInsert,
        Hook::ExecForeignUpdate,
        Hook::ExecForeignDelete,
        Hook::EndForeignModify,
        Hook::ExplainForeignModify,
    ];

    /// The global name the script defines the hook under.
    pub fn name(&self) -> &'static str {
        match self {
            Hook::EstimateRowCount => "EstimateRowCount",
            Hook::EstimateRowWidth => "EstimateRowWidth",
            Hook::EstimateStartupCost => "EstimateStartupCost",
            Hook::EstimateTotalCost => "EstimateTotalCost",
            Hook::ScanStart => "ScanStart",
            Hook::ScanIterate => "ScanIterate",
            Hook::ScanRestart => "ScanRestart",
            Hook::ScanEnd => "ScanEnd",
            Hook::ScanExplain => "ScanExplain",
            Hook::BeginForeignModify => "BeginForeignModify",
            Hook::ExecForeignInsert => "ExecForeignInsert",
            Hook::ExecForeignUpdate => "ExecForeignUpdate",
            Hook::ExecForeignDelete => "ExecForeignDelete",
            Hook::EndForeignModify => "EndForeignModify",
            Hook::ExplainForeignModify => "ExplainForeignModify",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A script engine that sessions drive.
///
/// Implementations resolve hooks once when the script is loaded and release
/// the engine in [`ScriptEngine::stop`].
pub trait ScriptEngine: Send {
    fn has_hook(&self, hook: Hook) -> bool;

    /// Invokes a hook that [`ScriptEngine::has_hook`] reported as present and
    /// returns everything it returned.
    fn call(&mut self, hook: Hook, args: Vec<ScriptValue>) -> BridgeResult<Vec<ScriptValue>>;

    fn interrupt_handle(&self) -> InterruptHandle;

    fn stop(self: Box<Self>);
}

/// A started script engine. The session is stopped exactly once, either by
/// [`Session::stop`] or when it is dropped.
pub struct Session {
    engine: Option<Box<dyn ScriptEngine>>,
    interrupt: InterruptHandle,
}

impl Session {
    /// Starts a Lua session, loading the script file and then the inline
    /// script.
    pub fn start(source: &ScriptSource, config: &SessionConfig) -> BridgeResult<Self> {
        let engine = LuaEngine::start(source, config)?;
        Ok(Self::from_engine(Box::new(engine)))
    }

    pub fn from_engine(engine: Box<dyn ScriptEngine>) -> Self {
        let interrupt = engine.interrupt_handle();
        Self {
            engine: Some(engine),
            interrupt,
        }
    }

    pub fn has_hook(&self, hook: Hook) -> bool {
        self.engine.as_ref().is_some_and(|e| e.has_hook(hook))
    }

    /// Calls a hook and returns exactly `expected` results, padded with nil.
    /// An absent hook succeeds with no results.
    pub fn call(
        &mut self,
        hook: Hook,
        args: Vec<ScriptValue>,
        expected: usize,
    ) -> BridgeResult<Vec<ScriptValue>> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| BridgeError::invalid_state("session is stopped"))?;
        if !engine.has_hook(hook) {
            return Ok(vec![]);
        }
        self.interrupt.check()?;
        debug!("calling script hook {hook}");
        let mut results = engine.call(hook, args)?;
        results.resize(expected, ScriptValue::Nil);
        Ok(results)
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn stop(mut self) {
        if let Some(engine) = self.engine.take() {
            debug!("stopping script session");
            engine.stop();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            warn!("script session dropped without being stopped");
            engine.stop();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("running", &self.engine.is_some())
            .finish()
    }
}
