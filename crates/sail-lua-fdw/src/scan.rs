use log::{debug, warn};

use crate::binding::TableBinding;
use crate::codec::decode_row;
use crate::error::{BridgeError, BridgeResult};
use crate::filter::Condition;
use crate::session::{Hook, InterruptHandle, Session};
use crate::types::Row;
use crate::value::ScriptValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Created,
    Began,
    Iterating,
    Ended,
}

/// Drives a table script through one scan.
///
/// The scan owns the session handed over by planning and stops it exactly
/// once when the scan ends, whether or not any row was read. A scan dropped
/// before it ended is ended on drop.
#[derive(Debug)]
pub struct ScanLifecycle {
    binding: TableBinding,
    conditions: Vec<Condition>,
    context: ScriptValue,
    session: Option<Session>,
    state: ScanState,
}

impl ScanLifecycle {
    pub fn new(binding: TableBinding, session: Session, conditions: Vec<Condition>) -> Self {
        let mut context = binding.script_context();
        if let ScriptValue::Table(fields) = &mut context {
            let clauses = conditions.iter().map(Condition::to_script_value).collect();
            fields.insert("clauses".to_string(), ScriptValue::List(clauses));
        }
        Self {
            binding,
            conditions,
            context,
            session: Some(session),
            state: ScanState::Created,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn binding(&self) -> &TableBinding {
        &self.binding
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// The interrupt of the scan's session, or `None` once the scan ended.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.session.as_ref().map(Session::interrupt_handle)
    }

    pub fn begin(&mut self) -> BridgeResult<()> {
        self.expect_state(&[ScanState::Created], "begin")?;
        self.call(Hook::ScanStart, 0)?;
        self.state = ScanState::Began;
        debug!("began scan of {}", self.binding.name());
        Ok(())
    }

    /// Fetches the next row, or `None` once the script stops returning
    /// tables.
    pub fn next(&mut self) -> BridgeResult<Option<Row>> {
        self.expect_state(&[ScanState::Began, ScanState::Iterating], "iterate")?;
        self.state = ScanState::Iterating;
        let value = self.call(Hook::ScanIterate, 1)?.into_iter().next();
        match value {
            Some(value @ (ScriptValue::Table(_) | ScriptValue::List(_))) => {
                Ok(Some(decode_row(&value, self.binding.columns())?))
            }
            _ => Ok(None),
        }
    }

    pub fn rescan(&mut self) -> BridgeResult<()> {
        self.expect_state(&[ScanState::Began, ScanState::Iterating], "restart")?;
        self.call(Hook::ScanRestart, 0)?;
        self.state = ScanState::Began;
        debug!("restarted scan of {}", self.binding.name());
        Ok(())
    }

    /// Returns the one-line annotation the script provides for EXPLAIN.
    pub fn explain(&mut self) -> BridgeResult<Option<String>> {
        if self.state == ScanState::Ended {
            return Err(self.state_error("explain"));
        }
        let value = self.call(Hook::ScanExplain, 1)?.into_iter().next();
        Ok(match value {
            Some(ScriptValue::String(text)) => Some(text),
            _ => None,
        })
    }

    /// Ends the scan and stops the session. Ending twice is a no-op.
    ///
    /// The session is stopped even when `ScanEnd` fails; its error is
    /// returned afterwards.
    pub fn end(&mut self) -> BridgeResult<()> {
        if self.state == ScanState::Ended {
            return Ok(());
        }
        let result = self.call(Hook::ScanEnd, 0).map(|_| ());
        if let Some(session) = self.session.take() {
            session.stop();
        }
        self.state = ScanState::Ended;
        debug!("ended scan of {}", self.binding.name());
        result
    }

    fn call(&mut self, hook: Hook, expected: usize) -> BridgeResult<Vec<ScriptValue>> {
        let context = self.context.clone();
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BridgeError::invalid_state("scan has no session"))?;
        session.call(hook, vec![context], expected)
    }

    fn expect_state(&self, allowed: &[ScanState], operation: &str) -> BridgeResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.state_error(operation))
        }
    }

    fn state_error(&self, operation: &str) -> BridgeError {
        BridgeError::invalid_state(format!(
            "cannot {operation} scan of {} in state {:?}",
            self.binding.name(),
            self.state
        ))
    }
}

impl Drop for ScanLifecycle {
    fn drop(&mut self) {
        if self.state != ScanState::Ended {
            if let Err(e) = self.end() {
                warn!("failed to end scan of {}: {e}", self.binding.name());
            }
        }
    }
}
