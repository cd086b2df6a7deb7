use log::{debug, warn};
use sail_lua_common::config::SessionConfig;

use crate::binding::TableBinding;
use crate::capabilities::{updatable_operations, UpdatableOperations};
use crate::codec::encode_row;
use crate::error::{BridgeError, BridgeResult};
use crate::session::{Hook, Session};
use crate::types::Row;
use crate::value::ScriptValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyState {
    Created,
    Began,
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Insert,
    Update,
    Delete,
}

impl ModifyOperation {
    fn hook(&self) -> Hook {
        match self {
            ModifyOperation::Insert => Hook::ExecForeignInsert,
            ModifyOperation::Update => Hook::ExecForeignUpdate,
            ModifyOperation::Delete => Hook::ExecForeignDelete,
        }
    }
}

/// Drives a table script through one write operation.
///
/// Each modify runs its own session, started from the table's own script
/// options when the modify begins.
#[derive(Debug)]
pub struct ModifyLifecycle {
    binding: TableBinding,
    config: SessionConfig,
    context: ScriptValue,
    session: Option<Session>,
    state: ModifyState,
}

impl ModifyLifecycle {
    pub fn new(binding: TableBinding, config: &SessionConfig) -> Self {
        let context = binding.script_context();
        Self {
            binding,
            config: config.clone(),
            context,
            session: None,
            state: ModifyState::Created,
        }
    }

    pub fn state(&self) -> ModifyState {
        self.state
    }

    pub fn updatable_operations(&self) -> UpdatableOperations {
        updatable_operations()
    }

    pub fn begin(&mut self) -> BridgeResult<()> {
        self.expect_state(&[ModifyState::Created], "begin")?;
        let session = Session::start(self.binding.source(), &self.config)?;
        self.begin_with_session(session)
    }

    /// Begins the modify on a session that is already started.
    pub fn begin_with_session(&mut self, session: Session) -> BridgeResult<()> {
        self.expect_state(&[ModifyState::Created], "begin")?;
        self.session = Some(session);
        if let Err(e) = self.call(Hook::BeginForeignModify, None, 0) {
            self.stop_session();
            self.state = ModifyState::Ended;
            return Err(e);
        }
        self.state = ModifyState::Began;
        debug!("began modify of {}", self.binding.name());
        Ok(())
    }

    pub fn insert(&mut self, row: &Row) -> BridgeResult<Option<Row>> {
        self.execute(ModifyOperation::Insert, row)
    }

    pub fn update(&mut self, row: &Row) -> BridgeResult<Option<Row>> {
        self.execute(ModifyOperation::Update, row)
    }

    pub fn delete(&mut self, row: &Row) -> BridgeResult<Option<Row>> {
        self.execute(ModifyOperation::Delete, row)
    }

    /// Hands one row to the script and returns it as the affected row.
    ///
    /// A failed call aborts the modify: the session is stopped without
    /// calling `EndForeignModify`.
    pub fn execute(&mut self, operation: ModifyOperation, row: &Row) -> BridgeResult<Option<Row>> {
        self.expect_state(&[ModifyState::Began, ModifyState::Active], "write")?;
        self.state = ModifyState::Active;
        let result = encode_row(row)
            .map_err(BridgeError::from)
            .and_then(|fields| self.call(operation.hook(), Some(fields), 0));
        if let Err(e) = result {
            self.abort();
            return Err(e);
        }
        Ok(Some(row.clone()))
    }

    pub fn explain(&mut self) -> BridgeResult<Option<String>> {
        self.expect_state(&[ModifyState::Began, ModifyState::Active], "explain")?;
        let value = self.call(Hook::ExplainForeignModify, None, 1)?.into_iter().next();
        Ok(match value {
            Some(ScriptValue::String(text)) => Some(text),
            _ => None,
        })
    }

    /// Ends the modify and stops the session. Ending twice is a no-op.
    pub fn end(&mut self) -> BridgeResult<()> {
        let result = match self.state {
            ModifyState::Ended => return Ok(()),
            ModifyState::Created => Ok(()),
            ModifyState::Began | ModifyState::Active => {
                self.call(Hook::EndForeignModify, None, 0).map(|_| ())
            }
        };
        self.stop_session();
        self.state = ModifyState::Ended;
        debug!("ended modify of {}", self.binding.name());
        result
    }

    /// Stops the session without calling `EndForeignModify`. Does nothing
    /// once the modify has ended.
    pub fn abort(&mut self) {
        if self.state == ModifyState::Ended {
            return;
        }
        self.stop_session();
        self.state = ModifyState::Ended;
        debug!("aborted modify of {}", self.binding.name());
    }

    fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
    }

    fn call(
        &mut self,
        hook: Hook,
        row: Option<ScriptValue>,
        expected: usize,
    ) -> BridgeResult<Vec<ScriptValue>> {
        let mut args = vec![self.context.clone()];
        args.extend(row);
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BridgeError::invalid_state("modify has no session"))?;
        session.call(hook, args, expected)
    }

    fn expect_state(&self, allowed: &[ModifyState], operation: &str) -> BridgeResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BridgeError::invalid_state(format!(
                "cannot {operation} modify of {} in state {:?}",
                self.binding.name(),
                self.state
            )))
        }
    }
}

impl Drop for ModifyLifecycle {
    fn drop(&mut self) {
        if matches!(self.state, ModifyState::Began | ModifyState::Active) {
            warn!("modify of {} dropped before it ended", self.binding.name());
        }
        self.abort();
    }
}
