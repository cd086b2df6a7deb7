use log::debug;
use sail_lua_common::config::SessionConfig;

use crate::binding::TableBinding;
use crate::error::BridgeResult;
use crate::filter::Condition;
use crate::scan::ScanLifecycle;
use crate::session::{Hook, Session};
use crate::value::ScriptValue;

/// Size and cost estimates reported by a table script.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanEstimates {
    pub rows: f64,
    /// Average row width in bytes, if the script provided one.
    pub width: Option<i32>,
    pub startup_cost: f64,
    pub total_cost: f64,
}

impl Default for ScanEstimates {
    fn default() -> Self {
        Self {
            rows: 0.0,
            width: None,
            startup_cost: 0.0,
            total_cost: 0.0,
        }
    }
}

/// The outcome of planning a scan: the estimates and the session that
/// produced them. The session either moves into the scan or is stopped by
/// [`PlannedScan::abandon`].
#[derive(Debug)]
pub struct PlannedScan {
    binding: TableBinding,
    estimates: ScanEstimates,
    session: Session,
}

impl PlannedScan {
    pub fn estimates(&self) -> &ScanEstimates {
        &self.estimates
    }

    pub fn binding(&self) -> &TableBinding {
        &self.binding
    }

    pub fn into_scan(self, conditions: Vec<Condition>) -> ScanLifecycle {
        ScanLifecycle::new(self.binding, self.session, conditions)
    }

    pub fn abandon(self) {
        debug!("abandoning planned scan of {}", self.binding.name());
        self.session.stop();
    }
}

/// Starts a session for the table and asks the script for its estimates.
pub fn plan(binding: TableBinding, config: &SessionConfig) -> BridgeResult<PlannedScan> {
    let session = Session::start(binding.source(), config)?;
    plan_with_session(binding, session)
}

/// Plans a scan using a session that is already started.
pub fn plan_with_session(binding: TableBinding, mut session: Session) -> BridgeResult<PlannedScan> {
    let context = binding.script_context();
    let estimates = match estimate(&mut session, &context) {
        Ok(estimates) => estimates,
        Err(e) => {
            session.stop();
            return Err(e);
        }
    };
    debug!("planned scan of {}: {estimates:?}", binding.name());
    Ok(PlannedScan {
        binding,
        estimates,
        session,
    })
}

fn estimate(session: &mut Session, context: &ScriptValue) -> BridgeResult<ScanEstimates> {
    let mut number = |hook: Hook| -> BridgeResult<Option<f64>> {
        let results = session.call(hook, vec![context.clone()], 1)?;
        Ok(results
            .first()
            .and_then(ScriptValue::as_f64)
            .filter(|v| v.is_finite()))
    };
    let rows = number(Hook::EstimateRowCount)?.unwrap_or(0.0);
    let width = number(Hook::EstimateRowWidth)?.map(|w| w.round() as i32);
    let startup_cost = number(Hook::EstimateStartupCost)?.unwrap_or(0.0);
    let total_cost = number(Hook::EstimateTotalCost)?.unwrap_or(startup_cost + rows);
    Ok(ScanEstimates {
        rows,
        width,
        startup_cost,
        total_cost,
    })
}
