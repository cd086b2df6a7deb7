use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::BridgeResult;
use crate::session::{Hook, InterruptHandle, ScriptEngine, Session};
use crate::value::ScriptValue;

type Handler = Box<dyn FnMut(Vec<ScriptValue>) -> BridgeResult<Vec<ScriptValue>> + Send>;

/// A script engine backed by Rust closures that records every hook call and
/// every stop.
pub(crate) struct RecordingEngine {
    handlers: HashMap<Hook, Handler>,
    recorder: Recorder,
    interrupt: InterruptHandle,
}

#[derive(Clone, Default)]
pub(crate) struct Recorder {
    calls: Arc<Mutex<Vec<(Hook, Vec<ScriptValue>)>>>,
    stops: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Hook> {
        self.calls.lock().unwrap().iter().map(|(h, _)| *h).collect()
    }

    pub fn args(&self, hook: Hook) -> Vec<Vec<ScriptValue>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| *h == hook)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl RecordingEngine {
    pub fn new() -> (Self, Recorder) {
        let recorder = Recorder::default();
        let engine = Self {
            handlers: HashMap::new(),
            recorder: recorder.clone(),
            interrupt: InterruptHandle::new(),
        };
        (engine, recorder)
    }

    pub fn with_hook<F>(mut self, hook: Hook, handler: F) -> Self
    where
        F: FnMut(Vec<ScriptValue>) -> BridgeResult<Vec<ScriptValue>> + Send + 'static,
    {
        self.handlers.insert(hook, Box::new(handler));
        self
    }

    pub fn into_session(self) -> Session {
        Session::from_engine(Box::new(self))
    }
}

impl ScriptEngine for RecordingEngine {
    fn has_hook(&self, hook: Hook) -> bool {
        self.handlers.contains_key(&hook)
    }

    fn call(&mut self, hook: Hook, args: Vec<ScriptValue>) -> BridgeResult<Vec<ScriptValue>> {
        self.recorder
            .calls
            .lock()
            .unwrap()
            .push((hook, args.clone()));
        match self.handlers.get_mut(&hook) {
            Some(handler) => handler(args),
            None => Ok(vec![]),
        }
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    fn stop(self: Box<Self>) {
        self.recorder.stops.fetch_add(1, Ordering::SeqCst);
    }
}
