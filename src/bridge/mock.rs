//! Scripted transport for tests.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::{BridgeError, CommandRequest, Operation, Response, Transport};

type Handler = Box<dyn Fn(&CommandRequest) -> Response + Send + Sync>;

/// Records every request and answers from per-operation handlers.
/// Operations with no handler get an empty successful response.
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<Operation, Handler>>,
    calls: Mutex<Vec<CommandRequest>>,
    unavailable: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, operation: Operation, stdout: &str) {
        let stdout = stdout.to_string();
        self.on(operation, move |_| Response::ok(&stdout));
    }

    pub fn on<F>(&self, operation: Operation, handler: F)
    where
        F: Fn(&CommandRequest) -> Response + Send + Sync + 'static,
    {
        self.handlers.lock().insert(operation, Box::new(handler));
    }

    /// Make every later call fail as if the CLI could not be spawned.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    pub fn calls(&self) -> Vec<CommandRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<CommandRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Transport for MockTransport {
    fn invoke(&self, request: &CommandRequest) -> Result<Response, BridgeError> {
        self.calls.lock().push(request.clone());
        if *self.unavailable.lock() {
            return Err(BridgeError::NotFound("mock-cli".to_string()));
        }
        let handlers = self.handlers.lock();
        Ok(match handlers.get(&request.operation) {
            Some(handler) => handler(request),
            None => Response::ok(""),
        })
    }
}
