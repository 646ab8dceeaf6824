/// Test utilities for the Moray client
///
/// Provides RPC contexts that stand in for a real transport: one that answers
/// from a script, one that hands the response channel to the test.

use futures::stream::{self, StreamExt};
use moray_client::{
    response_channel, ResponseSender, ResponseStream, RpcCall, RpcContext, TransportError,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Once;

/// Messages a scripted call answers with
pub type Script = Vec<Result<Value, TransportError>>;

/// Route client logs to the test output. `RUST_LOG` selects the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Object literal as options or values
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Context answering calls, in order, from queued scripts.
///
/// Every call is recorded. A call with no script left gets an empty response.
#[derive(Default)]
pub struct ScriptedContext {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<RpcCall>>,
}

impl ScriptedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response of the next call
    pub fn respond(self, script: Script) -> Self {
        self.scripts.lock().push_back(script);
        self
    }

    /// Calls issued so far
    pub fn calls(&self) -> Vec<RpcCall> {
        self.calls.lock().clone()
    }

    /// The only call issued; panics otherwise
    pub fn single_call(&self) -> RpcCall {
        let calls = self.calls.lock();
        assert_eq!(calls.len(), 1, "expected exactly one call, got {:?}", *calls);
        calls[0].clone()
    }
}

impl RpcContext for ScriptedContext {
    fn call(&self, call: RpcCall) -> ResponseStream {
        self.calls.lock().push(call);
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        stream::iter(script).boxed()
    }
}

/// Context that gives the test the sending side of every response
#[derive(Default)]
pub struct ChannelContext {
    senders: Mutex<Vec<ResponseSender>>,
    calls: Mutex<Vec<RpcCall>>,
    capacity: usize,
}

impl ChannelContext {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Sender for the response of the `n`th call
    pub fn sender(&self, n: usize) -> ResponseSender {
        self.senders.lock()[n].clone()
    }

    /// Stop feeding every response, ending the streams
    pub fn close_all(&self) {
        self.senders.lock().clear();
    }

    pub fn calls(&self) -> Vec<RpcCall> {
        self.calls.lock().clone()
    }
}

impl RpcContext for ChannelContext {
    fn call(&self, call: RpcCall) -> ResponseStream {
        self.calls.lock().push(call);
        let (tx, rx) = response_channel(self.capacity.max(1));
        self.senders.lock().push(tx);
        rx
    }
}
