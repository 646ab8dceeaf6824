/// Calls answered by a bounded number of data messages
use crate::context::{RpcCall, RpcContext};
use crate::error::{ClientError, Result};
use futures::StreamExt;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn, Instrument, Span};

/// Number of data messages an operation may receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ExactlyOne,
    AtMostOne,
    /// Messages are drained and ignored
    Any,
}

impl Cardinality {
    pub fn accepts(&self, received: usize) -> bool {
        match self {
            Cardinality::ExactlyOne => received == 1,
            Cardinality::AtMostOne => received <= 1,
            Cardinality::Any => true,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::ExactlyOne => f.write_str("exactly 1"),
            Cardinality::AtMostOne => f.write_str("at most 1"),
            Cardinality::Any => f.write_str("any number of"),
        }
    }
}

/// Issue `call` and check the response against `cardinality`.
///
/// The response is always read to the end so that a transport error arriving
/// after surplus messages is still reported as such. Returns the first
/// message, if any.
pub(crate) async fn execute<C: RpcContext + ?Sized>(
    ctx: &C,
    call: RpcCall,
    cardinality: Cardinality,
    span: Span,
) -> Result<Option<Value>> {
    collect(ctx, call, cardinality).instrument(span).await
}

async fn collect<C: RpcContext + ?Sized>(
    ctx: &C,
    call: RpcCall,
    cardinality: Cardinality,
) -> Result<Option<Value>> {
    let method = call.method.as_str();
    debug!(args = call.args.len(), "issuing call");

    let mut responses = ctx.call(call);
    let mut first = None;
    let mut received = 0usize;

    while let Some(message) = responses.next().await {
        let message = message?;
        received += 1;
        if first.is_none() {
            first = Some(message);
        }
    }

    if !cardinality.accepts(received) {
        warn!(%cardinality, received, "response cardinality violated");
        return Err(ClientError::ProtocolCardinality {
            method,
            expected: cardinality,
            received,
        });
    }

    debug!(received, "call complete");
    Ok(first)
}

/// Message of an at-most-one call, or an empty object when none was sent
pub(crate) fn or_empty_object(message: Option<Value>) -> Value {
    message.unwrap_or_else(|| Value::Object(Default::default()))
}
