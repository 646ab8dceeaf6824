/// The RPC session consumed by every operation
///
/// The transport (connection setup, framing, authentication, reconnects) lives
/// outside this crate. It plugs in by implementing [`RpcContext`].

use crate::error::TransportError;
use crate::options::RequestOptions;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use moray_proto::Method;
use serde_json::Value;
use tracing::Span;

/// Data messages of one call, ending after the last message or a single error
pub type ResponseStream = BoxStream<'static, std::result::Result<Value, TransportError>>;

/// One RPC invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: Method,
    /// Positional arguments, in wire order
    pub args: Vec<Value>,
    /// Tolerate trailing null fields in the response envelope
    pub ignore_null_values: bool,
}

impl RpcCall {
    pub fn new(method: Method, args: Vec<Value>) -> Self {
        Self {
            method,
            args,
            ignore_null_values: false,
        }
    }

    pub fn ignore_null_values(mut self) -> Self {
        self.ignore_null_values = true;
        self
    }
}

/// An active transport session.
///
/// Calls may be issued concurrently; implementations provide whatever
/// synchronization they need.
pub trait RpcContext: Send + Sync {
    /// Issue a call and return its response messages.
    ///
    /// Dropping the returned stream must release the request.
    fn call(&self, call: RpcCall) -> ResponseStream;

    /// Span that scopes diagnostics for one call
    fn request_span(&self, method: Method, options: &RequestOptions) -> Span {
        tracing::debug_span!("moray_rpc", method = method.as_str(), req_id = options.req_id())
    }
}

impl<C: RpcContext + ?Sized> RpcContext for std::sync::Arc<C> {
    fn call(&self, call: RpcCall) -> ResponseStream {
        (**self).call(call)
    }

    fn request_span(&self, method: Method, options: &RequestOptions) -> Span {
        (**self).request_span(method, options)
    }
}

/// Sending half of a [`response_channel`]
#[derive(Clone)]
pub struct ResponseSender {
    tx: mpsc::Sender<std::result::Result<Value, TransportError>>,
}

impl ResponseSender {
    /// Deliver a data message, waiting while the channel is full.
    ///
    /// Returns false once the receiving side has been dropped.
    pub async fn send(&mut self, message: Value) -> bool {
        self.tx.send(Ok(message)).await.is_ok()
    }

    /// Deliver a terminal error. Consumes the sender so nothing follows it.
    pub async fn fail(mut self, error: TransportError) {
        let _ = self.tx.send(Err(error)).await;
    }

    /// True once the caller stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Bounded channel a transport can use to feed a [`ResponseStream`].
///
/// The stream ends when every sender is dropped.
pub fn response_channel(capacity: usize) -> (ResponseSender, ResponseStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (ResponseSender { tx }, rx.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_response_channel_delivers_in_order() {
        let (mut tx, mut rx) = response_channel(1);

        let producer = tokio::spawn(async move {
            assert!(tx.send(json!({"n": 1})).await);
            assert!(tx.send(json!({"n": 2})).await);
            tx.fail(TransportError::Connection("reset".to_string())).await;
        });

        assert_eq!(rx.next().await, Some(Ok(json!({"n": 1}))));
        assert_eq!(rx.next().await, Some(Ok(json!({"n": 2}))));
        assert_eq!(
            rx.next().await,
            Some(Err(TransportError::Connection("reset".to_string())))
        );
        assert_eq!(rx.next().await, None);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_sender() {
        let (mut tx, rx) = response_channel(4);
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.send(json!({})).await);
    }

    #[test]
    fn test_rpc_call_flags() {
        let call = RpcCall::new(Method::DeleteObject, vec![json!("b"), json!("k")]);
        assert!(!call.ignore_null_values);
        assert!(call.ignore_null_values().ignore_null_values);
    }
}
