/// Streamed queries and negotiation of server-side guarantees
///
/// Some options change what a query result means. `requireIndexes`, for
/// example, asks the server to refuse sequential scans. Servers that predate
/// such an option silently ignore it, so the client asks the server to
/// confirm which ones it honored. The confirmation comes back as a metadata
/// record ahead of the data records. An option that is never confirmed fails
/// the query instead of yielding results the caller cannot trust.

use crate::context::ResponseStream;
use crate::error::{ClientError, Result};
use futures::stream::{FusedStream, Stream, StreamExt};
use moray_proto::{keys, HandledOptions};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn, Span};

/// Guarantees that need the server's explicit acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NegotiableOption {
    /// The query must be answered from an index, never a sequential scan
    RequireIndexes,
}

impl NegotiableOption {
    pub const ALL: [NegotiableOption; 1] = [NegotiableOption::RequireIndexes];

    /// Name used both in the options and in `_handledOptions`
    pub fn wire_name(&self) -> &'static str {
        match self {
            NegotiableOption::RequireIndexes => keys::REQUIRE_INDEXES,
        }
    }

    /// Whether `options` asks for this guarantee
    pub fn is_requested(&self, options: &Map<String, Value>) -> bool {
        match self {
            NegotiableOption::RequireIndexes => {
                options.get(keys::REQUIRE_INDEXES) == Some(&Value::Bool(true))
            }
        }
    }
}

/// Acknowledgment state of every requested guarantee
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Negotiation {
    acknowledged: BTreeMap<NegotiableOption, bool>,
}

impl Negotiation {
    /// Collect the guarantees requested by `options`
    pub fn from_options(options: &Map<String, Value>) -> Self {
        let acknowledged = NegotiableOption::ALL
            .iter()
            .filter(|opt| opt.is_requested(options))
            .map(|opt| (*opt, false))
            .collect();
        Self { acknowledged }
    }

    /// A negotiation with nothing to acknowledge
    pub fn none() -> Self {
        Self::default()
    }

    /// True when the server has to send a metadata record
    pub fn requires_ack(&self) -> bool {
        !self.acknowledged.is_empty()
    }

    /// Mark every requested guarantee the server reports as handled
    pub fn acknowledge(&mut self, handled: &HandledOptions) {
        for (opt, acked) in self.acknowledged.iter_mut() {
            if handled.contains(opt.wire_name()) {
                *acked = true;
            }
        }
    }

    /// Wire names of requested guarantees not yet acknowledged
    pub fn unacknowledged(&self) -> Vec<String> {
        self.acknowledged
            .iter()
            .filter(|(_, acked)| !**acked)
            .map(|(opt, _)| opt.wire_name().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nothing received yet; the first record may be metadata
    AwaitingFirst,
    Forwarding,
    Terminated,
}

/// Records of a streamed query, in server order.
///
/// Yields each record, then ends. A failure is yielded once and ends the
/// stream. Dropping the stream releases the underlying request.
pub struct ObjectStream {
    inner: ResponseStream,
    negotiation: Negotiation,
    phase: Phase,
    span: Span,
}

impl ObjectStream {
    pub(crate) fn new(inner: ResponseStream, negotiation: Negotiation, span: Span) -> Self {
        Self {
            inner,
            negotiation,
            phase: Phase::AwaitingFirst,
            span,
        }
    }

    /// Negotiation state as observed so far
    pub fn negotiation(&self) -> &Negotiation {
        &self.negotiation
    }

    /// Read every remaining record, stopping at the first error
    pub async fn collect_all(mut self) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record?);
        }
        Ok(records)
    }

    fn fail_unhandled(&mut self) -> Poll<Option<Result<Value>>> {
        let unhandled = self.negotiation.unacknowledged();
        warn!(options = ?unhandled, "server did not acknowledge requested options");
        self.phase = Phase::Terminated;
        Poll::Ready(Some(Err(ClientError::UnhandledOptions(unhandled))))
    }
}

impl Stream for ObjectStream {
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let span = this.span.clone();
        let _enter = span.enter();

        loop {
            if this.phase == Phase::Terminated {
                return Poll::Ready(None);
            }

            let message = match this.inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(message) => message,
            };

            match message {
                Some(Err(err)) => {
                    this.phase = Phase::Terminated;
                    return Poll::Ready(Some(Err(err.into())));
                }
                None => {
                    if this.phase == Phase::AwaitingFirst && this.negotiation.requires_ack() {
                        return this.fail_unhandled();
                    }
                    debug!("query complete");
                    this.phase = Phase::Terminated;
                    return Poll::Ready(None);
                }
                Some(Ok(record)) if this.phase == Phase::Forwarding => {
                    return Poll::Ready(Some(Ok(record)));
                }
                Some(Ok(record)) => {
                    this.phase = Phase::Forwarding;

                    if !this.negotiation.requires_ack() {
                        return Poll::Ready(Some(Ok(record)));
                    }

                    // A data record first means the server sent no metadata
                    let Some(handled) = HandledOptions::from_record(&record) else {
                        return this.fail_unhandled();
                    };
                    debug!(handled = ?handled.handled_options, "received handled options");
                    this.negotiation.acknowledge(&handled);

                    if !this.negotiation.unacknowledged().is_empty() {
                        return this.fail_unhandled();
                    }
                    // metadata record consumed; read the next one
                }
            }
        }
    }
}

impl FusedStream for ObjectStream {
    fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("negotiation", &self.negotiation)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
