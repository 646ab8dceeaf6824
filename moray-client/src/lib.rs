/// Moray client library
///
/// Builds Moray RPC requests, checks the server's responses against each
/// operation's contract and negotiates optional guarantees on streamed
/// queries. The transport is supplied by the caller through [`RpcContext`].

pub mod batch;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod find;
pub mod options;
pub mod unary;

// Re-export key types
pub use batch::{validate_batch, BatchOperation, BatchRequest};
pub use client::Client;
pub use config::ClientConfig;
pub use context::{response_channel, ResponseSender, ResponseStream, RpcCall, RpcContext};
pub use error::{ClientError, Result, TransportError};
pub use find::{NegotiableOption, Negotiation, ObjectStream};
pub use moray_proto::{Method, ReindexResult};
pub use options::{normalize, CallOptions, RequestOptions};
pub use unary::Cardinality;
