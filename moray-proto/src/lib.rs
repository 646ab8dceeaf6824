/// Wire vocabulary for the Moray RPC protocol
///
/// Method names, reserved field names and the small set of records whose
/// shape the client relies on. Method names must match the server exactly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved field marking the negotiation metadata record of a streamed query
pub const HANDLED_OPTIONS_FIELD: &str = "_handledOptions";

/// Internal option asking the server to prepend a metadata record
pub const SEND_HANDLED_OPTIONS: &str = "sendHandledOptions";

/// Option keys understood by the server
pub mod keys {
    pub const REQ_ID: &str = "req_id";
    pub const ETAG: &str = "etag";
    pub const LEGACY_ETAG: &str = "_etag";
    pub const HEADERS: &str = "headers";
    pub const NO_COUNT: &str = "no_count";
    pub const SQL_ONLY: &str = "sql_only";
    pub const NO_CACHE: &str = "noCache";
    pub const SERIALIZED_VALUE: &str = "_value";
    pub const REQUIRE_INDEXES: &str = "requireIndexes";
    pub const DEEP: &str = "deep";
}

/// RPC methods exposed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    PutObject,
    GetObject,
    DeleteObject,
    FindObjects,
    Batch,
    UpdateObjects,
    DeleteMany,
    ReindexObjects,
    Ping,
    Version,
    Sql,
}

impl Method {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::PutObject => "putObject",
            Method::GetObject => "getObject",
            Method::DeleteObject => "deleteObject",
            Method::FindObjects => "findObjects",
            Method::Batch => "batch",
            Method::UpdateObjects => "updateObjects",
            Method::DeleteMany => "deleteMany",
            Method::ReindexObjects => "reindexObjects",
            Method::Ping => "ping",
            Method::Version => "version",
            Method::Sql => "sql",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata record sent ahead of the data records of a streamed query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HandledOptions {
    #[serde(rename = "_handledOptions")]
    pub handled_options: Vec<String>,
}

impl HandledOptions {
    /// Extract the metadata from a record, if it is one.
    ///
    /// Entries that are not strings are skipped; a field that is not a list
    /// counts as an empty acknowledgment.
    pub fn from_record(record: &Value) -> Option<Self> {
        let field = record.as_object()?.get(HANDLED_OPTIONS_FIELD)?;
        let handled_options = field
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { handled_options })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handled_options.iter().any(|n| n == name)
    }
}

/// Result of a reindexObjects call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexResult {
    /// Rows reindexed by this call
    pub processed: u64,
    /// Rows left to reindex, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a version call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResult {
    pub version: u64,
}
