/// Per-call options and their normalization into wire form
use moray_proto::keys;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Options supplied by the caller for a single operation
pub type CallOptions = Map<String, Value>;

/// Canonical options object sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RequestOptions(Map<String, Value>);

impl RequestOptions {
    /// Request identifier, always present after normalization
    pub fn req_id(&self) -> &str {
        self.0
            .get(keys::REQ_ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn etag(&self) -> Option<&Value> {
        self.0.get(keys::ETAG)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Build the wire options for a call.
///
/// The caller's map is copied, never modified. When `value` is given its
/// JSON form is stored under `_value` for servers that still read it.
pub fn normalize(options: &CallOptions, value: Option<&Value>) -> RequestOptions {
    let mut opts = options.clone();

    if opts.get(keys::REQ_ID).map_or(true, Value::is_null) {
        opts.insert(
            keys::REQ_ID.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
    }

    if !opts.contains_key(keys::ETAG) {
        if let Some(etag) = opts.get(keys::LEGACY_ETAG).cloned() {
            opts.insert(keys::ETAG.to_string(), etag);
        }
    }

    opts.entry(keys::HEADERS)
        .or_insert_with(|| Value::Object(Map::new()));
    opts.entry(keys::NO_COUNT).or_insert(Value::Bool(false));
    opts.entry(keys::SQL_ONLY).or_insert(Value::Bool(false));
    opts.entry(keys::NO_CACHE).or_insert(Value::Bool(true));

    if let Some(value) = value {
        opts.insert(
            keys::SERIALIZED_VALUE.to_string(),
            Value::String(serialize_value(value)),
        );
    }

    RequestOptions(opts)
}

/// JSON text of a value, as stored in the legacy `_value` field
pub(crate) fn serialize_value(value: &Value) -> String {
    // Display for Value is infallible JSON serialization
    value.to_string()
}
