/// Client-wide defaults applied to every call
use moray_proto::keys;
use serde_json::{Map, Value};

use crate::options::CallOptions;

/// Client configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    /// Headers sent when a call supplies none of its own
    pub default_headers: Map<String, Value>,

    /// Ask for index-only execution on queries that do not say otherwise
    pub require_indexes: bool,
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Require index-only execution for queries by default
    pub fn with_require_indexes(mut self, require: bool) -> Self {
        self.require_indexes = require;
        self
    }

    /// Caller options with client defaults filled in where the caller left
    /// a key out
    pub(crate) fn apply(&self, options: &CallOptions) -> CallOptions {
        let mut opts = options.clone();
        if !self.default_headers.is_empty() && !opts.contains_key(keys::HEADERS) {
            opts.insert(
                keys::HEADERS.to_string(),
                Value::Object(self.default_headers.clone()),
            );
        }
        opts
    }

    /// Like [`apply`](Self::apply), plus query-only defaults
    pub(crate) fn apply_query(&self, options: &CallOptions) -> CallOptions {
        let mut opts = self.apply(options);
        if self.require_indexes && !opts.contains_key(keys::REQUIRE_INDEXES) {
            opts.insert(keys::REQUIRE_INDEXES.to_string(), Value::Bool(true));
        }
        opts
    }
}
