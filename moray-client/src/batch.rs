/// Batched writes submitted as a single call
use crate::error::{ClientError, Result};
use crate::options::{serialize_value, CallOptions};
use moray_proto::keys;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of a batched sub-operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Put,
    Update,
    Delete,
    DeleteMany,
}

impl BatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperation::Put => "put",
            BatchOperation::Update => "update",
            BatchOperation::Delete => "delete",
            BatchOperation::DeleteMany => "deleteMany",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "put" => Some(BatchOperation::Put),
            "update" => Some(BatchOperation::Update),
            "delete" => Some(BatchOperation::Delete),
            "deleteMany" => Some(BatchOperation::DeleteMany),
            _ => None,
        }
    }
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sub-operation of a batch, in its wire shape.
///
/// Built with the typed constructors, or deserialized from a raw JSON
/// descriptor. Either way it is checked by [`validate_batch`] before it is
/// sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchRequest(Map<String, Value>);

impl BatchRequest {
    fn new(bucket: impl Into<String>, operation: BatchOperation) -> Self {
        let mut fields = Map::new();
        fields.insert("bucket".to_string(), Value::String(bucket.into()));
        fields.insert(
            "operation".to_string(),
            Value::String(operation.as_str().to_string()),
        );
        Self(fields)
    }

    /// Store `value` under `key`
    pub fn put(
        bucket: impl Into<String>,
        key: impl Into<String>,
        value: Map<String, Value>,
    ) -> Self {
        let mut req = Self::new(bucket, BatchOperation::Put);
        req.0.insert("key".to_string(), Value::String(key.into()));
        req.0.insert("value".to_string(), Value::Object(value));
        req
    }

    /// Set `fields` on every object matching `filter`
    pub fn update(
        bucket: impl Into<String>,
        fields: Map<String, Value>,
        filter: impl Into<String>,
    ) -> Self {
        let mut req = Self::new(bucket, BatchOperation::Update);
        req.0.insert("fields".to_string(), Value::Object(fields));
        req.0.insert("filter".to_string(), Value::String(filter.into()));
        req
    }

    /// Remove the object stored under `key`
    pub fn delete(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let mut req = Self::new(bucket, BatchOperation::Delete);
        req.0.insert("key".to_string(), Value::String(key.into()));
        req
    }

    /// Remove every object matching `filter`
    pub fn delete_many(bucket: impl Into<String>, filter: impl Into<String>) -> Self {
        let mut req = Self::new(bucket, BatchOperation::DeleteMany);
        req.0.insert("filter".to_string(), Value::String(filter.into()));
        req
    }

    /// Per-request options, e.g. an `etag` or `headers`
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.0.insert("options".to_string(), Value::Object(options));
        self
    }

    /// Send `serialized` as the legacy `_value` instead of deriving it from
    /// the structured value
    pub fn with_serialized_value(mut self, serialized: impl Into<String>) -> Self {
        self.0.insert(
            keys::SERIALIZED_VALUE.to_string(),
            Value::String(serialized.into()),
        );
        self
    }

    /// Raw descriptor, e.g. decoded from JSON
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Operation kind, `put` when unspecified
    pub fn operation(&self) -> Result<BatchOperation> {
        match self.0.get("operation") {
            None | Some(Value::Null) => Ok(BatchOperation::Put),
            Some(Value::String(op)) => BatchOperation::parse(op)
                .ok_or_else(|| ClientError::invalid(format!("unknown operation \"{}\"", op))),
            Some(_) => Err(ClientError::invalid("operation must be a string")),
        }
    }

    fn require_string(&self, field: &str) -> Result<()> {
        match self.0.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Ok(()),
            _ => Err(ClientError::invalid(format!(
                "{} must be a non-empty string",
                field
            ))),
        }
    }

    fn require_object(&self, field: &str) -> Result<()> {
        match self.0.get(field) {
            Some(Value::Object(_)) => Ok(()),
            _ => Err(ClientError::invalid(format!("{} must be an object", field))),
        }
    }

    fn validate(&mut self) -> Result<()> {
        self.require_string("bucket")?;

        match self.operation()? {
            BatchOperation::Put => {
                self.require_string("key")?;
                self.require_object("value")?;
                self.derive_serialized_value()?;
            }
            BatchOperation::Update => {
                self.require_object("fields")?;
                self.require_string("filter")?;
            }
            BatchOperation::Delete => {
                self.require_string("key")?;
            }
            BatchOperation::DeleteMany => {
                self.require_string("filter")?;
            }
        }

        match self.0.get("options") {
            None => {}
            Some(Value::Object(options)) => match options.get(keys::HEADERS) {
                None | Some(Value::Object(_)) => {}
                Some(_) => return Err(ClientError::invalid("options.headers must be an object")),
            },
            Some(_) => return Err(ClientError::invalid("options must be an object")),
        }

        Ok(())
    }

    /// `_value` is only ever the caller's explicit JSON text or the JSON of
    /// `value`; anything else would let the two diverge. An empty string
    /// counts as absent.
    fn derive_serialized_value(&mut self) -> Result<()> {
        match self.0.get(keys::SERIALIZED_VALUE) {
            Some(Value::String(s)) if !s.is_empty() => {
                if serde_json::from_str::<Value>(s).is_err() {
                    return Err(ClientError::invalid("_value must be valid JSON"));
                }
                Ok(())
            }
            Some(Value::String(_)) | None => {
                let serialized = self
                    .0
                    .get("value")
                    .map(serialize_value)
                    .unwrap_or_default();
                self.0.insert(
                    keys::SERIALIZED_VALUE.to_string(),
                    Value::String(serialized),
                );
                Ok(())
            }
            Some(_) => Err(ClientError::invalid("_value must be a string")),
        }
    }
}

/// Check every request and fill in derived fields.
///
/// Stops at the first invalid request; the error names its position.
pub fn validate_batch(requests: &mut [BatchRequest]) -> Result<()> {
    for (i, req) in requests.iter_mut().enumerate() {
        req.validate().map_err(|err| match err {
            ClientError::InvalidArgument(msg) => {
                ClientError::InvalidArgument(format!("requests[{}]: {}", i, msg))
            }
            other => other,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn raw(v: Value) -> BatchRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_put_derives_serialized_value() {
        let mut requests = vec![BatchRequest::put("users", "alice", object(json!({"a": 1})))];
        validate_batch(&mut requests).unwrap();
        assert_eq!(requests[0].get("_value"), Some(&json!(r#"{"a":1}"#)));
    }

    #[test]
    fn test_caller_serialized_value_is_kept() {
        let mut requests = vec![
            BatchRequest::put("users", "alice", object(json!({"a": 1})))
                .with_serialized_value(r#"{"a":1,"legacy":true}"#),
        ];
        validate_batch(&mut requests).unwrap();
        assert_eq!(
            requests[0].get("_value"),
            Some(&json!(r#"{"a":1,"legacy":true}"#))
        );
    }

    #[test]
    fn test_non_string_serialized_value_rejected() {
        let mut requests = vec![raw(json!({
            "bucket": "users", "key": "alice", "value": {"a": 1}, "_value": {"a": 1}
        }))];
        let err = validate_batch(&mut requests).unwrap_err();
        assert_eq!(
            err,
            ClientError::InvalidArgument("requests[0]: _value must be a string".to_string())
        );
    }

    #[test]
    fn test_malformed_serialized_value_rejected() {
        for bad in ["not json", r#"{"a":"#] {
            let mut requests = vec![
                BatchRequest::put("users", "alice", object(json!({"a": 1})))
                    .with_serialized_value(bad),
            ];
            let err = validate_batch(&mut requests).unwrap_err();
            assert_eq!(
                err,
                ClientError::InvalidArgument("requests[0]: _value must be valid JSON".to_string())
            );
        }
    }

    #[test]
    fn test_empty_serialized_value_is_derived() {
        let mut requests = vec![
            BatchRequest::put("users", "alice", object(json!({"a": 1}))).with_serialized_value(""),
        ];
        validate_batch(&mut requests).unwrap();
        assert_eq!(requests[0].get("_value"), Some(&json!(r#"{"a":1}"#)));
    }

    #[test]
    fn test_operation_defaults_to_put() {
        let req = raw(json!({"bucket": "b", "key": "k", "value": {}}));
        assert_eq!(req.operation().unwrap(), BatchOperation::Put);

        let mut requests = vec![req];
        validate_batch(&mut requests).unwrap();
        assert_eq!(requests[0].get("_value"), Some(&json!("{}")));
    }

    #[test]
    fn test_required_fields() {
        let cases = vec![
            json!({"bucket": "b", "value": {}}),
            json!({"bucket": "b", "key": "k"}),
            json!({"key": "k", "value": {}}),
            json!({"bucket": "b", "operation": "update", "filter": "(a=1)"}),
            json!({"bucket": "b", "operation": "update", "fields": {"a": 2}}),
            json!({"bucket": "b", "operation": "delete"}),
            json!({"bucket": "b", "operation": "deleteMany"}),
            json!({"bucket": "", "operation": "delete", "key": "k"}),
        ];
        for case in cases {
            let mut requests = vec![raw(case.clone())];
            assert!(
                matches!(validate_batch(&mut requests), Err(ClientError::InvalidArgument(_))),
                "expected rejection of {}",
                case
            );
        }
    }

    #[test]
    fn test_unknown_operation() {
        let mut requests = vec![
            BatchRequest::delete("b", "k"),
            raw(json!({"bucket": "b", "key": "k", "operation": "upsert"})),
        ];
        let err = validate_batch(&mut requests).unwrap_err();
        assert_eq!(
            err,
            ClientError::InvalidArgument("requests[1]: unknown operation \"upsert\"".to_string())
        );
    }

    #[test]
    fn test_headers_must_be_object() {
        let mut ok = vec![BatchRequest::delete("b", "k")
            .with_options(object(json!({"headers": {"x": "y"}, "etag": "e"})))];
        assert!(validate_batch(&mut ok).is_ok());

        let mut bad = vec![BatchRequest::delete("b", "k")
            .with_options(object(json!({"headers": "x: y"})))];
        assert!(validate_batch(&mut bad).is_err());

        let mut bad_options = vec![raw(json!({
            "bucket": "b", "operation": "delete", "key": "k", "options": 5
        }))];
        assert!(validate_batch(&mut bad_options).is_err());
    }

    #[test]
    fn test_mixed_batch_wire_shape() {
        let mut requests = vec![
            BatchRequest::put("b", "k1", object(json!({"n": 1}))),
            BatchRequest::update("b", object(json!({"n": 2})), "(n=1)"),
            BatchRequest::delete_many("b", "(n=2)"),
        ];
        validate_batch(&mut requests).unwrap();

        let wire = serde_json::to_value(&requests).unwrap();
        assert_eq!(
            wire,
            json!([
                {
                    "bucket": "b", "operation": "put", "key": "k1",
                    "value": {"n": 1}, "_value": "{\"n\":1}"
                },
                {"bucket": "b", "operation": "update", "fields": {"n": 2}, "filter": "(n=1)"},
                {"bucket": "b", "operation": "deleteMany", "filter": "(n=2)"}
            ])
        );
    }
}
