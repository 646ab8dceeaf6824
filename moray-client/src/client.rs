/// Moray client operations
use crate::batch::{validate_batch, BatchRequest};
use crate::config::ClientConfig;
use crate::context::{RpcCall, RpcContext};
use crate::error::{ClientError, Result};
use crate::find::{Negotiation, ObjectStream};
use crate::options::{normalize, CallOptions, RequestOptions};
use crate::unary::{self, or_empty_object, Cardinality};
use moray_proto::{keys, Method, ReindexResult, VersionResult, SEND_HANDLED_OPTIONS};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Moray client bound to one RPC session
///
/// Calls take `&self`; several may be in flight at once if the transport
/// multiplexes them.
#[derive(Debug, Clone)]
pub struct Client<C> {
    ctx: C,
    config: ClientConfig,
}

fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ClientError::invalid(format!(
            "{} must be a non-empty string",
            name
        )));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(method: Method, message: Value) -> Result<T> {
    serde_json::from_value(message).map_err(|e| ClientError::MalformedResponse {
        method: method.as_str(),
        reason: e.to_string(),
    })
}

impl<C: RpcContext> Client<C> {
    /// Create a client with default configuration
    pub fn new(ctx: C) -> Self {
        Self::with_config(ctx, ClientConfig::default())
    }

    pub fn with_config(ctx: C, config: ClientConfig) -> Self {
        Self { ctx, config }
    }

    /// The underlying RPC session
    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn unary(
        &self,
        method: Method,
        args: Vec<Value>,
        opts: RequestOptions,
        cardinality: Cardinality,
    ) -> Result<Option<Value>> {
        let span = self.ctx.request_span(method, &opts);
        let mut args = args;
        args.push(opts.into_value());
        unary::execute(&self.ctx, RpcCall::new(method, args), cardinality, span).await
    }

    /// Store `value` under `key`.
    ///
    /// Returns the server's reply (typically the new `etag`), or `{}` when
    /// the server sends none.
    ///
    /// # Example
    /// ```no_run
    /// # use moray_client::{CallOptions, Client, RpcContext};
    /// # use serde_json::json;
    /// # async fn example(client: Client<impl RpcContext>) -> moray_client::Result<()> {
    /// let value = json!({"name": "Alice"}).as_object().cloned().unwrap();
    /// let reply = client.put_object("users", "alice", &value, &CallOptions::new()).await?;
    /// println!("stored with etag {}", reply["etag"]);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        value: &Map<String, Value>,
        opts: &CallOptions,
    ) -> Result<Value> {
        require_non_empty("bucket", bucket)?;
        require_non_empty("key", key)?;

        let value = Value::Object(value.clone());
        let opts = normalize(&self.config.apply(opts), Some(&value));
        let reply = self
            .unary(
                Method::PutObject,
                vec![json!(bucket), json!(key), value],
                opts,
                Cardinality::AtMostOne,
            )
            .await?;
        Ok(or_empty_object(reply))
    }

    /// Fetch the object stored under `key`
    pub async fn get_object(&self, bucket: &str, key: &str, opts: &CallOptions) -> Result<Value> {
        require_non_empty("bucket", bucket)?;
        require_non_empty("key", key)?;

        let opts = normalize(&self.config.apply(opts), None);
        let reply = self
            .unary(
                Method::GetObject,
                vec![json!(bucket), json!(key)],
                opts,
                Cardinality::ExactlyOne,
            )
            .await?;
        // ExactlyOne guarantees a message
        Ok(reply.unwrap_or_default())
    }

    /// Remove the object stored under `key`.
    ///
    /// Sent as `deleteObject`. Response messages are ignored.
    pub async fn del_object(&self, bucket: &str, key: &str, opts: &CallOptions) -> Result<()> {
        require_non_empty("bucket", bucket)?;
        require_non_empty("key", key)?;

        let opts = normalize(&self.config.apply(opts), None);
        let span = self.ctx.request_span(Method::DeleteObject, &opts);
        let call = RpcCall::new(
            Method::DeleteObject,
            vec![json!(bucket), json!(key), opts.into_value()],
        )
        .ignore_null_values();
        unary::execute(&self.ctx, call, Cardinality::Any, span).await?;
        Ok(())
    }

    /// Stream the objects matching `filter`.
    ///
    /// When the options request a guarantee the server must confirm (such as
    /// `requireIndexes`), the stream fails with
    /// [`ClientError::UnhandledOptions`] unless the server acknowledges it.
    ///
    /// # Example
    /// ```no_run
    /// # use moray_client::{CallOptions, Client, RpcContext};
    /// # use futures::StreamExt;
    /// # use serde_json::json;
    /// # async fn example(client: Client<impl RpcContext>) -> moray_client::Result<()> {
    /// let opts = json!({"requireIndexes": true, "limit": 100})
    ///     .as_object()
    ///     .cloned()
    ///     .unwrap();
    /// let mut objects = client.find_objects("users", "(name=Alice)", &opts)?;
    /// while let Some(object) = objects.next().await {
    ///     println!("{}", object?["key"]);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn find_objects(
        &self,
        bucket: &str,
        filter: &str,
        opts: &CallOptions,
    ) -> Result<ObjectStream> {
        require_non_empty("bucket", bucket)?;
        require_non_empty("filter", filter)?;

        let opts = normalize(&self.config.apply_query(opts), None);
        let negotiation = Negotiation::from_options(opts.as_map());
        let span = self.ctx.request_span(Method::FindObjects, &opts);

        let mut args = vec![json!(bucket), json!(filter), opts.into_value()];
        if negotiation.requires_ack() {
            args.push(json!({ SEND_HANDLED_OPTIONS: true }));
        }

        span.in_scope(|| debug!(negotiate = negotiation.requires_ack(), "issuing query"));
        let responses = self.ctx.call(RpcCall::new(Method::FindObjects, args));
        Ok(ObjectStream::new(responses, negotiation, span))
    }

    /// Submit several writes as one call.
    ///
    /// Every request is validated before anything is sent.
    ///
    /// # Example
    /// ```no_run
    /// # use moray_client::{BatchRequest, CallOptions, Client, RpcContext};
    /// # use serde_json::json;
    /// # async fn example(client: Client<impl RpcContext>) -> moray_client::Result<()> {
    /// let value = json!({"name": "Alice"}).as_object().cloned().unwrap();
    /// let requests = vec![
    ///     BatchRequest::put("users", "alice", value),
    ///     BatchRequest::delete("users", "bob"),
    /// ];
    /// client.batch(requests, &CallOptions::new()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn batch(&self, requests: Vec<BatchRequest>, opts: &CallOptions) -> Result<Value> {
        let mut requests = requests;
        validate_batch(&mut requests)?;

        let opts = normalize(&self.config.apply(opts), None);
        let requests = serde_json::to_value(&requests).map_err(|e| {
            ClientError::invalid(format!("batch requests are not serializable: {}", e))
        })?;
        let reply = self
            .unary(Method::Batch, vec![requests], opts, Cardinality::AtMostOne)
            .await?;
        Ok(or_empty_object(reply))
    }

    /// Set `fields` on every object matching `filter`
    pub async fn update_objects(
        &self,
        bucket: &str,
        fields: &Map<String, Value>,
        filter: &str,
        opts: &CallOptions,
    ) -> Result<Value> {
        require_non_empty("bucket", bucket)?;
        require_non_empty("filter", filter)?;

        let opts = normalize(&self.config.apply(opts), None);
        let reply = self
            .unary(
                Method::UpdateObjects,
                vec![json!(bucket), Value::Object(fields.clone()), json!(filter)],
                opts,
                Cardinality::AtMostOne,
            )
            .await?;
        Ok(or_empty_object(reply))
    }

    /// Remove every object matching `filter`
    pub async fn delete_many(
        &self,
        bucket: &str,
        filter: &str,
        opts: &CallOptions,
    ) -> Result<Value> {
        require_non_empty("bucket", bucket)?;
        require_non_empty("filter", filter)?;

        let opts = normalize(&self.config.apply(opts), None);
        let reply = self
            .unary(
                Method::DeleteMany,
                vec![json!(bucket), json!(filter)],
                opts,
                Cardinality::AtMostOne,
            )
            .await?;
        Ok(or_empty_object(reply))
    }

    /// Reindex up to `count` rows of `bucket`
    pub async fn reindex_objects(
        &self,
        bucket: &str,
        count: u32,
        opts: &CallOptions,
    ) -> Result<ReindexResult> {
        require_non_empty("bucket", bucket)?;
        if count == 0 {
            return Err(ClientError::invalid("count must be greater than zero"));
        }

        let opts = normalize(&self.config.apply(opts), None);
        let reply = self
            .unary(
                Method::ReindexObjects,
                vec![json!(bucket), json!(count)],
                opts,
                Cardinality::ExactlyOne,
            )
            .await?;
        decode(Method::ReindexObjects, reply.unwrap_or_default())
    }

    /// Check that the server is up. A deep ping also checks its backend.
    pub async fn ping(&self, deep: bool, opts: &CallOptions) -> Result<()> {
        let mut opts = self.config.apply(opts);
        opts.insert(keys::DEEP.to_string(), Value::Bool(deep));
        let opts = normalize(&opts, None);
        self.unary(Method::Ping, vec![], opts, Cardinality::Any).await?;
        Ok(())
    }

    /// Protocol version spoken by the server
    pub async fn version(&self, opts: &CallOptions) -> Result<u64> {
        let opts = normalize(&self.config.apply(opts), None);
        let reply = self
            .unary(Method::Version, vec![], opts, Cardinality::ExactlyOne)
            .await?;
        let version: VersionResult = decode(Method::Version, reply.unwrap_or_default())?;
        Ok(version.version)
    }

    /// Run a raw SQL statement and stream the resulting rows
    pub fn sql(
        &self,
        statement: &str,
        values: Vec<Value>,
        opts: &CallOptions,
    ) -> Result<ObjectStream> {
        require_non_empty("statement", statement)?;

        let opts = normalize(&self.config.apply(opts), None);
        let span = self.ctx.request_span(Method::Sql, &opts);
        let args = vec![json!(statement), Value::Array(values), opts.into_value()];
        let responses = self.ctx.call(RpcCall::new(Method::Sql, args));
        Ok(ObjectStream::new(responses, Negotiation::none(), span))
    }
}
