/// End-to-end tests of the unary operations
///
/// Each test drives a `Client` over a scripted context and checks both what
/// went on the wire and what the caller got back.

use moray_client::{
    CallOptions, Cardinality, Client, ClientConfig, ClientError, Method, TransportError,
};
use moray_test_utils::{init_tracing, object, ScriptedContext};
use serde_json::{json, Value};

fn client(ctx: ScriptedContext) -> Client<ScriptedContext> {
    init_tracing();
    Client::new(ctx)
}

fn wire_options(args: &[Value]) -> &serde_json::Map<String, Value> {
    args.last().and_then(Value::as_object).expect("options are the last argument")
}

#[tokio::test]
async fn test_put_object_wire_shape() {
    let client = client(ScriptedContext::new().respond(vec![Ok(json!({"etag": "E1"}))]));
    let value = object(json!({"name": "Alice", "age": 30}));
    let opts = object(json!({"req_id": "r-1", "_etag": "E0"}));

    let reply = client.put_object("users", "alice", &value, &opts).await.unwrap();
    assert_eq!(reply, json!({"etag": "E1"}));

    let call = client.context().single_call();
    assert_eq!(call.method, Method::PutObject);
    assert_eq!(&call.args[..3], &[json!("users"), json!("alice"), json!(value)]);

    let wire = wire_options(&call.args);
    assert_eq!(wire["req_id"], json!("r-1"));
    assert_eq!(wire["etag"], json!("E0"));
    assert_eq!(wire["_value"], json!(r#"{"name":"Alice","age":30}"#));
    assert_eq!(wire["noCache"], json!(true));

    // the caller's options are left as they were
    assert_eq!(opts, object(json!({"req_id": "r-1", "_etag": "E0"})));
}

#[tokio::test]
async fn test_put_object_without_reply_returns_empty_object() {
    let client = client(ScriptedContext::new());
    let reply = client
        .put_object("users", "alice", &object(json!({})), &CallOptions::new())
        .await
        .unwrap();
    assert_eq!(reply, json!({}));
}

#[tokio::test]
async fn test_put_object_rejects_two_messages() {
    let client = client(
        ScriptedContext::new().respond(vec![Ok(json!({"etag": "a"})), Ok(json!({"etag": "b"}))]),
    );
    let err = client
        .put_object("users", "alice", &object(json!({})), &CallOptions::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ClientError::ProtocolCardinality {
            method: "putObject",
            expected: Cardinality::AtMostOne,
            received: 2,
        }
    );
}

#[tokio::test]
async fn test_get_object_requires_exactly_one_message() {
    let record = json!({"bucket": "users", "key": "alice", "value": {"name": "Alice"}});
    let client = client(
        ScriptedContext::new()
            .respond(vec![Ok(record.clone())])
            .respond(vec![])
            .respond(vec![Ok(record.clone()), Ok(record.clone())]),
    );

    assert_eq!(
        client.get_object("users", "alice", &CallOptions::new()).await.unwrap(),
        record
    );

    for received in [0, 2] {
        let err = client
            .get_object("users", "alice", &CallOptions::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::ProtocolCardinality {
                method: "getObject",
                expected: Cardinality::ExactlyOne,
                received,
            }
        );
    }
}

#[tokio::test]
async fn test_get_object_passes_transport_error_through() {
    let not_found = TransportError::remote("ObjectNotFoundError", "users::alice does not exist");
    let client = client(ScriptedContext::new().respond(vec![Err(not_found.clone())]));

    let err = client
        .get_object("users", "alice", &CallOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::Transport(not_found));
    assert_eq!(err.code(), "TRANSPORT_ERROR");
}

#[tokio::test]
async fn test_del_object_tolerates_null_messages() {
    let client = client(ScriptedContext::new().respond(vec![Ok(Value::Null), Ok(Value::Null)]));
    client
        .del_object("users", "alice", &CallOptions::new())
        .await
        .unwrap();

    let call = client.context().single_call();
    assert_eq!(call.method.as_str(), "deleteObject");
    assert!(call.ignore_null_values);
    assert_eq!(&call.args[..2], &[json!("users"), json!("alice")]);
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_the_wire() {
    let client = client(ScriptedContext::new());
    let opts = CallOptions::new();

    let results = vec![
        client.get_object("", "alice", &opts).await.map(|_| ()),
        client.get_object("users", "", &opts).await.map(|_| ()),
        client.del_object("users", "", &opts).await,
        client.delete_many("users", "", &opts).await.map(|_| ()),
        client
            .update_objects("users", &object(json!({"a": 1})), "", &opts)
            .await
            .map(|_| ()),
        client.reindex_objects("users", 0, &opts).await.map(|_| ()),
        client.find_objects("users", "", &opts).map(|_| ()),
    ];

    for result in results {
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }
    assert!(client.context().calls().is_empty());
}

#[tokio::test]
async fn test_update_objects_and_delete_many() {
    let client = client(
        ScriptedContext::new()
            .respond(vec![Ok(json!({"count": 3}))])
            .respond(vec![]),
    );
    let fields = object(json!({"status": "archived"}));

    let updated = client
        .update_objects("users", &fields, "(age>=30)", &CallOptions::new())
        .await
        .unwrap();
    assert_eq!(updated, json!({"count": 3}));

    let deleted = client
        .delete_many("users", "(status=archived)", &CallOptions::new())
        .await
        .unwrap();
    assert_eq!(deleted, json!({}));

    let calls = client.context().calls();
    assert_eq!(calls[0].method, Method::UpdateObjects);
    assert_eq!(
        &calls[0].args[..3],
        &[json!("users"), json!(fields), json!("(age>=30)")]
    );
    assert!(wire_options(&calls[0].args).get("_value").is_none());
    assert_eq!(calls[1].method, Method::DeleteMany);
    assert_eq!(&calls[1].args[..2], &[json!("users"), json!("(status=archived)")]);
}

#[tokio::test]
async fn test_reindex_objects() {
    let client = client(
        ScriptedContext::new()
            .respond(vec![Ok(json!({"processed": 100, "remaining": 20}))])
            .respond(vec![Ok(json!({"remaining": 20}))]),
    );

    let result = client
        .reindex_objects("users", 100, &CallOptions::new())
        .await
        .unwrap();
    assert_eq!(result.processed, 100);
    assert_eq!(result.remaining, Some(20));
    assert_eq!(client.context().calls()[0].args[1], json!(100));

    let err = client
        .reindex_objects("users", 100, &CallOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::MalformedResponse { method: "reindexObjects", .. }
    ));
}

#[tokio::test]
async fn test_mutation_cardinality_contracts() {
    let two = || vec![Ok(json!({})), Ok(json!({}))];
    let cases = [
        (Method::UpdateObjects, two(), Cardinality::AtMostOne, 2),
        (Method::DeleteMany, two(), Cardinality::AtMostOne, 2),
        (Method::ReindexObjects, vec![], Cardinality::ExactlyOne, 0),
        (Method::ReindexObjects, two(), Cardinality::ExactlyOne, 2),
    ];

    for (method, script, expected, received) in cases {
        let client = client(ScriptedContext::new().respond(script));
        let opts = CallOptions::new();
        let err = match method {
            Method::UpdateObjects => client
                .update_objects("users", &object(json!({"a": 1})), "(a=0)", &opts)
                .await
                .unwrap_err(),
            Method::DeleteMany => client.delete_many("users", "(a=0)", &opts).await.unwrap_err(),
            _ => client.reindex_objects("users", 10, &opts).await.unwrap_err(),
        };
        assert_eq!(
            err,
            ClientError::ProtocolCardinality {
                method: method.as_str(),
                expected,
                received,
            },
            "{}",
            method.as_str()
        );
    }
}

#[tokio::test]
async fn test_ping_and_version() {
    let client = client(
        ScriptedContext::new()
            .respond(vec![])
            .respond(vec![Ok(json!({"version": 3}))]),
    );

    client.ping(true, &CallOptions::new()).await.unwrap();
    assert_eq!(client.version(&CallOptions::new()).await.unwrap(), 3);

    let calls = client.context().calls();
    assert_eq!(calls[0].method, Method::Ping);
    assert_eq!(wire_options(&calls[0].args)["deep"], json!(true));
    assert_eq!(calls[1].method, Method::Version);
}

#[tokio::test]
async fn test_config_headers_are_defaults_only() {
    init_tracing();
    let config = ClientConfig::new().with_header("x-tenant", "acme");
    let ctx = ScriptedContext::new()
        .respond(vec![])
        .respond(vec![])
        .respond(vec![])
        .respond(vec![Ok(json!({"version": 1}))]);
    let client = Client::with_config(ctx, config);

    client
        .del_object("users", "alice", &CallOptions::new())
        .await
        .unwrap();
    client
        .del_object("users", "bob", &object(json!({"headers": {"x-tenant": "other"}})))
        .await
        .unwrap();
    client.ping(false, &CallOptions::new()).await.unwrap();
    assert_eq!(client.version(&CallOptions::new()).await.unwrap(), 1);

    let calls = client.context().calls();
    assert_eq!(wire_options(&calls[0].args)["headers"], json!({"x-tenant": "acme"}));
    assert_eq!(wire_options(&calls[1].args)["headers"], json!({"x-tenant": "other"}));
    assert_eq!(calls[2].method, Method::Ping);
    assert_eq!(wire_options(&calls[2].args)["headers"], json!({"x-tenant": "acme"}));
    assert_eq!(calls[3].method, Method::Version);
    assert_eq!(wire_options(&calls[3].args)["headers"], json!({"x-tenant": "acme"}));
}
