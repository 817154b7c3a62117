//! End-to-End Buffered JSON Response Tests

use serde_json::{Value, json};

use mcp_e2e_shared::{McpTestClient, TestServer, init_tracing};

#[tokio::test]
async fn test_single_call_returns_object() {
    init_tracing();
    let server = TestServer::json().await.expect("server");
    let mut client = server.client();

    let response = client.initialize().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");

    let response = client
        .post(&McpTestClient::call(1, "tools/list", json!({"cursor": null})))
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"jsonrpc": "2.0", "id": 1, "result": {"method": "tools/list", "echo": {"cursor": null}}})
    );
}

#[tokio::test]
async fn test_batch_returns_array_in_call_order() {
    init_tracing();
    let server = TestServer::json().await.expect("server");
    let mut client = server.client();
    client.initialize().await.unwrap();

    let batch = json!([
        McpTestClient::call(3, "countdown", json!({"intervalMs": 10})),
        McpTestClient::call(1, "a", json!({})),
        McpTestClient::call(2, "b", json!({"_meta": {"progressToken": "ignored"}})),
    ]);
    let response = client.post(&batch).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let replies = body.as_array().expect("array body");
    let ids: Vec<i64> = replies.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert_eq!(replies[0]["result"]["done"], true);
    // progress notifications never appear in a buffered body
    assert!(replies.iter().all(|r| r.get("method").is_none()));
}
