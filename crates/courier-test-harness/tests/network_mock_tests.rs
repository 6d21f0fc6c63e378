use courier_test_harness::network::header_value;
use courier_test_harness::*;

#[tokio::test]
async fn test_mock_get_json() {
    let server = TestHttpServer::start().await;

    server
        .get_json("/posts/1", &serde_json::json!({ "id": 1, "title": "hello" }))
        .await;

    let response = reqwest::get(server.url_for("/posts/1")).await.unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["title"], "hello");
}

#[tokio::test]
async fn test_mock_builder_matches_headers_and_body() {
    let server = TestHttpServer::start().await;

    MockBuilder::post("/posts")
        .with_header("X-Api-Key", "k")
        .with_json_body(&serde_json::json!({ "title": "foo" }))
        .expect(1)
        .respond_with(responses::created())
        .mount(&server)
        .await;

    let response = reqwest::Client::new()
        .post(server.url_for("/posts"))
        .header("X-Api-Key", "k")
        .json(&serde_json::json!({ "title": "foo" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let recorded = server.requests_to("/posts").await;
    assert_eq!(header_value(&recorded[0], "x-api-key").as_deref(), Some("k"));
}

#[tokio::test]
async fn test_mock_sequence() {
    let server = TestHttpServer::start().await;

    server
        .sequence(
            "/data",
            vec![
                responses::service_unavailable(),
                responses::json(200, &serde_json::json!({ "ok": true })),
            ],
        )
        .await;

    let client = reqwest::Client::new();
    let r1 = client.get(server.url_for("/data")).send().await.unwrap();
    assert_eq!(r1.status(), 503);

    let r2 = client.get(server.url_for("/data")).send().await.unwrap();
    assert_eq!(r2.status(), 200);

    server.verify_received("/data", 2).await;
}

#[tokio::test]
async fn test_status_endpoint_and_reset() {
    let server = TestHttpServer::start().await;
    server.status("/gone", 404).await;

    let response = reqwest::Client::new()
        .delete(server.url_for("/gone"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    server.reset().await;
    assert!(server.received_requests().await.is_empty());
}
