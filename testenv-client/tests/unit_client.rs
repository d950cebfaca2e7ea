use serde::Deserialize;
use testenv_client::{ClientError, TestClient, TestResponse};
use testenv_common::BaseAddress;

// Helper: a client aimed at the given mockito server URL.
fn client_for(server_url: &str) -> TestClient {
    TestClient::new(&BaseAddress::parse(server_url).unwrap())
}

#[test]
fn test_url_joins_with_single_separator() {
    let client = TestClient::new(&BaseAddress::localhost(8090).unwrap());
    assert_eq!(client.url("/ping"), "http://localhost:8090/ping");
    assert_eq!(client.url("ping"), "http://localhost:8090/ping");
    assert_eq!(client.base().port(), 8090);
}

#[test]
fn test_url_with_prefix() {
    let client = TestClient::new(&BaseAddress::parse("http://localhost:8090/api").unwrap());
    assert_eq!(client.url("/ping"), "http://localhost:8090/api/ping");
}

#[test]
fn test_response_is_success() {
    let ok = TestResponse { status: 204, body: String::new() };
    let missing = TestResponse { status: 404, body: String::new() };
    assert!(ok.is_success());
    assert!(!missing.is_success());
}

#[test]
fn test_response_json() {
    #[derive(Deserialize, Debug, PartialEq)]
    struct Health {
        status: String,
    }

    let response = TestResponse { status: 200, body: r#"{"status":"ok"}"#.to_string() };
    assert_eq!(response.json::<Health>().unwrap(), Health { status: "ok".to_string() });

    let garbage = TestResponse { status: 200, body: "nope".to_string() };
    assert!(matches!(garbage.json::<Health>(), Err(ClientError::Decode(_))));
}

#[tokio::test]
async fn test_get_returns_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/ping")
        .with_status(200)
        .with_body("pong")
        .create_async()
        .await;

    let response = client_for(&server.url()).get("/ping").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response, TestResponse { status: 200, body: "pong".to_string() });
}

#[tokio::test]
async fn test_get_non_success_status_is_not_an_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .with_body("not here")
        .create_async()
        .await;

    let response = client_for(&server.url()).get("missing").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_post_sends_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/echo")
        .match_body("hello")
        .with_status(201)
        .with_body("created")
        .create_async()
        .await;

    let response = client_for(&server.url()).post("/echo", "hello").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 201);
    assert_eq!(response.body, "created");
}

#[tokio::test]
async fn test_delete() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/items/1")
        .with_status(204)
        .create_async()
        .await;

    let response = client_for(&server.url()).delete("/items/1").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = TestClient::new(&BaseAddress::new("http", "127.0.0.1", port, None).unwrap());

    assert!(matches!(client.get("/ping").await, Err(ClientError::Network(_))));
}
