use switchyard::http::request::{Method, Request, RequestBuilder};

fn get(path: &str) -> RequestBuilder {
    RequestBuilder::new().method(Method::GET).path(path)
}

#[test]
fn test_request_header_retrieval() {
    let req = get("/")
        .header("Host", "example.com")
        .header("Content-Type", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_header_lookup_ignores_case() {
    let req = get("/").header("X-Request-Id", "abc").build().unwrap();

    assert_eq!(req.header("x-request-id"), Some("abc"));
    assert_eq!(req.header("X-REQUEST-ID"), Some("abc"));
}

#[test]
fn test_request_repeated_header_returns_first_value() {
    let req = get("/")
        .header("Accept", "text/html")
        .header("accept", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("Accept"), Some("text/html"));
}

#[test]
fn test_request_content_length_parsing() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .path("/api")
        .header("Content-Length", "42")
        .build()
        .unwrap();

    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_missing_or_invalid() {
    let missing = get("/").build().unwrap();
    let invalid = get("/").header("Content-Length", "nope").build().unwrap();

    assert_eq!(missing.content_length(), 0);
    assert_eq!(invalid.content_length(), 0);
}

#[test]
fn test_request_query_is_split_from_path() {
    let req = get("/search?q=rust%20lang&page=2").build().unwrap();

    assert_eq!(req.path(), "/search");
    assert_eq!(req.query(), Some("q=rust%20lang&page=2"));
    assert_eq!(req.query_param("q"), Some("rust lang".to_string()));
    assert_eq!(req.query_param("page"), Some("2".to_string()));
    assert_eq!(req.query_param("missing"), None);
}

#[test]
fn test_request_without_query() {
    let req = get("/plain").build().unwrap();

    assert_eq!(req.path(), "/plain");
    assert_eq!(req.query(), None);
    assert_eq!(req.query_param("q"), None);
}

#[test]
fn test_request_websocket_upgrade_detection() {
    let upgrade = get("/ws").header("upgrade", "WebSocket").build().unwrap();
    let plain = get("/ws").build().unwrap();
    let other = get("/ws").header("Upgrade", "h2c").build().unwrap();

    assert!(upgrade.is_websocket_upgrade());
    assert!(!plain.is_websocket_upgrade());
    assert!(!other.is_websocket_upgrade());
}

#[test]
fn test_request_default_version() {
    let req: Request = get("/").build().unwrap();
    assert_eq!(req.version(), "HTTP/1.1");
}

#[test]
fn test_request_builder_requires_method_and_path() {
    assert!(RequestBuilder::new().path("/").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}

#[test]
fn test_request_method_from_string() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("POST"), Some(Method::POST));
    assert_eq!(Method::from_str("PUT"), Some(Method::PUT));
    assert_eq!(Method::from_str("PATCH"), Some(Method::PATCH));
    assert_eq!(Method::from_str("DELETE"), Some(Method::DELETE));
    assert_eq!(Method::from_str("HEAD"), None);
    assert_eq!(Method::from_str("OPTIONS"), None);
    assert_eq!(Method::from_str("get"), None); // Case-sensitive
}

#[test]
fn test_request_with_body() {
    let body_content = b"test body content".to_vec();
    let req = RequestBuilder::new()
        .method(Method::POST)
        .path("/api")
        .body(body_content.clone())
        .build()
        .unwrap();

    assert_eq!(req.body(), body_content.as_slice());
}
