use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use bucket_sync_core::{HeadResult, ObjectStore, PutOptions, S3Store, StoreError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_store(server: &MockServer) -> S3Store {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test-key", "test-secret", None, None, "test"))
        .endpoint_url(server.uri())
        .force_path_style(true)
        .build();
    S3Store::from_client(Client::from_conf(config), "site-bucket")
}

#[tokio::test]
async fn head_reports_quoted_etag() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/site-bucket/docs/index.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"5d41402abc4b2a76b9719d911017c592\"")
                .insert_header("Content-Length", "5"),
        )
        .mount(&server)
        .await;

    let store = make_store(&server);
    let head = store.head("docs/index.html").await;

    assert_eq!(
        head,
        HeadResult::found("\"5d41402abc4b2a76b9719d911017c592\"")
    );
}

#[tokio::test]
async fn head_treats_not_found_as_missing() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/site-bucket/missing.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = make_store(&server);
    let head = store.head("missing.txt").await;

    assert!(!head.exists);
    assert_eq!(head.tag, None);
}

#[tokio::test]
async fn head_treats_access_denied_as_missing() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/site-bucket/secret.txt"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let store = make_store(&server);
    assert_eq!(store.head("secret.txt").await, HeadResult::missing());
}

#[tokio::test]
async fn put_sends_content_type_and_options() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/site-bucket/docs/index.html"))
        .and(header("content-type", "text/html"))
        .and(header("x-amz-acl", "public-read"))
        .and(header("x-amz-server-side-encryption", "AES256"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc\""))
        .expect(1)
        .mount(&server)
        .await;

    let store = make_store(&server);
    let key = store
        .put(
            "docs/index.html",
            b"<html></html>".to_vec(),
            "text/html",
            &PutOptions {
                acl: Some("public-read".into()),
                server_side_encryption: Some("AES256".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(key, "docs/index.html");
}

#[tokio::test]
async fn put_surfaces_service_errors() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/site-bucket/denied.txt"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
        ))
        .mount(&server)
        .await;

    let store = make_store(&server);
    let err = store
        .put(
            "denied.txt",
            b"x".to_vec(),
            "text/plain",
            &PutOptions::default(),
        )
        .await
        .expect_err("expected access denied");

    let StoreError::Put { key, message } = err;
    assert_eq!(key, "denied.txt");
    assert!(message.contains("AccessDenied"), "unexpected message: {message}");
}
