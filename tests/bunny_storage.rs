use bunnysync::core::sha256_hex;
use bunnysync::storage::BunnyStorage;
use bunnysync::{Storage, SyncConfig, SyncEngine, SyncStatus};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-key";

fn entry(dir: &str, name: &str, content: &[u8]) -> serde_json::Value {
    json!({
        "Guid": "00000000-0000-0000-0000-000000000000",
        "StorageZoneName": "my-zone",
        "Path": dir,
        "ObjectName": name,
        "Length": content.len(),
        "IsDirectory": false,
        "Checksum": sha256_hex(content).to_ascii_uppercase(),
    })
}

fn directory(dir: &str, name: &str) -> serde_json::Value {
    json!({
        "Path": dir,
        "ObjectName": name,
        "Length": 0,
        "IsDirectory": true,
        "Checksum": null,
    })
}

fn storage(server: &MockServer) -> BunnyStorage {
    BunnyStorage::new("my-zone", KEY, &server.uri()).unwrap()
}

#[tokio::test]
async fn test_list_sends_access_key_and_parses_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/my-zone/assets/"))
        .and(header("AccessKey", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry("/my-zone/assets/", "app.js", b"js"),
            directory("/my-zone/assets/", "img"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let objects = storage(&server).list("assets").await.unwrap();

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].relative_path, "/my-zone/assets/app.js");
    assert_eq!(objects[0].size_bytes, 2);
    assert_eq!(objects[0].checksum_hex, sha256_hex(b"js"));
    assert!(objects[1].is_directory);
}

#[tokio::test]
async fn test_list_error_includes_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = storage(&server).list("").await.unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("401"), "{}", message);
}

#[tokio::test]
async fn test_upload_sends_checksum_and_content_type() {
    let server = MockServer::start().await;
    let content = b"hello world";
    Mock::given(method("PUT"))
        .and(path("/my-zone/docs/read%20me.txt"))
        .and(header("AccessKey", KEY))
        .and(header("Checksum", sha256_hex(content).to_ascii_uppercase().as_str()))
        .and(header("Content-Type", "text/plain"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    storage(&server)
        .upload(
            "docs/read me.txt",
            Bytes::from_static(content),
            &sha256_hex(content),
            "text/plain",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_failure_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/my-zone/gone.txt"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Object Not Found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = storage(&server).delete("gone.txt").await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_engine_against_http_zone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/my-zone/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry("/my-zone/", "b.txt", b"world"),
            entry("/my-zone/", "c.txt", b"stale"),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/my-zone/a.txt"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/my-zone/c.txt"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    std::fs::write(dir.path().join("b.txt"), b"world").unwrap();

    let engine = SyncEngine::new(Arc::new(storage(&server)), SyncConfig::default());
    let report = engine.run(dir.path()).await.unwrap();

    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(report.metrics.new_files, 1);
    assert_eq!(report.metrics.skipped_files, 1);
    assert_eq!(report.metrics.deleted_files, 1);
}
