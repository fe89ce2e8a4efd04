//! End-to-end tests for the `find` command against a wiremock GraphQL endpoint

use cve_finder::Host;
use serde_json::json;
use std::fs;
use std::path::Path;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test host that captures output to in-memory buffers.
struct TestHost {
    output_buf: Vec<u8>,
    error_buf: Vec<u8>,
    exit_code: Option<i32>,
}

impl TestHost {
    const fn new() -> Self {
        Self {
            output_buf: Vec::new(),
            error_buf: Vec::new(),
            exit_code: None,
        }
    }

    fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output_buf).into_owned()
    }

    fn error_str(&self) -> String {
        String::from_utf8_lossy(&self.error_buf).into_owned()
    }
}

impl Host for TestHost {
    fn output(&mut self) -> impl std::io::Write {
        &mut self.output_buf
    }

    fn error(&mut self) -> impl std::io::Write {
        &mut self.error_buf
    }

    fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }
}

fn write_config(dir: &Path, server: &MockServer) -> String {
    let path = dir.join("tuning.toml");
    fs::write(&path, format!("endpoint = \"{}\"\n", server.uri())).expect("Failed to write config");
    path.to_str().expect("temp path is UTF-8").to_string()
}

fn node(url: &str, description: &str) -> serde_json::Value {
    json!({
        "url": url,
        "description": description,
        "isEmpty": false,
        "repositoryTopics": {"nodes": [{"topic": {"name": "security"}}]}
    })
}

async fn mount_search(server: &MockServer, nodes: Vec<serde_json::Value>) {
    let count = nodes.len();

    Mock::given(method("POST"))
        .and(body_string_contains("query SearchCount("))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"search": {"repositoryCount": count}}
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("query SearchPage("))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "search": {
                    "repositoryCount": count,
                    "pageInfo": {"endCursor": "Y3Vyc29yOjE=", "hasNextPage": false},
                    "nodes": nodes
                }
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_find_writes_results_for_matching_repositories() {
    let server = MockServer::start().await;
    mount_search(
        &server,
        vec![
            node("https://github.com/alice/poc", "PoC for CVE-2021-0001"),
            node("https://github.com/bob/exploit", "exploit for cve_2021_0001"),
            node("https://github.com/carol/notes", "nothing to see"),
        ],
    )
    .await;

    Mock::given(method("POST"))
        .and(body_string_contains("query Document("))
        .and(body_string_contains("carol"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"repository": {"object": {"text": "Mitigation notes for CVE–2019–11510"}}}
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("query Document("))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"repository": {"object": null}}
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let config = write_config(tmp.path(), &server);
    let out = tmp.path().join("out");
    let json_path = tmp.path().join("report.json");

    let mut host = TestHost::new();
    cve_finder::run(
        &mut host,
        [
            "cve-finder",
            "find",
            "--token",
            "secret",
            "--query",
            "\"foo\" in:name",
            "--scope",
            "--config",
            config.as_str(),
            "--color",
            "never",
            "-o",
            out.to_str().unwrap(),
            "--json",
            json_path.to_str().unwrap(),
        ],
    )
    .await
    .unwrap();

    assert_eq!(host.exit_code, None);

    let expected = "CVE-2019-11510 - https://github.com/carol/notes\n\
                    CVE-2021-0001 - https://github.com/alice/poc\n\
                    CVE-2021-0001 - https://github.com/bob/exploit\n";
    assert_eq!(fs::read_to_string(out.join("results.txt")).unwrap(), expected);
    assert_eq!(host.output_str(), expected);

    assert_eq!(
        fs::read_to_string(out.join("CVE-2021-0001.txt")).unwrap(),
        "https://github.com/alice/poc\nhttps://github.com/bob/exploit\n"
    );

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(report["repositories"].as_array().unwrap().len(), 3);
    assert!(host.error_str().contains("Finished"));

    let requests = server.received_requests().await.unwrap();
    let count_body = requests
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .find(|body| body.contains("query SearchCount("))
        .unwrap();
    let count_json: serde_json::Value = serde_json::from_str(&count_body).unwrap();
    let search = count_json["variables"]["query"].as_str().unwrap();
    assert!(search.starts_with("\"foo\" in:name created:2008-02-08T00:00:00Z.."));
}

#[tokio::test]
async fn test_find_failure_flushes_and_exits_with_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let config = write_config(tmp.path(), &server);
    let out = tmp.path().join("out");

    let mut host = TestHost::new();
    cve_finder::run(
        &mut host,
        [
            "cve-finder",
            "find",
            "--token",
            "wrong",
            "--query",
            "cve",
            "--config",
            config.as_str(),
            "--color",
            "never",
            "--silent",
            "-o",
            out.to_str().unwrap(),
        ],
    )
    .await
    .unwrap();

    assert_eq!(host.exit_code, Some(1));
    assert!(host.error_str().contains("Bad credentials"));
    assert_eq!(fs::read_to_string(out.join("results.txt")).unwrap(), "");
    assert!(host.output_str().is_empty());
}

#[tokio::test]
async fn test_init_then_find_with_generated_config() {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let config = tmp.path().join("cve-finder.toml");

    let mut host = TestHost::new();
    cve_finder::run(&mut host, ["cve-finder", "init", config.to_str().unwrap()])
        .await
        .unwrap();

    let text = fs::read_to_string(&config).unwrap();
    assert!(text.contains("batch_size = 10"));
    assert!(host.output_str().contains("Generated default configuration file"));
}
