//! End-to-end tests of the MCP tool surface
//!
//! A real rmcp server runs behind a [`DuplexSession`] and JSON-RPC
//! messages are exchanged exactly as the HTTP transport does. GitLab is a
//! mockito server.

use serde_json::{Value, json};

use gitlab_mcp::gitlab::{AuthProvider, ClientOptions, GitlabClient};
use gitlab_mcp::policy::Policy;
use gitlab_mcp::tools::GitLabTools;
use gitlab_mcp::transport::http::duplex::DuplexSession;
use gitlab_mcp::transport::http::session::{
    ProtocolServer, handshake_request, initialized_notification,
};

fn tools(host: &str, policy: Policy) -> GitLabTools {
    let client = GitlabClient::new(
        ClientOptions::new(host),
        AuthProvider::personal_access_token("glpat-test"),
    )
    .unwrap();
    GitLabTools::new(client, policy)
}

fn open_policy() -> Policy {
    Policy::new(false, &[], &[], &[])
}

async fn session(tools: GitLabTools) -> DuplexSession {
    let session = DuplexSession::spawn(tools);
    let init = session.dispatch(handshake_request()).await.unwrap().unwrap();
    assert!(init["result"]["serverInfo"].is_object(), "{}", init);
    assert!(
        session
            .dispatch(initialized_notification())
            .await
            .unwrap()
            .is_none()
    );
    session
}

async fn call(session: &DuplexSession, id: u64, name: &str, arguments: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    });
    session.dispatch(request).await.unwrap().unwrap()
}

fn text_of(response: &Value) -> String {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Tests that tools/list exposes the catalog through the protocol
#[tokio::test]
async fn test_tools_are_listed() {
    let session = session(tools("http://127.0.0.1:9", open_policy())).await;
    let response = session
        .dispatch(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
        .await
        .unwrap()
        .unwrap();

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    for expected in [
        "gitlab_get_file",
        "gitlab_get_job_log_tail",
        "gitlab_download_job_artifacts",
        "gitlab_trigger_pipeline",
    ] {
        assert!(names.contains(&expected), "missing {}", expected);
    }
    session.close().await;
}

/// Tests a read tool end to end, including default branch resolution
#[tokio::test]
async fn test_get_file_through_protocol() {
    let mut server = mockito::Server::new_async().await;
    let _project = server
        .mock("GET", "/api/v4/projects/group%2Fproject")
        .with_status(200)
        .with_body(
            json!({
                "id": 1,
                "name": "project",
                "path_with_namespace": "group/project",
                "default_branch": "main",
                "web_url": "https://gitlab.example/group/project"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _file = server
        .mock("GET", "/api/v4/projects/group%2Fproject/repository/files/README.md")
        .match_query(mockito::Matcher::UrlEncoded("ref".into(), "main".into()))
        .with_status(200)
        .with_body(json!({ "file_path": "README.md", "encoding": "base64", "content": "aGVsbG8=" }).to_string())
        .create_async()
        .await;

    let session = session(tools(&server.url(), open_policy())).await;
    let response = call(
        &session,
        3,
        "gitlab_get_file",
        json!({ "project": "group/project", "file_path": "README.md" }),
    )
    .await;

    let payload: Value = serde_json::from_str(&text_of(&response)).unwrap();
    assert_eq!(payload["content"], "hello");
    assert_eq!(payload["ref"], "main");
    session.close().await;
}

/// Tests that a missing trigger token is reported as a tool error without calling GitLab
#[tokio::test]
async fn test_trigger_without_token_reports_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let session = session(tools(&server.url(), open_policy())).await;
    let response = call(
        &session,
        4,
        "gitlab_trigger_pipeline",
        json!({ "project": "group/project", "ref_name": "main" }),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(response["result"]["isError"], true);
    assert!(text_of(&response).contains("trigger token"));
    session.close().await;
}

/// Tests that read-only mode blocks write tools at call time
#[tokio::test]
async fn test_read_only_blocks_writes() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let policy = Policy::new(true, &[], &[], &[]);
    let session = session(tools(&server.url(), policy)).await;
    let response = call(
        &session,
        5,
        "gitlab_create_issue",
        json!({ "project": "group/project", "title": "hello" }),
    )
    .await;

    mock.assert_async().await;
    assert!(text_of(&response).contains("read-only mode"));
    session.close().await;
}

/// Tests that writes outside the project allowlist are refused
#[tokio::test]
async fn test_write_allowlist() {
    let policy = Policy::new(false, &[], &[], &["group/allowed".to_string()]);
    let session = session(tools("http://127.0.0.1:9", policy)).await;
    let response = call(
        &session,
        6,
        "gitlab_retry_job",
        json!({ "project": "group/other", "job_id": 1 }),
    )
    .await;

    assert!(text_of(&response).contains("GITLAB_MCP_WRITE_PROJECT_ALLOWLIST"));
    session.close().await;
}

/// Tests that merging and approving are blocked in read-only mode while thread listing is not
#[tokio::test]
async fn test_read_only_covers_review_tools() {
    let mut server = mockito::Server::new_async().await;
    let writes = server
        .mock("PUT", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let discussions = server
        .mock("GET", "/api/v4/projects/7/merge_requests/12/discussions")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(json!([{ "id": "abc", "individual_note": true, "notes": [] }]).to_string())
        .create_async()
        .await;

    let policy = Policy::new(true, &[], &[], &[]);
    let session = session(tools(&server.url(), policy)).await;
    let merge = call(
        &session,
        7,
        "gitlab_merge_merge_request",
        json!({ "project": "7", "mr_iid": 12 }),
    )
    .await;
    let approve = call(
        &session,
        8,
        "gitlab_approve_merge_request",
        json!({ "project": "7", "mr_iid": 12 }),
    )
    .await;
    let listed = call(
        &session,
        9,
        "gitlab_list_merge_request_discussions",
        json!({ "project": "7", "mr_iid": 12 }),
    )
    .await;

    writes.assert_async().await;
    discussions.assert_async().await;
    assert!(text_of(&merge).contains("read-only mode"));
    assert!(text_of(&approve).contains("read-only mode"));
    let payload: Value = serde_json::from_str(&text_of(&listed)).unwrap();
    assert_eq!(payload[0]["id"], "abc");
    session.close().await;
}

/// Tests that invalid update and commit arguments never reach GitLab
#[tokio::test]
async fn test_invalid_write_arguments_are_rejected_locally() {
    let mut server = mockito::Server::new_async().await;
    let mut unexpected = Vec::new();
    for method in ["GET", "POST", "PUT"] {
        unexpected.push(
            server
                .mock(method, mockito::Matcher::Any)
                .expect(0)
                .create_async()
                .await,
        );
    }

    let session = session(tools(&server.url(), open_policy())).await;
    let empty_update = call(
        &session,
        10,
        "gitlab_update_issue",
        json!({ "project": "7", "issue_iid": 3 }),
    )
    .await;
    let mixed_labels = call(
        &session,
        11,
        "gitlab_update_merge_request",
        json!({ "project": "7", "mr_iid": 12, "labels": ["a"], "add_labels": ["b"] }),
    )
    .await;
    let binary = call(
        &session,
        12,
        "gitlab_create_commit",
        json!({
            "project": "7",
            "branch": "main",
            "commit_message": "add",
            "actions": [{ "action": "create", "file_path": "a.bin", "content": "AAEC", "encoding": "base64" }]
        }),
    )
    .await;
    let half_position = call(
        &session,
        13,
        "gitlab_create_merge_request_discussion",
        json!({
            "project": "7",
            "mr_iid": 12,
            "body": "hm",
            "position": { "base_sha": "a", "start_sha": "b", "head_sha": "c", "new_path": "src/lib.rs" }
        }),
    )
    .await;

    for mock in &unexpected {
        mock.assert_async().await;
    }
    assert!(text_of(&empty_update).contains("at least one update field"));
    assert!(text_of(&mixed_labels).contains("not both"));
    assert!(text_of(&binary).contains("binary commits are refused"));
    assert!(text_of(&half_position).contains("new_line"));
    session.close().await;
}
