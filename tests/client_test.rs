//! Tests for the GitLab access facade against a mock server
//!
//! These tests verify request shapes (paths, query parameters, headers and
//! bodies), the per-instance default branch cache, and how the read and
//! write retry policies react to transient failures.

use std::time::Duration;

use mockito::Matcher;
use serde_json::json;

use gitlab_mcp::gitlab::client::models::PipelineVariable;
use gitlab_mcp::gitlab::client::queries::{
    CommitAction, CommitActionKind, DiffPosition, IssueQuery, IssueUpdate, ListQuery,
    MergeOptions, NewCommit, NewIssue, NoteUpdate, Page, ProjectQuery,
};
use gitlab_mcp::gitlab::{AuthProvider, ClientOptions, GitlabClient, GitlabError, RetryPolicy};

fn fast(attempts: u32) -> (RetryPolicy, RetryPolicy) {
    let delays = (Duration::from_millis(1), Duration::from_millis(5));
    (
        RetryPolicy::reads(attempts).with_delays(delays.0, delays.1),
        RetryPolicy::writes(attempts).with_delays(delays.0, delays.1),
    )
}

fn client_for(server: &mockito::ServerGuard) -> GitlabClient {
    client_with(server, ClientOptions::new(server.url()))
}

fn client_with(server: &mockito::ServerGuard, mut options: ClientOptions) -> GitlabClient {
    options.host = server.url();
    let (reads, writes) = fast(3);
    GitlabClient::new(options, AuthProvider::personal_access_token("glpat-test"))
        .unwrap()
        .with_retry_policies(reads, writes)
}

fn project_json() -> serde_json::Value {
    json!({
        "id": 7,
        "name": "project",
        "path_with_namespace": "group/project",
        "default_branch": "main",
        "web_url": "https://gitlab.example/group/project"
    })
}

/// Tests that list calls carry paging, filters and the private token header
#[tokio::test]
async fn test_list_projects_query_shape() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/projects")
        .match_header("private-token", "glpat-test")
        .match_header("accept", "application/json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("search".into(), "api".into()),
            Matcher::UrlEncoded("membership".into(), "true".into()),
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("per_page".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([project_json()]).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let projects = client
        .list_projects(&ProjectQuery {
            search: Some("api".into()),
            membership: true,
            page: Page::new(2, 5),
        })
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].path_with_namespace, "group/project");
}

/// Tests that a namespaced project path is sent as one encoded segment
#[tokio::test]
async fn test_issue_search_encodes_project_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/projects/group%2Fproject/issues")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state".into(), "opened".into()),
            Matcher::UrlEncoded("labels".into(), "bug,ci".into()),
        ]))
        .with_status(200)
        .with_body(
            json!([{
                "iid": 3,
                "title": "Flaky job",
                "state": "opened",
                "labels": ["bug", "ci"],
                "web_url": "https://gitlab.example/group/project/-/issues/3"
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let issues = client
        .search_issues(&IssueQuery {
            project: "group/project".into(),
            state: Some("opened".into()),
            labels: vec!["bug".into(), "ci".into()],
            ..Default::default()
        })
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(issues[0].iid, 3);
}

/// Tests that the default branch is looked up once per facade instance
#[tokio::test]
async fn test_default_branch_is_cached_per_instance() {
    let mut server = mockito::Server::new_async().await;
    let project = server
        .mock("GET", "/api/v4/projects/group%2Fproject")
        .with_status(200)
        .with_body(project_json().to_string())
        .expect(1)
        .create_async()
        .await;
    let file = server
        .mock("GET", "/api/v4/projects/group%2Fproject/repository/files/src%2Fmain.rs")
        .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
        .with_status(200)
        .with_body(
            json!({
                "file_path": "src/main.rs",
                "encoding": "base64",
                "content": "aGVsbG8="
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let first = client
        .get_file("group/project", "src/main.rs", None)
        .await
        .unwrap();
    let second = client
        .get_file("group/project", "src/main.rs", Some(""))
        .await
        .unwrap();

    project.assert_async().await;
    file.assert_async().await;
    assert_eq!(first.content, "hello");
    assert_eq!(first.git_ref, "main");
    assert_eq!(second.size_bytes, 5);
    assert_eq!(
        client.default_branches().get("group/project").as_deref(),
        Some("main")
    );
    assert!(client.with_fresh_cache().default_branches().is_empty());
}

/// Tests that a 404 is terminal and reported with its status
#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/projects/missing")
        .with_status(404)
        .with_body(r#"{"message":"404 Project Not Found"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.get_project("missing").await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.http_status(), Some(404));
    assert!(err.to_string().contains("404 Project Not Found"));
}

/// Tests that reads retry 5xx until attempts run out
#[tokio::test]
async fn test_reads_retry_server_errors() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/user")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.current_user().await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.http_status(), Some(503));
}

/// Tests that a write hitting a 5xx is not repeated
#[tokio::test]
async fn test_writes_do_not_retry_server_errors() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v4/projects/7/issues")
        .with_status(502)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .create_issue(
            "7",
            &NewIssue {
                title: "t".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.http_status(), Some(502));
}

/// Tests that a rate-limited write is retried
#[tokio::test]
async fn test_writes_retry_rate_limits() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v4/projects/7/issues/3/notes")
        .match_body(Matcher::Json(json!({ "body": "hello" })))
        .with_status(429)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.add_issue_note("7", 3, "hello").await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.http_status(), Some(429));
}

/// Tests that triggering without any token fails before a request is sent
#[tokio::test]
async fn test_trigger_requires_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .trigger_pipeline("group/project", "main", None, &[])
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, GitlabError::MissingTriggerToken));
}

/// Tests the trigger form: configured token, ref and `variables[KEY]` fields
#[tokio::test]
async fn test_trigger_sends_form_with_variables() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v4/projects/group%2Fproject/trigger/pipeline")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("token".into(), "configured".into()),
            Matcher::UrlEncoded("ref".into(), "release".into()),
            Matcher::UrlEncoded("variables[DEPLOY]".into(), "yes".into()),
        ]))
        .with_status(201)
        .with_body(
            json!({
                "id": 99,
                "status": "created",
                "ref": "release",
                "sha": "abc123",
                "web_url": "https://gitlab.example/group/project/-/pipelines/99"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut options = ClientOptions::new(server.url());
    options.trigger_token = Some("configured".into());
    let client = client_with(&server, options);
    let pipeline = client
        .trigger_pipeline(
            "group/project",
            "release",
            None,
            &[PipelineVariable {
                key: "DEPLOY".into(),
                value: "yes".into(),
            }],
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(pipeline.id, 99);
    assert_eq!(pipeline.git_ref, "release");
}

/// Tests that a branch without an explicit ref starts from the default branch
#[tokio::test]
async fn test_create_branch_defaults_ref() {
    let mut server = mockito::Server::new_async().await;
    let _project = server
        .mock("GET", "/api/v4/projects/7")
        .with_status(200)
        .with_body(project_json().to_string())
        .create_async()
        .await;
    let branch = server
        .mock("POST", "/api/v4/projects/7/repository/branches")
        .match_body(Matcher::Json(json!({ "branch": "feature", "ref": "main" })))
        .with_status(201)
        .with_body(json!({ "name": "feature", "commit": { "id": "deadbeef" } }).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let created = client.create_branch("7", "feature", None).await.unwrap();

    branch.assert_async().await;
    assert_eq!(created.name, "feature");
    assert_eq!(created.commit_sha, "deadbeef");
}

/// Tests that a failing token endpoint is not hammered by the read retry policy
///
/// A refresh token is single-use; retrying the call would post it again.
#[tokio::test]
async fn test_token_endpoint_failure_is_not_retried() {
    use gitlab_mcp::gitlab::auth::token_file::{OAuthToken, write_token_file};
    use gitlab_mcp::gitlab::{AuthError, OAuthSettings};

    let mut server = mockito::Server::new_async().await;
    let refresh = server
        .mock("POST", "/oauth/token")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let user = server
        .mock("GET", "/api/v4/user")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("token.json");
    let now = chrono::Utc::now().timestamp();
    write_token_file(
        &file,
        &OAuthToken {
            access_token: "stale".into(),
            refresh_token: Some("single-use".into()),
            created_at: Some(now - 7200),
            expires_in: Some(3600),
            client_id: Some("app-id".into()),
            redirect_uri: Some("http://127.0.0.1:7777/oauth/callback".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let auth = AuthProvider::oauth(
        OAuthSettings {
            host: server.url(),
            token_file: Some(file),
            ..Default::default()
        },
        reqwest::Client::new(),
    );
    let (reads, writes) = fast(4);
    let client = GitlabClient::new(ClientOptions::new(server.url()), auth)
        .unwrap()
        .with_retry_policies(reads, writes);

    let err = client.current_user().await.unwrap_err();

    refresh.assert_async().await;
    user.assert_async().await;
    assert!(matches!(
        err,
        GitlabError::Auth(AuthError::TokenEndpoint { status: 503, .. })
    ));
}

/// Tests that an issue update is a PUT carrying only the fields that were set
#[tokio::test]
async fn test_update_issue_sends_only_set_fields() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/api/v4/projects/group%2Fproject/issues/3")
        .match_body(Matcher::Json(json!({ "state_event": "close", "labels": "" })))
        .with_status(200)
        .with_body(
            json!({
                "iid": 3,
                "title": "Flaky job",
                "state": "closed",
                "web_url": "https://gitlab.example/group/project/-/issues/3"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let issue = client
        .update_issue(
            "group/project",
            3,
            &IssueUpdate {
                state_event: Some("close".into()),
                labels: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(issue.state, "closed");
}

/// Tests branch listing with a name filter and paging
#[tokio::test]
async fn test_list_branches_query_shape() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/projects/7/repository/branches")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("search".into(), "fix".into()),
            Matcher::UrlEncoded("page".into(), "1".into()),
            Matcher::UrlEncoded("per_page".into(), "20".into()),
        ]))
        .with_status(200)
        .with_body(
            json!([{
                "name": "fix-ci",
                "protected": false,
                "commit": { "id": "deadbeef", "short_id": "deadbee", "title": "Fix CI" }
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let branches = client
        .list_branches(&ListQuery {
            project: "7".into(),
            search: Some("fix".into()),
            page: Page::new(1, 20),
        })
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(branches[0].name, "fix-ci");
    assert_eq!(branches[0].commit.as_ref().unwrap().id, "deadbeef");
}

/// Tests that an inline thread is posted with a text position
#[tokio::test]
async fn test_inline_discussion_carries_text_position() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v4/projects/7/merge_requests/12/discussions")
        .match_body(Matcher::Json(json!({
            "body": "Off by one?",
            "position": {
                "position_type": "text",
                "base_sha": "aaa",
                "start_sha": "bbb",
                "head_sha": "ccc",
                "new_path": "src/lib.rs",
                "new_line": 42
            }
        })))
        .with_status(201)
        .with_body(
            json!({
                "id": "6a9c1750b37d513a43987b574953fceb50b03ce7",
                "individual_note": false,
                "notes": [{ "id": 1, "body": "Off by one?", "resolvable": true, "resolved": false }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let position = DiffPosition {
        base_sha: "aaa".into(),
        start_sha: "bbb".into(),
        head_sha: "ccc".into(),
        new_path: Some("src/lib.rs".into()),
        new_line: Some(42),
        ..Default::default()
    };
    let discussion = client
        .create_merge_request_discussion("7", 12, "Off by one?", Some(&position))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(discussion.notes.len(), 1);
    assert!(discussion.notes[0].resolvable);
}

/// Tests that resolving a thread addresses the note inside its discussion
#[tokio::test]
async fn test_resolve_discussion_note() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/api/v4/projects/7/merge_requests/12/discussions/abc123/notes/5")
        .match_body(Matcher::Json(json!({ "resolved": true })))
        .with_status(200)
        .with_body(json!({ "id": 5, "body": "done", "resolvable": true, "resolved": true }).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let note = client
        .update_merge_request_discussion_note(
            "7",
            12,
            "abc123",
            5,
            &NoteUpdate {
                body: None,
                resolved: Some(true),
            },
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(note.resolved, Some(true));
}

/// Tests approval pinned to a head commit and its withdrawal, whose response body is ignored
#[tokio::test]
async fn test_approve_and_unapprove() {
    let mut server = mockito::Server::new_async().await;
    let approve = server
        .mock("POST", "/api/v4/projects/7/merge_requests/12/approve")
        .match_body(Matcher::Json(json!({ "sha": "ccc" })))
        .with_status(201)
        .with_body(
            json!({
                "iid": 12,
                "approved": true,
                "approvals_left": 0,
                "approved_by": [{ "user": { "id": 1, "username": "alice", "name": "Alice" } }]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let unapprove = server
        .mock("POST", "/api/v4/projects/7/merge_requests/12/unapprove")
        .with_status(201)
        .with_body("")
        .create_async()
        .await;

    let client = client_for(&server);
    let approvals = client.approve_merge_request("7", 12, Some("ccc")).await.unwrap();
    let withdrawn = client.unapprove_merge_request("7", 12).await.unwrap();

    approve.assert_async().await;
    unapprove.assert_async().await;
    assert_eq!(approvals.approvals_left, Some(0));
    assert_eq!(approvals.approved_by.len(), 1);
    assert!(withdrawn.unapproved);
}

/// Tests that a merge is a PUT carrying the requested options and is not repeated on 5xx
#[tokio::test]
async fn test_merge_sends_options_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/api/v4/projects/7/merge_requests/12/merge")
        .match_body(Matcher::Json(json!({
            "sha": "ccc",
            "squash": true,
            "merge_when_pipeline_succeeds": true
        })))
        .with_status(502)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let options = MergeOptions {
        sha: Some("ccc".into()),
        squash: Some(true),
        merge_when_pipeline_succeeds: Some(true),
        ..Default::default()
    };
    let err = client.merge_merge_request("7", 12, &options).await.unwrap_err();
    mock.assert_async().await;
    assert_eq!(err.http_status(), Some(502));
}

/// Tests that a multi-file commit posts its actions as given
#[tokio::test]
async fn test_create_commit_posts_actions() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v4/projects/group%2Fproject/repository/commits")
        .match_body(Matcher::Json(json!({
            "branch": "fix-ci",
            "start_branch": "main",
            "commit_message": "Fix CI",
            "actions": [
                { "action": "update", "file_path": ".gitlab-ci.yml", "content": "stages: [test]" },
                { "action": "delete", "file_path": "old.sh" }
            ]
        })))
        .with_status(201)
        .with_body(json!({ "id": "f00d", "short_id": "f00d", "title": "Fix CI" }).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let commit = client
        .create_commit(
            "group/project",
            &NewCommit {
                branch: "fix-ci".into(),
                commit_message: "Fix CI".into(),
                start_branch: Some("main".into()),
                actions: vec![
                    CommitAction {
                        action: CommitActionKind::Update,
                        file_path: ".gitlab-ci.yml".into(),
                        content: Some("stages: [test]".into()),
                        encoding: None,
                        last_commit_id: None,
                    },
                    CommitAction {
                        action: CommitActionKind::Delete,
                        file_path: "old.sh".into(),
                        content: None,
                        encoding: None,
                        last_commit_id: None,
                    },
                ],
            },
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(commit.id, "f00d");
}
