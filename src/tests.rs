//! Integration tests for the recipe version service.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, init_snapshot_database};
use crate::services::VersionControl;
use crate::{create_router, AppState};

const API_KEY: &str = "test-api-key";
const USER: &str = "u1";

/// Test fixture for integration tests.
struct TestFixture {
    /// Sends the API key and a user id.
    client: Client,
    /// Sends the API key only.
    anonymous: Client,
    base_url: String,
    snapshot_pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_options(Some(API_KEY.to_string()), 5).await
    }

    async fn with_options(psk: Option<String>, commit_retries: u32) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("metadata.sqlite");
        let snapshot_db_path = temp_dir.path().join("snapshots.sqlite");

        let metadata = init_database(&db_path).await.expect("Failed to init DB");
        let snapshot_pool = init_snapshot_database(&snapshot_db_path)
            .await
            .expect("Failed to init snapshot DB");

        let config = Config {
            api_psk: psk.clone(),
            db_path,
            snapshot_db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            log_json: false,
            request_timeout: Duration::from_secs(30),
            commit_retries,
            orphan_grace: Duration::from_secs(300),
        };

        let state = AppState {
            vcs: Arc::new(VersionControl::new(
                metadata,
                snapshot_pool.clone(),
                commit_retries,
            )),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut anonymous_headers = reqwest::header::HeaderMap::new();
        if let Some(key) = &psk {
            anonymous_headers.insert("x-api-key", key.parse().unwrap());
        }
        let mut headers = anonymous_headers.clone();
        headers.insert("x-user-id", USER.parse().unwrap());

        TestFixture {
            client: Client::builder().default_headers(headers).build().unwrap(),
            anonymous: Client::builder()
                .default_headers(anonymous_headers)
                .build()
                .unwrap(),
            base_url,
            snapshot_pool,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    /// Initialize a recipe and return its main branch.
    async fn init(&self, recipe_id: i64, serving_size: i64) -> Value {
        let (status, branch) = self
            .post(
                &format!("/recipes/{}/init", recipe_id),
                json!({ "content": recipe(serving_size) }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "init failed: {}", branch);
        branch
    }

    async fn commit(&self, branch_id: &str, message: &str, serving_size: i64) -> Value {
        let (status, commit) = self
            .post(
                &format!("/branches/{}/commit", branch_id),
                json!({ "message": message, "content": recipe(serving_size) }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "commit failed: {}", commit);
        commit
    }

    async fn history(&self, branch_id: &str) -> Vec<Value> {
        let (status, body) = self
            .get(&format!("/branches/{}/history", branch_id))
            .await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().unwrap().clone()
    }
}

fn recipe(serving_size: i64) -> Value {
    json!({
        "servingSize": serving_size,
        "ingredients": [{ "name": "Flour", "unit": "cups", "amount": 2.0 }],
        "steps": [{ "order": 1, "details": "Mix" }]
    })
}

fn id(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

fn assert_error(status: StatusCode, body: &Value, expected: StatusCode, code: &str) {
    assert_eq!(status, expected, "unexpected body: {}", body);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], code);
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/recipes/1/branches"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/recipes/1/branches"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_auth_bearer_token() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/recipes/1/branches"))
        .header("authorization", format!("Bearer {}", API_KEY))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_auth_disabled_without_psk() {
    let fixture = TestFixture::with_options(None, 5).await;

    let resp = Client::new()
        .get(fixture.url("/recipes/1/branches"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/recipes/1/branches"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "req-42");

    let resp = fixture
        .client
        .get(fixture.url("/recipes/1/branches"))
        .send()
        .await
        .unwrap();
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let fixture = TestFixture::new().await;

    // Init
    let main = fixture.init(1, 4).await;
    assert_eq!(main["name"], "main");
    assert_eq!(main["recipeId"], 1);
    let main_id = id(&main);
    let root_head = main["headCommitId"].as_str().unwrap().to_string();
    assert_eq!(fixture.history(&main_id).await.len(), 1);

    // Branch
    let (status, feature) = fixture
        .post(
            "/recipes/1/branches",
            json!({ "branchName": "feature", "sourceBranchId": main_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feature["name"], "feature");
    assert_eq!(feature["headCommitId"], root_head.as_str());
    let feature_id = id(&feature);

    // Commit
    let commit = fixture.commit(&feature_id, "bump serving", 6).await;
    assert_eq!(commit["parentId"], root_head.as_str());
    assert_eq!(commit["authorId"], USER);
    assert_eq!(commit["message"], "bump serving");

    // History
    let history = fixture.history(&feature_id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["id"], commit["id"]);
    assert_eq!(history[1]["id"], root_head.as_str());

    // Changes
    let (status, changes) = fixture
        .get(&format!("/commits/{}/changes", id(&commit)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(changes["firstCommit"], false);
    assert_eq!(changes["old"]["servingSize"], 4);
    assert_eq!(changes["current"]["servingSize"], 6);
    assert_eq!(
        changes["patch"],
        json!([{ "op": "replace", "path": "/servingSize", "value": 6, "fromValue": 4 }])
    );

    // Commit details
    let (status, details) = fixture.get(&format!("/commits/{}", id(&commit))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["commit"]["id"], commit["id"]);
    assert_eq!(details["content"]["servingSize"], 6);
    assert_eq!(details["content"]["ingredients"][0]["name"], "Flour");

    // Second init fails
    let (status, body) = fixture
        .post("/recipes/1/init", json!({ "content": recipe(4) }))
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "CONFLICT");

    let (_, branches) = fixture.get("/recipes/1/branches").await;
    let names: Vec<&str> = branches
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"main"));
    assert!(names.contains(&"feature"));
}

#[tokio::test]
async fn test_branch_names_are_unique_per_recipe() {
    let fixture = TestFixture::new().await;
    let main_id = id(&fixture.init(1, 4).await);
    let body = json!({ "branchName": "feature", "sourceBranchId": main_id });

    let (status, _) = fixture.post("/recipes/1/branches", body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = fixture.post("/recipes/1/branches", body.clone()).await;
    assert_error(status, &err, StatusCode::BAD_REQUEST, "CONFLICT");

    let (status, other) = fixture.post("/recipes/2/branches", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(other["recipeId"], 2);
}

#[tokio::test]
async fn test_fork_is_not_affected_by_source_commits() {
    let fixture = TestFixture::new().await;
    let main = fixture.init(1, 4).await;
    let main_id = id(&main);

    let (_, feature) = fixture
        .post(
            "/recipes/1/branches",
            json!({ "branchName": "feature", "sourceBranchId": main_id }),
        )
        .await;
    let (_, copy) = fixture
        .post(&format!("/branches/{}/copy", main_id), json!({ "recipeId": 7 }))
        .await;

    fixture.commit(&main_id, "second", 5).await;
    fixture.commit(&main_id, "third", 6).await;
    assert_eq!(fixture.history(&main_id).await.len(), 3);

    for fork in [&feature, &copy] {
        let history = fixture.history(&id(fork)).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["id"], main["headCommitId"]);
    }

    let (_, branches) = fixture.get("/recipes/7/branches").await;
    assert_eq!(branches[0]["headCommitId"], main["headCommitId"]);
}

#[tokio::test]
async fn test_copy_recipe() {
    let fixture = TestFixture::new().await;
    let main_id = id(&fixture.init(1, 4).await);
    let head = fixture.commit(&main_id, "second", 5).await;

    // Copy needs no user id
    let resp = fixture
        .anonymous
        .post(fixture.url(&format!("/branches/{}/copy", main_id)))
        .json(&json!({ "recipeId": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let copy: Value = resp.json().await.unwrap();
    assert_eq!(copy["name"], "main");
    assert_eq!(copy["recipeId"], 2);
    assert_eq!(copy["headCommitId"], head["id"]);
    assert_eq!(fixture.history(&id(&copy)).await.len(), 2);

    // The copy commits on its own
    let own = fixture.commit(&id(&copy), "diverge", 8).await;
    assert_eq!(own["parentId"], head["id"]);
    assert_eq!(fixture.history(&main_id).await.len(), 2);

    // Target already initialized
    let (status, err) = fixture
        .post(&format!("/branches/{}/copy", main_id), json!({ "recipeId": 2 }))
        .await;
    assert_error(status, &err, StatusCode::BAD_REQUEST, "CONFLICT");
}

#[tokio::test]
async fn test_first_commit_changes() {
    let fixture = TestFixture::new().await;
    let main = fixture.init(1, 4).await;

    let (status, changes) = fixture
        .get(&format!(
            "/commits/{}/changes",
            main["headCommitId"].as_str().unwrap()
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(changes["firstCommit"], true);
    assert_eq!(
        changes["old"],
        json!({ "ingredients": [], "steps": [], "images": [] })
    );
    assert_eq!(changes["current"]["servingSize"], 4);

    let patch = changes["patch"].as_array().unwrap();
    assert!(patch.iter().all(|op| op["op"] == "add"));
    assert!(patch
        .iter()
        .any(|op| op["path"] == "/servingSize" && op["value"] == 4));
}

#[tokio::test]
async fn test_not_found_errors() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/branches/missing/history").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "NOT_FOUND");

    let (status, body) = fixture.get("/commits/missing").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "NOT_FOUND");

    let (status, body) = fixture.get("/commits/missing/changes").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "NOT_FOUND");

    let (status, body) = fixture
        .post(
            "/branches/missing/commit",
            json!({ "message": "m", "content": recipe(4) }),
        )
        .await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "NOT_FOUND");

    let (status, body) = fixture
        .post("/branches/missing/copy", json!({ "recipeId": 3 }))
        .await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "NOT_FOUND");

    let (status, body) = fixture
        .post(
            "/recipes/1/branches",
            json!({ "branchName": "feature", "sourceBranchId": "missing" }),
        )
        .await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "NOT_FOUND");

    let (status, body) = fixture.get("/recipes/99/branches").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_validation_errors() {
    let fixture = TestFixture::new().await;

    // Serving size below one
    let (status, body) = fixture
        .post("/recipes/1/init", json!({ "content": recipe(0) }))
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "VALIDATION_ERROR");

    // No ingredients
    let mut content = recipe(4);
    content["ingredients"] = json!([]);
    let (status, body) = fixture
        .post("/recipes/1/init", json!({ "content": content }))
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "VALIDATION_ERROR");

    // Nothing was written by the rejected calls
    let (_, branches) = fixture.get("/recipes/1/branches").await;
    assert_eq!(branches, json!([]));

    let main_id = id(&fixture.init(1, 4).await);

    // Blank commit message
    let (status, body) = fixture
        .post(
            &format!("/branches/{}/commit", main_id),
            json!({ "message": "  ", "content": recipe(5) }),
        )
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "VALIDATION_ERROR");

    // Step without details
    let mut content = recipe(5);
    content["steps"][0]["details"] = json!("");
    let (status, body) = fixture
        .post(
            &format!("/branches/{}/commit", main_id),
            json!({ "message": "m", "content": content }),
        )
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "VALIDATION_ERROR");
    assert_eq!(fixture.history(&main_id).await.len(), 1);

    // Blank branch name
    let (status, body) = fixture
        .post(
            "/recipes/1/branches",
            json!({ "branchName": "", "sourceBranchId": main_id }),
        )
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_malformed_requests() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/recipes/1/init"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = fixture.get("/recipes/abc/branches").await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "BAD_REQUEST");
}

#[tokio::test]
async fn test_writes_require_user_id() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .anonymous
        .post(fixture.url("/recipes/1/init"))
        .json(&json!({ "content": recipe(4) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // The legacy header name is accepted
    let resp = fixture
        .anonymous
        .post(fixture.url("/recipes/1/init"))
        .header("user-id", "legacy-user")
        .json(&json!({ "content": recipe(4) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let main: Value = resp.json().await.unwrap();

    let history = fixture.history(&id(&main)).await;
    assert_eq!(history[0]["authorId"], "legacy-user");
    assert_eq!(history[0]["message"], "create recipe.");
}

#[tokio::test]
async fn test_concurrent_commits_form_a_chain() {
    let fixture = Arc::new(TestFixture::with_options(Some(API_KEY.to_string()), 10).await);
    let main_id = id(&fixture.init(1, 1).await);

    let mut handles = Vec::new();
    for i in 0..5 {
        let fixture = fixture.clone();
        let main_id = main_id.clone();
        handles.push(tokio::spawn(async move {
            fixture
                .post(
                    &format!("/branches/{}/commit", main_id),
                    json!({ "message": format!("c{}", i), "content": recipe(i + 2) }),
                )
                .await
        }));
    }
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK, "commit failed: {}", body);
    }

    let history = fixture.history(&main_id).await;
    assert_eq!(history.len(), 6);

    // Newest first, each commit's parent is the next entry
    for pair in history.windows(2) {
        assert_eq!(pair[0]["parentId"], pair[1]["id"]);
    }
    assert!(history[5]["parentId"].is_null());

    let (_, branches) = fixture.get("/recipes/1/branches").await;
    assert_eq!(branches[0]["headCommitId"], history[0]["id"]);
}

#[tokio::test]
async fn test_snapshot_store_failure_leaves_branch_unchanged() {
    let fixture = TestFixture::new().await;
    let main = fixture.init(1, 4).await;
    let main_id = id(&main);

    fixture.snapshot_pool.close().await;

    let (status, body) = fixture
        .post(
            &format!("/branches/{}/commit", main_id),
            json!({ "message": "lost", "content": recipe(6) }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");

    let history = fixture.history(&main_id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], main["headCommitId"]);
}

#[tokio::test]
async fn test_concurrent_commit_without_retries_is_rejected() {
    let fixture = Arc::new(TestFixture::with_options(Some(API_KEY.to_string()), 1).await);
    let main_id = id(&fixture.init(1, 1).await);

    let mut landed = 0;
    let mut rejected = Vec::new();
    for round in 0..20 {
        let mut handles = Vec::new();
        for i in 0..8 {
            let fixture = fixture.clone();
            let main_id = main_id.clone();
            handles.push(tokio::spawn(async move {
                fixture
                    .post(
                        &format!("/branches/{}/commit", main_id),
                        json!({ "message": format!("r{}c{}", round, i), "content": recipe(i + 2) }),
                    )
                    .await
            }));
        }
        for handle in handles {
            let (status, body) = handle.await.unwrap();
            if status == StatusCode::OK {
                landed += 1;
            } else {
                rejected.push((status, body));
            }
        }
        if !rejected.is_empty() {
            break;
        }
    }

    assert!(!rejected.is_empty(), "no commit lost the race");
    for (status, body) in &rejected {
        assert_error(*status, body, StatusCode::CONFLICT, "VERSION_MISMATCH");
        let current = body["error"]["details"]["currentVersion"].as_i64().unwrap();
        assert!(current > 1, "stale version reported: {}", body);
    }

    // Rejected commits leave no trace on the branch
    let history = fixture.history(&main_id).await;
    assert_eq!(history.len(), landed + 1);
    for pair in history.windows(2) {
        assert_eq!(pair[0]["parentId"], pair[1]["id"]);
    }
}

#[tokio::test]
async fn test_slow_request_times_out_with_error_body() {
    let app = crate::with_middleware(
        axum::Router::new().route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        ),
        Duration::from_millis(50),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let resp = Client::new()
        .get(format!("http://{}/slow", addr))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_error(status, &body, StatusCode::REQUEST_TIMEOUT, "REQUEST_TIMEOUT");
}
