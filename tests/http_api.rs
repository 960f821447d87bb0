use bizops_dashboard_lib::config::AppConfig;
use bizops_dashboard_lib::build_app;
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base: String,
    client: reqwest::Client,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            database_path: dir.path().join("dashboard.sqlite"),
            ..AppConfig::default()
        };
        let (_core, app) = build_app(config).expect("build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn register(&self, subject: &str) {
        let response = self
            .client
            .post(self.url("/api/users/me"))
            .header("x-user-subject", subject)
            .header("x-user-name", format!("User {}", subject))
            .header("x-user-email", format!("{}@example.com", subject))
            .send()
            .await
            .expect("register");
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn post(&self, subject: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("x-user-subject", subject)
            .json(&body)
            .send()
            .await
            .expect("post")
    }

    async fn get(&self, subject: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("x-user-subject", subject)
            .send()
            .await
            .expect("get")
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start().await;
    let response = server.client.get(server.url("/health")).send().await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn requests_without_identity_are_rejected() {
    let server = TestServer::start().await;
    let response = server.client.get(server.url("/api/projects")).send().await.expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn current_user_is_created_from_headers() {
    let server = TestServer::start().await;

    let missing = server.get("alice", "/api/users/me").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.register("alice").await;
    let response = server.get("alice", "/api/users/me").await;
    assert_eq!(response.status(), StatusCode::OK);
    let user: Value = response.json().await.expect("json");
    assert_eq!(user["email"], "alice@example.com");
}

#[tokio::test]
async fn project_task_flow_updates_progress() {
    let server = TestServer::start().await;
    server.register("alice").await;

    let response = server.post("alice", "/api/projects", json!({ "name": "Relaunch" })).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let project: Value = response.json().await.expect("json");
    let project_id = project["id"].as_str().expect("id").to_string();
    assert_eq!(project["status"], "planning");

    let phase: Value = server
        .post("alice", "/api/phases", json!({ "projectId": project_id, "name": "Build" }))
        .await
        .json()
        .await
        .expect("phase");
    let phase_id = phase["id"].as_str().expect("id").to_string();

    let task: Value = server
        .post(
            "alice",
            "/api/tasks",
            json!({ "projectId": project_id, "phaseId": phase_id, "title": "Write copy" }),
        )
        .await
        .json()
        .await
        .expect("task");
    assert_eq!(task["priority"], 3);
    let task_id = task["id"].as_str().expect("id").to_string();

    let toggled = server.post("alice", &format!("/api/tasks/{}/toggle", task_id), json!({})).await;
    assert_eq!(toggled.status(), StatusCode::OK);

    let detail: Value = server
        .get("alice", &format!("/api/projects/{}", project_id))
        .await
        .json()
        .await
        .expect("detail");
    assert_eq!(detail["project"]["progress"], 100);
    assert_eq!(detail["phases"][0]["status"], "completed");

    let count: Value = server
        .get("alice", "/api/notifications/unread-count")
        .await
        .json()
        .await
        .expect("count");
    assert_eq!(count["count"], 1);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let server = TestServer::start().await;
    server.register("alice").await;
    server.register("bob").await;

    let project: Value = server
        .post("alice", "/api/projects", json!({ "name": "Secret" }))
        .await
        .json()
        .await
        .expect("project");
    let project_id = project["id"].as_str().expect("id");

    let forbidden = server.get("bob", &format!("/api/projects/{}", project_id)).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let missing = server.get("alice", "/api/projects/does-not-exist").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.expect("json");
    assert_eq!(body["code"], "NOT_FOUND");

    let invalid = server.post("alice", "/api/projects", json!({ "name": "   " })).await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let customer = json!({ "name": "Acme", "email": "a@acme.test" });
    assert_eq!(server.post("alice", "/api/customers", customer.clone()).await.status(), StatusCode::CREATED);
    assert_eq!(server.post("alice", "/api/customers", customer).await.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn dashboard_overview_is_available() {
    let server = TestServer::start().await;
    server.register("alice").await;

    let response = server.get("alice", "/api/dashboard").await;
    assert_eq!(response.status(), StatusCode::OK);
    let overview: Value = response.json().await.expect("json");
    assert_eq!(overview["openTasks"], 0);
    assert_eq!(overview["projectsByStatus"]["planning"], 0);
}
