//! Test utilities shared by the integration tests.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use datachat::config::Config;
use datachat::{build_router, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "datachat-test-boundary";

/// A router over a scratch directory and an in-memory database.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build the app after letting the caller adjust the configuration
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = Config::for_dirs(dir.path().join("uploads"), dir.path().join("cache"));
        adjust(&mut config);

        let state = AppState::new(config)
            .await
            .expect("Failed to create app state");
        let router = build_router(state.clone());

        TestApp {
            router,
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body)
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn form(uri: &str, cookie: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body)).unwrap()
    }

    pub async fn register(&self, username: &str, password: &str) -> StatusCode {
        let body = format!("username={}&password={}", username, password);
        let (status, _, _) = self.send(Self::form("/register", None, body)).await;
        status
    }

    /// Log in and return the `Cookie` header value for later requests
    pub async fn login(&self, username: &str, password: &str) -> Option<String> {
        let body = format!("username={}&password={}", username, password);
        let (status, headers, _) = self.send(Self::form("/login", None, body)).await;
        if status != StatusCode::SEE_OTHER {
            return None;
        }
        headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|pair| pair.to_string())
    }

    /// Register `username` with a fixed password and log in
    pub async fn user(&self, username: &str) -> String {
        assert_eq!(self.register(username, "secret").await, StatusCode::SEE_OTHER);
        self.login(username, "secret").await.expect("login failed")
    }

    pub async fn get_json(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send_json(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, cookie: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send_json(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_form(&self, uri: &str, cookie: &str, body: &str) -> (StatusCode, Value) {
        self.send_json(Self::form(uri, Some(cookie), body.to_string()))
            .await
    }

    /// Upload `contents` as a multipart field named `field`
    pub async fn upload_field(
        &self,
        cookie: &str,
        field: &str,
        filename: &str,
        contents: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap();
        self.send_json(request).await
    }

    pub async fn upload(&self, cookie: &str, filename: &str, contents: &str) -> (StatusCode, Value) {
        self.upload_field(cookie, "file", filename, contents.as_bytes())
            .await
    }

    pub async fn select(&self, cookie: &str, filename: &str) -> (StatusCode, Value) {
        self.post_json(
            "/select_file",
            Some(cookie),
            serde_json::json!({ "filename": filename }),
        )
        .await
    }

    /// Send a chat message and return the reply body
    pub async fn chat(&self, cookie: &str, message: &str) -> Value {
        let (status, body) = self
            .post_json("/chat", Some(cookie), serde_json::json!({ "message": message }))
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    /// Number of session snapshots in the cache directory
    pub fn cached_snapshots(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.state.config.cache_dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".bin.gz"))
            .count()
    }
}

/// CSV with `n` rows of `id,name,score`
#[allow(dead_code)]
pub fn numbered_csv(n: usize) -> String {
    let mut csv = String::from("id,name,score\n");
    for i in 0..n {
        csv.push_str(&format!("{},row{},{}.5\n", i, i, i));
    }
    csv
}
