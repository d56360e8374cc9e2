use axum::{
    extract::{DefaultBodyLimit, FromRef, FromRequest, Multipart, Query, Request, State},
    http::header,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use axum_extra::extract::cookie::Key;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::ai::AiClient;
use crate::cache::SessionCache;
use crate::commands::{self, Command, Reply, NO_FILES_MESSAGE};
use crate::config::{Config, AI_SAMPLE_ROWS};
use crate::db;
use crate::downloader;
use crate::error::{AppError, Result};
use crate::loader::{self, has_allowed_extension, sanitize_filename};
use crate::login::{self, CurrentUser, Session, Sessions};
use crate::pager::TABLE_CLASS;
use crate::table::DataFrame;

pub const NO_DATASET_MESSAGE: &str = "Please upload and select a data file first.";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub sessions: Arc<Sessions>,
    pub cache: SessionCache,
    pub config: Arc<Config>,
    pub key: Key,
    pub ai: Option<AiClient>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    /// Open the database, prepare the upload directory and build the AI
    /// client if a key is configured
    pub async fn new(config: Config) -> Result<Self> {
        let db = db::connect(&config.database_url).await?;
        std::fs::create_dir_all(&config.upload_dir)?;

        let ai = AiClient::from_config(&config)?;
        if ai.is_none() {
            log::info!("OPENAI_API_KEY is not set; unmatched chat messages will be echoed");
        }

        Ok(AppState {
            db,
            sessions: Arc::new(Sessions::new()),
            cache: SessionCache::new(config.cache_dir.clone()),
            key: login::cookie_key(&config.secret_key),
            config: Arc::new(config),
            ai,
        })
    }
}

/// Request body read as JSON when the client says so, as a form otherwise
///
/// Bodies that fail to parse yield `T::default()` so handlers can report
/// the missing field themselves.
pub struct JsonOrForm<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default + Send,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/json"))
            .unwrap_or(false);

        let value = if is_json {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(value)| value)
                .unwrap_or_default()
        } else {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(value)| value)
                .unwrap_or_default()
        };
        Ok(JsonOrForm(value))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectFileRequest {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
}

/// Build the application router
///
/// Everything except the landing page and the account entry points sits
/// behind [`login::require_auth`].
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    let protected = Router::new()
        .route("/upload", post(upload))
        .route("/files", get(list_files))
        .route("/select_file", post(select_file))
        .route("/session_info", get(session_info))
        .route("/analyze", post(analyze))
        .route("/chat", post(chat))
        .route("/download", get(download))
        .route("/account/delete", post(login::handle_delete_account))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    Router::new()
        .route("/", get(serve_index))
        .route("/register", post(login::handle_signup))
        .route("/login", post(login::handle_login))
        .route("/logout", post(login::handle_logout))
        .merge(protected)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config).await?;
    let addr = state.config.bind_addr.clone();
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

fn current_session(state: &AppState, user: &CurrentUser) -> Result<Session> {
    state
        .sessions
        .get(&user.session_id)
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
}

/// Find the data file chat commands should read
///
/// The session's active file wins while the caller still owns it and it is
/// on disk; otherwise the caller's most recent upload is used.
async fn resolve_active_file(
    state: &AppState,
    user_id: i64,
    active: Option<&str>,
) -> Result<Option<(String, PathBuf)>> {
    if let Some(name) = active {
        let path = state.config.upload_dir.join(name);
        if db::find_file(&state.db, user_id, name).await?.is_some() && path.is_file() {
            return Ok(Some((name.to_string(), path)));
        }
    }

    Ok(db::latest_file(&state.db, user_id)
        .await?
        .map(|record| {
            let path = state.config.upload_dir.join(&record.filename);
            (record.filename, path)
        })
        .filter(|(_, path)| path.is_file()))
}

/// Resolve and load the caller's active dataset for the non-chat endpoints
async fn load_active_dataset(state: &AppState, user: &CurrentUser) -> Result<(String, DataFrame)> {
    let session = current_session(state, user)?;
    let (filename, path) = resolve_active_file(state, user.id, session.active_file.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(NO_FILES_MESSAGE.to_string()))?;
    let df = loader::load_dataframe(&path)
        .map_err(|e| AppError::Data(format!("Failed to read the uploaded file: {}", e)))?;
    Ok((filename, df))
}

async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = sanitize_filename(field.file_name().unwrap_or_default());
        if filename.is_empty() {
            return Err(AppError::BadRequest("No selected file".to_string()));
        }
        if !has_allowed_extension(&filename) {
            return Err(AppError::BadRequest("Invalid file extension".to_string()));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        tokio::fs::create_dir_all(&state.config.upload_dir).await?;
        tokio::fs::write(state.config.upload_dir.join(&filename), &data).await?;
        db::record_upload(&state.db, user.id, &filename).await?;

        log::info!(
            "User {} uploaded {} ({} bytes)",
            user.username,
            filename,
            data.len()
        );
        return Ok(Json(json!({
            "message": "File uploaded successfully",
            "filename": filename,
        })));
    }

    Err(AppError::BadRequest("No file part".to_string()))
}

async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>> {
    let files: Vec<String> = db::list_files(&state.db, user.id)
        .await?
        .into_iter()
        .map(|record| record.filename)
        .collect();
    Ok(Json(json!({ "files": files })))
}

async fn select_file(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    JsonOrForm(request): JsonOrForm<SelectFileRequest>,
) -> Result<Json<serde_json::Value>> {
    let raw = request.filename.unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(AppError::BadRequest("filename is required".to_string()));
    }

    let filename = sanitize_filename(&raw);
    if !has_allowed_extension(&filename) {
        return Err(AppError::BadRequest("Invalid file extension".to_string()));
    }

    let owned = db::find_file(&state.db, user.id, &filename).await?.is_some();
    if !owned || !state.config.upload_dir.join(&filename).is_file() {
        return Err(AppError::NotFound("File not found".to_string()));
    }

    let sid = state
        .sessions
        .set_active_file(&user.session_id, &filename)
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;
    state.cache.clear(&sid);

    log::info!("User {} selected {}", user.username, filename);
    Ok(Json(json!({ "selected": filename })))
}

async fn session_info(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>> {
    let session = current_session(&state, &user)?;
    Ok(Json(json!({
        "active_file": session.active_file,
        "username": user.username,
    })))
}

/// One-shot summary of the active dataset
async fn analyze(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>> {
    let (filename, df) = load_active_dataset(&state, &user).await?;
    let (rows, cols) = df.shape();

    let columns: Vec<serde_json::Value> = df
        .columns()
        .iter()
        .enumerate()
        .map(|(c, name)| {
            json!({
                "name": name,
                "dtype": df.column_dtype(c).to_string(),
                "non_null": df.non_null_count(c),
            })
        })
        .collect();

    Ok(Json(json!({
        "filename": filename,
        "shape": { "rows": rows, "columns": cols },
        "columns": columns,
        "averages": commands::averages_json(&df),
        "describe": df.describe().to_html(TABLE_CLASS, true),
    })))
}

/// Chat endpoint
///
/// Always answers 200 with a [`Reply`]; failures become the reply text.
async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    JsonOrForm(request): JsonOrForm<ChatRequest>,
) -> Json<Reply> {
    let message = request.message.unwrap_or_default();
    let reply = match respond(&state, &user, &message).await {
        Ok(reply) => reply,
        Err(e) => {
            log::error!("Chat request from {} failed: {}", user.username, e);
            Reply::text(e.to_string())
        }
    };
    Json(reply)
}

async fn respond(state: &AppState, user: &CurrentUser, message: &str) -> Result<Reply> {
    let session = current_session(state, user)?;

    let command = Command::parse(message);
    match command {
        Command::ShowPage(page) => return Ok(commands::show_page(&state.cache, &session.sid, page)),
        Command::Unmatched => return ai_fallback(state, user, &session, message).await,
        _ => {}
    }

    let Some((filename, path)) =
        resolve_active_file(state, user.id, session.active_file.as_deref()).await?
    else {
        return Ok(Reply::text(NO_FILES_MESSAGE));
    };

    let df = match loader::load_dataframe(&path) {
        Ok(df) => df,
        Err(e) => {
            log::warn!("Failed to read {}: {}", filename, e);
            return Ok(Reply::text(format!("Failed to read the uploaded file: {}", e)));
        }
    };

    Ok(
        commands::run(&command, &df, &state.cache, &session.sid).unwrap_or_else(|e| {
            Reply::text(format!("Error processing DataFrame command: {}", e))
        }),
    )
}

/// Answer a free-form message with the completion service
///
/// The monthly quota is checked before the call and only successful answers
/// are counted.
async fn ai_fallback(
    state: &AppState,
    user: &CurrentUser,
    session: &Session,
    message: &str,
) -> Result<Reply> {
    let Some(client) = &state.ai else {
        return Ok(Reply::text(format!("You said: {}", message)));
    };

    let month = db::current_month();
    let quota = state.config.ai_monthly_quota;
    if db::ai_queries_used(&state.db, user.id, &month).await? >= quota {
        return Ok(Reply::text(format!(
            "You have reached your monthly limit of {} AI queries.",
            quota
        )));
    }

    let Some((_, path)) =
        resolve_active_file(state, user.id, session.active_file.as_deref()).await?
    else {
        return Ok(Reply::text(NO_DATASET_MESSAGE));
    };

    let sample = match loader::load_dataframe(&path) {
        Ok(df) => downloader::to_csv(&df.head(AI_SAMPLE_ROWS)),
        Err(e) => return Ok(Reply::text(format!("Failed to read the uploaded file: {}", e))),
    };

    match client.ask(&sample, message).await {
        Ok(answer) => {
            db::record_ai_query(&state.db, user.id, &month).await?;
            Ok(Reply::text(answer))
        }
        Err(e) => {
            log::warn!("AI request for {} failed: {}", user.username, e);
            Ok(Reply::text(format!("AI service error: {}", e)))
        }
    }
}

/// Re-export the active dataset as CSV or XLSX
async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let format = query
        .format
        .as_deref()
        .unwrap_or("csv")
        .to_lowercase();
    if format != "csv" && format != "xlsx" {
        return Err(AppError::BadRequest(format!(
            "Unsupported format '{}'; use csv or xlsx",
            format
        )));
    }

    let (filename, df) = load_active_dataset(&state, &user).await?;
    let stem = Path::new(&filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("data")
        .to_string();

    let (content_type, body) = if format == "xlsx" {
        let bytes = downloader::to_xlsx(&df)
            .map_err(|e| AppError::Internal(format!("XLSX export failed: {}", e)))?;
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            bytes,
        )
    } else {
        ("text/csv; charset=utf-8", downloader::to_csv(&df).into_bytes())
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.{}\"", stem, format),
            ),
        ],
        body,
    )
        .into_response())
}
