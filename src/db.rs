//! Relational store for users and their uploaded files.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// A registered account
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,

    /// Argon2 PHC string
    #[serde(skip)]
    pub password_hash: String,

    pub created_at: DateTime<Utc>,

    /// AI questions asked during `ai_query_month`
    pub ai_query_count: i64,

    /// Month (`YYYY-MM`, UTC) the counter belongs to
    pub ai_query_month: Option<String>,
}

/// Metadata for one uploaded data file; the bytes live in the upload directory
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub user_id: i64,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        ai_query_count INTEGER NOT NULL DEFAULT 0,
        ai_query_month TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        uploaded_at TEXT NOT NULL,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        UNIQUE (user_id, filename)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_files_user_id ON files(user_id)",
];

const USER_COLUMNS: &str = "id, username, password_hash, created_at, ai_query_count, ai_query_month";
const FILE_COLUMNS: &str = "id, filename, uploaded_at, user_id";

/// Open the database and create any missing tables
///
/// In-memory databases are held on a single connection that never expires,
/// since every SQLite memory connection is its own database.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        if let Some(parent) = Path::new(options.get_filename()).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    create_all(&pool).await?;
    Ok(pool)
}

/// Create the `users` and `files` tables if they do not exist yet
pub async fn create_all(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA.iter().copied() {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Current month in the format used by the AI query counter
pub fn current_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}

pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?) RETURNING {}",
        USER_COLUMNS
    ))
    .bind(username)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn find_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn find_user(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Delete a user; their file rows go with them
///
/// # Returns
/// * `true` if a user was deleted
pub async fn delete_user(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// AI questions the user has asked in `month`
pub async fn ai_queries_used(pool: &SqlitePool, user_id: i64, month: &str) -> Result<i64, sqlx::Error> {
    let used: Option<i64> = sqlx::query_scalar(
        "SELECT CASE WHEN ai_query_month = ? THEN ai_query_count ELSE 0 END FROM users WHERE id = ?",
    )
    .bind(month)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(used.unwrap_or(0))
}

/// Count one AI question against `month`, restarting the counter when the
/// stored month differs
pub async fn record_ai_query(pool: &SqlitePool, user_id: i64, month: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET ai_query_count = CASE WHEN ai_query_month = ?1 THEN ai_query_count + 1 ELSE 1 END,
            ai_query_month = ?1
        WHERE id = ?2
        "#,
    )
    .bind(month)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record an upload, refreshing the timestamp when the user re-uploads a
/// file with the same name
pub async fn record_upload(
    pool: &SqlitePool,
    user_id: i64,
    filename: &str,
) -> Result<FileRecord, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(&format!(
        r#"
        INSERT INTO files (filename, uploaded_at, user_id) VALUES (?, ?, ?)
        ON CONFLICT (user_id, filename) DO UPDATE SET uploaded_at = excluded.uploaded_at
        RETURNING {}
        "#,
        FILE_COLUMNS
    ))
    .bind(filename)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_one(pool)
    .await
}

/// The user's files, sorted by name
pub async fn list_files(pool: &SqlitePool, user_id: i64) -> Result<Vec<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(&format!(
        "SELECT {} FROM files WHERE user_id = ? ORDER BY filename",
        FILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Look up a file by name, only if `user_id` owns it
pub async fn find_file(
    pool: &SqlitePool,
    user_id: i64,
    filename: &str,
) -> Result<Option<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(&format!(
        "SELECT {} FROM files WHERE user_id = ? AND filename = ?",
        FILE_COLUMNS
    ))
    .bind(user_id)
    .bind(filename)
    .fetch_optional(pool)
    .await
}

/// The user's most recent upload
pub async fn latest_file(pool: &SqlitePool, user_id: i64) -> Result<Option<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(&format!(
        "SELECT {} FROM files WHERE user_id = ? ORDER BY uploaded_at DESC, id DESC LIMIT 1",
        FILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
