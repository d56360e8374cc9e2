#![cfg(not(tarpaulin_include))]

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use serde::Deserialize;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::AppState;
use crate::db::{self, User};
use crate::error::{AppError, Result};

/// Name of the signed cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Credential data for login and registration
#[derive(Debug, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// Server-side state of one logged-in browser session
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub expires_at: SystemTime,

    /// Data file selected for chat commands
    pub active_file: Option<String>,

    /// Opaque id keying this session's dataset cache
    pub sid: String,
}

/// The authenticated caller, placed in request extensions by [`require_auth`]
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub session_id: String,
}

/// Active sessions, keyed by the id stored in the session cookie
#[derive(Debug, Default)]
pub struct Sessions {
    inner: RwLock<HashMap<String, Session>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for `user` and return its id
    pub fn create(&self, user: &User) -> String {
        let now = SystemTime::now();
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            user_id: user.id,
            username: user.username.clone(),
            expires_at: now + Duration::from_secs(SESSION_DURATION),
            active_file: None,
            sid: Uuid::new_v4().simple().to_string(),
        };

        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Sessions nobody looks up again are only reclaimed here
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// Look up a live session; an expired one is dropped
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(session_id) {
            Some(session) if session.expires_at > SystemTime::now() => Some(session.clone()),
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    /// Set the active file and return the session's cache id
    pub fn set_active_file(&self, session_id: &str, filename: &str) -> Option<String> {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get_mut(session_id)?;
        session.active_file = Some(filename.to_string());
        Some(session.sid.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Session> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    /// End every session belonging to `user_id`, returning them
    pub fn remove_user(&self, user_id: i64) -> Vec<Session> {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.user_id == user_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| sessions.remove(id)).collect()
    }
}

/// Derive the cookie signing key from the configured secret
///
/// The secret is stretched with SHA-512 so any length gives a full
/// 64-byte key.
pub fn cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(&digest[..])
}

/// Hash a password using Argon2id with a random salt
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a plaintext password against a stored Argon2 hash
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash format".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Register a new user
///
/// # Errors
/// * `BadRequest` if the username or password is empty
/// * `Conflict` if the username is taken
pub async fn register_user(pool: &sqlx::SqlitePool, username: &str, password: &str) -> Result<User> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "Username and password cannot be empty".to_string(),
        ));
    }

    let password_hash = hash_password(password)?;
    match db::create_user(pool, username, &password_hash).await {
        Ok(user) => Ok(user),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(AppError::Conflict("Username already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Verify user credentials
///
/// # Returns
/// * The user when the password matches, `None` for an unknown user or a
///   wrong password
pub async fn verify_user(pool: &sqlx::SqlitePool, username: &str, password: &str) -> Result<Option<User>> {
    match db::find_user_by_username(pool, username.trim()).await? {
        Some(user) if verify_password(password, &user.password_hash)? => Ok(Some(user)),
        _ => Ok(None),
    }
}

/// Handle user registration
///
/// Redirects to the landing page on success.
pub async fn handle_signup(
    State(state): State<AppState>,
    Form(credentials): Form<UserCredentials>,
) -> Result<Redirect> {
    let user = register_user(&state.db, &credentials.username, &credentials.password).await?;
    log::info!("Registered user {} (id {})", user.username, user.id);
    Ok(Redirect::to("/?registered=true"))
}

/// Handle user login
///
/// Validates credentials, starts a session and stores its id in the signed
/// session cookie.
pub async fn handle_login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Result<(SignedCookieJar, Redirect)> {
    let Some(user) = verify_user(&state.db, &credentials.username, &credentials.password).await?
    else {
        log::warn!("Failed login for {:?}", credentials.username);
        return Err(AppError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    };

    let session_id = state.sessions.create(&user);
    log::info!("User {} logged in", user.username);

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    Ok((jar.add(cookie), Redirect::to("/")))
}

/// Handle user logout
///
/// Ends the session, drops its cached dataset and clears the cookie.
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> (SignedCookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(session) = state.sessions.remove(cookie.value()) {
            state.cache.clear(&session.sid);
            log::info!("User {} logged out", session.username);
        }
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/"),
    )
}

/// Delete the caller's account
///
/// File rows are removed with the user; uploaded bytes stay on disk.
pub async fn handle_delete_account(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Extension(user): Extension<CurrentUser>,
) -> Result<(SignedCookieJar, Json<serde_json::Value>)> {
    if !db::delete_user(&state.db, user.id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    for session in state.sessions.remove_user(user.id) {
        state.cache.clear(&session.sid);
    }
    log::info!("Deleted account {} (id {})", user.username, user.id);

    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(serde_json::json!({ "deleted": user.username })),
    ))
}

/// Authentication middleware
///
/// Resolves the session cookie to a live session and exposes the caller as
/// a [`CurrentUser`] extension. Requests without one get a 401.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let user = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| {
            let session_id = cookie.value().to_string();
            state.sessions.get(&session_id).map(|s| (session_id, s))
        })
        .map(|(session_id, session)| CurrentUser {
            id: session.user_id,
            username: session.username,
            session_id,
        });

    match user {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => AppError::Unauthorized("authentication required".to_string()).into_response(),
    }
}
