use crate::db::users;
use crate::utils::error::PpeError;
use crate::web::AppState;
use crate::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

/// POST /api/signup 请求体
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

/// POST /api/login 请求体
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 账号接口统一的 {"message": ...} 应答，成功失败都是这个形状
fn message(status: StatusCode, text: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": text })))
}

pub async fn signup_handler(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    if users::find_by_email(&state.db, &request.email)
        .await?
        .is_some()
    {
        return Ok(message(StatusCode::BAD_REQUEST, "Email already exists."));
    }

    let password_hash = hash_password(request.password).await?;

    match users::insert(
        &state.db,
        request.name.as_deref(),
        &request.email,
        &password_hash,
    )
    .await
    {
        Ok(_) => {}
        // 两个并发注册都通过了查重时，唯一约束兜底
        Err(PpeError::Database(sqlx::Error::Database(e))) if e.is_unique_violation() => {
            return Ok(message(StatusCode::BAD_REQUEST, "Email already exists."));
        }
        Err(e) => return Err(e),
    }

    tracing::info!("User registered: {}", request.email);
    Ok(message(
        StatusCode::CREATED,
        "User registered successfully.",
    ))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let user = match users::find_by_email(&state.db, &request.email).await? {
        Some(user) => user,
        None => {
            return Ok(message(
                StatusCode::UNAUTHORIZED,
                "User does not exist. Please sign up first.",
            ));
        }
    };

    if verify_password(request.password, user.password).await? {
        tracing::info!("User logged in: {}", request.email);
        Ok(message(StatusCode::OK, "Login successful."))
    } else {
        Ok(message(StatusCode::UNAUTHORIZED, "Incorrect password."))
    }
}

/// Argon2 是故意算得慢的，挪到阻塞线程池
pub(crate) async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PpeError::PasswordHash(e.to_string()))
    })
    .await
    .map_err(|e| PpeError::Internal(format!("Hash task failed: {}", e)))?
}

pub(crate) async fn verify_password(password: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored_hash).map_err(|e| PpeError::PasswordHash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| PpeError::Internal(format!("Verify task failed: {}", e)))?
}
