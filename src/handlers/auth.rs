use axum::{extract::State, http::{HeaderMap, StatusCode}, response::Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use mongodb::{
    bson::doc,
    options::ReturnDocument,
    Collection,
};
use validator::Validate;

use crate::dtos::ApiResponse;
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::user::{
    self, AuthResponse, CreateUser, LoginUser, UpdateRole, User, UserResponse, UserSummary,
};
use crate::services::activity_service::{self, NewActivity};
use crate::services::token_service;
use crate::state::AppState;

fn users(state: &AppState) -> Collection<User> {
    state.db.collection(user::COLLECTION)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn auth_response(state: &AppState, user: &User) -> Result<AuthResponse> {
    let token = token_service::issue(user, &state.config.jwt_secret, state.config.jwt_expire_hours)?;
    Ok(AuthResponse {
        success: true,
        token,
        user: UserSummary::from(user),
    })
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUser>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    payload.validate()?;

    if !payload.role.is_self_assignable() {
        return Err(AppError::invalid_data("Invalid role specified"));
    }

    let email = normalize_email(&payload.email);
    let collection = users(&state);

    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::bad_request("User already exists"));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST)?;
    let user = User::new(payload.name.trim().to_string(), email, password_hash, payload.role);

    collection.insert_one(&user).await.map_err(|e| match AppError::from(e) {
        AppError::DuplicateKey => AppError::bad_request("User already exists"),
        other => other,
    })?;

    tracing::info!(user = %user.id, role = user.role.as_str(), "user registered");
    activity_service::record(
        &state.db,
        NewActivity::new("user.register")
            .by(user.id)
            .target("user", user.id.to_hex())
            .metadata(doc! { "role": user.role.as_str() })
            .request(&headers),
    )
    .await;

    Ok((StatusCode::CREATED, Json(auth_response(&state, &user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginUser>,
) -> Result<Json<AuthResponse>> {
    payload.validate()?;

    let user = users(&state)
        .find_one(doc! { "email": normalize_email(&payload.email) })
        .await?
        .ok_or_else(|| AppError::AuthError("Invalid credentials".into()))?;

    if !verify(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid credentials".into()));
    }

    activity_service::record(
        &state.db,
        NewActivity::new("user.login").by(user.id).request(&headers),
    )
    .await;

    Ok(Json(auth_response(&state, &user)?))
}

pub async fn me(auth: AuthUser) -> Result<Json<ApiResponse<UserResponse>>> {
    Ok(Json(ApiResponse::success(UserResponse::from(auth.0))))
}

/// Onboarding role choice. Only student and teacher may be self-assigned.
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<UpdateRole>,
) -> Result<Json<AuthResponse>> {
    if !payload.role.is_self_assignable() {
        return Err(AppError::invalid_data("Invalid role specified"));
    }

    let updated = users(&state)
        .find_one_and_update(
            doc! { "_id": auth.id() },
            doc! { "$set": {
                "role": payload.role.as_str(),
                "isOnboarded": true,
                "updatedAt": Utc::now(),
            }},
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    activity_service::record(
        &state.db,
        NewActivity::new("user.role_selected")
            .by(updated.id)
            .target("user", updated.id.to_hex())
            .metadata(doc! { "from": auth.role().as_str(), "to": updated.role.as_str() })
            .request(&headers),
    )
    .await;

    Ok(Json(auth_response(&state, &updated)?))
}
