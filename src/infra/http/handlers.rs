use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::application::error::AppError;
use crate::application::repos::EdgeChange;
use crate::application::users::{RegisterUser, UpdateUser};
use crate::domain::entities::{UserProfile, UserRecord};

use super::HttpState;

/// Upper bound on ids in one batch profile request.
pub const MAX_BATCH_IDS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
    #[serde(default)]
    pub phone: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub sex: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub avatar: Option<String>,
    pub sex: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub viewer_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct BatchProfilesRequest {
    pub viewer_id: u64,
    pub ids: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchProfilesResponse {
    pub items: Vec<UserProfile>,
}

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub viewer_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowResponse {
    pub changed: bool,
}

impl From<EdgeChange> for FollowResponse {
    fn from(change: EdgeChange) -> Self {
        Self {
            changed: change == EdgeChange::Applied,
        }
    }
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn get_user(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
) -> Result<Json<UserRecord>, AppError> {
    let user = state.users.reader.get_user(id).await?;
    Ok(Json(user))
}

pub async fn register_user(
    State(state): State<HttpState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .commands
        .register_user(RegisterUser {
            username: payload.username,
            phone: payload.phone,
            email: payload.email,
            avatar: payload.avatar,
            sex: payload.sex,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserRecord>, AppError> {
    let user = state
        .users
        .commands
        .update_user(
            id,
            UpdateUser {
                avatar: payload.avatar,
                sex: payload.sex,
            },
        )
        .await?;
    Ok(Json(user))
}

pub async fn get_profile(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<UserProfile>, AppError> {
    let profile = state.users.profiles.profile(query.viewer_id, id).await?;
    Ok(Json(profile))
}

pub async fn batch_profiles(
    State(state): State<HttpState>,
    Json(payload): Json<BatchProfilesRequest>,
) -> Result<Json<BatchProfilesResponse>, AppError> {
    if payload.ids.len() > MAX_BATCH_IDS {
        return Err(AppError::validation(format!(
            "at most {MAX_BATCH_IDS} ids per request"
        )));
    }

    let items = state
        .users
        .profiles
        .batch_profiles(payload.viewer_id, &payload.ids)
        .await?;
    Ok(Json(BatchProfilesResponse { items }))
}

pub async fn follow(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
    Json(payload): Json<FollowRequest>,
) -> Result<Json<FollowResponse>, AppError> {
    let change = state.users.commands.follow(payload.viewer_id, id).await?;
    Ok(Json(change.into()))
}

pub async fn unfollow(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
    Json(payload): Json<FollowRequest>,
) -> Result<Json<FollowResponse>, AppError> {
    let change = state.users.commands.unfollow(payload.viewer_id, id).await?;
    Ok(Json(change.into()))
}
