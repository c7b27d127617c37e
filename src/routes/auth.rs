use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::{
    auth::{AccessToken, Identity},
    error::{AppError, AppResult},
    service::UserView,
    state::AppState,
};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = state.service.register(
        &payload.email,
        &payload.password,
        &payload.role,
        payload.full_name.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<Json<AccessToken>> {
    let token = state.service.login(&payload.email, &payload.password)?;
    Ok(Json(token))
}

pub async fn me(identity: Identity) -> Json<Identity> {
    Json(identity)
}
