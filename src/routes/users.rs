use axum::extract::{Json, Query, State};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::auth::Identity;
use crate::error::{AppError, AppResult, CoreError};
use crate::models::Role;
use crate::service::{Page, UserView};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

pub async fn list_users(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Query(query), _): WithRejection<Query<UserListQuery>, AppError>,
) -> AppResult<Json<Vec<UserView>>> {
    let role = query
        .role
        .as_deref()
        .map(|value| value.parse::<Role>())
        .transpose()
        .map_err(|_| CoreError::InvalidInput("invalid_role"))?;

    let page = Page::new(query.offset, query.limit);
    let users = state.service.list_users(&identity, role, page)?;
    Ok(Json(users))
}
