use axum::{
    extract::{Path, State},
    Json,
};

use crate::database::models::tag::Tag;

use super::{error::AppError, state::AppState};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, AppError> {
    let tags = state.run(|store| Ok(store.tags()?)).await?;

    Ok(Json(tags))
}

pub async fn retrieve(State(state): State<AppState>, Path(id): Path<i32>) -> Result<Json<Tag>, AppError> {
    let tag = state.run(move |store| store.tag(id)?.ok_or(AppError::NotFound)).await?;

    Ok(Json(tag))
}
