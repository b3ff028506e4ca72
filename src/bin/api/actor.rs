use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use crate::access_control::{authorize, Action, Actor};

use super::{error::AppError, state::AppState};

const TOKEN_PREFIX: &str = "Token ";

/// Resolves `Authorization: Token <key>` into the acting user.
///
/// No header means [`Actor::Anonymous`]; a header with an unknown key is a 401.
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Actor::Anonymous);
        };

        let key = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(TOKEN_PREFIX))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AppError::Unauthorized)?
            .to_owned();

        let user = state.run(move |store| Ok(store.user_by_token(&key)?)).await?;

        match user {
            Some(user) => {
                debug!(user_id = user.id, "Authenticated request");
                Ok(Actor::User(user))
            }
            None => Err(AppError::Unauthorized),
        }
    }
}

/// Coarse write check for endpoints without a target recipe; yields the writer's id.
pub fn require_writer(actor: &Actor) -> Result<i32, AppError> {
    AppError::check(actor, authorize(actor, Action::Write, None))?;

    actor.id().ok_or(AppError::Unauthorized)
}
