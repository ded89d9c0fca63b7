pub(crate) mod cards;
pub(crate) mod items;
pub(crate) mod workspaces;

pub(crate) use cards::*;
pub(crate) use items::*;
pub(crate) use workspaces::*;

use axum::{extract::FromRequestParts, http::request::Parts};
use corkboard_core::{Container, Item, ItemKind, UserId};

use super::{
    core::{AppState, ACTOR_HEADER},
    errors::ServiceError,
    store::Repository,
};

/// Authenticated caller. Authentication is terminated upstream; this only
/// trusts the forwarded user id once it names a registered user.
pub(crate) struct Actor(pub(crate) UserId);

impl FromRequestParts<AppState> for Actor {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok())
            .ok_or(ServiceError::Unauthorized)?;
        if !state.store.user_exists(user).await? {
            tracing::warn!(event = "auth.actor", outcome = "unknown_user", user_id = %user);
            return Err(ServiceError::Unauthorized);
        }
        Ok(Self(user))
    }
}

pub(crate) fn parse_item(kind: String, id: &str) -> Result<Item, ServiceError> {
    Ok(Item::parse(ItemKind::try_from(kind)?, id)?)
}

/// Accepts `board` in addition to every item kind that holds children.
pub(crate) fn parse_container(kind: String, id: &str) -> Result<Container, ServiceError> {
    if kind == "board" {
        return Ok(Container::Board(id.parse()?));
    }
    parse_item(kind, id)?
        .as_container()
        .ok_or(ServiceError::InvalidRequest)
}
