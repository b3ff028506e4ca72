//! Request-time authorization for recipes.
//!
//! Two checks run for every request, in order:
//!
//! - the coarse check (list and create): reads are always allowed, writes need an
//!   authenticated *and* active actor;
//! - the object check (a specific recipe): only after the coarse check passed,
//!   reads are allowed, writes need the recipe's author or an admin.
//!
//! Because the coarse check runs first, a banned admin cannot write anything,
//! not even recipes they authored.

use axum::http::Method;

use crate::database::models::{recipe::Recipe, user::User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

impl Action {
    pub fn from_method(method: &Method) -> Self {
        if [Method::GET, Method::HEAD, Method::OPTIONS].contains(method) {
            Action::Read
        } else {
            Action::Write
        }
    }
}

/// Who performs a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User(User),
}

impl Actor {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Actor::User(_))
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Actor::User(user) if user.is_active)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::User(user) if user.is_staff)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Actor::Anonymous => None,
            Actor::User(user) => Some(user),
        }
    }

    pub fn id(&self) -> Option<i32> {
        self.user().map(|user| user.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

pub fn authorize(actor: &Actor, action: Action, target: Option<&Recipe>) -> Decision {
    let coarse = action == Action::Read || (actor.is_authenticated() && actor.is_active());

    let Some(recipe) = target else {
        return coarse.into();
    };

    (coarse
        && (action == Action::Read
            || actor.id() == Some(recipe.author_id)
            || actor.is_admin()))
    .into()
}
