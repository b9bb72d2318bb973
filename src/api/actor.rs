//! Resolves the calling user from the request. Authentication happens upstream;
//! by the time a request reaches this service its identity headers are trusted.
use axum::http::HeaderMap;

use super::error::AppError;
use crate::types::{Actor, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLES_HEADER: &str = "x-user-roles";
pub const USER_DEPT_HEADER: &str = "x-user-dept";

pub trait ActorResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Actor>;
}

/// Reads the identity a gateway forwards in `x-user-*` headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderActorResolver;

impl ActorResolver for HeaderActorResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Actor> {
        let id = header(headers, USER_ID_HEADER)?.parse::<UserId>().ok()?;
        let name = header(headers, USER_NAME_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string());
        let role_ids = header(headers, USER_ROLES_HEADER)
            .map(|raw| {
                raw.split(',')
                    .filter_map(|r| r.trim().parse::<u64>().ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut actor = Actor::new(id, name).with_roles(role_ids);
        if let Some(dept) = header(headers, USER_DEPT_HEADER).and_then(|d| d.parse().ok()) {
            actor = actor.with_dept(dept);
        }
        Some(actor)
    }
}

fn header<'a>(headers: &'a HeaderMap, key: &str) -> Option<&'a str> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Explicit id + name from the request body win; otherwise the resolver decides.
pub fn resolve_actor(
    resolver: &dyn ActorResolver,
    headers: &HeaderMap,
    explicit_id: Option<UserId>,
    explicit_name: Option<String>,
) -> Result<Actor, AppError> {
    let ambient = resolver.resolve(headers);

    match (explicit_id, explicit_name) {
        (Some(id), Some(name)) if !name.trim().is_empty() => {
            let mut actor = Actor::new(id, name.trim());
            // roles and dept only come from the ambient identity
            if let Some(ambient) = ambient.filter(|a| a.id == id) {
                actor.role_ids = ambient.role_ids;
                actor.dept_id = ambient.dept_id;
            }
            Ok(actor)
        }
        _ => ambient.ok_or_else(unresolved),
    }
}

/// Like [`resolve_actor`] for queries that only name a user id.
pub fn resolve_user(
    resolver: &dyn ActorResolver,
    headers: &HeaderMap,
    user_id: Option<UserId>,
) -> Result<Actor, AppError> {
    let ambient = resolver.resolve(headers);

    match (user_id, ambient) {
        (Some(id), Some(actor)) if actor.id == id => Ok(actor),
        (Some(id), _) => Ok(Actor::new(id, id.to_string())),
        (None, Some(actor)) => Ok(actor),
        (None, None) => Err(unresolved()),
    }
}

fn unresolved() -> AppError {
    AppError::unauthorized("ACTOR_UNRESOLVED", "could not determine the acting user")
}
