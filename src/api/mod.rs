//! HTTP surface over the approval engine.
pub mod actor;
pub mod controller;
pub mod error;
pub mod route;
pub mod schema;

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::service::ApprovalEngine;
use crate::store::SledRepository;
use actor::{ActorResolver, HeaderActorResolver};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<ApprovalEngine<SledRepository>>,
    pub actors: Arc<dyn ActorResolver>,
}

impl AppState {
    pub fn new(config: AppConfig, repo: SledRepository) -> Self {
        let engine = ApprovalEngine::with_settings(Arc::new(repo), config.engine_settings());
        Self {
            config,
            engine: Arc::new(engine),
            actors: Arc::new(HeaderActorResolver),
        }
    }

    pub fn with_resolver(mut self, actors: Arc<dyn ActorResolver>) -> Self {
        self.actors = actors;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    route::register_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
