use axum::Router;
use axum::routing::{get, post, put};

use super::AppState;
use super::controller;

pub fn register_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(controller::health))
        .route("/approval/flow/list", get(controller::list_flows))
        .route("/approval/flow", post(controller::create_flow))
        .route(
            "/approval/flow/{id}",
            get(controller::get_flow)
                .put(controller::update_flow)
                .delete(controller::delete_flow),
        )
        .route("/approval/flow/{id}/status", put(controller::set_flow_status))
        .route("/approval/start", post(controller::start_approval))
        .route("/approval/do", post(controller::do_approval))
        .route("/approval/pending", get(controller::my_pending))
        .route("/approval/initiated", get(controller::my_initiated))
        .route("/approval/record/{id}", get(controller::get_record_detail))
        .route(
            "/approval/record/{id}/cancel",
            post(controller::cancel_approval),
        )
        .with_state(state)
}
