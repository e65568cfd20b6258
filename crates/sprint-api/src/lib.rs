//! Sprint REST API
//!
//! HTTP front end for the sprint engine: lead and alumni registries, the
//! sprint lifecycle, scout interventions and peer voting.
//!
//! ## Endpoints
//!
//! - `POST /api/leads`, `GET /api/leads`, `GET /api/leads/{id}` - Lead registry
//! - `GET /api/leads/{id}/brief` - Markdown handoff brief
//! - `POST /api/leads/{id}/sprint` - Launch a sprint
//! - `POST /api/leads/{id}/sprint/{action}` - Join, checkpoints, reviews,
//!   winner selection and scout interventions
//! - `GET /api/sprints/stalled`, `POST /api/sprints/nudges` - Stall sweep
//! - `POST /api/leads/{id}/voting/open|close`, `GET /api/leads/{id}/voting`,
//!   `GET /api/voting`, `POST /api/votes` - Peer voting
//! - `POST /api/alumni`, `GET /api/alumni`, `GET /api/alumni/{id}` - Builder registry
//! - `GET /health` - Health check

pub mod config;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use sprint_engine::SprintEngine;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<SprintEngine>,
}

impl AppState {
    pub fn new(engine: Arc<SprintEngine>) -> Self {
        Self { engine }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_handler))
        // Lead registry
        .route(
            "/api/leads",
            post(handlers::create_lead_handler).get(handlers::list_leads_handler),
        )
        .route("/api/leads/{id}", get(handlers::get_lead_handler))
        .route("/api/leads/{id}/brief", get(handlers::lead_brief_handler))
        // Sprint lifecycle
        .route("/api/leads/{id}/sprint", post(handlers::launch_sprint_handler))
        .route("/api/leads/{id}/sprint/join", post(handlers::join_sprint_handler))
        .route(
            "/api/leads/{id}/sprint/checkpoint",
            post(handlers::submit_checkpoint_handler),
        )
        .route(
            "/api/leads/{id}/sprint/verify",
            post(handlers::verify_checkpoint_handler),
        )
        .route("/api/leads/{id}/sprint/review", post(handlers::scout_review_handler))
        .route(
            "/api/leads/{id}/sprint/winner",
            post(handlers::calculate_winner_handler),
        )
        // Scout interventions
        .route("/api/leads/{id}/sprint/pause", post(handlers::pause_sprint_handler))
        .route("/api/leads/{id}/sprint/resume", post(handlers::resume_sprint_handler))
        .route(
            "/api/leads/{id}/sprint/extend",
            post(handlers::extend_deadline_handler),
        )
        .route("/api/leads/{id}/sprint/evict", post(handlers::evict_builder_handler))
        .route(
            "/api/leads/{id}/sprint/terminate",
            post(handlers::terminate_sprint_handler),
        )
        .route("/api/leads/{id}/sprint/nudge", post(handlers::nudge_builder_handler))
        .route("/api/leads/{id}/sprint/flag", post(handlers::flag_builder_handler))
        .route("/api/sprints/stalled", get(handlers::stalled_builders_handler))
        .route("/api/sprints/nudges", post(handlers::dispatch_nudges_handler))
        // Peer voting
        .route("/api/leads/{id}/voting", get(handlers::voting_state_handler))
        .route("/api/leads/{id}/voting/open", post(handlers::open_voting_handler))
        .route("/api/leads/{id}/voting/close", post(handlers::close_voting_handler))
        .route("/api/voting", get(handlers::open_voting_states_handler))
        .route("/api/votes", post(handlers::cast_vote_handler))
        // Alumni registry
        .route(
            "/api/alumni",
            post(handlers::register_alumni_handler).get(handlers::list_alumni_handler),
        )
        .route("/api/alumni/{id}", get(handlers::get_alumni_handler))
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
