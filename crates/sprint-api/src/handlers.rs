//! API request handlers for sprint, voting and registry operations

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sprint_common::{AlumniProfile, Error, ErrorKind, Lead, Vote};
use sprint_engine::{
    brief, AuditContext, LeadView, NudgeReport, StalledBuilder, VotingOutcome, VotingState,
    WinnerResult,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::AppState;

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "kind": self.kind.as_str(),
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::CapacityExceeded | ErrorKind::ConflictingState => StatusCode::CONFLICT,
            ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if kind == ErrorKind::Internal {
            error!("Internal error: {:#}", err);
            return ApiError {
                status,
                kind,
                message: "Internal server error".to_string(),
            };
        }

        ApiError {
            status,
            kind,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err).into()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Who is acting, for audited scout actions. The body is optional on
/// pause, resume and terminate; without one the actor is "scout".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    pub actor: Option<String>,
    pub reason: Option<String>,
}

fn audit(actor: Option<String>, reason: Option<String>) -> AuditContext {
    AuditContext::new(actor.unwrap_or_else(|| "scout".to_string()), reason)
}

impl AdminRequest {
    fn context(self) -> AuditContext {
        audit(self.actor, self.reason)
    }

    fn context_from(body: Option<Json<Self>>) -> AuditContext {
        body.map(|Json(req)| req).unwrap_or_default().context()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSprintRequest {
    pub max_slots: u8,
    #[serde(alias = "durationWeeks")]
    pub sprint_duration: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSprintRequest {
    pub user_id: String,
    pub selected_deliverables: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCheckpointRequest {
    pub user_id: String,
    pub milestone_id: u32,
    pub proof_link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCheckpointRequest {
    pub user_id: String,
    pub milestone_id: u32,
    pub approved: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutReviewRequest {
    pub user_id: String,
    pub quality_score: u32,
    pub scout_review_score: Option<u32>,
    pub review_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendDeadlineRequest {
    pub days: u32,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

/// Evict, nudge and flag all target one builder
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderActionRequest {
    pub user_id: String,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    #[serde(alias = "build_id")]
    pub build_id: String,
    #[serde(alias = "voter_id")]
    pub voter_id: String,
    pub score: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoterQuery {
    pub voter_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlumniQuery {
    pub specialty: Option<String>,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sprint-api"
    }))
}

// ---- leads -----------------------------------------------------------------

pub async fn create_lead_handler(
    State(state): State<Arc<AppState>>,
    Json(lead): Json<Lead>,
) -> Result<(StatusCode, Json<LeadView>), ApiError> {
    let view = state.engine.create_lead(lead).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_leads_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<LeadView>> {
    Ok(Json(state.engine.list_leads().await?))
}

pub async fn get_lead_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
) -> ApiResult<LeadView> {
    Ok(Json(state.engine.get_lead(&lead_id).await?))
}

/// Download the Markdown handoff brief for a lead
pub async fn lead_brief_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
) -> Result<Response, ApiError> {
    let view = state.engine.get_lead(&lead_id).await?;
    let markdown = brief::render_markdown(&view);
    let disposition = format!("attachment; filename=\"brief-{}.md\"", view.lead.id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        markdown,
    )
        .into_response())
}

// ---- sprint lifecycle ------------------------------------------------------

pub async fn launch_sprint_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<LaunchSprintRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .launch_sprint(&lead_id, req.max_slots, req.sprint_duration)
        .await?;
    Ok(Json(view))
}

pub async fn join_sprint_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<JoinSprintRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .join_sprint(&lead_id, &req.user_id, req.selected_deliverables)
        .await?;
    Ok(Json(view))
}

pub async fn submit_checkpoint_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<SubmitCheckpointRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .submit_checkpoint(&lead_id, &req.user_id, req.milestone_id, &req.proof_link)
        .await?;
    Ok(Json(view))
}

pub async fn verify_checkpoint_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<VerifyCheckpointRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .verify_checkpoint(&lead_id, &req.user_id, req.milestone_id, req.approved, req.notes)
        .await?;
    Ok(Json(view))
}

pub async fn scout_review_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<ScoutReviewRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .submit_scout_review(
            &lead_id,
            &req.user_id,
            req.quality_score,
            req.scout_review_score,
            req.review_notes,
        )
        .await?;
    Ok(Json(view))
}

pub async fn calculate_winner_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
) -> ApiResult<WinnerResult> {
    let result = state.engine.calculate_winner(&lead_id).await?;
    info!("Winner calculated for lead {}", lead_id);
    Ok(Json(result))
}

// ---- scout interventions ---------------------------------------------------

pub async fn pause_sprint_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    body: Option<Json<AdminRequest>>,
) -> ApiResult<LeadView> {
    let ctx = AdminRequest::context_from(body);
    Ok(Json(state.engine.pause_sprint(&lead_id, ctx).await?))
}

pub async fn resume_sprint_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    body: Option<Json<AdminRequest>>,
) -> ApiResult<LeadView> {
    let ctx = AdminRequest::context_from(body);
    Ok(Json(state.engine.resume_sprint(&lead_id, ctx).await?))
}

pub async fn extend_deadline_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<ExtendDeadlineRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .extend_deadline(&lead_id, req.days, audit(req.actor, req.reason))
        .await?;
    Ok(Json(view))
}

pub async fn evict_builder_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<BuilderActionRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .evict_builder(&lead_id, &req.user_id, audit(req.actor, req.reason))
        .await?;
    Ok(Json(view))
}

pub async fn terminate_sprint_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    body: Option<Json<AdminRequest>>,
) -> ApiResult<LeadView> {
    let ctx = AdminRequest::context_from(body);
    Ok(Json(state.engine.terminate_sprint(&lead_id, ctx).await?))
}

pub async fn nudge_builder_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<BuilderActionRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .nudge_builder(&lead_id, &req.user_id, audit(req.actor, req.reason))
        .await?;
    Ok(Json(view))
}

pub async fn flag_builder_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<BuilderActionRequest>,
) -> ApiResult<LeadView> {
    let view = state
        .engine
        .flag_builder(&lead_id, &req.user_id, audit(req.actor, req.reason))
        .await?;
    Ok(Json(view))
}

pub async fn stalled_builders_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<StalledBuilder>> {
    Ok(Json(state.engine.detect_stalled().await?))
}

pub async fn dispatch_nudges_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<NudgeReport>> {
    Ok(Json(state.engine.dispatch_nudges().await?))
}

// ---- voting ----------------------------------------------------------------

pub async fn open_voting_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
) -> ApiResult<VotingState> {
    Ok(Json(state.engine.open_voting(&lead_id).await?))
}

pub async fn close_voting_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
) -> ApiResult<VotingOutcome> {
    Ok(Json(state.engine.close_voting(&lead_id).await?))
}

pub async fn voting_state_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    Query(query): Query<VoterQuery>,
) -> ApiResult<VotingState> {
    let voting = state
        .engine
        .voting_state(&lead_id, query.voter_id.as_deref())
        .await?;
    Ok(Json(voting))
}

pub async fn open_voting_states_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VoterQuery>,
) -> ApiResult<Vec<VotingState>> {
    let states = state
        .engine
        .open_voting_states(query.voter_id.as_deref())
        .await?;
    Ok(Json(states))
}

pub async fn cast_vote_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CastVoteRequest>,
) -> Result<(StatusCode, Json<Vote>), ApiError> {
    let vote = state
        .engine
        .cast_vote(&req.build_id, &req.voter_id, req.score)
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

// ---- alumni registry -------------------------------------------------------

pub async fn register_alumni_handler(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<AlumniProfile>,
) -> ApiResult<AlumniProfile> {
    Ok(Json(state.engine.register_alumni(profile).await?))
}

pub async fn list_alumni_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlumniQuery>,
) -> ApiResult<Vec<AlumniProfile>> {
    Ok(Json(state.engine.list_alumni(query.specialty.as_deref()).await?))
}

pub async fn get_alumni_handler(
    State(state): State<Arc<AppState>>,
    Path(alumni_id): Path<String>,
) -> ApiResult<AlumniProfile> {
    Ok(Json(state.engine.get_alumni(&alumni_id).await?))
}
