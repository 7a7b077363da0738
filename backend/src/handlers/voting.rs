use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{path_code, sessions::ViewerQuery},
    middleware::Caller,
    models::{
        results::{calculate_results, tally_votes},
        MatchRule, RestaurantTally, Session, SessionResults, SessionStatus,
    },
    services::SessionError,
    state::AppState,
    types::{RestaurantId, SessionCode},
    validation::{rules::validate_participant_id, ValidatedJson},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[validate(custom(function = "validate_participant_id"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 256))]
    pub restaurant_id: String,
    pub liked: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub success: bool,
    pub user_finished: bool,
    pub all_finished: bool,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VotingStatusResponse {
    pub success: bool,
    pub status: SessionStatus,
    /// True once the session has finished or every ballot is complete.
    pub all_finished: bool,
    pub user_finished: bool,
    pub user_count: usize,
    pub total_votes: usize,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostActionRequest {
    #[validate(custom(function = "validate_participant_id"))]
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostActionResponse {
    pub success: bool,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    pub success: bool,
    pub status: SessionStatus,
    /// `null` while no restaurant has matched.
    pub results: Option<SessionResults>,
    pub tallies: Vec<RestaurantTally>,
    pub participant_count: usize,
}

pub async fn cast_vote(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    ValidatedJson(payload): ValidatedJson<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let code = path_code(&code)?;
    let user_id = caller.resolve_user_id(Some(&payload.user_id));
    let restaurant_id = RestaurantId::from(payload.restaurant_id);

    let receipt = state
        .sessions
        .record_vote(&code, &user_id, &restaurant_id, payload.liked)?;
    if receipt.finished_session {
        record_outcomes_once(&state, &code);
    }

    Ok(Json(VoteResponse {
        success: true,
        user_finished: receipt.user_finished,
        all_finished: receipt.all_finished,
        status: receipt.status,
    }))
}

pub async fn voting_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<VotingStatusResponse>, AppError> {
    let code = path_code(&code)?;
    let session = state
        .sessions
        .get_session(&code)
        .ok_or_else(|| SessionError::NotFound(code.clone()))?;
    let user_finished = query
        .viewer(&caller)
        .is_some_and(|viewer| session.has_user_finished(&viewer));

    Ok(Json(VotingStatusResponse {
        success: true,
        status: session.status,
        all_finished: session.is_finished() || session.all_users_finished(),
        user_finished,
        user_count: session.users.len(),
        total_votes: session.votes.len(),
    }))
}

pub async fn close_voting(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    ValidatedJson(payload): ValidatedJson<HostActionRequest>,
) -> Result<Json<HostActionResponse>, AppError> {
    let code = path_code(&code)?;
    let actor = caller.resolve_user_id(Some(&payload.user_id));
    let session = state.sessions.finish_session(&code, Some(&actor))?;
    record_outcomes_once(&state, &code);

    Ok(Json(HostActionResponse {
        success: true,
        status: session.status,
    }))
}

pub async fn set_reconfiguring(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    ValidatedJson(payload): ValidatedJson<HostActionRequest>,
) -> Result<Json<HostActionResponse>, AppError> {
    let code = path_code(&code)?;
    let actor = caller.resolve_user_id(Some(&payload.user_id));
    let session = state.sessions.set_reconfiguring(&code, &actor)?;

    Ok(Json(HostActionResponse {
        success: true,
        status: session.status,
    }))
}

/// Safe to poll. Outcomes are recorded the first time a finished session
/// is seen by any of the closing paths.
pub async fn session_results(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ResultsResponse>, AppError> {
    let code = path_code(&code)?;
    let session = state
        .sessions
        .get_session(&code)
        .ok_or_else(|| SessionError::NotFound(code.clone()))?;
    let (results, tallies) = results_snapshot(&session, state.sessions.policy().match_rule);

    if session.is_finished() {
        record_outcomes_once(&state, &code);
    }

    Ok(Json(ResultsResponse {
        success: true,
        status: session.status,
        results,
        tallies,
        participant_count: session.users.len(),
    }))
}

/// Results and top-level tallies taken from one snapshot so they always
/// agree.
fn results_snapshot(
    session: &Session,
    rule: MatchRule,
) -> (Option<SessionResults>, Vec<RestaurantTally>) {
    match calculate_results(session, rule) {
        Some(results) => {
            let tallies = results.tallies.clone();
            (Some(results), tallies)
        }
        None => (None, tally_votes(session, rule)),
    }
}

/// Claims the session's one outcome write and runs it off the request path.
fn record_outcomes_once(state: &AppState, code: &SessionCode) {
    match state.sessions.mark_outcomes_recorded(code) {
        Ok(true) => {}
        Ok(false) => return,
        Err(err) => {
            tracing::debug!(%code, error = %err, "Skipping outcome recording");
            return;
        }
    }
    let Some(session) = state.sessions.get_session(code) else {
        return;
    };
    let recorder = state.outcomes.clone();
    let rule = state.sessions.policy().match_rule;
    tokio::spawn(async move {
        recorder.record_session(&session, rule).await;
    });
}
