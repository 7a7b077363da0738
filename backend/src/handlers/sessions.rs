use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{path_code, requested_code},
    middleware::Caller,
    models::{
        Filters, FoodMethod, Location, Restaurant, Session, SessionMetadata, SessionStatus,
    },
    selection::{SelectionRequest, SourcedRestaurants},
    services::SessionError,
    state::AppState,
    types::{RestaurantId, SessionCode, UserId},
    validation::{rules::validate_participant_id, ValidatedJson},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitSessionRequest {
    #[validate(custom(function = "validate_participant_id"))]
    pub user_id: Option<String>,
    /// Code to reserve. Generated when omitted.
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitSessionResponse {
    pub success: bool,
    pub code: SessionCode,
    pub user_id: UserId,
    /// The code was already reserved by this host.
    pub resumed: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(nested)]
    pub filters: Filters,
    #[validate(nested)]
    pub location: Location,
    #[validate(custom(function = "validate_participant_id"))]
    pub user_id: Option<String>,
    /// A code reserved through `/api/session/init`.
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    pub code: SessionCode,
    pub user_id: UserId,
    pub session: SessionView,
    /// Place source the candidates came from.
    pub source: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconfigureRequest {
    #[validate(custom(function = "validate_participant_id"))]
    pub user_id: String,
    #[validate(nested)]
    pub filters: Filters,
    #[validate(nested)]
    pub location: Location,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconfigureResponse {
    pub success: bool,
    pub session: ReconfiguredSession,
    pub source: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconfiguredSession {
    pub code: SessionCode,
    pub status: SessionStatus,
    pub restaurant_count: usize,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ViewerQuery {
    /// Participant the view is rendered for.
    pub user_id: Option<String>,
}

impl ViewerQuery {
    /// The authenticated id wins; otherwise whatever the client passed.
    pub fn viewer(&self, caller: &Caller) -> Option<UserId> {
        caller.user_id.clone().or_else(|| {
            self.user_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(UserId::from)
        })
    }
}

/// Anonymised progress of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    /// 1-based join position.
    pub user_index: usize,
    pub finished: bool,
    pub vote_count: usize,
    pub is_host: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub code: SessionCode,
    pub status: SessionStatus,
    pub host_id: UserId,
    pub restaurants: Vec<Restaurant>,
    pub filters: Option<Filters>,
    pub location: Option<Location>,
    pub user_count: usize,
    pub user_status: Vec<UserStatus>,
    pub total_restaurants: usize,
    pub is_host: bool,
    /// Set when the viewer could not join, e.g. voting has closed.
    pub read_only: bool,
    /// The viewer's own ballot so far.
    pub user_votes: BTreeMap<RestaurantId, bool>,
    pub food_method_result: Option<FoodMethod>,
    pub metadata: Option<SessionMetadata>,
    pub created_at: DateTime<Utc>,
}

impl SessionView {
    pub fn render(session: &Session, viewer: Option<&UserId>, read_only: bool) -> Self {
        let user_status = session
            .users
            .iter()
            .enumerate()
            .map(|(index, user)| UserStatus {
                user_index: index + 1,
                finished: session.has_user_finished(user),
                vote_count: session.vote_count_for(user),
                is_host: session.is_host(user),
            })
            .collect();
        let user_votes = viewer
            .map(|viewer| {
                session
                    .votes
                    .iter()
                    .filter(|vote| &vote.user_id == viewer)
                    .map(|vote| (vote.restaurant_id.clone(), vote.liked))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            code: session.code.clone(),
            status: session.status,
            host_id: session.host_id.clone(),
            restaurants: session.restaurants.clone(),
            filters: session.filters.clone(),
            location: session.location,
            user_count: session.users.len(),
            user_status,
            total_restaurants: session.restaurants.len(),
            is_host: viewer.is_some_and(|viewer| session.is_host(viewer)),
            read_only,
            user_votes,
            food_method_result: session.food_method_result,
            metadata: session.metadata.clone(),
            created_at: session.created_at,
        }
    }
}

pub async fn init_session(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(payload): ValidatedJson<InitSessionRequest>,
) -> Result<Json<InitSessionResponse>, AppError> {
    let host_id = caller.resolve_user_id(payload.user_id.as_deref());
    let requested = requested_code(payload.code.as_deref())?;
    let reservation = state.sessions.reserve_code(requested, &host_id)?;

    Ok(Json(InitSessionResponse {
        success: true,
        code: reservation.code,
        user_id: host_id,
        resumed: reservation.resumed,
    }))
}

pub async fn create_session(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(payload): ValidatedJson<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let host_id = caller.resolve_user_id(payload.user_id.as_deref());
    let requested = requested_code(payload.code.as_deref())?;
    let limit = state.config.restaurant_limit(caller.tier);
    let metadata = SessionMetadata {
        creator_tier: caller.tier,
        restaurant_limit: limit,
    };

    let reservation = state.sessions.reserve_code(requested, &host_id)?;
    let code = reservation.code;

    let request = SelectionRequest {
        lat: payload.location.lat,
        lng: payload.location.lng,
        filters: payload.filters.clone(),
        limit,
    };
    let sourced = match state.sourcing.select(&request).await {
        Ok(sourced) => sourced,
        Err(err) => {
            state.sessions.abandon_pending_session(&code);
            return Err(err.into());
        }
    };
    let SourcedRestaurants {
        restaurants,
        source,
    } = sourced;

    let session = state
        .sessions
        .complete_session(
            &code,
            payload.filters,
            payload.location,
            restaurants,
            Some(metadata),
        )
        .inspect_err(|_| {
            state.sessions.abandon_pending_session(&code);
        })?;

    tracing::info!(
        %code,
        tier = ?caller.tier,
        source,
        restaurants = session.restaurants.len(),
        resumed = reservation.resumed,
        "Session ready for voting"
    );

    Ok(Json(CreateSessionResponse {
        success: true,
        code,
        session: SessionView::render(&session, Some(&host_id), false),
        user_id: host_id,
        source: source.to_string(),
    }))
}

/// Joins the viewer when voting is still open; otherwise returns the
/// session read-only.
pub async fn get_session(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<SessionView>, AppError> {
    let code = path_code(&code)?;
    let viewer = query.viewer(&caller);

    let Some(viewer_id) = viewer.as_ref() else {
        let session = state
            .sessions
            .get_session(&code)
            .ok_or_else(|| SessionError::NotFound(code.clone()))?;
        return Ok(Json(SessionView::render(&session, None, true)));
    };

    match state.sessions.add_user_to_session(&code, viewer_id) {
        Ok(session) => Ok(Json(SessionView::render(&session, Some(viewer_id), false))),
        Err(SessionError::InvalidState(reason)) => {
            tracing::debug!(%code, %viewer_id, reason, "Serving read-only session view");
            let session = state
                .sessions
                .get_session(&code)
                .ok_or_else(|| SessionError::NotFound(code.clone()))?;
            Ok(Json(SessionView::render(&session, Some(viewer_id), true)))
        }
        Err(err) => Err(err.into()),
    }
}

/// Host resubmits filters: the session drops back to pending, gets a fresh
/// candidate list and reopens. A failed selection leaves it reconfiguring.
pub async fn reconfigure_session(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    ValidatedJson(payload): ValidatedJson<ReconfigureRequest>,
) -> Result<Json<ReconfigureResponse>, AppError> {
    let code = path_code(&code)?;
    let actor = caller.resolve_user_id(Some(&payload.user_id));

    let pending = state.sessions.begin_reconfigure(
        &code,
        &actor,
        payload.filters.clone(),
        payload.location,
    )?;
    let metadata = pending.metadata.clone();
    let limit = metadata
        .as_ref()
        .map(|m| m.restaurant_limit)
        .unwrap_or_else(|| state.config.restaurant_limit(caller.tier));

    let request = SelectionRequest {
        lat: payload.location.lat,
        lng: payload.location.lng,
        filters: payload.filters.clone(),
        limit,
    };
    let sourced = match state.sourcing.select(&request).await {
        Ok(sourced) => sourced,
        Err(err) => {
            revert(&state, &code);
            return Err(err.into());
        }
    };

    let session = state
        .sessions
        .complete_session(
            &code,
            payload.filters,
            payload.location,
            sourced.restaurants,
            metadata,
        )
        .inspect_err(|_| revert(&state, &code))?;

    tracing::info!(
        %code,
        source = sourced.source,
        restaurants = session.restaurants.len(),
        "Session reconfigured"
    );

    Ok(Json(ReconfigureResponse {
        success: true,
        session: ReconfiguredSession {
            code: session.code.clone(),
            status: session.status,
            restaurant_count: session.restaurants.len(),
        },
        source: sourced.source.to_string(),
    }))
}

fn revert(state: &AppState, code: &SessionCode) {
    if let Err(err) = state.sessions.revert_reconfigure(code) {
        tracing::warn!(%code, error = %err, "Failed to revert reconfigure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::test_support::active_session;
    use crate::models::UserTier;

    #[test]
    fn view_numbers_users_from_one_and_flags_host() {
        let mut session = active_session(&["R1", "R2"], &["U1", "U2"]);
        let now = Utc::now();
        session.upsert_vote(&UserId::from("U2"), &RestaurantId::from("R1"), true, now);
        session.upsert_vote(&UserId::from("U2"), &RestaurantId::from("R2"), false, now);

        let view = SessionView::render(&session, Some(&UserId::from("U2")), false);
        assert_eq!(view.total_restaurants, 2);
        assert_eq!(
            view.user_status,
            vec![
                UserStatus {
                    user_index: 1,
                    finished: false,
                    vote_count: 0,
                    is_host: true
                },
                UserStatus {
                    user_index: 2,
                    finished: true,
                    vote_count: 2,
                    is_host: false
                },
            ]
        );
        assert!(!view.is_host);
        assert_eq!(view.user_votes.len(), 2);
        assert!(!view.user_votes[&RestaurantId::from("R2")]);
    }

    #[test]
    fn viewer_prefers_authenticated_id() {
        let query = ViewerQuery {
            user_id: Some("claimed".to_string()),
        };
        let caller = Caller {
            user_id: Some(UserId::from("auth-9")),
            tier: UserTier::Authenticated,
            client_ip: None,
        };
        assert_eq!(query.viewer(&caller), Some(UserId::from("auth-9")));
        assert_eq!(
            query.viewer(&Caller::anonymous()),
            Some(UserId::from("claimed"))
        );
        assert_eq!(ViewerQuery::default().viewer(&Caller::anonymous()), None);
    }
}
