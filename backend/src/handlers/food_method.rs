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
    models::{FoodMethod, FoodMethodTallies, Session},
    services::SessionError,
    state::AppState,
    types::UserId,
    validation::{rules::validate_participant_id, ValidatedJson},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FoodMethodRequest {
    #[validate(custom(function = "validate_participant_id"))]
    pub user_id: String,
    pub method: FoodMethod,
    /// Host only: fixes the group's decision instead of casting a vote.
    #[serde(default)]
    pub set_result: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FoodMethodResponse {
    pub success: bool,
    pub tallies: FoodMethodTallies,
    pub result: Option<FoodMethod>,
    pub user_vote: Option<FoodMethod>,
    pub is_host: bool,
}

impl FoodMethodResponse {
    fn render(session: &Session, viewer: Option<&UserId>) -> Self {
        Self {
            success: true,
            tallies: FoodMethodTallies::from_votes(&session.food_method_votes),
            result: session.food_method_result,
            user_vote: viewer.and_then(|v| session.food_method_votes.get(v).copied()),
            is_host: viewer.is_some_and(|v| session.is_host(v)),
        }
    }
}

pub async fn get_food_method(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<FoodMethodResponse>, AppError> {
    let code = path_code(&code)?;
    let session = state
        .sessions
        .get_session(&code)
        .ok_or_else(|| SessionError::NotFound(code.clone()))?;
    let viewer = query.viewer(&caller);
    Ok(Json(FoodMethodResponse::render(&session, viewer.as_ref())))
}

pub async fn submit_food_method(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    ValidatedJson(payload): ValidatedJson<FoodMethodRequest>,
) -> Result<Json<FoodMethodResponse>, AppError> {
    let code = path_code(&code)?;
    let user_id = caller.resolve_user_id(Some(&payload.user_id));

    let session = if payload.set_result {
        state
            .sessions
            .set_food_method_result(&code, &user_id, payload.method)?
    } else {
        state
            .sessions
            .vote_food_method(&code, &user_id, payload.method)?
    };
    Ok(Json(FoodMethodResponse::render(&session, Some(&user_id))))
}
