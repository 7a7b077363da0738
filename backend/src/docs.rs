#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::{
        food_method::{FoodMethodRequest, FoodMethodResponse},
        health::HealthResponse,
        sessions::{
            CreateSessionRequest, CreateSessionResponse, InitSessionRequest, InitSessionResponse,
            ReconfigureRequest, ReconfigureResponse, ReconfiguredSession, SessionView,
            UserStatus, ViewerQuery,
        },
        voting::{
            HostActionRequest, HostActionResponse, ResultsResponse, VoteRequest, VoteResponse,
            VotingStatusResponse,
        },
    },
    models::{
        Filters, FoodMethod, FoodMethodTallies, Location, Restaurant, RestaurantTally,
        SessionMetadata, SessionResults, SessionStatus, UserTier,
    },
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        init_session_doc,
        create_session_doc,
        get_session_doc,
        cast_vote_doc,
        voting_status_doc,
        close_voting_doc,
        set_reconfiguring_doc,
        reconfigure_doc,
        results_doc,
        get_food_method_doc,
        submit_food_method_doc,
        health_doc,
    ),
    components(
        schemas(
            ErrorResponse,
            Filters,
            Location,
            Restaurant,
            SessionStatus,
            SessionMetadata,
            UserTier,
            FoodMethod,
            FoodMethodTallies,
            RestaurantTally,
            SessionResults,
            InitSessionRequest,
            InitSessionResponse,
            CreateSessionRequest,
            CreateSessionResponse,
            SessionView,
            UserStatus,
            ReconfigureRequest,
            ReconfigureResponse,
            ReconfiguredSession,
            VoteRequest,
            VoteResponse,
            VotingStatusResponse,
            HostActionRequest,
            HostActionResponse,
            ResultsResponse,
            FoodMethodRequest,
            FoodMethodResponse,
            HealthResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Sessions", description = "Session lifecycle"),
        (name = "Voting", description = "Ballots, status and results"),
        (name = "FoodMethod", description = "How the group eats the winner"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "AuthUserHeader",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "x-auth-user-id",
                "Set by the auth proxy for signed-in users. Optional.",
            ))),
        );
    }
}

#[utoipa::path(
    post,
    path = "/api/session/init",
    request_body = InitSessionRequest,
    responses(
        (status = 200, body = InitSessionResponse),
        (status = 403, description = "Code reserved by another host", body = ErrorResponse),
        (status = 409, description = "Code already in use", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn init_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/create",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, body = CreateSessionResponse),
        (status = 400, description = "Invalid filters or location", body = ErrorResponse),
        (status = 404, description = "No restaurants found", body = ErrorResponse),
        (status = 409, description = "Code already in use", body = ErrorResponse),
        (status = 503, description = "Place data unavailable", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn create_session_doc() {}

#[utoipa::path(
    get,
    path = "/api/session/{code}",
    params(("code" = String, Path, description = "Session code"), ViewerQuery),
    responses(
        (status = 200, description = "Joined, or read-only once finished", body = SessionView),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn get_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/{code}/vote",
    params(("code" = String, Path, description = "Session code")),
    request_body = VoteRequest,
    responses(
        (status = 200, body = VoteResponse),
        (status = 400, description = "Voting is closed", body = ErrorResponse),
        (status = 404, body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse)
    ),
    tag = "Voting"
)]
fn cast_vote_doc() {}

#[utoipa::path(
    get,
    path = "/api/session/{code}/status",
    params(("code" = String, Path, description = "Session code"), ViewerQuery),
    responses((status = 200, body = VotingStatusResponse), (status = 404, body = ErrorResponse)),
    tag = "Voting"
)]
fn voting_status_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/{code}/close-voting",
    params(("code" = String, Path, description = "Session code")),
    request_body = HostActionRequest,
    responses(
        (status = 200, body = HostActionResponse),
        (status = 403, description = "Not the host", body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Voting"
)]
fn close_voting_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/{code}/set-reconfiguring",
    params(("code" = String, Path, description = "Session code")),
    request_body = HostActionRequest,
    responses(
        (status = 200, body = HostActionResponse),
        (status = 403, description = "Not the host", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn set_reconfiguring_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/{code}/reconfigure",
    params(("code" = String, Path, description = "Session code")),
    request_body = ReconfigureRequest,
    responses(
        (status = 200, body = ReconfigureResponse),
        (status = 403, description = "Not the host", body = ErrorResponse),
        (status = 404, description = "Session or restaurants not found", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn reconfigure_doc() {}

#[utoipa::path(
    get,
    path = "/api/session/{code}/results",
    params(("code" = String, Path, description = "Session code")),
    responses((status = 200, body = ResultsResponse), (status = 404, body = ErrorResponse)),
    tag = "Voting"
)]
fn results_doc() {}

#[utoipa::path(
    get,
    path = "/api/session/{code}/food-method",
    params(("code" = String, Path, description = "Session code"), ViewerQuery),
    responses((status = 200, body = FoodMethodResponse), (status = 404, body = ErrorResponse)),
    tag = "FoodMethod"
)]
fn get_food_method_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/{code}/food-method",
    params(("code" = String, Path, description = "Session code")),
    request_body = FoodMethodRequest,
    responses(
        (status = 200, body = FoodMethodResponse),
        (status = 403, description = "Not a member, or not the host when setting the result", body = ErrorResponse)
    ),
    tag = "FoodMethod"
)]
fn submit_food_method_doc() {}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = HealthResponse)),
    tag = "Health"
)]
fn health_doc() {}
