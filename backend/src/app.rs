use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    docs::ApiDoc,
    handlers,
    middleware::{self, create_session_rate_limiter},
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut creation_routes = Router::new()
        .route("/api/session/init", post(handlers::sessions::init_session))
        .route(
            "/api/session/create",
            post(handlers::sessions::create_session),
        );
    let mut vote_routes = Router::new().route(
        "/api/session/{code}/vote",
        post(handlers::voting::cast_vote),
    );

    if config.rate_limit_enabled {
        if let Some(limiter) = create_session_rate_limiter(&config) {
            creation_routes = creation_routes.route_layer(limiter);
        }
        vote_routes = vote_routes.route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::participant_rate_limit,
        ));
    } else {
        tracing::warn!("Rate limiting disabled");
    }

    let session_routes = Router::new()
        .route("/api/session/{code}", get(handlers::sessions::get_session))
        .route(
            "/api/session/{code}/status",
            get(handlers::voting::voting_status),
        )
        .route(
            "/api/session/{code}/close-voting",
            post(handlers::voting::close_voting),
        )
        .route(
            "/api/session/{code}/set-reconfiguring",
            post(handlers::voting::set_reconfiguring),
        )
        .route(
            "/api/session/{code}/reconfigure",
            post(handlers::sessions::reconfigure_session),
        )
        .route(
            "/api/session/{code}/results",
            get(handlers::voting::session_results),
        )
        .route(
            "/api/session/{code}/food-method",
            get(handlers::food_method::get_food_method)
                .post(handlers::food_method::submit_food_method),
        );

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(creation_routes)
        .merge(vote_routes)
        .merge(session_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config))
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(axum_middleware::from_fn(middleware::log_error_responses))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::identify_caller,
                )),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_any = origins.is_empty() || config.cors_allow_origins.iter().any(|o| o == "*");
    let allow_origin = if allow_any {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(24 * 60 * 60))
}

