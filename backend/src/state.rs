use std::sync::Arc;

use crate::{
    config::Config,
    middleware::ParticipantRateLimiter,
    selection::{OutcomeRecorder, RestaurantSourcing},
    services::SessionStore,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub sourcing: Arc<RestaurantSourcing>,
    pub outcomes: OutcomeRecorder,
    pub rate_limiter: Arc<ParticipantRateLimiter>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionStore>,
        sourcing: Arc<RestaurantSourcing>,
        outcomes: OutcomeRecorder,
        config: Config,
    ) -> Self {
        Self {
            rate_limiter: Arc::new(ParticipantRateLimiter::from_config(&config)),
            sessions,
            sourcing,
            outcomes,
            config,
        }
    }
}
