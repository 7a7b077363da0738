pub mod identity;
pub mod logging;
pub mod rate_limit;
pub mod request_id;

pub use identity::{identify_caller, Caller};
pub use logging::log_error_responses;
pub use rate_limit::{create_session_rate_limiter, participant_rate_limit, ParticipantRateLimiter};
pub use request_id::{request_id, RequestId};
