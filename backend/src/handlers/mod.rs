pub mod food_method;
pub mod health;
pub mod sessions;
pub mod voting;

use crate::{error::AppError, types::SessionCode};

/// Path segments that are not a valid code cannot name a session.
pub(crate) fn path_code(raw: &str) -> Result<SessionCode, AppError> {
    SessionCode::parse(raw).map_err(|_| AppError::NotFound("Session not found".to_string()))
}

/// A code supplied in a request body is the client's mistake when malformed.
pub(crate) fn requested_code(raw: Option<&str>) -> Result<Option<SessionCode>, AppError> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => SessionCode::parse(raw)
            .map(Some)
            .map_err(|err| AppError::BadRequest(err.to_string())),
        None => Ok(None),
    }
}
