//! Unified validation framework for request payloads.
//!
//! Handlers take [`ValidatedJson`] instead of `Json`: malformed bodies and
//! rule violations both come back as 400 with the standard error body, so
//! the session store only ever sees well-typed values.

pub mod rules;

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub use validator::Validate;

/// JSON body that has been deserialized and passed its `validator` rules.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}
