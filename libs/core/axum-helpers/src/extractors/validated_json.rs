//! JSON extractor with automatic validation using the validator crate.

use crate::errors::{ApiError, ErrorCode};
use axum::{
    extract::{FromRequest, Json, Request},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON extractor with automatic validation.
///
/// Validates the request body using the `validator` crate's `Validate` trait.
/// Returns the standard error envelope with per-field details on failure.
///
/// # Example
/// ```ignore
/// use axum_helpers::ValidatedJson;
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct CreateSimulation {
///     #[validate(range(min = 1))]
///     max_concurrency: u32,
/// }
///
/// async fn create(ValidatedJson(payload): ValidatedJson<CreateSimulation>) { /* ... */ }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state).await.map_err(|e| {
            ApiError::new(ErrorCode::ValidationError, e.body_text()).into_response()
        })?;

        data.validate()
            .map_err(|e| ApiError::from(e).into_response())?;

        Ok(ValidatedJson(data))
    }
}
