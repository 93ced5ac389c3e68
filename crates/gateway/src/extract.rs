//! Request extractors

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};

use thesisforge_common::{
    auth::AuthContext,
    domain::User,
    errors::{AppError, Result},
};

use crate::AppState;

/// The authenticated caller, provisioned into the store on first sight.
///
/// Tokens are the source of truth for email, display name and global roles;
/// a stored user whose details drifted is updated in place.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let AuthContext { user, request_id } = AuthContext::from_request_parts(parts, state).await?;

        match state.store.find_user(user.id).await? {
            Some(stored) if stored == user => {}
            existing => {
                state.store.upsert_user(&user).await?;
                tracing::info!(
                    user_id = %user.id,
                    request_id = %request_id,
                    created = existing.is_none(),
                    "Provisioned user from token"
                );
            }
        }

        Ok(CurrentUser(user))
    }
}

/// `Json` whose rejections use the API error envelope.
///
/// Malformed bodies and unknown enum names answer 400 `VALIDATION_ERROR`
/// instead of axum's plain-text 422.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(AppError::Validation {
                message: rejection.body_text(),
                field: None,
            }),
        }
    }
}
