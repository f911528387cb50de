use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cadence_core::error::CadenceError;

// ---------------------------------------------------------------------------
// Sentinels for auth failures
// ---------------------------------------------------------------------------

/// Carries an HTTP 401 through the `anyhow::Error` chain.
#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

/// Carries an HTTP 403 through the `anyhow::Error` chain.
#[derive(Debug)]
struct ForbiddenError(String);

impl std::fmt::Display for ForbiddenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ForbiddenError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. The body is always
/// `{ "error": { "name": ..., "message": ... } }`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// 400 with a `ValidationError` body.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(CadenceError::Validation(msg.into()).into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(ForbiddenError(msg.into()).into())
    }

    fn status_and_name(&self) -> (StatusCode, &'static str) {
        if self.0.downcast_ref::<UnauthorizedError>().is_some() {
            return (StatusCode::UNAUTHORIZED, "UnauthorizedError");
        }
        if self.0.downcast_ref::<ForbiddenError>().is_some() {
            return (StatusCode::FORBIDDEN, "ForbiddenError");
        }
        match self.0.downcast_ref::<CadenceError>() {
            Some(e @ CadenceError::NotFound(_)) => (StatusCode::NOT_FOUND, e.name()),
            Some(e @ (CadenceError::Validation(_) | CadenceError::AlreadyOnRelease { .. })) => {
                (StatusCode::BAD_REQUEST, e.name())
            }
            Some(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.name()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "ApplicationError"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, name) = self.status_and_name();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({
            "error": { "name": name, "message": self.0.to_string() }
        });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError(CadenceError::release_not_found(7).into());
        assert_eq!(status(err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_and_duplicate_entry_map_to_400() {
        assert_eq!(
            status(AppError(CadenceError::already_published().into())),
            StatusCode::BAD_REQUEST
        );
        let dup = CadenceError::AlreadyOnRelease {
            entry_id: 1,
            content_type: "api::article.article".into(),
            release_id: 2,
        };
        assert_eq!(status(AppError(dup.into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn auth_sentinels() {
        assert_eq!(status(AppError::unauthorized("no token")), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AppError::forbidden("nope")), StatusCode::FORBIDDEN);
    }

    #[test]
    fn other_errors_map_to_500() {
        assert_eq!(
            status(AppError(CadenceError::Db("disk".into()).into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AppError(anyhow::anyhow!("unexpected"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_carries_name_and_message() {
        let response = AppError::bad_request("Scheduled at must be later than now").into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["name"], "ValidationError");
        assert_eq!(json["error"]["message"], "Scheduled at must be later than now");
    }
}
