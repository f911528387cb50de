use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use cadence_core::types::Permission;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, attached to every request that passes the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: Option<String>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Caller of an unauthenticated server: no name, every permission.
    pub fn open() -> Self {
        Self {
            name: None,
            permissions: Permission::all().to_vec(),
        }
    }

    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.permissions.contains(&permission) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "Missing permission {}",
                permission.uid()
            )))
        }
    }

    pub fn actor(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Resolve the caller from `Authorization: Bearer <token>`.
///
/// With no tokens configured the gate is open and every request runs as
/// [`Principal::open`]. Otherwise a missing or unknown token is a 401.
pub async fn auth_middleware(State(app): State<AppState>, mut req: Request, next: Next) -> Response {
    let tokens = app.tokens();
    let principal = if tokens.is_empty() {
        Principal::open()
    } else {
        let presented = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        let Some(presented) = presented else {
            return AppError::unauthorized("Missing or invalid credentials").into_response();
        };
        match tokens.iter().find(|t| token_matches(presented, &t.token)) {
            Some(token) => Principal {
                name: Some(token.name.clone()),
                permissions: token.permissions.clone(),
            },
            None => {
                tracing::debug!("rejected unknown api token");
                return AppError::unauthorized("Missing or invalid credentials").into_response();
            }
        }
    };

    req.extensions_mut().insert(principal);
    next.run(req).await
}

/// Compare SHA-256 digests in constant time so neither the token contents
/// nor its length leak through response timing.
fn token_matches(presented: &str, expected: &str) -> bool {
    use sha2::{Digest, Sha256};
    use subtle::ConstantTimeEq;

    if presented.is_empty() || expected.is_empty() {
        return false;
    }
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.ct_eq(&b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_principal_holds_everything() {
        let p = Principal::open();
        for perm in Permission::all() {
            assert!(p.require(*perm).is_ok());
        }
        assert_eq!(p.actor(), None);
    }

    #[test]
    fn token_match_requires_exact_value() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cre", "s3cret"));
        assert!(!token_matches("s3cret-extra", "s3cret"));
        assert!(!token_matches("", ""));
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let p = Principal {
            name: Some("reader".into()),
            permissions: vec![Permission::Read],
        };
        assert!(p.require(Permission::Read).is_ok());
        let err = p.require(Permission::Publish).unwrap_err();
        assert_eq!(
            err.0.to_string(),
            "Missing permission plugin::content-releases.publish"
        );
    }
}
