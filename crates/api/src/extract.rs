//! Caller identity from trusted upstream headers.
//!
//! Authentication happens in front of this service; the gateway forwards the
//! verified user as `x-user-id` (UUID) and `x-user-role` (`customer` or
//! `admin`, default `customer`).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Caller, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

impl Identity {
    /// Rejects callers without the admin role.
    pub fn require_admin(&self) -> Result<Caller, ApiError> {
        if self.0.is_admin() {
            Ok(self.0)
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .map(|v| {
                    v.to_str()
                        .map(str::trim)
                        .map_err(|_| ApiError::BadRequest(format!("{name} is not valid text")))
                })
                .transpose()
        };

        let user_id = header(USER_ID_HEADER)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?
            .parse::<UserId>()
            .map_err(|e| ApiError::Unauthenticated(format!("invalid {USER_ID_HEADER}: {e}")))?;

        let role = match header(USER_ROLE_HEADER)? {
            Some(raw) if !raw.is_empty() => raw.parse::<Role>().map_err(ApiError::BadRequest)?,
            _ => Role::Customer,
        };

        Ok(Identity(Caller { user_id, role }))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(headers: &[(&str, &str)]) -> Result<Identity, ApiError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_customer_by_default() {
        let user = UserId::new();
        let id = user.to_string();
        let identity = extract(&[(USER_ID_HEADER, id.as_str())]).await.unwrap();
        assert_eq!(identity.0, Caller::customer(user));
        assert!(identity.require_admin().is_err());
    }

    #[tokio::test]
    async fn test_admin_role() {
        let user = UserId::new();
        let id = user.to_string();
        let identity = extract(&[(USER_ID_HEADER, id.as_str()), (USER_ROLE_HEADER, "Admin")])
            .await
            .unwrap();
        assert_eq!(identity.require_admin().unwrap(), Caller::admin(user));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_user_is_unauthenticated() {
        assert!(matches!(extract(&[]).await, Err(ApiError::Unauthenticated(_))));
        assert!(matches!(
            extract(&[(USER_ID_HEADER, "not-a-uuid")]).await,
            Err(ApiError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let user = UserId::new().to_string();
        assert!(matches!(
            extract(&[(USER_ID_HEADER, user.as_str()), (USER_ROLE_HEADER, "root")]).await,
            Err(ApiError::BadRequest(_))
        ));
    }
}
