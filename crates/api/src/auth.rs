//! Caller identity supplied by the fronting auth proxy.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use database::Owner;

use crate::error::{ApiError, Result};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub organization_id: Option<String>,
}

impl AuthUser {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = header_value(headers, USER_ID_HEADER)?;
        Some(Self {
            user_id,
            organization_id: header_value(headers, ORGANIZATION_ID_HEADER),
        })
    }

    pub fn owner(&self) -> Owner {
        Owner::new(self.user_id.clone(), self.organization_id.clone())
    }

    /// A record is visible to its creator and to members of its organization.
    pub fn can_access(&self, user_id: &str, organization_id: Option<&str>) -> bool {
        if user_id == self.user_id {
            return true;
        }
        matches!(
            (organization_id, self.organization_id.as_deref()),
            (Some(theirs), Some(ours)) if theirs == ours
        )
    }

    /// Like [`AuthUser::can_access`], reporting hidden records as missing.
    pub fn ensure_access(
        &self,
        entity: &'static str,
        id: &str,
        user_id: &str,
        organization_id: Option<&str>,
    ) -> Result<()> {
        if self.can_access(user_id, organization_id) {
            Ok(())
        } else {
            Err(ApiError::not_found(entity, id))
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        AuthUser::from_headers(&parts.headers).ok_or_else(|| {
            tracing::warn!(path = %parts.uri.path(), "Unauthorized request");
            ApiError::Unauthorized
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(org: Option<&str>) -> AuthUser {
        AuthUser {
            user_id: "user-1".into(),
            organization_id: org.map(str::to_string),
        }
    }

    #[test]
    fn reads_identity_headers() {
        let mut headers = HeaderMap::new();
        assert!(AuthUser::from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" user-1 "));
        headers.insert(ORGANIZATION_ID_HEADER, HeaderValue::from_static(""));
        assert_eq!(AuthUser::from_headers(&headers), Some(user(None)));

        headers.insert(ORGANIZATION_ID_HEADER, HeaderValue::from_static("org-1"));
        assert_eq!(AuthUser::from_headers(&headers), Some(user(Some("org-1"))));
    }

    #[test]
    fn organization_members_share_records() {
        let caller = user(Some("org-1"));
        assert!(caller.can_access("user-1", None));
        assert!(caller.can_access("user-2", Some("org-1")));
        assert!(!caller.can_access("user-2", Some("org-2")));
        assert!(!user(None).can_access("user-2", None));
    }

    #[test]
    fn hidden_records_are_not_found() {
        let err = user(None)
            .ensure_access("Campaign", "c1", "user-2", Some("org-1"))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { entity: "Campaign", .. }));
    }
}
