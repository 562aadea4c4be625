use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

pub const USER_ID_HEADER: &str = "X-User-ID";

/// Current-user provider for the HTTP surface.
///
/// Reads the owner from the `X-User-ID` header set by the authenticating
/// front end. A missing header is not rejected here: the document core turns
/// an absent owner into `MissingOwner`, so there is a single place deciding it.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<String>);

impl CurrentUser {
    pub fn owner_id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        if let Some(user_id) = &user_id {
            tracing::Span::current().record("user_id", user_id.as_str());
        }

        Ok(CurrentUser(user_id))
    }
}
