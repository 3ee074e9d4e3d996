use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::error::{ApiError, ApiResult};

/// Header carrying the id of the user the upstream session layer authenticated.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

pub async fn require_user(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user = user_from_headers(req.headers())?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

fn user_from_headers(headers: &HeaderMap) -> ApiResult<CurrentUser> {
    let value = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("invalid X-User-Id header".to_string()))?
        .trim();
    if value.is_empty() {
        return Err(ApiError::Unauthorized("invalid X-User-Id header".to_string()));
    }
    Ok(CurrentUser(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" user_1 "));
        assert_eq!(
            user_from_headers(&headers).unwrap(),
            CurrentUser("user_1".into())
        );
    }

    #[test]
    fn test_user_header_missing_or_blank() {
        assert!(matches!(
            user_from_headers(&HeaderMap::new()),
            Err(ApiError::Unauthorized(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static(""));
        assert!(matches!(
            user_from_headers(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
