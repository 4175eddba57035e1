//! Header-based API token verification.

use actix_web::HttpRequest;

use crate::config::AuthConfig;
use crate::errors::ApiError;

/// Check the request against the configured token. With no token configured
/// every request is allowed; otherwise the token must arrive either as
/// `Authorization: Bearer <token>` or `X-API-Token: <token>`, compared
/// exactly.
pub fn verify_token(req: &HttpRequest, auth: &AuthConfig) -> Result<(), ApiError> {
    let Some(expected) = auth.api_token.as_deref() else {
        return Ok(());
    };

    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let header_token = req
        .headers()
        .get("X-API-Token")
        .and_then(|v| v.to_str().ok());

    if bearer == Some(expected) || header_token == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    fn auth_with_token() -> AuthConfig {
        AuthConfig {
            api_token: Some("secret".to_string()),
        }
    }

    #[test]
    fn unconfigured_token_allows_everything() {
        let req = TestRequest::default().to_http_request();
        let auth = AuthConfig { api_token: None };
        assert!(verify_token(&req, &auth).is_ok());
    }

    #[test]
    fn bearer_header_is_accepted() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer secret"))
            .to_http_request();
        assert!(verify_token(&req, &auth_with_token()).is_ok());
    }

    #[test]
    fn x_api_token_header_is_accepted() {
        let req = TestRequest::default()
            .insert_header(("X-API-Token", "secret"))
            .to_http_request();
        assert!(verify_token(&req, &auth_with_token()).is_ok());
    }

    #[test]
    fn missing_token_is_rejected() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            verify_token(&req, &auth_with_token()),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let req = TestRequest::default()
            .insert_header(("X-API-Token", "nope"))
            .to_http_request();
        assert!(matches!(
            verify_token(&req, &auth_with_token()),
            Err(ApiError::Unauthorized)
        ));
    }
}
