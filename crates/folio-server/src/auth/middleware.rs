use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use folio_core::config::AuthMode;

use crate::{error::AppError, state::AppState};

use super::jwt::decode_jwt;

/// Cookie carrying the dashboard token for browser clients.
pub const SESSION_COOKIE: &str = "folio_session";

/// Caller identity injected into request extensions by [`require_auth`].
///
/// With auth disabled every caller is [`AuthContext::anonymous`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
        }
    }
}

/// Guard for report routes and the realtime socket.
///
/// Accepts `Authorization: Bearer <jwt>` or the `folio_session` cookie.
/// A no-op when `FOLIO_AUTH=none`.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.config.auth_mode == AuthMode::None {
        request.extensions_mut().insert(AuthContext::anonymous());
        return next.run(request).await;
    }

    let Some(secret) = state.jwt_secret() else {
        tracing::error!("Auth enabled but no JWT secret configured");
        return AppError::Unauthorized.into_response();
    };

    let Some(token) = token_from_headers(request.headers()) else {
        return AppError::Unauthorized.into_response();
    };

    match decode_jwt(&token, secret) {
        Ok(claims) => {
            request
                .extensions_mut()
                .insert(AuthContext { subject: claims.sub });
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected dashboard token");
            AppError::Unauthorized.into_response()
        }
    }
}

/// Bearer header first, then the session cookie.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookie_str| {
            cookie_str.split(';').find_map(|c| {
                c.trim()
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
            })
        })
        .map(|t| t.to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::HeaderValue, routing::get, Extension, Router};
    use chrono_tz::Tz;
    use folio_core::config::{default_admin_paths, Config};
    use folio_duckdb::DuckDbBackend;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::jwt::encode_jwt;

    fn whoami_app(auth_mode: AuthMode) -> Router {
        let config = Config {
            port: 0,
            data_dir: "/tmp/folio-test".to_string(),
            geoip_path: "/nonexistent/GeoLite2-City.mmdb".to_string(),
            auth_mode,
            jwt_secret: Some("test-secret".to_string()),
            timezone: Tz::UTC,
            admin_paths: default_admin_paths(),
            dedup_window_minutes: 60,
            cors_origins: vec![],
            rate_limit_disable: false,
            duckdb_memory_limit: "1GB".to_string(),
        };
        let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
        let state = Arc::new(AppState::new(db, config));
        Router::new()
            .route(
                "/whoami",
                get(|Extension(auth): Extension<AuthContext>| async move { auth.subject }),
            )
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::clone(&state),
                require_auth,
            ))
            .with_state(state)
    }

    async fn whoami(app: Router, token: Option<&str>) -> String {
        let mut request = axum::http::Request::builder().uri("/whoami");
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = app
            .oneshot(request.body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn token_subject_reaches_handlers() {
        let (token, _) = encode_jwt("test-secret", "admin", 1).expect("token");
        assert_eq!(whoami(whoami_app(AuthMode::Token), Some(&token)).await, "admin");
    }

    #[tokio::test]
    async fn disabled_auth_yields_anonymous_subject() {
        assert_eq!(whoami(whoami_app(AuthMode::None), None).await, "anonymous");
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("folio_session=xyz"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; folio_session=xyz; lang=en"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn similarly_named_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("folio_session_old=xyz"));
        assert_eq!(token_from_headers(&headers), None);
    }
}
