//! HTTP routes: the collaborator-facing code endpoint, the code entry form and
//! the provider callback.

use crate::pages;
use crate::service::LinkService;
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chatlink_core::LinkError;
use chatlink_oauth2::AuthorizationCallback;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LinkService>,
    /// Bearer token required on `POST /link/codes` when set
    pub collaborator_token: Option<String>,
    /// Address of the code entry page, returned with each issued code
    pub link_page_url: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueCodeRequest {
    pub messaging_identity: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueCodeResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub link_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitCodeForm {
    #[serde(default)]
    pub code: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/link/codes", post(issue_code))
        .route("/link", get(link_form).post(submit_code))
        .route("/oauth2/callback", get(oauth2_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

fn error_status(err: &LinkError) -> StatusCode {
    if err.is_user_facing() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Text shown to the user. Internal failures never leak their details.
fn user_message(err: &LinkError) -> &'static str {
    match err {
        LinkError::NotFound => "That code or link is not valid.",
        LinkError::Expired => "That code or link has expired.",
        LinkError::AlreadyUsed => "That code or link has already been used.",
        LinkError::ConsentDenied(_) => "Access to your account was not granted.",
        LinkError::InvalidCallback(_) => "The provider response was incomplete.",
        LinkError::ProviderExchangeFailed(_) | LinkError::StoreUnavailable(_) => {
            "Something went wrong while linking your account."
        }
    }
}

fn authorized(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

async fn issue_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IssueCodeRequest>,
) -> Response {
    if !authorized(&headers, state.collaborator_token.as_deref()) {
        warn!("Rejected code request with missing or invalid bearer token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthorized" })),
        )
            .into_response();
    }

    let messaging_identity = request.messaging_identity.trim();
    if messaging_identity.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "messaging_identity is required" })),
        )
            .into_response();
    }

    match state.service.issue_code(messaging_identity).await {
        Ok(link_code) => Json(IssueCodeResponse {
            code: link_code.code,
            expires_at: link_code.expires_at,
            link_url: state.link_page_url.clone(),
        })
        .into_response(),
        Err(e) => {
            error!(%messaging_identity, "Failed to issue link code: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "code issuance failed" })),
            )
                .into_response()
        }
    }
}

async fn link_form() -> Response {
    pages::link_form(None).into_response()
}

async fn submit_code(State(state): State<AppState>, Form(form): Form<SubmitCodeForm>) -> Response {
    match state.service.submit_code(&form.code).await {
        Ok(authorization_url) => Redirect::to(&authorization_url).into_response(),
        Err(e) => {
            if !e.is_user_facing() {
                error!("Code submission failed: {}", e);
            }
            (error_status(&e), pages::link_form(Some(user_message(&e)))).into_response()
        }
    }
}

async fn oauth2_callback(
    State(state): State<AppState>,
    Query(callback): Query<AuthorizationCallback>,
) -> Response {
    // Detached so a client disconnect cannot abandon a redeemed grant halfway
    let service = state.service.clone();
    let outcome = tokio::spawn(async move { service.handle_callback(callback).await }).await;

    match outcome {
        Ok(Ok(_)) => pages::link_success().into_response(),
        Ok(Err(e)) => (error_status(&e), pages::link_failure(user_message(&e))).into_response(),
        Err(e) => {
            error!("Callback task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::link_failure("Something went wrong while linking your account."),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_check() {
        let mut headers = HeaderMap::new();
        assert!(authorized(&headers, None));
        assert!(!authorized(&headers, Some("secret")));

        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(!authorized(&headers, Some("secret")));

        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(authorized(&headers, Some("secret")));

        headers.insert(header::AUTHORIZATION, "Basic secret".parse().unwrap());
        assert!(!authorized(&headers, Some("secret")));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(error_status(&LinkError::Expired), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(&LinkError::ConsentDenied("access_denied".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&LinkError::StoreUnavailable("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(!user_message(&LinkError::ProviderExchangeFailed("secret detail".into()))
            .contains("secret"));
    }
}
