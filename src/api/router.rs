//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Slot and chat routes require bearer token authentication; account
//! creation, login and the health check do not.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::api::websocket;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost
/// layer); endpoint handlers use `State<ApiContext>`.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // Protected routes — bearer token required.
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/slots/available", get(endpoints::slots::available))
        .route("/slots/book", post(endpoints::slots::book))
        .route("/slots", post(endpoints::slots::create))
        .route("/slots/:slot_id", delete(endpoints::slots::delete_slot))
        .route(
            "/slots/pending-approval",
            get(endpoints::slots::pending_approval),
        )
        .route("/slots/:slot_id/approve", post(endpoints::slots::approve))
        .route("/chat/history/:patient_id", get(endpoints::chat::history))
        .route("/chat/patients", get(endpoints::chat::patients))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so the middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone());

    // WebSocket upgrade route (token-in-query auth)
    let ws_routes = Router::new()
        .route("/ws", get(websocket::ws_upgrade))
        .with_state(ctx);

    Router::new()
        .merge(protected)
        .merge(unprotected)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::identity::{self, NewUser};

    const PASSWORD: &str = "router-test-pass";

    fn test_core() -> (Arc<CoreState>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::new(tmp.path().join("router.db")));
        core.open_db().unwrap(); // initialize schema
        (core, tmp)
    }

    fn patient_token(core: &CoreState, email: &str) -> (String, Uuid) {
        let conn = core.open_db().unwrap();
        let user = identity::register(
            &conn,
            NewUser {
                email: email.to_string(),
                password: PASSWORD.to_string(),
                first_name: None,
                last_name: None,
            },
            Utc::now().naive_utc(),
        )
        .unwrap();
        let (token, _) = identity::login(&conn, email, PASSWORD, Utc::now().naive_utc()).unwrap();
        (token, user.id)
    }

    fn staff_token(core: &CoreState, email: &str) -> (String, Uuid) {
        let conn = core.open_db().unwrap();
        let id =
            identity::ensure_staff_account(&conn, email, PASSWORD, Utc::now().naive_utc()).unwrap();
        let (token, _) = identity::login(&conn, email, PASSWORD, Utc::now().naive_utc()).unwrap();
        (token, id)
    }

    fn request(
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let (core, _tmp) = test_core();
        let app = api_router(core);

        let response = app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn slots_require_auth() {
        let (core, _tmp) = test_core();
        let app = api_router(core);

        let response = app
            .oneshot(request("GET", "/slots/available", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_token_is_401() {
        let (core, _tmp) = test_core();
        let app = api_router(core);

        let response = app
            .oneshot(request("GET", "/slots/available", Some("bogus"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn patients_cannot_publish_slots() {
        let (core, _tmp) = test_core();
        let (token, _) = patient_token(&core, "alice@clinic.test");
        let app = api_router(core);

        let response = app
            .oneshot(request(
                "POST",
                "/slots",
                Some(&token),
                Some(serde_json::json!({
                    "date_time": (Utc::now() + Duration::hours(1)).to_rfc3339()
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    /// The full lifecycle scenario: publish → list → claim → relist →
    /// losing claim → approve → re-approve conflict.
    #[tokio::test]
    async fn booking_lifecycle_end_to_end() {
        let (core, _tmp) = test_core();
        let (staff, _) = staff_token(&core, "desk@clinic.test");
        let (alice, _) = patient_token(&core, "alice@clinic.test");
        let (bob, _) = patient_token(&core, "bob@clinic.test");

        let app = api_router(core);

        // Staff publish a slot one hour out
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/slots",
                Some(&staff),
                Some(serde_json::json!({
                    "date_time": (Utc::now() + Duration::hours(1)).to_rfc3339()
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let slot_id = body_json(response).await["slot"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        // Listed as available
        let response = app
            .clone()
            .oneshot(request("GET", "/slots/available", Some(&alice), None))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed["slots"].as_array().unwrap().len(), 1);

        // Alice claims it
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/slots/book",
                Some(&alice),
                Some(serde_json::json!({ "slot_id": slot_id })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["slot"]["state"], "booked");

        // No longer available
        let response = app
            .clone()
            .oneshot(request("GET", "/slots/available", Some(&bob), None))
            .await
            .unwrap();
        assert!(body_json(response).await["slots"]
            .as_array()
            .unwrap()
            .is_empty());

        // Bob's claim conflicts
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/slots/book",
                Some(&bob),
                Some(serde_json::json!({ "slot_id": slot_id })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Pending list shows Alice's booking to staff
        let response = app
            .clone()
            .oneshot(request("GET", "/slots/pending-approval", Some(&staff), None))
            .await
            .unwrap();
        let pending = body_json(response).await;
        assert_eq!(pending["pending"][0]["patient_email"], "alice@clinic.test");

        // Staff approve
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/slots/{slot_id}/approve"),
                Some(&staff),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["slot"]["state"], "confirmed");

        // Re-approval is a conflict, not a no-op
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/slots/{slot_id}/approve"),
                Some(&staff),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // A reserved slot cannot be deleted
        let response = app
            .oneshot(request(
                "DELETE",
                &format!("/slots/{slot_id}"),
                Some(&staff),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn approve_of_unknown_slot_is_404() {
        let (core, _tmp) = test_core();
        let (staff, _) = staff_token(&core, "desk@clinic.test");
        let app = api_router(core);

        let response = app
            .oneshot(request(
                "POST",
                &format!("/slots/{}/approve", Uuid::new_v4()),
                Some(&staff),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patient_history_is_confined_to_own_channel() {
        let (core, _tmp) = test_core();
        let (alice, alice_id) = patient_token(&core, "alice@clinic.test");
        let (_bob, bob_id) = patient_token(&core, "bob@clinic.test");

        // Seed one message per channel
        {
            let conn = core.open_db().unwrap();
            for (owner, text) in [(alice_id, "mine"), (bob_id, "theirs")] {
                crate::chat::persist_message(
                    &conn,
                    &crate::identity::AuthUser {
                        user_id: owner,
                        role: crate::models::enums::Role::Patient,
                    },
                    None,
                    text,
                    Utc::now().naive_utc(),
                )
                .unwrap();
            }
        }

        let app = api_router(core);

        // Alice requests Bob's history and receives her own
        let response = app
            .oneshot(request(
                "GET",
                &format!("/chat/history/{bob_id}"),
                Some(&alice),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = body_json(response).await;
        assert_eq!(history["channel_owner_id"], alice_id.to_string());
        assert_eq!(history["messages"].as_array().unwrap().len(), 1);
        assert_eq!(history["messages"][0]["content"], "mine");
    }

    #[tokio::test]
    async fn roster_is_staff_only() {
        let (core, _tmp) = test_core();
        let (alice, _) = patient_token(&core, "alice@clinic.test");
        let (staff, _) = staff_token(&core, "desk@clinic.test");
        let app = api_router(core);

        let response = app
            .clone()
            .oneshot(request("GET", "/chat/patients", Some(&alice), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request("GET", "/chat/patients", Some(&staff), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let roster = body_json(response).await;
        assert_eq!(roster["patients"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_then_login_issues_usable_token() {
        let (core, _tmp) = test_core();
        let app = api_router(core);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/auth/register",
                None,
                Some(serde_json::json!({
                    "email": "new@clinic.test",
                    "password": "long-enough-pass"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["user"]["role"], "patient");

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/auth/login",
                None,
                Some(serde_json::json!({
                    "email": "new@clinic.test",
                    "password": "long-enough-pass"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(request("GET", "/slots/available", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (core, _tmp) = test_core();
        patient_token(&core, "taken@clinic.test");
        let app = api_router(core);

        let response = app
            .oneshot(request(
                "POST",
                "/auth/register",
                None,
                Some(serde_json::json!({
                    "email": "taken@clinic.test",
                    "password": "long-enough-pass"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
