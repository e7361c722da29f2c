pub mod chats;
pub mod connections;
pub mod error;
pub mod middleware;
pub mod profiles;
pub mod recommendations;
pub mod sockets;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::middleware::require_identity;
use crate::state::AppState;

/// Every route, behind the identity middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/me", get(profiles::me))
        .route("/users/{id}", get(profiles::user_summary))
        .route("/users/{id}/bio", get(profiles::user_bio))
        .route("/chats", get(chats::list_chats))
        .route("/chats/send", post(chats::send_message))
        .route("/chats/{id}", get(chats::history))
        .route("/chats/{id}/read", post(chats::mark_read))
        .route("/recommendations", get(recommendations::get_recommendations))
        .route("/recommendations/decline", post(recommendations::decline_recommendation))
        .route("/connections", get(connections::list_connections))
        .route("/connections/requests", get(connections::pending_requests))
        .route("/connections/request", post(connections::send_request))
        .route("/connections/accept", post(connections::accept_request))
        .route("/connections/decline", post(connections::decline_request))
        .route("/connections/disconnect", post(connections::disconnect))
        .route("/ws/chat", get(sockets::direct_socket))
        .route("/ws/chat_list", get(sockets::chat_list_socket))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_identity))
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn missing_or_malformed_identity_is_unauthorized() {
        let app = TestApp::new();

        let response = crate::router(app.state.clone())
            .oneshot(Request::builder().uri("/chats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = crate::router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/chats")
                    .header("x-authenticated-user", "not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
