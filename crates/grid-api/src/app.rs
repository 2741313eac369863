use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_token;
use crate::handlers;
use crate::state::AppState;

/// Build the full router (§6's route table): an unauthenticated health
/// check plus every state-backend and RPC route behind [`require_token`].
pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/readyz", get(handlers::readyz))
        .route(
            "/tfstate/:guid",
            get(handlers::get_tfstate).post(handlers::post_tfstate).delete(handlers::delete_tfstate),
        )
        .route("/tfstate/:guid/lock", post(handlers::lock_tfstate))
        .route("/tfstate/:guid/unlock", post(handlers::unlock_tfstate))
        .route("/states", post(handlers::create_state).get(handlers::list_states))
        .route("/states/:state_ref", get(handlers::get_state_info).delete(handlers::destroy_state))
        .route("/states/:state_ref/labels", patch(handlers::update_state_labels))
        .route("/states/:state_ref/outputs", get(handlers::list_state_outputs))
        .route("/states/:state_ref/status", get(handlers::get_state_status))
        .route("/states/:state_ref/topology", get(handlers::get_topology))
        .route("/states/:state_ref/graph", get(handlers::get_dependency_graph))
        .route("/states/:state_ref/render", post(handlers::render_state))
        .route("/dependencies", post(handlers::add_dependency).get(handlers::list_dependencies))
        .route("/dependencies/:id", delete(handlers::remove_dependency))
        .route("/dependents", get(handlers::list_dependents))
        .route("/outputs/:name/consumers", get(handlers::search_by_output))
        .route("/dependencies/all", get(handlers::list_all_edges))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use grid_render::RenderConfig;
    use grid_service::DependencyService;
    use grid_store::{EdgeStore, InMemoryStore, StateStore};
    use grid_worker::EdgeWorker;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const TEST_TOKEN: &str = "test-token";

    fn test_state() -> AppState {
        let store = Arc::new(InMemoryStore::new());
        let worker = Arc::new(EdgeWorker::new(
            store.clone() as Arc<dyn EdgeStore>,
            store.clone() as Arc<dyn StateStore>,
        ));
        let service = Arc::new(DependencyService::new(
            store.clone() as Arc<dyn StateStore>,
            store.clone() as Arc<dyn EdgeStore>,
            worker.clone(),
        ));
        AppState::new(
            store.clone() as Arc<dyn StateStore>,
            store as Arc<dyn EdgeStore>,
            service,
            worker,
            TEST_TOKEN,
            None,
            RenderConfig { backend_base_url: "http://localhost:8080/tfstate".to_string() },
            5 * 1024 * 1024,
        )
    }

    fn auth_header() -> (&'static str, String) {
        ("authorization", format!("Bearer {TEST_TOKEN}"))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_requires_no_auth() {
        let app = build_app(test_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_unauthorized() {
        let app = build_app(test_state());
        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn full_dependency_wiring_round_trip() {
        let app = build_app(test_state());
        let (key, value) = auth_header();

        let producer = Uuid::now_v7();
        let consumer = Uuid::now_v7();

        let create = |guid: Uuid, logic_id: &str| {
            Request::builder()
                .method("POST")
                .uri("/states")
                .header(key, value.clone())
                .header("content-type", "application/json")
                .body(Body::from(json!({"guid": guid, "logic_id": logic_id}).to_string()))
                .unwrap()
        };

        let response = app.clone().oneshot(create(producer, "producer")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = app.clone().oneshot(create(consumer, "consumer")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let add_dep = Request::builder()
            .method("POST")
            .uri("/dependencies")
            .header(key, value.clone())
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "from_ref": "producer",
                    "from_output": "vpc_id",
                    "to_ref": "consumer",
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(add_dep).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let edge = body_json(response).await;
        assert_eq!(edge["status"], "pending");
        assert_eq!(edge["to_input_name"], "producer_vpc_id");

        let status_req = Request::builder()
            .uri("/states/consumer/status")
            .header(key, value.clone())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(status_req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["verdict"], "Stale");
    }

    #[tokio::test]
    async fn tfstate_write_then_read_round_trips_and_returns_204_when_empty() {
        let app = build_app(test_state());
        let (key, value) = auth_header();
        let guid = Uuid::now_v7();

        let create = Request::builder()
            .method("POST")
            .uri("/states")
            .header(key, value.clone())
            .header("content-type", "application/json")
            .body(Body::from(json!({"guid": guid, "logic_id": "solo"}).to_string()))
            .unwrap();
        app.clone().oneshot(create).await.unwrap();

        let empty_get = Request::builder()
            .uri(format!("/tfstate/{guid}"))
            .header(key, value.clone())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(empty_get).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let blob = br#"{"serial": 1, "outputs": {"vpc_id": {"value": "vpc-1", "sensitive": false}}}"#;
        let write = Request::builder()
            .method("POST")
            .uri(format!("/tfstate/{guid}"))
            .header(key, value.clone())
            .body(Body::from(blob.to_vec()))
            .unwrap();
        let response = app.clone().oneshot(write).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let read = Request::builder()
            .uri(format!("/tfstate/{guid}"))
            .header(key, value.clone())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(read).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &blob[..]);
    }

    #[tokio::test]
    async fn lock_conflict_returns_423_with_current_holder() {
        let app = build_app(test_state());
        let (key, value) = auth_header();
        let guid = Uuid::now_v7();

        let create = Request::builder()
            .method("POST")
            .uri("/states")
            .header(key, value.clone())
            .header("content-type", "application/json")
            .body(Body::from(json!({"guid": guid, "logic_id": "solo"}).to_string()))
            .unwrap();
        app.clone().oneshot(create).await.unwrap();

        let lock_body = json!({
            "ID": "lock-1",
            "Operation": "plan",
            "Who": "alice@example.com",
            "Created": "2026-01-01T00:00:00Z",
            "Path": "solo/terraform.tfstate",
        })
        .to_string();

        let first_lock = Request::builder()
            .method("POST")
            .uri(format!("/tfstate/{guid}/lock"))
            .header(key, value.clone())
            .header("content-type", "application/json")
            .body(Body::from(lock_body.clone()))
            .unwrap();
        let response = app.clone().oneshot(first_lock).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let second_lock = Request::builder()
            .method("POST")
            .uri(format!("/tfstate/{guid}/lock"))
            .header(key, value.clone())
            .header("content-type", "application/json")
            .body(Body::from(lock_body))
            .unwrap();
        let response = app.clone().oneshot(second_lock).await.unwrap();
        assert_eq!(response.status(), StatusCode::LOCKED);
        let conflict = body_json(response).await;
        assert_eq!(conflict["ID"], "lock-1");
    }

    #[tokio::test]
    async fn cycle_rejection_is_unprocessable() {
        let app = build_app(test_state());
        let (key, value) = auth_header();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        for (guid, logic_id) in [(a, "a"), (b, "b")] {
            let create = Request::builder()
                .method("POST")
                .uri("/states")
                .header(key, value.clone())
                .header("content-type", "application/json")
                .body(Body::from(json!({"guid": guid, "logic_id": logic_id}).to_string()))
                .unwrap();
            app.clone().oneshot(create).await.unwrap();
        }

        let forward = Request::builder()
            .method("POST")
            .uri("/dependencies")
            .header(key, value.clone())
            .header("content-type", "application/json")
            .body(Body::from(json!({"from_ref": "a", "from_output": "o", "to_ref": "b"}).to_string()))
            .unwrap();
        app.clone().oneshot(forward).await.unwrap();

        let backward = Request::builder()
            .method("POST")
            .uri("/dependencies")
            .header(key, value.clone())
            .header("content-type", "application/json")
            .body(Body::from(json!({"from_ref": "b", "from_output": "o", "to_ref": "a"}).to_string()))
            .unwrap();
        let response = app.clone().oneshot(backward).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
