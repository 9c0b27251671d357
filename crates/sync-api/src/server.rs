use crate::handlers::{get_flow, health_check, jobs, triggers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub struct ApiServer {
    host: String,
    port: u16,
    cors_enabled: bool,
    state: AppState,
}

impl ApiServer {
    pub fn new(host: String, port: u16, cors_enabled: bool, state: AppState) -> Self {
        Self {
            host,
            port,
            cors_enabled,
            state,
        }
    }

    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route("/health", get(health_check))
            .route("/api/flow", get(get_flow))
            // Triggers
            .route("/api/notifications", post(triggers::receive_notification))
            .route("/api/poll/run", post(triggers::run_poll))
            // Jobs
            .route("/api/jobs", get(jobs::list_jobs))
            .route("/api/jobs/{id}", get(jobs::get_job))
            .with_state(self.state.clone());

        if self.cors_enabled {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);

            app = app.layer(cors);
        }

        app
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", self.host, self.port);
        info!("Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use sync_core::{
        BatchRunner, DestinationAdapter, JobHandle, JobId, RunnerSettings, SyncFlow, SyncRules,
    };
    use sync_crm_destination::{CrmAdapter, CrmConfig};
    use sync_push_trigger::{sample_notification, PushConfig, PushTrigger};
    use tower::ServiceExt;

    fn push_flow() -> Arc<SyncFlow> {
        let crm = CrmAdapter::new("crm", CrmConfig::default()).unwrap();
        let adapters: Vec<Arc<dyn DestinationAdapter>> = vec![Arc::new(crm)];
        let runner = BatchRunner::new(
            "accounts",
            adapters,
            SyncRules::default(),
            RunnerSettings::default(),
        );
        Arc::new(SyncFlow::new(
            "accounts".to_string(),
            Box::new(PushTrigger::new(PushConfig::default())),
            runner,
            Duration::from_secs(5),
        ))
    }

    fn server(flow: Arc<SyncFlow>) -> ApiServer {
        ApiServer::new("127.0.0.1".to_string(), 0, true, AppState::new(flow))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "text/xml")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_flow_info() {
        let app = server(push_flow()).router();

        let (status, body) = call(app.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "healthy");

        let (status, body) = call(app, get("/api/flow")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "accounts");
        assert_eq!(body["data"]["policy"], "push");
        assert_eq!(body["data"]["destinations"], serde_json::json!(["crm"]));
    }

    #[tokio::test]
    async fn test_notification_starts_one_job() {
        let flow = push_flow();
        let app = server(flow.clone()).router();

        let (status, body) = call(
            app.clone(),
            post("/api/notifications", sample_notification("X-ApiPush")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["records"], 1);

        let job_id: JobId = body["data"]["job_id"].as_str().unwrap().parse().unwrap();
        let result = flow
            .runner()
            .await_completion(&JobHandle { job_id, total: 1 }, Duration::from_secs(5))
            .await
            .unwrap();
        result.assert_successful().unwrap();

        let (status, body) = call(app.clone(), get(&format!("/api/jobs/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "finished");
        assert_eq!(body["data"]["status"], "SUCCEEDED");

        let (_, body) = call(app, get("/api/jobs")).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let flow = push_flow();
        let app = server(flow.clone()).router();

        let (status, body) = call(app.clone(), post("/api/notifications", "<notifications/>")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(flow.runner().jobs().await.is_empty());

        // push flows are not polled
        let (status, _) = call(app.clone(), post("/api/poll/run", Body::empty())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(app.clone(), get("/api/jobs/not-a-job")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(app, get(&format!("/api/jobs/{}", JobId::new()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
