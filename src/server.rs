use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::scorer::QueryTime;
use crate::service::{Failure, INVALID_TIME_MESSAGE, Prediction, Service};

const DEFAULT_QUERY_TIME: &str = "09:00";

#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let service = Service::bootstrap(&opts.data.paths(), opts.data.seed)
        .context("prepare survey model")?;
    tracing::info!("Serving {} doctors", service.population_size());

    let app = router(Arc::new(service));

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(service: Arc<Service>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api_home))
        .route("/predict", get(api_predict))
        .layer(cors)
        .with_state(AppState { service })
}

#[derive(Debug, Serialize)]
struct HomeResponse {
    message: &'static str,
}

async fn api_home() -> impl IntoResponse {
    Json(HomeResponse {
        message: "Doctor Survey Predictor API is running!",
    })
}

#[derive(Debug, Deserialize)]
struct PredictParams {
    time: Option<String>,
}

async fn api_predict(
    State(st): State<AppState>,
    Query(p): Query<PredictParams>,
) -> impl IntoResponse {
    let raw = p.time.unwrap_or_else(|| DEFAULT_QUERY_TIME.to_string());
    let at: QueryTime = match raw.parse() {
        Ok(t) => t,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(Failure::new(INVALID_TIME_MESSAGE)),
            )
                .into_response();
        }
    };

    // Scoring is CPU-bound; a panic there surfaces as a JoinError, not a crash.
    let service = st.service.clone();
    let error = match tokio::task::spawn_blocking(move || service.rank(at)).await {
        Ok(Ok(doctors)) => return Json(Prediction::new(at, doctors)).into_response(),
        Ok(Err(e)) => format!("{e:#}"),
        Err(e) => e.to_string(),
    };
    tracing::warn!("Error in prediction for {}: {}", at, error);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(Failure::new(error))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureFrame;
    use crate::model::{CompletionModel, TrainedModel};
    use crate::schema::FieldMapping;
    use crate::scorer::Population;
    use crate::table::{Column, Table};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    struct Constant(f64);

    impl CompletionModel for Constant {
        fn completion_probability(&self, features: &FeatureFrame) -> anyhow::Result<Vec<f64>> {
            Ok(vec![self.0; features.len()])
        }
    }

    struct Panicking;

    impl CompletionModel for Panicking {
        fn completion_probability(&self, _: &FeatureFrame) -> anyhow::Result<Vec<f64>> {
            panic!("scoring blew up")
        }
    }

    fn service_with(model: Arc<dyn CompletionModel>) -> Arc<Service> {
        let table = Table::new(vec![
            Column::text("NPI", ["NPI1", "NPI2"]),
            Column::text("Speciality", ["Cardiology", "Oncology"]),
            Column::text("Region", ["West", "South"]),
            Column::text("Login Time", ["21:00", "09:00"]),
        ])
        .unwrap();
        let mapping = FieldMapping::resolve(table.column_names());
        let population = Population::new(table, vec![30.0, 30.0]).unwrap();
        Arc::new(Service::new(TrainedModel::new(model, mapping), population, 42))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn home_reports_running() {
        let app = router(service_with(Arc::new(Constant(0.5))));
        let (status, body) = get_json(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Doctor Survey Predictor API is running!");
    }

    #[tokio::test]
    async fn predict_ranks_matching_hour_first() {
        let app = router(service_with(Arc::new(Constant(0.8))));
        let (status, body) = get_json(app, "/predict?time=9:00").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["time"], "09:00");
        let doctors = body["doctors"].as_array().unwrap();
        assert_eq!(doctors.len(), 2);
        assert_eq!(doctors[0]["npi"], "NPI2");
        assert_eq!(doctors[0]["likelihood_score"], 80.0);
        assert_eq!(doctors[1]["npi"], "NPI1");
        assert_eq!(doctors[1]["specialty"], "Cardiology");
    }

    #[tokio::test]
    async fn predict_defaults_to_nine_am() {
        let app = router(service_with(Arc::new(Constant(0.8))));
        let (status, body) = get_json(app, "/predict").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["time"], "09:00");
    }

    #[tokio::test]
    async fn out_of_range_time_is_a_client_error() {
        let app = router(service_with(Arc::new(Constant(0.8))));
        let (status, body) = get_json(app, "/predict?time=25:00").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], INVALID_TIME_MESSAGE);
        assert!(body.get("doctors").is_none());
    }

    #[tokio::test]
    async fn unpadded_time_normalizes_the_same_every_call() {
        let service = service_with(Arc::new(Constant(0.4)));
        let (_, first) = get_json(router(service.clone()), "/predict?time=9:5").await;
        let (_, second) = get_json(router(service), "/predict?time=09:05").await;
        assert_eq!(first["time"], "09:05");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn scoring_panic_is_a_server_error() {
        let service = service_with(Arc::new(Panicking));
        let (status, body) = get_json(router(service.clone()), "/predict?time=10:00").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some());

        // Shared state is still usable afterwards.
        let (status, _) = get_json(router(service), "/").await;
        assert_eq!(status, StatusCode::OK);
    }
}
