//! The REST adapter.
//!
//! Thin translation layer over [`JobService`]: request parsing and the
//! response envelope live here, everything else is the facade's business.

pub mod response;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::de::DeserializeOwned;
use tower_http::cors::{Any, CorsLayer};

use crate::service::{CreateJob, JobService, UpdateJob};
use response::Envelope;

const API_PREFIX: &str = "/api/v1";

pub fn router(service: JobService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            &format!("{API_PREFIX}/job"),
            get(list_jobs).post(create_job),
        )
        .route(
            &format!("{API_PREFIX}/job/{{id}}"),
            get(get_job).patch(update_job).delete(delete_job),
        )
        .layer(cors)
        .with_state(service)
}

/// Decode a JSON body, surfacing parse failures in the envelope instead of
/// an extractor rejection.
fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, (StatusCode, Envelope)> {
    serde_json::from_slice(body).map_err(|e| {
        let err = crate::error::CronmanError::BadRequest(format!(
            "Failed to parse the JSON body. Error: {e}"
        ));
        Envelope::error(&err)
    })
}

async fn list_jobs(State(service): State<JobService>) -> (StatusCode, Envelope) {
    match service.list().await {
        Ok(jobs) => Envelope::ok(jobs),
        Err(e) => Envelope::error(&e),
    }
}

async fn get_job(
    State(service): State<JobService>,
    Path(id): Path<String>,
) -> (StatusCode, Envelope) {
    match service.get(&id).await {
        Ok(job) => Envelope::ok(job),
        Err(e) => Envelope::error(&e),
    }
}

async fn create_job(State(service): State<JobService>, body: Bytes) -> (StatusCode, Envelope) {
    let request: CreateJob = match decode_body(&body) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    match service.create(request).await {
        Ok(job) => Envelope::ok(job),
        Err(e) => Envelope::error(&e),
    }
}

async fn update_job(
    State(service): State<JobService>,
    Path(id): Path<String>,
    body: Bytes,
) -> (StatusCode, Envelope) {
    let patch: UpdateJob = match decode_body(&body) {
        Ok(patch) => patch,
        Err(rejection) => return rejection,
    };
    match service.update(&id, patch).await {
        Ok(job) => Envelope::ok(job),
        Err(e) => Envelope::error(&e),
    }
}

async fn delete_job(
    State(service): State<JobService>,
    Path(id): Path<String>,
) -> (StatusCode, Envelope) {
    match service.delete(&id).await {
        Ok(()) => Envelope::ok(format!("Successfully deleted the job - {id}")),
        Err(e) => Envelope::error(&e),
    }
}
