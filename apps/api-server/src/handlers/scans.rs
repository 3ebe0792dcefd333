//! Scan submission and status polling.

use actix_web::{HttpResponse, web};

use vigil_core::domain::{Job, JobId, JobStatus};
use vigil_shared::dto::{ScanAccepted, ScanStatusResponse, SubmitScanRequest};

use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /api/scans
pub async fn submit_scan(
    state: web::Data<AppState>,
    body: web::Json<SubmitScanRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    if req.target.trim().is_empty() {
        return Err(AppError::BadRequest("target must not be empty".to_string()));
    }

    let job_id = JobId::generate();
    let job = Job::pending()
        .with_field("job_id", job_id.as_str())
        .with_field("target", req.target.clone())
        .with_field("probes", req.probes.clone().unwrap_or_default());

    state.jobs.create(&job_id, &job).await?;
    state.runner.spawn(job_id.clone(), req);

    tracing::info!(job_id = %job_id, "Scan submitted");

    Ok(HttpResponse::Accepted().json(ScanAccepted {
        job_id: job_id.to_string(),
        status: JobStatus::Pending.to_string(),
    }))
}

/// GET /api/scans/{job_id}
///
/// A job whose runner has finished (running, no message) is marked complete
/// once its report is on disk.
pub async fn scan_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let job_id = JobId::parse(&path.into_inner())?;

    let mut job = read_job(&state, &job_id).await?;
    let report_available = state.runner.report_available(&job_id);

    if job.status == JobStatus::Running && job.status_message.is_none() && report_available {
        state
            .jobs
            .update(job_id.as_str(), JobStatus::Complete, "")
            .await;
        job = read_job(&state, &job_id).await?;
    }

    Ok(HttpResponse::Ok().json(ScanStatusResponse {
        job_id: job_id.to_string(),
        status: job.status.to_string(),
        status_message: job.status_message,
        report_available,
        updated_at: job.updated_at.map(|t| t.to_rfc3339()),
    }))
}

async fn read_job(state: &AppState, job_id: &JobId) -> AppResult<Job> {
    state
        .jobs
        .read(job_id.as_str())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("scan {} not found", job_id)))
}
