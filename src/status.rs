use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, Responder, get, web};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{
    error::{RunFailure, Stage},
    pipeline::RunReport,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessEntry {
    pub slot: DateTime<Utc>,
    #[serde(flatten)]
    pub report: RunReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub slot: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    pub stage: Stage,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub last_success: Option<SuccessEntry>,
    pub last_failure: Option<FailureEntry>,
}

/// Last known outcome of the scheduled runs, shared with the status endpoint.
#[derive(Debug, Default)]
pub struct StatusBoard {
    status: RwLock<RunStatus>,
}

impl StatusBoard {
    pub async fn record_success(&self, slot: DateTime<Utc>, report: RunReport) {
        self.status.write().await.last_success = Some(SuccessEntry { slot, report });
    }

    pub async fn record_failure(&self, slot: DateTime<Utc>, failure: &RunFailure) {
        self.status.write().await.last_failure = Some(FailureEntry {
            slot,
            failed_at: Utc::now(),
            stage: failure.stage,
            error: failure.error.to_string(),
        });
    }

    pub async fn snapshot(&self) -> RunStatus {
        self.status.read().await.clone()
    }
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

#[get("/status")]
async fn status(board: web::Data<StatusBoard>) -> impl Responder {
    HttpResponse::Ok().json(board.snapshot().await)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(status);
}

pub async fn serve(addr: &str, board: Arc<StatusBoard>) -> Result<()> {
    let data = web::Data::from(board);
    info!("Serving run status on {}", addr);

    HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .bind(addr)
        .with_context(|| format!("Can't bind status server to {}", addr))?
        .run()
        .await
        .context("Status server stopped")
}
