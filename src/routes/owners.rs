//! Owner routes.
//!
//! - POST /api/owners/{id}/sync - Run a sync job
//! - GET /api/owners/{id}/structures - Structures with derived power state
//! - GET /api/owners/{id}/notifications - Stored notifications, newest first

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::ApiAuth;
use crate::error::{AppError, AppResult};
use crate::services::power;
use crate::state::AppState;
use crate::sync::SyncJob;

const DEFAULT_NOTIFICATION_LIMIT: i64 = 100;
const MAX_NOTIFICATION_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    pub limit: Option<i64>,
}

async fn require_owner(state: &AppState, owner_id: i64) -> AppResult<()> {
    state
        .store
        .get_owner(owner_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("Owner {} not found", owner_id)))
}

/// POST /api/owners/{id}/sync
pub async fn sync_owner(
    state: web::Data<AppState>,
    _auth: ApiAuth,
    path: web::Path<i64>,
    body: web::Json<SyncJob>,
) -> AppResult<HttpResponse> {
    let report = state
        .pipeline
        .run(path.into_inner(), body.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /api/owners/{id}/structures
pub async fn list_structures(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let owner_id = path.into_inner();
    require_owner(&state, owner_id).await?;

    let now = Utc::now();
    let structures: Vec<_> = state
        .store
        .structures_for_owner(owner_id)
        .await?
        .into_iter()
        .map(|s| power::health(s, now))
        .collect();

    Ok(HttpResponse::Ok().json(structures))
}

/// GET /api/owners/{id}/notifications
pub async fn list_notifications(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<NotificationListQuery>,
) -> AppResult<HttpResponse> {
    let owner_id = path.into_inner();
    require_owner(&state, owner_id).await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
        .clamp(1, MAX_NOTIFICATION_LIMIT);
    let notifications = state
        .store
        .notifications_for_owner(owner_id, limit)
        .await?;

    Ok(HttpResponse::Ok().json(notifications))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/owners/{id}")
            .route("/sync", web::post().to(sync_owner))
            .route("/structures", web::get().to(list_structures))
            .route("/notifications", web::get().to(list_notifications)),
    );
}
