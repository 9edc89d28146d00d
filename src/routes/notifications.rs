use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::auth::ApiAuth;
use crate::error::AppResult;
use crate::state::AppState;

/// POST /api/notifications/{pk}/resend
///
/// Queues the notification again for the owner's active webhooks, even if
/// it was already sent. Delivery happens on the next drain.
pub async fn resend_notification(
    state: web::Data<AppState>,
    _auth: ApiAuth,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let webhook_ids = state.queue.force_resend(path.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(json!({ "queued_webhooks": webhook_ids })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/notifications")
            .route("/{pk}/resend", web::post().to(resend_notification)),
    );
}
