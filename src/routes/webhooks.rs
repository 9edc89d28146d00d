use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::auth::ApiAuth;
use crate::error::AppResult;
use crate::state::AppState;

/// POST /api/webhooks/{id}/test
pub async fn test_webhook(
    state: web::Data<AppState>,
    _auth: ApiAuth,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let result = state.queue.send_test_message(path.into_inner()).await?;

    if result.success {
        Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Test message sent successfully"
        })))
    } else {
        Ok(HttpResponse::Ok().json(json!({
            "success": false,
            "message": result.error_message,
            "http_status": result.http_status
        })))
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/webhooks").route("/{id}/test", web::post().to(test_webhook)));
}
