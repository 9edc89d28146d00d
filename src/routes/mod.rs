pub mod health;
pub mod notifications;
pub mod owners;
pub mod webhooks;

use actix_web::web;

/// Registers every route of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure)
        .configure(owners::configure)
        .configure(notifications::configure)
        .configure(webhooks::configure);
}
