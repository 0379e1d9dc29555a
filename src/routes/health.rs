use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

#[get("/api")]
async fn status() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "AgriLink backend is running",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[get("/api/health")]
async fn health(pool: web::Data<PgPool>) -> impl Responder {
    let db_ok = sqlx::query("SELECT 1").execute(pool.get_ref()).await.is_ok();

    let body = json!({
        "status": if db_ok { "OK" } else { "DEGRADED" },
        "database": if db_ok { "connected" } else { "disconnected" },
        "timestamp": Utc::now().to_rfc3339(),
    });

    if db_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(status);
    cfg.service(health);
}
