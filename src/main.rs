use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use log::info;
use tokio::net::TcpListener;

mod auth;
mod databases;
mod routes;
mod services;
mod ws;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let pool = databases::setup_backend().await?;

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "5000".to_string())
        .parse()
        .context("Invalid PORT")?;
    let ws_port: u16 = std::env::var("WS_PORT")
        .unwrap_or_else(|_| "5001".to_string())
        .parse()
        .context("Invalid WS_PORT")?;
    let allowed_origins: Vec<String> = std::env::var("ALLOWED_ORIGINS")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let ws_listener = TcpListener::bind(("0.0.0.0", ws_port))
        .await
        .with_context(|| format!("Failed to bind relay port {}", ws_port))?;
    tokio::spawn(ws::run_relay(ws_listener, Arc::new(ws::RelayState::new())));
    info!("Chat relay listening on port {}", ws_port);

    info!("AgriLink backend listening on port {}", port);

    let pool_data = web::Data::new(pool);
    HttpServer::new(move || {
        let cors = if allowed_origins.is_empty() {
            Cors::permissive()
        } else {
            let mut cors = Cors::default()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials();
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        App::new()
            .wrap(cors)
            .app_data(pool_data.clone())
            .configure(routes::health::init)
            .configure(routes::auth::init)
            .configure(routes::users::init)
            .configure(routes::products::init)
            .configure(routes::messages::init)
            .configure(routes::analytics::init)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
