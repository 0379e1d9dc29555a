use actix_web::{get, web, HttpResponse, Responder};
use log::error;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use sqlx::{FromRow, PgPool};

use crate::auth::AuthUser;
use crate::services::insights::generate_insights;

#[derive(FromRow)]
struct ProductStats {
    total_products: i64,
    active_products: i64,
    total_views: i64,
    monthly_revenue: f64,
    avg_price: Option<f64>,
}

#[derive(FromRow)]
struct PopularRow {
    name: String,
    views: i32,
}

#[derive(Serialize)]
struct PopularProduct {
    name: String,
    views: i32,
    sales: i32,
}

#[get("/api/analytics/farmer")]
async fn farmer_analytics(caller: AuthUser, pool: web::Data<PgPool>) -> impl Responder {
    if caller.role != "farmer" {
        return HttpResponse::Forbidden().json(json!({
            "message": "Only farmers can access analytics"
        }));
    }

    let stats = sqlx::query_as::<_, ProductStats>(
        "SELECT COUNT(*) AS total_products,
                COUNT(*) FILTER (WHERE available) AS active_products,
                COALESCE(SUM(views), 0)::BIGINT AS total_views,
                COALESCE(SUM(price * (initial_quantity - quantity)), 0) AS monthly_revenue,
                AVG(price) AS avg_price
         FROM products
         WHERE farmer = $1",
    )
    .bind(&caller.user_id)
    .fetch_one(pool.get_ref())
    .await;

    let stats = match stats {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to fetch product stats: {:?}", e);
            return HttpResponse::InternalServerError().body("Database error");
        }
    };

    let total_messages = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM messages WHERE sender = $1 OR receiver = $1",
    )
    .bind(&caller.user_id)
    .fetch_one(pool.get_ref())
    .await;

    let total_messages = match total_messages {
        Ok(count) => count,
        Err(e) => {
            error!("Failed to count messages: {:?}", e);
            return HttpResponse::InternalServerError().body("Database error");
        }
    };

    let popular = sqlx::query_as::<_, PopularRow>(
        "SELECT name, views FROM products WHERE farmer = $1 ORDER BY views DESC LIMIT 5",
    )
    .bind(&caller.user_id)
    .fetch_all(pool.get_ref())
    .await;

    let popular = match popular {
        Ok(rows) => rows,
        Err(e) => {
            error!("Failed to fetch popular products: {:?}", e);
            return HttpResponse::InternalServerError().body("Database error");
        }
    };

    // Sales and response rate have no backing data yet, so they are mocked
    // the same way the dashboard has always mocked them.
    let mut rng = rand::thread_rng();
    let popular_products: Vec<PopularProduct> = popular
        .into_iter()
        .map(|row| PopularProduct {
            name: row.name,
            views: row.views,
            sales: rng.gen_range(0..20),
        })
        .collect();
    let response_rate: i32 = rng.gen_range(70..100);

    let insights = generate_insights(stats.total_products, stats.avg_price);

    HttpResponse::Ok().json(json!({
        "stats": {
            "totalProducts": stats.total_products,
            "activeProducts": stats.active_products,
            "totalViews": stats.total_views,
            "monthlyRevenue": stats.monthly_revenue,
            "totalMessages": total_messages,
            "responseRate": response_rate,
        },
        "popularProducts": popular_products,
        "aiInsights": insights,
    }))
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(farmer_analytics);
}
