use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, FromRow, PgPool};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::routes::users::Location;
use crate::services::pricing;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Vegetables,
    Fruits,
    Flowers,
    Grains,
    Herbs,
    Other,
}

impl Category {
    fn as_str(&self) -> &'static str {
        match self {
            Category::Vegetables => "vegetables",
            Category::Fruits => "fruits",
            Category::Flowers => "flowers",
            Category::Grains => "grains",
            Category::Herbs => "herbs",
            Category::Other => "other",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Kg,
    G,
    Pieces,
    Bunches,
    Crates,
}

impl Unit {
    fn as_str(&self) -> &'static str {
        match self {
            Unit::Kg => "kg",
            Unit::G => "g",
            Unit::Pieces => "pieces",
            Unit::Bunches => "bunches",
            Unit::Crates => "crates",
        }
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: String,
    farmer_id: String,
    name: String,
    category: String,
    description: String,
    price: f64,
    suggested_price: Option<f64>,
    quantity: f64,
    unit: String,
    county: Option<String>,
    subcounty: Option<String>,
    available: bool,
    views: i32,
    ai_score: Option<f64>,
    ai_message: Option<String>,
    created_at: DateTime<Utc>,
    farmer_name: String,
    farmer_farm_name: Option<String>,
    farmer_verified: bool,
    farmer_rating: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFarmer {
    pub id: String,
    pub name: String,
    pub farm_name: Option<String>,
    pub verified: bool,
    pub rating: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRecommendation {
    pub score: f64,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: String,
    pub farmer: ProductFarmer,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub suggested_price: Option<f64>,
    pub quantity: f64,
    pub unit: String,
    pub location: Location,
    pub available: bool,
    pub views: i32,
    pub ai_recommendation: Option<AiRecommendation>,
    pub created_at: DateTime<Utc>,
}

fn map_to_view(row: ProductRow) -> ProductView {
    let ai_recommendation = match (row.ai_score, row.ai_message) {
        (Some(score), Some(message)) => Some(AiRecommendation { score, message }),
        _ => None,
    };

    ProductView {
        id: row.id,
        farmer: ProductFarmer {
            id: row.farmer_id,
            name: row.farmer_name,
            farm_name: row.farmer_farm_name,
            verified: row.farmer_verified,
            rating: row.farmer_rating,
        },
        name: row.name,
        category: row.category,
        description: row.description,
        price: row.price,
        suggested_price: row.suggested_price,
        quantity: row.quantity,
        unit: row.unit,
        location: Location {
            county: row.county,
            subcounty: row.subcounty,
        },
        available: row.available,
        views: row.views,
        ai_recommendation,
        created_at: row.created_at,
    }
}

const PRODUCT_VIEW_SELECT: &str =
    "SELECT p.id, p.farmer AS farmer_id, p.name, p.category, p.description, p.price,
            p.suggested_price, p.quantity, p.unit, p.county, p.subcounty, p.available,
            p.views, p.ai_score, p.ai_message, p.created_at,
            u.name AS farmer_name, u.farm_name AS farmer_farm_name,
            u.verified AS farmer_verified, u.rating AS farmer_rating
     FROM products p
     JOIN users u ON u.id = p.farmer";

async fn fetch_product_view(
    pool: &PgPool,
    product_id: &str,
) -> Result<Option<ProductView>, sqlx::Error> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "{} WHERE p.id = $1",
        PRODUCT_VIEW_SELECT
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(map_to_view))
}

#[derive(Deserialize)]
pub struct ProductQuery {
    category: Option<String>,
    county: Option<String>,
    search: Option<String>,
    farmer: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

#[get("/api/products")]
async fn list_products(pool: web::Data<PgPool>, query: web::Query<ProductQuery>) -> impl Responder {
    let mut sql = format!("{} WHERE p.available = TRUE", PRODUCT_VIEW_SELECT);
    let mut args = PgArguments::default();
    let mut param_index = 1;

    if let Some(category) = &query.category {
        sql.push_str(&format!(" AND p.category = ${}", param_index));
        args.add(category.as_str());
        param_index += 1;
    }

    if let Some(county) = &query.county {
        sql.push_str(&format!(" AND p.county ILIKE ${}", param_index));
        args.add(format!("%{}%", county));
        param_index += 1;
    }

    if let Some(farmer) = &query.farmer {
        sql.push_str(&format!(" AND p.farmer = ${}", param_index));
        args.add(farmer.as_str());
        param_index += 1;
    }

    if let Some(search) = &query.search {
        sql.push_str(&format!(
            " AND (p.name ILIKE ${} OR p.description ILIKE ${})",
            param_index,
            param_index + 1
        ));
        args.add(format!("%{}%", search));
        args.add(format!("%{}%", search));
        param_index += 2;
    }

    if let Some(min_price) = query.min_price {
        sql.push_str(&format!(" AND p.price >= ${}", param_index));
        args.add(min_price);
        param_index += 1;
    }

    if let Some(max_price) = query.max_price {
        sql.push_str(&format!(" AND p.price <= ${}", param_index));
        args.add(max_price);
    }

    sql.push_str(" ORDER BY p.created_at DESC");

    let result = sqlx::query_as_with::<_, ProductRow, _>(&sql, args)
        .fetch_all(pool.get_ref())
        .await;

    match result {
        Ok(rows) => {
            let products: Vec<ProductView> = rows.into_iter().map(map_to_view).collect();
            HttpResponse::Ok().json(products)
        }
        Err(e) => {
            error!("Failed to fetch products: {:?}", e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[derive(Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category: Category,
    pub description: String,
    pub price: f64,
    pub quantity: f64,
    pub unit: Unit,
    pub county: String,
    pub subcounty: String,
}

#[post("/api/products")]
async fn add_product(
    caller: AuthUser,
    body: web::Json<NewProduct>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    if caller.role != "farmer" {
        return HttpResponse::Forbidden().json(json!({
            "message": "Only farmers can add products"
        }));
    }

    let product = body.into_inner();

    let missing = json!({
        "name": product.name.trim().is_empty(),
        "description": product.description.trim().is_empty(),
        "county": product.county.trim().is_empty(),
        "subcounty": product.subcounty.trim().is_empty(),
        "price": product.price <= 0.0,
        "quantity": product.quantity <= 0.0,
    });
    let any_missing = missing
        .as_object()
        .is_some_and(|m| m.values().any(|v| v.as_bool() == Some(true)));
    if any_missing {
        return HttpResponse::BadRequest().json(json!({
            "message": "Missing required fields",
            "missing": missing
        }));
    }

    let id = Uuid::new_v4().to_string();
    let suggested_price = pricing::suggested_price(product.price);
    let recommendation = pricing::recommend(product.name.trim(), product.county.trim());

    let insert = sqlx::query(
        "INSERT INTO products (id, farmer, name, category, description, price,
                               suggested_price, quantity, initial_quantity, unit,
                               county, subcounty, ai_score, ai_message)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $10, $11, $12, $13)",
    )
    .bind(&id)
    .bind(&caller.user_id)
    .bind(product.name.trim())
    .bind(product.category.as_str())
    .bind(product.description.trim())
    .bind(product.price)
    .bind(suggested_price)
    .bind(product.quantity)
    .bind(product.unit.as_str())
    .bind(product.county.trim())
    .bind(product.subcounty.trim())
    .bind(recommendation.score)
    .bind(&recommendation.message)
    .execute(pool.get_ref())
    .await;

    if let Err(e) = insert {
        error!("Failed to insert product: {:?}", e);
        return HttpResponse::InternalServerError().body("Database error");
    }

    match fetch_product_view(pool.get_ref(), &id).await {
        Ok(Some(view)) => HttpResponse::Created().json(json!({
            "success": true,
            "message": "Product added successfully",
            "product": view
        })),
        _ => HttpResponse::InternalServerError().body("Database error"),
    }
}

#[get("/api/products/farmer/{farmer_id}")]
async fn get_farmer_products(path: web::Path<String>, pool: web::Data<PgPool>) -> impl Responder {
    let farmer_id = path.into_inner();

    let result = sqlx::query_as::<_, ProductRow>(&format!(
        "{} WHERE p.farmer = $1 ORDER BY p.created_at DESC",
        PRODUCT_VIEW_SELECT
    ))
    .bind(&farmer_id)
    .fetch_all(pool.get_ref())
    .await;

    match result {
        Ok(rows) => {
            let products: Vec<ProductView> = rows.into_iter().map(map_to_view).collect();
            HttpResponse::Ok().json(products)
        }
        Err(e) => {
            error!("Failed to fetch products for farmer {}: {:?}", farmer_id, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[get("/api/products/{id}")]
async fn get_product(path: web::Path<String>, pool: web::Data<PgPool>) -> impl Responder {
    let id = path.into_inner();

    let viewed = sqlx::query("UPDATE products SET views = views + 1 WHERE id = $1")
        .bind(&id)
        .execute(pool.get_ref())
        .await;

    match viewed {
        Ok(result) if result.rows_affected() == 0 => {
            return HttpResponse::NotFound().body("Product not found");
        }
        Err(e) => {
            error!("Failed to bump views for product {}: {:?}", id, e);
            return HttpResponse::InternalServerError().body("Database error");
        }
        Ok(_) => {}
    }

    match fetch_product_view(pool.get_ref(), &id).await {
        Ok(Some(view)) => HttpResponse::Ok().json(view),
        Ok(None) => HttpResponse::NotFound().body("Product not found"),
        Err(e) => {
            error!("Failed to fetch product {}: {:?}", id, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

async fn product_owner(pool: &PgPool, product_id: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT farmer FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(pool)
        .await
}

#[derive(Deserialize)]
pub struct UpdateProduct {
    pub price: Option<f64>,
    pub quantity: Option<f64>,
    pub description: Option<String>,
    pub available: Option<bool>,
}

#[put("/api/products/{id}")]
async fn update_product(
    caller: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdateProduct>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    let id = path.into_inner();

    match product_owner(pool.get_ref(), &id).await {
        Ok(None) => return HttpResponse::NotFound().body("Product not found"),
        Ok(Some(owner)) if owner != caller.user_id => {
            return HttpResponse::Forbidden().body("You can only update your own products");
        }
        Err(e) => {
            error!("Failed to check product owner: {:?}", e);
            return HttpResponse::InternalServerError().body("Database error");
        }
        Ok(Some(_)) => {}
    }

    let update = body.into_inner();
    let result = sqlx::query(
        "UPDATE products SET
            price = COALESCE($2, price),
            quantity = COALESCE($3, quantity),
            description = COALESCE($4, description),
            available = COALESCE($5, available)
         WHERE id = $1",
    )
    .bind(&id)
    .bind(update.price)
    .bind(update.quantity)
    .bind(&update.description)
    .bind(update.available)
    .execute(pool.get_ref())
    .await;

    if let Err(e) = result {
        error!("Failed to update product {}: {:?}", id, e);
        return HttpResponse::InternalServerError().body("Database error");
    }

    match fetch_product_view(pool.get_ref(), &id).await {
        Ok(Some(view)) => HttpResponse::Ok().json(json!({
            "message": "Product updated successfully",
            "product": view
        })),
        _ => HttpResponse::InternalServerError().body("Database error"),
    }
}

#[delete("/api/products/{id}")]
async fn delete_product(
    caller: AuthUser,
    path: web::Path<String>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    let id = path.into_inner();

    match product_owner(pool.get_ref(), &id).await {
        Ok(None) => return HttpResponse::NotFound().body("Product not found"),
        Ok(Some(owner)) if owner != caller.user_id => {
            return HttpResponse::Forbidden().body("You can only delete your own products");
        }
        Err(e) => {
            error!("Failed to check product owner: {:?}", e);
            return HttpResponse::InternalServerError().body("Database error");
        }
        Ok(Some(_)) => {}
    }

    match sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(&id)
        .execute(pool.get_ref())
        .await
    {
        Ok(_) => HttpResponse::Ok().json(json!({ "message": "Product deleted" })),
        Err(e) => {
            error!("Failed to delete product {}: {:?}", id, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(list_products);
    cfg.service(add_product);
    // farmer listing must come before the {id} route
    cfg.service(get_farmer_products);
    cfg.service(get_product);
    cfg.service(update_product);
    cfg.service(delete_product);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_lowercase_names() {
        let category: Category = serde_json::from_str("\"vegetables\"").unwrap();
        assert_eq!(category.as_str(), "vegetables");
        assert!(serde_json::from_str::<Category>("\"livestock\"").is_err());
    }

    #[test]
    fn unit_parses_lowercase_names() {
        let unit: Unit = serde_json::from_str("\"bunches\"").unwrap();
        assert_eq!(unit.as_str(), "bunches");
        assert!(serde_json::from_str::<Unit>("\"litres\"").is_err());
    }
}
