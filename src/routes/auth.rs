use actix_web::{web, HttpResponse, Responder};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use log::error;
use serde::Deserialize;
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::auth::create_token;
use crate::routes::users::{fetch_public_user, ProfileInput};

#[derive(Deserialize)]
pub struct RegisterData {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub profile: Option<ProfileInput>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(FromRow)]
struct Credentials {
    id: String,
    role: String,
    password: String,
}

async fn email_taken(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

pub async fn register(data: web::Json<RegisterData>, pool: web::Data<PgPool>) -> impl Responder {
    let user = data.into_inner();

    if user.name.trim().is_empty() || user.email.trim().is_empty() {
        return HttpResponse::BadRequest().body("Name and email are required");
    }
    if user.password.len() < 6 {
        return HttpResponse::BadRequest().body("Password must be at least 6 characters");
    }
    if user.role != "farmer" && user.role != "buyer" {
        return HttpResponse::BadRequest().body("Role must be 'farmer' or 'buyer'");
    }

    let email = user.email.trim().to_lowercase();

    match email_taken(pool.get_ref(), &email).await {
        Ok(true) => return HttpResponse::Conflict().body("User already exists"),
        Err(e) => {
            error!("Failed to check existing user: {:?}", e);
            return HttpResponse::InternalServerError().body("Database error");
        }
        _ => {}
    }

    let salt = SaltString::generate(&mut OsRng);
    let hashed_password = match Argon2::default().hash_password(user.password.as_bytes(), &salt) {
        Ok(hash) => hash.to_string(),
        Err(e) => {
            error!("Failed to hash password: {:?}", e);
            return HttpResponse::InternalServerError().body("Password hashing failed");
        }
    };

    let id = Uuid::new_v4().to_string();
    let profile = user.profile.unwrap_or_default();
    let location = profile.location.unwrap_or_default();

    let insert = sqlx::query(
        "INSERT INTO users (id, name, email, password, role, farm_name, business_name,
                            county, subcounty, phone, profile_image)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(&id)
    .bind(user.name.trim())
    .bind(&email)
    .bind(&hashed_password)
    .bind(&user.role)
    .bind(&profile.farm_name)
    .bind(&profile.business_name)
    .bind(&location.county)
    .bind(&location.subcounty)
    .bind(&profile.phone)
    .bind(&profile.profile_image)
    .execute(pool.get_ref())
    .await;

    if let Err(e) = insert {
        error!("Failed to insert user: {:?}", e);
        return HttpResponse::InternalServerError().body("Database error");
    }

    let token = match create_token(&id, &user.role) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to issue token: {:?}", e);
            return HttpResponse::InternalServerError().body("Token creation failed");
        }
    };

    match fetch_public_user(pool.get_ref(), &id).await {
        Ok(Some(public)) => HttpResponse::Created().json(json!({
            "message": "Registration successful",
            "token": token,
            "user": public
        })),
        _ => HttpResponse::InternalServerError().body("Database error"),
    }
}

pub async fn login(data: web::Json<LoginRequest>, pool: web::Data<PgPool>) -> impl Responder {
    let LoginRequest { email, password } = data.into_inner();
    let email = email.trim().to_lowercase();

    let credentials = sqlx::query_as::<_, Credentials>(
        "SELECT id, role, password FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await;

    let credentials = match credentials {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return HttpResponse::NotFound().body("No user found with that email"),
        Err(e) => {
            error!("Failed to fetch credentials: {:?}", e);
            return HttpResponse::InternalServerError().body("Database error");
        }
    };

    let parsed_hash = match PasswordHash::new(&credentials.password) {
        Ok(hash) => hash,
        Err(_) => return HttpResponse::InternalServerError().body("Password hash parsing failed"),
    };

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return HttpResponse::Unauthorized().body("Password does not match");
    }

    let token = match create_token(&credentials.id, &credentials.role) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to issue token: {:?}", e);
            return HttpResponse::InternalServerError().body("Token creation failed");
        }
    };

    match fetch_public_user(pool.get_ref(), &credentials.id).await {
        Ok(Some(public)) => HttpResponse::Ok().json(json!({
            "message": "Login successful",
            "token": token,
            "user": public
        })),
        _ => HttpResponse::InternalServerError().body("Database error"),
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/auth/register", web::post().to(register));
    cfg.route("/api/auth/login", web::post().to(login));
}
