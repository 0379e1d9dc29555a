use actix_web::{get, put, web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};

use crate::auth::AuthUser;

#[derive(FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub role: String,
    pub farm_name: Option<String>,
    pub business_name: Option<String>,
    pub county: Option<String>,
    pub subcounty: Option<String>,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
    pub verified: bool,
    pub rating: f32,
    pub total_ratings: i32,
}

#[derive(Serialize)]
pub struct Location {
    pub county: Option<String>,
    pub subcounty: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub farm_name: Option<String>,
    pub business_name: Option<String>,
    pub location: Location,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
    pub verified: bool,
    pub rating: f32,
    pub total_ratings: i32,
}

/// User record as exposed over the API: everything except credentials.
#[derive(Serialize)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub role: String,
    pub profile: Profile,
}

impl From<UserRow> for PublicUser {
    fn from(row: UserRow) -> Self {
        PublicUser {
            id: row.id,
            name: row.name,
            role: row.role,
            profile: Profile {
                farm_name: row.farm_name,
                business_name: row.business_name,
                location: Location {
                    county: row.county,
                    subcounty: row.subcounty,
                },
                phone: row.phone,
                profile_image: row.profile_image,
                verified: row.verified,
                rating: row.rating,
                total_ratings: row.total_ratings,
            },
        }
    }
}

pub const PUBLIC_USER_COLUMNS: &str = "id, name, role, farm_name, business_name, county, \
     subcounty, phone, profile_image, verified, rating, total_ratings";

pub async fn fetch_public_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<PublicUser>, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        PUBLIC_USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(PublicUser::from))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileInput {
    pub farm_name: Option<String>,
    pub business_name: Option<String>,
    pub location: Option<LocationInput>,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LocationInput {
    pub county: Option<String>,
    pub subcounty: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub profile: Option<ProfileInput>,
}

#[get("/api/users/role/farmers")]
async fn list_farmers(pool: web::Data<PgPool>) -> impl Responder {
    let result = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE role = 'farmer' ORDER BY rating DESC, name ASC LIMIT 20",
        PUBLIC_USER_COLUMNS
    ))
    .fetch_all(pool.get_ref())
    .await;

    match result {
        Ok(rows) => {
            let farmers: Vec<PublicUser> = rows.into_iter().map(PublicUser::from).collect();
            HttpResponse::Ok().json(farmers)
        }
        Err(e) => {
            error!("Failed to fetch farmers: {:?}", e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[get("/api/users/{id}")]
async fn get_user(
    _caller: AuthUser,
    path: web::Path<String>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    let user_id = path.into_inner();

    match fetch_public_user(pool.get_ref(), &user_id).await {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => HttpResponse::NotFound().body("User not found"),
        Err(e) => {
            error!("Failed to fetch user {}: {:?}", user_id, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[put("/api/users/{id}")]
async fn update_user(
    caller: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdateUser>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    let user_id = path.into_inner();

    if caller.user_id != user_id {
        return HttpResponse::Forbidden().body("You can only update your own profile");
    }

    let update = body.into_inner();
    let profile = update.profile.unwrap_or_default();
    let location = profile.location.unwrap_or_default();

    let result = sqlx::query(
        "UPDATE users SET
            name = COALESCE($2, name),
            farm_name = COALESCE($3, farm_name),
            business_name = COALESCE($4, business_name),
            county = COALESCE($5, county),
            subcounty = COALESCE($6, subcounty),
            phone = COALESCE($7, phone),
            profile_image = COALESCE($8, profile_image)
         WHERE id = $1",
    )
    .bind(&user_id)
    .bind(&update.name)
    .bind(&profile.farm_name)
    .bind(&profile.business_name)
    .bind(&location.county)
    .bind(&location.subcounty)
    .bind(&profile.phone)
    .bind(&profile.profile_image)
    .execute(pool.get_ref())
    .await;

    if let Err(e) = result {
        error!("Failed to update user {}: {:?}", user_id, e);
        return HttpResponse::InternalServerError().body("Database error");
    }

    match fetch_public_user(pool.get_ref(), &user_id).await {
        Ok(Some(user)) => HttpResponse::Ok().json(json!({
            "message": "Profile updated successfully",
            "user": user
        })),
        Ok(None) => HttpResponse::NotFound().body("User not found"),
        Err(e) => {
            error!("Failed to reload user {}: {:?}", user_id, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    // list_farmers must come first so "role" is not captured by the {id} route
    cfg.service(list_farmers);
    cfg.service(get_user);
    cfg.service(update_user);
}
