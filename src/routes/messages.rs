use std::collections::HashMap;

use actix_web::{get, post, put, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::routes::users::{Location, Profile, PublicUser, PUBLIC_USER_COLUMNS};

/// Canonical room key for a pair of users: the two ids sorted
/// lexicographically and joined with "_". Symmetric in its arguments, so
/// both participants resolve to the same room no matter who is sender.
pub fn room_name(a: &str, b: &str) -> String {
    let mut ids = [a, b];
    ids.sort_unstable();
    ids.join("_")
}

/// One chat line joined with both participants' display names.
#[derive(Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub room: String,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub sender_name: String,
    pub receiver_name: String,
}

#[derive(Deserialize)]
pub struct SendMessage {
    pub room: String,
    pub receiver: String,
    pub content: String,
}

/// Row of the conversation scan: one message plus the counterpart's
/// public fields, newest first.
#[derive(FromRow)]
pub struct ScanRow {
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub other_id: String,
    pub other_name: String,
    pub other_role: String,
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

impl ScanRow {
    fn counterpart(self) -> PublicUser {
        PublicUser {
            id: self.other_id,
            name: self.other_name,
            role: self.other_role,
            profile: Profile {
                farm_name: self.farm_name,
                business_name: self.business_name,
                location: Location {
                    county: self.county,
                    subcounty: self.subcounty,
                },
                phone: self.phone,
                profile_image: self.profile_image,
                verified: self.verified,
                rating: self.rating,
                total_ratings: self.total_ratings,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub participant: PublicUser,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread: i64,
}

/// Fold the newest-first message scan into one summary per room. The first
/// message seen for a room is its most recent one and becomes the summary;
/// unread messages addressed to the requester are counted during the same
/// pass, so no per-room count queries are needed.
pub fn group_conversations(user_id: &str, rows: Vec<ScanRow>) -> Vec<ConversationSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut summaries: HashMap<String, ConversationSummary> = HashMap::new();

    for row in rows {
        let other_id = if row.sender == user_id {
            row.receiver.clone()
        } else {
            row.sender.clone()
        };
        let room = room_name(user_id, &other_id);

        let unread_here = i64::from(row.receiver == user_id && !row.read);

        match summaries.get_mut(&room) {
            Some(summary) => summary.unread += unread_here,
            None => {
                order.push(room.clone());
                let last_message = row.content.clone();
                let last_message_time = row.created_at;
                summaries.insert(
                    room.clone(),
                    ConversationSummary {
                        id: room,
                        participant: row.counterpart(),
                        last_message,
                        last_message_time,
                        unread: unread_here,
                    },
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|room| summaries.remove(&room))
        .collect()
}

#[get("/api/messages/conversations")]
async fn get_conversations(caller: AuthUser, pool: web::Data<PgPool>) -> impl Responder {
    let result = sqlx::query_as::<_, ScanRow>(
        "SELECT m.sender, m.receiver, m.content, m.read, m.created_at,
                u.id AS other_id, u.name AS other_name, u.role AS other_role,
                u.farm_name, u.business_name, u.county, u.subcounty, u.phone,
                u.profile_image, u.verified, u.rating, u.total_ratings
         FROM messages m
         JOIN users u
           ON u.id = CASE WHEN m.sender = $1 THEN m.receiver ELSE m.sender END
         WHERE m.sender = $1 OR m.receiver = $1
         ORDER BY m.created_at DESC",
    )
    .bind(&caller.user_id)
    .fetch_all(pool.get_ref())
    .await;

    match result {
        Ok(rows) => HttpResponse::Ok().json(group_conversations(&caller.user_id, rows)),
        Err(e) => {
            error!("Failed to fetch conversations: {:?}", e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[get("/api/messages/users/list")]
async fn list_counterparties(caller: AuthUser, pool: web::Data<PgPool>) -> impl Responder {
    // farmers message buyers and vice versa
    let wanted_role = if caller.role == "farmer" { "buyer" } else { "farmer" };

    let result = sqlx::query_as::<_, crate::routes::users::UserRow>(&format!(
        "SELECT {} FROM users WHERE role = $1 ORDER BY name ASC LIMIT 50",
        PUBLIC_USER_COLUMNS
    ))
    .bind(wanted_role)
    .fetch_all(pool.get_ref())
    .await;

    match result {
        Ok(rows) => {
            let users: Vec<PublicUser> = rows.into_iter().map(PublicUser::from).collect();
            HttpResponse::Ok().json(users)
        }
        Err(e) => {
            error!("Failed to fetch messaging counterparties: {:?}", e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[get("/api/messages/{room}")]
async fn get_room_history(
    _caller: AuthUser,
    path: web::Path<String>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    let room = path.into_inner();

    let result = sqlx::query_as::<_, MessageView>(
        "SELECT m.id, m.room, m.sender, m.receiver, m.content, m.read, m.created_at,
                s.name AS sender_name, r.name AS receiver_name
         FROM messages m
         JOIN users s ON s.id = m.sender
         JOIN users r ON r.id = m.receiver
         WHERE m.room = $1
         ORDER BY m.created_at ASC",
    )
    .bind(&room)
    .fetch_all(pool.get_ref())
    .await;

    match result {
        Ok(messages) => HttpResponse::Ok().json(messages),
        Err(e) => {
            error!("Failed to fetch room {}: {:?}", room, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[post("/api/messages")]
async fn send_message(
    caller: AuthUser,
    body: web::Json<SendMessage>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    let msg = body.into_inner();
    let content = msg.content.trim();

    if content.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "message": "Message content is required"
        }));
    }
    if msg.room.is_empty() || msg.receiver.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "message": "Room and receiver are required"
        }));
    }

    let id = Uuid::new_v4().to_string();
    let insert = sqlx::query(
        "INSERT INTO messages (id, room, sender, receiver, content) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&id)
    .bind(&msg.room)
    .bind(&caller.user_id)
    .bind(&msg.receiver)
    .bind(content)
    .execute(pool.get_ref())
    .await;

    if let Err(e) = insert {
        error!("Failed to insert message: {:?}", e);
        return HttpResponse::InternalServerError().body("Database error");
    }

    let stored = sqlx::query_as::<_, MessageView>(
        "SELECT m.id, m.room, m.sender, m.receiver, m.content, m.read, m.created_at,
                s.name AS sender_name, r.name AS receiver_name
         FROM messages m
         JOIN users s ON s.id = m.sender
         JOIN users r ON r.id = m.receiver
         WHERE m.id = $1",
    )
    .bind(&id)
    .fetch_one(pool.get_ref())
    .await;

    match stored {
        Ok(message) => HttpResponse::Created().json(json!({
            "message": "Message sent successfully",
            "data": message
        })),
        Err(e) => {
            error!("Failed to reload message {}: {:?}", id, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

#[put("/api/messages/{room}/read")]
async fn mark_room_read(
    caller: AuthUser,
    path: web::Path<String>,
    pool: web::Data<PgPool>,
) -> impl Responder {
    let room = path.into_inner();

    // Only flips unread messages addressed to the caller, so reapplying
    // matches zero rows and the operation stays idempotent.
    let result = sqlx::query(
        "UPDATE messages SET read = TRUE
         WHERE room = $1 AND receiver = $2 AND read = FALSE",
    )
    .bind(&room)
    .bind(&caller.user_id)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => HttpResponse::Ok().json(json!({ "message": "Messages marked as read" })),
        Err(e) => {
            error!("Failed to mark room {} as read: {:?}", room, e);
            HttpResponse::InternalServerError().body("Database error")
        }
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    // fixed paths before the {room} catch-all
    cfg.service(get_conversations);
    cfg.service(list_counterparties);
    cfg.service(send_message);
    cfg.service(mark_room_read);
    cfg.service(get_room_history);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test as actix_test;
    use actix_web::App;
    use chrono::TimeZone;

    // Never connected: the validation guards return before any query runs,
    // and a query against this pool would fail and surface as a 500 instead.
    fn lazy_pool() -> PgPool {
        PgPool::connect_lazy("postgres://127.0.0.1:1/agrilink").unwrap()
    }

    fn row(
        sender: &str,
        receiver: &str,
        content: &str,
        read: bool,
        ts: i64,
        other_id: &str,
        other_name: &str,
    ) -> ScanRow {
        ScanRow {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            content: content.to_string(),
            read,
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            other_id: other_id.to_string(),
            other_name: other_name.to_string(),
            other_role: "buyer".to_string(),
            farm_name: None,
            business_name: None,
            county: None,
            subcounty: None,
            phone: None,
            profile_image: None,
            verified: false,
            rating: 0.0,
            total_ratings: 0,
        }
    }

    #[test]
    fn room_name_is_symmetric() {
        assert_eq!(room_name("u1", "u2"), room_name("u2", "u1"));
        assert_eq!(room_name("u1", "u2"), "u1_u2");
        assert_eq!(room_name("zeta", "alpha"), "alpha_zeta");
        // degenerate inputs still produce a stable key
        assert_eq!(room_name("", "u1"), room_name("u1", ""));
    }

    #[test]
    fn room_name_sorts_lexicographically_not_numerically() {
        assert_eq!(room_name("10", "9"), "10_9");
    }

    #[test]
    fn grouping_keeps_one_entry_per_counterpart_with_latest_message() {
        // newest first, as the query orders them
        let rows = vec![
            row("u2", "u1", "Hello", false, 200, "u2", "Wanjiku"),
            row("u1", "u2", "Hi", false, 100, "u2", "Wanjiku"),
        ];

        let conversations = group_conversations("u1", rows);

        assert_eq!(conversations.len(), 1);
        let convo = &conversations[0];
        assert_eq!(convo.id, "u1_u2");
        assert_eq!(convo.participant.id, "u2");
        assert_eq!(convo.last_message, "Hello");
        assert_eq!(convo.unread, 1);
    }

    #[test]
    fn grouping_orders_rooms_by_recency_of_newest_message() {
        let rows = vec![
            row("u3", "u1", "newest thread", false, 300, "u3", "Otieno"),
            row("u2", "u1", "older thread", true, 200, "u2", "Wanjiku"),
            row("u1", "u3", "first contact", true, 100, "u3", "Otieno"),
        ];

        let conversations = group_conversations("u1", rows);

        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].participant.id, "u3");
        assert_eq!(conversations[0].last_message, "newest thread");
        assert_eq!(conversations[1].participant.id, "u2");
        assert_eq!(conversations[1].last_message, "older thread");
    }

    #[test]
    fn unread_counts_only_messages_addressed_to_requester() {
        let rows = vec![
            row("u2", "u1", "third", false, 300, "u2", "Wanjiku"),
            row("u2", "u1", "second", false, 200, "u2", "Wanjiku"),
            row("u1", "u2", "first", false, 100, "u2", "Wanjiku"),
        ];

        let conversations = group_conversations("u1", rows);

        assert_eq!(conversations.len(), 1);
        // "first" was sent by u1, so it never counts toward u1's unread
        assert_eq!(conversations[0].unread, 2);
    }

    #[test]
    fn read_messages_do_not_count_as_unread() {
        let rows = vec![
            row("u2", "u1", "seen already", true, 100, "u2", "Wanjiku"),
        ];

        let conversations = group_conversations("u1", rows);

        assert_eq!(conversations[0].unread, 0);
    }

    #[test]
    fn no_messages_means_no_conversations() {
        assert!(group_conversations("u1", Vec::new()).is_empty());
    }

    #[actix_web::test]
    async fn whitespace_only_content_is_rejected_without_persisting() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .service(send_message),
        )
        .await;

        let token = crate::auth::create_token("u1", "buyer").unwrap();
        let req = actix_test::TestRequest::post()
            .uri("/api/messages")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "room": "u1_u2", "receiver": "u2", "content": " \t\n " }))
            .to_request();

        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn blank_room_or_receiver_is_rejected() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .service(send_message),
        )
        .await;

        let token = crate::auth::create_token("u1", "buyer").unwrap();
        let req = actix_test::TestRequest::post()
            .uri("/api/messages")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "room": "", "receiver": "u2", "content": "Hi" }))
            .to_request();

        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn sending_requires_a_bearer_token() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .service(send_message),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/messages")
            .set_json(json!({ "room": "u1_u2", "receiver": "u2", "content": "Hi" }))
            .to_request();

        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
