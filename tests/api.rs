use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use canteen::{
    build_router,
    config::Config,
    db::{init_db, models::Role},
    services::{
        auth,
        otp::{MailError, OtpMailer},
    },
    state::AppState,
};
use chrono::{Duration, Utc};
use futures::future::{self, BoxFuture};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

#[derive(Default)]
struct CapturedMail {
    sent: Mutex<Vec<(String, String)>>,
}

impl CapturedMail {
    fn last_code(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, code)| code.clone())
    }
}

impl OtpMailer for CapturedMail {
    fn send_otp<'a>(
        &'a self,
        email: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), code.to_string()));
        Box::pin(future::ready(Ok(())))
    }
}

struct Harness {
    app: Router,
    pool: SqlitePool,
    mail: Arc<CapturedMail>,
}

impl Harness {
    async fn new() -> Self {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let mail = Arc::new(CapturedMail::default());
        let state = AppState::new(pool.clone(), Config::default(), mail.clone());

        Self {
            app: build_router(state),
            pool,
            mail,
        }
    }

    async fn token(&self, role: Role) -> String {
        let email = format!("{role}-{}@example.com", uuid::Uuid::new_v4());
        auth::create_user(&self.pool, "Staff", &email, "secret1", role)
            .await
            .unwrap();
        let (token, _) = auth::login(&self.pool, &email, "secret1", Duration::hours(1))
            .await
            .unwrap();
        token
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        (status, value)
    }

    async fn place_order(&self, token: &str, payment_id: &str, items: Value) -> Value {
        let (status, order) = self
            .call(
                Method::POST,
                "/api/orders",
                Some(token),
                Some(json!({ "paymentId": payment_id, "items": items, "totalAmount": 30 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{order}");
        order
    }
}

fn serve_uri(order: &Value, index: usize) -> String {
    format!("/api/orders/counter/{}/item/{}/serve", order["id"], index)
}

#[tokio::test]
async fn liveness_root() {
    let h = Harness::new().await;
    let (status, body) = h.call(Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Canteen API is running");
}

#[tokio::test]
async fn tea_is_served_in_two_steps() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let counter = h.token(Role::Counter).await;

    let order = h
        .place_order(
            &customer,
            "pay_tea",
            json!([{ "name": "Tea", "price": 10, "quantity": 3, "category": "snacks" }]),
        )
        .await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"][0]["servedQty"], 0);
    assert!(order.get("version").is_none());

    let (status, order) = h
        .call(Method::PUT, &serve_uri(&order, 0), Some(&counter), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["items"][0]["servedQty"], 1);
    assert_eq!(order["items"][0]["served"], false);

    let (status, order) = h
        .call(
            Method::PUT,
            &serve_uri(&order, 0),
            Some(&counter),
            Some(json!({ "qty": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["items"][0]["servedQty"], 3);
    assert_eq!(order["items"][0]["served"], true);
    assert_eq!(order["status"], "completed");

    let (status, body) = h
        .call(Method::PUT, &serve_uri(&order, 0), Some(&counter), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Order already completed");

    let (_, delivered) = h
        .call(Method::GET, "/api/orders/counter/delivered", Some(&counter), None)
        .await;
    assert_eq!(delivered.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn over_serving_is_rejected_without_change() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let counter = h.token(Role::Counter).await;

    let order = h
        .place_order(&customer, "pay_over", json!([{ "name": "Tea", "price": 10, "quantity": 3 }]))
        .await;

    let (status, body) = h
        .call(
            Method::PUT,
            &serve_uri(&order, 0),
            Some(&counter),
            Some(json!({ "qty": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only 3 remaining for Tea");

    let (status, body) = h
        .call(
            Method::PUT,
            &serve_uri(&order, 5),
            Some(&counter),
            Some(json!({ "qty": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = h
        .call(
            Method::PUT,
            &serve_uri(&order, 0),
            Some(&counter),
            Some(json!({ "qty": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid serve quantity");

    let (_, pending) = h
        .call(Method::GET, "/api/orders/counter/pending", Some(&counter), None)
        .await;
    assert_eq!(pending[0]["items"][0]["servedQty"], 0);
}

#[tokio::test]
async fn concurrent_serves_never_exceed_quantity() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let counter = h.token(Role::Counter).await;

    let order = h
        .place_order(&customer, "pay_rush", json!([{ "name": "Samosa", "price": 15, "quantity": 5 }]))
        .await;
    let uri = serve_uri(&order, 0);

    let results = future::join_all(
        (0..6).map(|_| h.call(Method::PUT, &uri, Some(&counter), Some(json!({ "qty": 1 })))),
    )
    .await;

    let ok = results.iter().filter(|(s, _)| *s == StatusCode::OK).count();
    let conflicts = results
        .iter()
        .filter(|(s, _)| *s == StatusCode::CONFLICT)
        .count();
    assert_eq!((ok, conflicts), (5, 1));

    let admin = h.token(Role::Admin).await;
    let (_, stored) = h
        .call(Method::GET, &format!("/api/orders/{}", order["id"]), Some(&admin), None)
        .await;
    assert_eq!(stored["items"][0]["servedQty"], 5);
    assert_eq!(stored["status"], "completed");
}

#[tokio::test]
async fn duplicate_payment_returns_existing_order() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let items = json!([{ "name": "Poha", "price": 25, "quantity": 1, "category": "breakfast" }]);

    let first = h.place_order(&customer, "pay_dup", items.clone()).await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/orders",
            Some(&customer),
            Some(json!({ "paymentId": "pay_dup", "items": items, "totalAmount": 25 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Order already exists for this payment");
    assert_eq!(body["order"]["id"], first["id"]);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE payment_id = ?")
        .bind("pay_dup")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn malformed_orders_are_rejected() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/orders",
            Some(&customer),
            Some(json!({ "items": [{ "name": "Tea" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "paymentId is required");

    let (status, _) = h
        .call(
            Method::POST,
            "/api/orders",
            Some(&customer),
            Some(json!({ "paymentId": "p", "items": [{ "name": "Tea", "status": "completed" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn role_gates() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let counter = h.token(Role::Counter).await;
    let admin = h.token(Role::Admin).await;

    let (status, body) = h
        .call(Method::GET, "/api/orders/counter/pending", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Missing bearer token");

    let (status, _) = h
        .call(Method::GET, "/api/orders/counter/pending", Some("bogus"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h
        .call(Method::GET, "/api/orders/counter/pending", Some(&customer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "counter access required");

    let (status, _) = h.call(Method::GET, "/api/orders", Some(&counter), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .call(Method::GET, "/api/orders/counter/pending", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .call(
            Method::POST,
            "/api/orders",
            None,
            Some(json!({ "paymentId": "p", "items": [{ "name": "Tea" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn scanning_pending_and_delivered_orders() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let counter = h.token(Role::Counter).await;

    let order = h
        .place_order(&customer, "pay_scan", json!([{ "name": "Idli", "price": 30, "quantity": 1 }]))
        .await;

    let (status, found) = h
        .call(
            Method::GET,
            "/api/orders/counter/scan/ORDER-pay_scan",
            Some(&counter),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], order["id"]);

    let (status, _) = h
        .call(Method::GET, "/api/orders/counter/scan/pay_missing", Some(&counter), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.call(Method::PUT, &serve_uri(&order, 0), Some(&counter), None)
        .await;

    let (status, body) = h
        .call(Method::GET, "/api/orders/counter/scan/pay_scan", Some(&counter), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Order already delivered");
    assert_eq!(body["alreadyServed"], true);
    assert_eq!(body["order"]["id"], order["id"]);
}

#[tokio::test]
async fn admin_force_completes_orders() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let admin = h.token(Role::Admin).await;

    let order = h
        .place_order(
            &customer,
            "pay_force",
            json!([
                { "name": "Thali", "price": 90, "quantity": 2 },
                { "name": "Tea", "price": 10, "quantity": 1 }
            ]),
        )
        .await;
    let uri = format!("/api/orders/{}/status", order["id"]);

    let (status, done) = h
        .call(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "completed" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
    for item in done["items"].as_array().unwrap() {
        assert_eq!(item["served"], true);
        assert_eq!(item["servedQty"], item["quantity"]);
    }

    let (status, _) = h
        .call(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "pending" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = h
        .call(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            Method::PUT,
            "/api/orders/9999/status",
            Some(&admin),
            Some(json!({ "status": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reports_count_meal_slots() {
    let h = Harness::new().await;
    let customer = h.token(Role::User).await;
    let admin = h.token(Role::Admin).await;

    h.place_order(
        &customer,
        "pay_r1",
        json!([
            { "name": "Dosa", "price": 20, "quantity": 1, "category": "breakfast" },
            { "name": "Thali", "price": 20, "quantity": 1, "category": "lunch" }
        ]),
    )
    .await;
    h.place_order(&customer, "pay_r2", json!([{ "name": "Chips", "price": 5, "quantity": 2 }]))
        .await;

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();

    let (status, rows) = h
        .call(
            Method::GET,
            &format!("/api/reports/breakdown?from={today}&to={today}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        rows,
        json!([{ "date": today, "breakfast": 1, "lunch": 1, "snacks": 1, "revenue": 50.0 }])
    );

    let (_, kpis) = h
        .call(Method::GET, "/api/reports/kpis", Some(&admin), None)
        .await;
    assert_eq!(kpis["totalOrders"], 2);
    assert_eq!(kpis["breakfastOrders"], 1);
    assert_eq!(kpis["lunchOrders"], 1);
    assert_eq!(kpis["snacksOrders"], 0);

    let (_, overview) = h
        .call(Method::GET, "/api/reports/overview", Some(&admin), None)
        .await;
    assert_eq!(overview.as_array().unwrap().len(), 3);

    let (_, empty) = h
        .call(
            Method::GET,
            "/api/reports/breakdown?from=2000-01-01&to=2000-01-31",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(empty, json!([]));

    let (status, _) = h
        .call(Method::GET, "/api/reports/kpis?from=yesterday", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn otp_flow() {
    let h = Harness::new().await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/otp/send-otp",
            None,
            Some(json!({ "email": "Student@Example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OTP sent to email");

    let code = h.mail.last_code().unwrap();
    let wrong = if code == "111111" { "222222" } else { "111111" };

    let (status, body) = h
        .call(
            Method::POST,
            "/api/otp/verify-otp",
            None,
            Some(json!({ "email": "student@example.com", "otp": wrong })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid OTP");

    let (status, _) = h
        .call(
            Method::POST,
            "/api/otp/verify-otp",
            None,
            Some(json!({ "email": "student@example.com", "otp": code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .call(
            Method::POST,
            "/api/otp/verify-otp",
            None,
            Some(json!({ "email": "student@example.com", "otp": code })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_login_and_logout() {
    let h = Harness::new().await;

    let (status, user) = h
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "name": "Asha", "email": "asha@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["role"], "user");
    assert!(user.get("passwordHash").is_none());

    let (status, login) = h
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "asha@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap().to_string();

    let (status, _) = h
        .call(Method::GET, "/api/auth/verify", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .call(Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .call(Method::GET, "/api/auth/verify", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn menu_crud() {
    let h = Harness::new().await;
    let admin = h.token(Role::Admin).await;
    let customer = h.token(Role::User).await;
    let dish = json!({
        "name": "Veg Thali",
        "price": 90,
        "category": "lunch",
        "day": "Monday",
        "mealSlot": "lunch"
    });

    let (status, _) = h
        .call(Method::POST, "/api/menu", Some(&customer), Some(dish.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, item) = h
        .call(Method::POST, "/api/menu", Some(&admin), Some(dish))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(item["isAvailable"], true);
    let uri = format!("/api/menu/{}", item["id"]);

    let (status, item) = h
        .call(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "price": "95", "isAvailable": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["price"], 95.0);
    assert_eq!(item["name"], "Veg Thali");

    let (_, menu) = h.call(Method::GET, "/api/menu", None, None).await;
    assert_eq!(menu.as_array().unwrap().len(), 1);

    let (status, _) = h.call(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Menu item not found");
}

#[tokio::test]
async fn stock_and_user_admin() {
    let h = Harness::new().await;
    let admin = h.token(Role::Admin).await;
    let customer = h.token(Role::User).await;

    let (status, item) = h
        .call(
            Method::POST,
            "/api/stock",
            Some(&admin),
            Some(json!({ "itemName": "Milk", "quantity": 20, "price": 28 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, stock) = h.call(Method::GET, "/api/stock", Some(&customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock[0]["itemName"], "Milk");

    let uri = format!("/api/stock/{}", item["id"]);
    let (status, _) = h.call(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.call(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, users) = h.call(Method::GET, "/api/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);
}
