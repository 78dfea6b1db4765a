mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{request, token_for, TestApp};
use shesphere_backend::notify::ScriptedNotifier;

const ASHA: &str = "asha@example.com";

async fn add_contact(app: &TestApp, name: &str, email: &str) -> String {
    let (status, body) = app
        .post(
            "/api/safety/contacts",
            json!({
                "userId": ASHA,
                "name": name,
                "relationship": "friend",
                "phone": "555-0100",
                "email": email,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["_id"].as_str().unwrap().to_string()
}

fn alert_body(contacts: Vec<String>) -> Value {
    json!({
        "alert": {
            "userId": ASHA,
            "alertType": "emergency",
            "location": { "lat": 12.97, "lng": 77.59 },
            "contactsNotified": contacts,
            "notes": "Need help",
        }
    })
}

#[tokio::test]
async fn contacts_are_listed_per_user() {
    let app = TestApp::new();
    add_contact(&app, "Mum", "mum@example.com").await;

    let (status, list) = app
        .get(&format!("/api/safety/contacts?userId={ASHA}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["phoneNumber"], "555-0100");
    assert_eq!(list[0]["isEmergencyContact"], false);

    let (_, other) = app
        .get("/api/safety/contacts?userId=eve@example.com")
        .await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn contact_requires_every_field() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/safety/contacts",
            json!({ "userId": ASHA, "name": "Mum", "relationship": "parent", "email": "mum@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "phoneNumber is required");
}

#[tokio::test]
async fn only_the_owner_can_delete_a_contact() {
    let app = TestApp::new();
    let id = add_contact(&app, "Mum", "mum@example.com").await;

    let (status, _) = app
        .send(request(
            Method::DELETE,
            &format!("/api/safety/contacts/{id}?userId=eve@example.com"),
            None,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(request(
            Method::DELETE,
            &format!("/api/safety/contacts/{id}?userId={ASHA}"),
            None,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Contact deleted successfully");

    let (status, _) = app
        .send(request(
            Method::DELETE,
            "/api/safety/contacts/not-a-uuid?userId=asha@example.com",
            None,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn alert_is_created_and_contacts_emailed() {
    let app = TestApp::new();
    let mum = add_contact(&app, "Mum", "mum@example.com").await;

    let (status, body) = app
        .post("/api/safety/alerts", alert_body(vec![mum.clone()]))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Safety alert created successfully");
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["alertType"], "emergency");
    assert_eq!(body["data"]["contactsNotified"], json!([mum]));
    assert_eq!(body["data"]["location"]["latitude"], 12.97);

    let sent = app.notifier.delivered();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_address, "mum@example.com");
}

#[tokio::test]
async fn alert_survives_unreachable_email_channel() {
    let app = TestApp::with_notifier(ScriptedNotifier::new("alerts@shesphere.test").unreachable());
    let mum = add_contact(&app, "Mum", "mum@example.com").await;

    let (status, body) = app.post("/api/safety/alerts", alert_body(vec![mum])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "active");

    let (_, alerts) = app.get(&format!("/api/safety/alerts?userId={ASHA}")).await;
    assert_eq!(alerts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn one_bad_recipient_does_not_block_the_rest() {
    let app = TestApp::with_notifier(
        ScriptedNotifier::new("alerts@shesphere.test").failing_for("a@example.com"),
    );
    let a = add_contact(&app, "A", "a@example.com").await;
    let b = add_contact(&app, "B", "b@example.com").await;

    let (status, body) = app.post("/api/safety/alerts", alert_body(vec![a, b])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "active");

    let mut attempts = app.notifier.attempts();
    attempts.sort();
    assert_eq!(attempts, vec!["a@example.com", "b@example.com"]);
    assert_eq!(app.notifier.delivered().len(), 1);
}

#[tokio::test]
async fn send_email_false_stores_without_emailing() {
    let app = TestApp::new();
    let mum = add_contact(&app, "Mum", "mum@example.com").await;

    let mut body = alert_body(vec![mum]);
    body["sendEmail"] = json!(false);
    let (status, _) = app.post("/api/safety/alerts", body).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(app.notifier.attempts().is_empty());
}

#[tokio::test]
async fn failed_persistence_reports_failure_and_sends_nothing() {
    let app = TestApp::new();
    let mum = add_contact(&app, "Mum", "mum@example.com").await;
    app.store.set_fail_writes(true);

    let (status, body) = app.post("/api/safety/alerts", alert_body(vec![mum])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Failed to create alert");
    assert!(app.notifier.attempts().is_empty());
}

#[tokio::test]
async fn half_a_location_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/safety/alerts",
            json!({
                "alert": {
                    "userId": ASHA,
                    "alertType": "test",
                    "location": { "latitude": 12.97 },
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, alerts) = app.get(&format!("/api/safety/alerts?userId={ASHA}")).await;
    assert!(alerts.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn alerts_list_newest_first() {
    let app = TestApp::new();
    for (ts, kind) in [
        ("2024-03-01T10:00:00Z", "test"),
        ("2024-03-02T10:00:00Z", "check-in"),
    ] {
        app.post(
            "/api/safety/alerts",
            json!({ "alert": { "userId": ASHA, "alertType": kind, "timestamp": ts } }),
        )
        .await;
    }

    let (_, alerts) = app.get(&format!("/api/safety/alerts?userId={ASHA}")).await;
    let kinds: Vec<&str> = alerts
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["alertType"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["check-in", "test"]);
}

#[tokio::test]
async fn token_identity_wins_over_user_id() {
    let app = TestApp::with_auth(false);
    let token = token_for(ASHA);

    let (status, _) = app
        .send(request(
            Method::GET,
            "/api/safety/contacts",
            None,
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(request(
            Method::GET,
            "/api/safety/contacts?userId=eve@example.com",
            None,
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bad_or_missing_tokens_are_refused() {
    let app = TestApp::with_auth(true);

    let (status, body) = app
        .send(request(
            Method::GET,
            "/api/safety/alerts",
            None,
            Some("not-a-jwt"),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token. Please login again.");

    let (status, body) = app
        .get(&format!("/api/safety/alerts?userId={ASHA}"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication required. Please login.");

    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn alert_cannot_email_another_users_contacts() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/safety/contacts",
            json!({
                "userId": "victim@example.com",
                "name": "Victim's Mum",
                "relationship": "parent",
                "phone": "555-0199",
                "email": "victims-mum@example.com",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let foreign = body["_id"].as_str().unwrap().to_string();

    let (status, body) = app.post("/api/safety/alerts", alert_body(vec![foreign.clone()])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["contactsNotified"], json!([foreign]));
    assert!(app.notifier.attempts().is_empty());
}
