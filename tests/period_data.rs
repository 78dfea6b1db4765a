mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{request, TestApp};

const ASHA: &str = "asha@example.com";

#[tokio::test]
async fn root_and_health_respond() {
    let app = TestApp::new();

    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Shesphere Backend is running!");

    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn same_day_writes_keep_one_record() {
    let app = TestApp::new();

    let (status, first) = app
        .post(
            "/api/period-data",
            json!({ "userId": ASHA, "date": "2024-03-01", "flow": "light" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = app
        .post(
            "/api/period-data",
            json!({
                "userId": ASHA,
                "date": "2024-03-01T18:30:00.000Z",
                "periodStart": true,
                "flow": "heavy",
                "symptoms": ["cramps", "cramps", " fatigue "],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["_id"], first["_id"]);

    let (status, list) = app.get(&format!("/api/period-data?userId={ASHA}")).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["date"], "2024-03-01");
    assert_eq!(list[0]["periodStart"], true);
    assert_eq!(list[0]["flow"], "heavy");
    assert_eq!(list[0]["symptoms"], json!(["cramps", "fatigue"]));
}

#[tokio::test]
async fn list_is_newest_first_and_limited() {
    let app = TestApp::new();
    for date in ["2024-01-05", "2024-03-05", "2024-02-05"] {
        app.post("/api/period-data", json!({ "userId": ASHA, "date": date }))
            .await;
    }

    let (_, list) = app
        .get(&format!("/api/period-data?userId={ASHA}&limit=2"))
        .await;
    let dates: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, vec!["2024-03-05", "2024-02-05"]);

    let (status, _) = app
        .get(&format!("/api/period-data?userId={ASHA}&limit=0"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_user_id_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/period-data").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User ID is required");

    let (status, _) = app
        .post("/api/period-data", json!({ "date": "2024-03-01" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_date_and_flow_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/period-data", json!({ "userId": ASHA, "date": "March 1st" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid date: March 1st");

    let (status, _) = app
        .post(
            "/api/period-data",
            json!({ "userId": ASHA, "date": "2024-03-01", "flow": "torrential" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn storage_failure_is_a_server_error() {
    let app = TestApp::new();
    app.store.set_fail_writes(true);

    let (status, body) = app
        .post("/api/period-data", json!({ "userId": ASHA, "date": "2024-03-01" }))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to save period data");
}

#[tokio::test]
async fn prediction_averages_logged_cycles() {
    let app = TestApp::new();
    for date in ["2024-01-01", "2024-01-29", "2024-01-30"] {
        app.post(
            "/api/period-data",
            json!({ "userId": ASHA, "date": date, "periodStart": true, "flow": "medium" }),
        )
        .await;
    }

    let (status, body) = app
        .get(&format!(
            "/api/period-data/prediction?userId={ASHA}&today=2024-02-10"
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let prediction = &body["prediction"];
    assert_eq!(prediction["averageCycleLength"], 28);
    assert_eq!(prediction["lastPeriodStart"], "2024-01-30");
    assert_eq!(prediction["nextPeriodPrediction"], "2024-02-27");
    assert_eq!(prediction["fertileWindow"]["start"], "2024-02-10");
    assert_eq!(prediction["fertileWindow"]["end"], "2024-02-15");
    assert_eq!(prediction["fertileDays"].as_array().unwrap().len(), 6);
    assert_eq!(prediction["periodDays"].as_array().unwrap().len(), 3);

    assert_eq!(body["summary"]["cycleDay"], 11);
    assert_eq!(body["summary"]["daysUntilNextPeriod"], 17);
    assert_eq!(body["summary"]["inFertileWindow"], true);

    assert_eq!(body["stats"]["periodStarts"], 3);
    assert_eq!(body["stats"]["cycleLengths"], json!([28]));
}

#[tokio::test]
async fn single_start_uses_stored_cycle_length() {
    let app = TestApp::new();
    app.post(
        "/api/period-data",
        json!({ "userId": ASHA, "date": "2024-01-01", "periodStart": true }),
    )
    .await;

    let (_, body) = app
        .get(&format!(
            "/api/period-data/prediction?userId={ASHA}&today=2024-01-05"
        ))
        .await;
    assert_eq!(body["prediction"]["nextPeriodPrediction"], "2024-01-29");

    let (status, settings) = app
        .send(request(
            Method::PUT,
            "/api/period-data/settings",
            Some(json!({ "userId": ASHA, "typicalCycleLength": 32, "typicalPeriodLength": 6 })),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["typicalCycleLength"], 32);

    let (_, body) = app
        .get(&format!(
            "/api/period-data/prediction?userId={ASHA}&today=2024-01-05"
        ))
        .await;
    assert_eq!(body["prediction"]["averageCycleLength"], 32);
    assert_eq!(body["prediction"]["nextPeriodPrediction"], "2024-02-02");
}

#[tokio::test]
async fn settings_default_to_unset_and_reject_out_of_range() {
    let app = TestApp::new();

    let (status, body) = app
        .get(&format!("/api/period-data/settings?userId={ASHA}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["typicalCycleLength"], serde_json::Value::Null);

    let (status, _) = app
        .send(request(
            Method::PUT,
            "/api/period-data/settings",
            Some(json!({ "userId": ASHA, "typicalCycleLength": 90 })),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn previous_cycle_records_start_end_and_settings() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/period-data/previous-cycle",
            json!({
                "userId": ASHA,
                "startDate": "2024-02-01",
                "endDate": "2024-02-05",
                "symptoms": ["bloating"],
                "typicalCycleLength": 30,
                "typicalPeriodLength": 5,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["start"]["periodStart"], true);
    assert_eq!(body["start"]["flow"], "medium");
    assert_eq!(body["start"]["notes"], "Initial period start data");
    assert_eq!(body["end"]["periodEnd"], true);
    assert_eq!(body["end"]["flow"], "light");
    assert_eq!(body["settings"]["typicalCycleLength"], 30);

    let (_, list) = app.get(&format!("/api/period-data?userId={ASHA}")).await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let (status, _) = app
        .post(
            "/api/period-data/previous-cycle",
            json!({ "userId": ASHA, "startDate": "2024-02-10", "endDate": "2024-02-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn partial_settings_update_keeps_the_other_length() {
    let app = TestApp::new();

    for body in [
        json!({ "userId": ASHA, "typicalCycleLength": 32 }),
        json!({ "userId": ASHA, "typicalPeriodLength": 6 }),
    ] {
        let (status, _) = app
            .send(request(Method::PUT, "/api/period-data/settings", Some(body), None))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, settings) = app
        .get(&format!("/api/period-data/settings?userId={ASHA}"))
        .await;
    assert_eq!(settings["typicalCycleLength"], 32);
    assert_eq!(settings["typicalPeriodLength"], 6);

    let (status, body) = app
        .post(
            "/api/period-data/previous-cycle",
            json!({ "userId": ASHA, "startDate": "2024-02-01", "typicalPeriodLength": 4 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["settings"]["typicalCycleLength"], 32);
    assert_eq!(body["settings"]["typicalPeriodLength"], 4);
}
