#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;

use shesphere_backend::{
    app,
    auth::{AuthState, Claims, JwtVerifier},
    dispatch::{DispatchSettings, TracingObserver},
    notify::{Notifier, ScriptedNotifier},
    store::MemoryStore,
    AppState,
};

pub const JWT_SECRET: &str = "integration-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<ScriptedNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(ScriptedNotifier::new("alerts@shesphere.test"), AuthState::disabled())
    }

    pub fn with_notifier(notifier: ScriptedNotifier) -> Self {
        Self::build(notifier, AuthState::disabled())
    }

    pub fn with_auth(required: bool) -> Self {
        Self::build(
            ScriptedNotifier::new("alerts@shesphere.test"),
            AuthState {
                verifier: Some(Arc::new(JwtVerifier::new(JWT_SECRET))),
                required,
            },
        )
    }

    fn build(notifier: ScriptedNotifier, auth: AuthState) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let state = AppState::with_store(
            store.clone(),
            Some(notifier.clone() as Arc<dyn Notifier>),
            Arc::new(TracingObserver),
            DispatchSettings::default(),
        );
        Self {
            router: app(state, auth),
            store,
            notifier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(request(Method::GET, uri, None, None)).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(request(Method::POST, uri, Some(body), None)).await
    }
}

pub fn request(method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn token_for(email: &str) -> String {
    let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
    encode(
        &Header::default(),
        &Claims {
            id: format!("id-{email}"),
            email: email.to_string(),
            role: Some("user".to_string()),
            exp,
        },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}
