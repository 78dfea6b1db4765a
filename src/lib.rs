pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod notify;
pub mod prediction;
pub mod routes;
pub mod store;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::auth::{authenticate, AuthState};
use crate::dispatch::{AlertDispatcher, DispatchObserver, DispatchSettings};
use crate::notify::Notifier;
use crate::store::{AlertStore, ContactStore, ObservationStore, SettingsStore, UserDirectory};

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub observations: Arc<dyn ObservationStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub dispatcher: Arc<AlertDispatcher>,
}

impl AppState {
    /// Wires every port to one backing store.
    pub fn with_store<S>(
        store: Arc<S>,
        notifier: Option<Arc<dyn Notifier>>,
        observer: Arc<dyn DispatchObserver>,
        dispatch: DispatchSettings,
    ) -> Self
    where
        S: ObservationStore + SettingsStore + ContactStore + AlertStore + UserDirectory + 'static,
    {
        let dispatcher = AlertDispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifier,
            observer,
            dispatch,
        );
        Self {
            observations: store.clone(),
            settings: store.clone(),
            contacts: store.clone(),
            alerts: store,
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// The full HTTP surface, without transport layers.
pub fn app(state: AppState, auth: AuthState) -> Router {
    let api = Router::new()
        .merge(routes::cycle::routes(state.clone()))
        .merge(routes::cycle_stats::routes(state.clone()))
        .merge(routes::safety::routes(state))
        .layer(middleware::from_fn_with_state(auth, authenticate));

    Router::new()
        .route("/", get(|| async { "Shesphere Backend is running!" }))
        .route("/health", get(|| async { "✅ Backend up" }))
        .merge(api)
}
