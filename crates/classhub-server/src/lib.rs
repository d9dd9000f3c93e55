//! Classhub Server Library
//!
//! This module exposes the server components for testing and embedding.

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod ws;

use anyhow::Result;
use db::{MembershipStore, PgStore};
use services::{LogMailer, Mailer, NotificationDispatcher};
use std::sync::Arc;

/// Create and configure the server application on PostgreSQL
pub async fn create_app(config: state::Config) -> Result<(axum::Router, sqlx::PgPool)> {
    let db_pool = db::init_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    let (router, _state) = create_app_with_store(config, store, Arc::new(LogMailer));
    Ok((router, db_pool))
}

/// Build the application over any store. Spawns the dispatch worker, so it
/// must run inside a Tokio runtime.
pub fn create_app_with_store(
    config: state::Config,
    store: Arc<dyn MembershipStore>,
    mailer: Arc<dyn Mailer>,
) -> (axum::Router, state::AppState) {
    let (dispatcher, _worker) = NotificationDispatcher::spawn(
        config.dispatch_queue_capacity,
        mailer,
        config.mail_from.clone(),
    );
    let app_state = state::AppState::new(config, store, dispatcher);
    let router = api::create_router(app_state.clone());
    (router, app_state)
}
