use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db::{self, queries};
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if let Some(name) = &config.bootstrap_user {
        let user = match queries::get_user_by_name(&conn, name)? {
            Some(user) => user,
            None => {
                let user = queries::create_user(&conn, name)?;
                tracing::info!(user_id = user.id, "created bootstrap user {name}");
                user
            }
        };
        tracing::info!("bootstrap user {name} token: {}", user.api_token);
    }

    let state = Arc::new(AppState::new(conn, config.clone()));
    let app = slotbook::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
