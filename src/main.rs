use std::sync::Arc;

mod app;
mod config;
mod db;
mod mail;
mod pagination;
mod signing;
mod state;
mod users;

use crate::{config::AppConfig, state::AppState};

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "xenopus_accounts=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;

    let bind_addr = config.bind_addr.clone();
    let state = AppState::init(config, pool)?;
    app::serve(app::build_app(state), &bind_addr).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_builds_with_fake_state() {
        let (state, _, _) = AppState::fake();
        let _router = app::build_app(state);
    }
}
