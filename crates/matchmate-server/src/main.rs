mod configuration;
mod error;
mod routes;
mod state;

use configuration::Settings;
use matchmate::agent::Agent;
use matchmate::providers::factory;
use matchmate::systems::{InMemoryOpportunityStore, OpportunitySystem};
use matchmate::tools::ToolRegistry;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging, defaulting to info unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::new()?;

    let store = InMemoryOpportunityStore::from_path(&settings.data.opportunities_path).await?;
    info!(
        count = store.len(),
        path = %settings.data.opportunities_path.display(),
        "loaded opportunities"
    );

    let registry = ToolRegistry::builder()
        .with_system(&OpportunitySystem::new(Arc::new(store)))
        .max_concurrent(settings.agent.max_concurrent_tools)
        .build()?;

    info!(provider = ?settings.provider.provider_type(), "configuring model provider");
    let agent_config = settings.agent.to_config();
    let provider = factory::get_provider(settings.provider.into_config())?;
    let agent = Agent::new(provider, Arc::new(registry), agent_config)?;
    let state = state::AppState::new(agent);

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
