use tokio::net::TcpListener;
use tracing::info;
use url_summarizer::{api::routes::create_router, config::Config, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr;

    let app_state = AppState::from_config(&config)?;
    info!(
        llm = app_state.summarizer.llm_backend(),
        model = %config.llm.model,
        list = ?app_state.summarizer.list_name(),
        "Summarizer configured"
    );

    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;
    info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
