use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use typetype_server::config::ServerConfig;
use typetype_server::lobby::{run_lobby, LobbyCommand};
use typetype_server::ws::{router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();
    let (lobby_tx, lobby_rx) = mpsc::channel::<LobbyCommand>(256);
    let app_state = AppState::new(lobby_tx, &config);
    let app = router(app_state, &config.allowed_origins);

    tracing::info!(
        "Tick rate {} Hz, rng seed {:?}, max {} connections",
        config.tick_rate_hz,
        config.rng_seed,
        config.max_connections
    );

    // Spawn lobby
    tokio::spawn(async move {
        run_lobby(lobby_rx, config).await;
    });

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Typetype server listening on {}", listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
