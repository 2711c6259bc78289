use axum::middleware;
use conductor_server::auth::check_api_key;
use conductor_server::configuration::Settings;
use conductor_server::state::AppState;
use conductor_server::{logging, routes};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

pub async fn run(host: Option<String>, port: Option<u16>, debug: bool) -> anyhow::Result<()> {
    logging::setup_logging(Some("conductord"))?;

    let mut settings = Settings::new()?;
    if let Some(host) = host {
        settings.host = host;
    }
    if let Some(port) = port {
        settings.port = port;
    }
    settings.debug = settings.debug || debug;

    let app_state = AppState::new()?;

    routes::schedulers::spawn_background_loops(app_state.clone(), &settings);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(app_state.clone())
        .layer(middleware::from_fn_with_state(app_state, check_api_key))
        .layer(cors);

    let addr = settings.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("listening on {}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shutdown complete");
    Ok(())
}
