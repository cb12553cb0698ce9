use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use zimgx::config::ZimgxConfig;
use zimgx::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "zimgx=info".into()),
        )
        .init();

    let config = ZimgxConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "invalid bind address");
            return ExitCode::FAILURE;
        }
    };

    let max_connections = config.server.max_connections;
    let state = Arc::new(zimgx::build_state(&config));
    let server = Server::new(state, max_connections);

    tracing::info!("starting zimgx");
    if let Err(e) = server.run(addr).await {
        tracing::error!(error = %e, "server exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
