use log::{error, info};
use scribe_collab::server::{RelayConfig, RelayServer};

/// Environment variable consulted when no bind address is given on the command line.
const ADDR_ENV: &str = "SCRIBE_RELAY_ADDR";

fn relay_config() -> RelayConfig {
    let bind_addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ADDR_ENV).ok());

    match bind_addr {
        Some(bind_addr) => RelayConfig { bind_addr },
        None => RelayConfig::default(),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = relay_config();
    info!("Starting scribe relay on {}...", config.bind_addr);

    let server = match RelayServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind relay: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Relay stopped: {e}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
}
