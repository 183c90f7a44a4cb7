use beckn::{
    config::AppConfig, server::gateway_router, Broadcaster, Gateway, HttpRegistry, Registry, StaticRegistry,
};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "Search gateway broadcasting discovery requests to registered providers")]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Overrides `gateway.registry_url`
    #[arg(short, long)]
    registry_url: Option<String>,

    /// Overrides `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

impl Args {
    /// Command-line flags win over the file and the environment.
    fn apply_to(self, config: &mut AppConfig) {
        if let Some(registry_url) = self.registry_url {
            config.gateway.registry_url = Some(registry_url);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = AppConfig::load_with_env_overrides(&args.config)?;
    args.apply_to(&mut config);
    config.validate()?;
    config.logging.init_tracing();

    let registry: Arc<dyn Registry> = match &config.gateway.registry_url {
        Some(url) => {
            tracing::info!("Resolving providers through registry at {}", url);
            Arc::new(HttpRegistry::new(url.clone(), config.gateway.timeout())?)
        }
        None => {
            tracing::info!("Using {} statically configured providers", config.gateway.providers.len());
            Arc::new(StaticRegistry::new(config.gateway.providers.clone()))
        }
    };

    let broadcaster = Arc::new(Broadcaster::from_config(registry, &config.gateway));
    let gateway = Arc::new(Gateway::new(broadcaster, config.gateway.timeout())?);

    let app = gateway_router(gateway);
    let listener = TcpListener::bind(config.get_server_address()).await?;
    tracing::info!("Gateway listening on {}", config.get_server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_port_is_kept_without_flag() {
        let mut config = AppConfig::default();
        config.server.port = 9100;

        Args::parse_from(["gateway"]).apply_to(&mut config);
        assert_eq!(config.server.port, 9100);
        assert!(config.gateway.registry_url.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = AppConfig::default();
        config.server.port = 9100;

        Args::parse_from(["gateway", "--port", "5000", "--registry-url", "http://registry.test/lookup"])
            .apply_to(&mut config);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.gateway.registry_url.as_deref(), Some("http://registry.test/lookup"));
    }
}
