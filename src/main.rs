use raffle_relay::chain::{abi, RpcChain};
use raffle_relay::config::{Config, ConfigError, LoggingConfig};
use raffle_relay::notify::TelegramNotifier;
use raffle_relay::relay::{fault, RelayContext, Supervisor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const CONFIG_PATH: &str = "relay.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            let e = anyhow::Error::from(e).context("invalid configuration");
            return fail(e, fault::RESTART_DELAY).await;
        }
    };

    init_logging(&config.logging);
    info!("raffle-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let restart_delay = config.relay.restart_delay();
    fault::install_panic_boundary(restart_delay);

    if let Err(e) = run(config).await {
        return fail(e, restart_delay).await;
    }

    Ok(())
}

fn load_config() -> Result<Config, ConfigError> {
    if Path::new(CONFIG_PATH).exists() {
        Config::load(Path::new(CONFIG_PATH))
    } else {
        Config::from_env()
    }
}

/// Log a startup failure, then wait out the restart delay before exiting 1.
async fn fail(e: anyhow::Error, delay: Duration) -> anyhow::Result<()> {
    error!(error = %format!("{e:#}"), "relay failed");
    fault::exit_after(delay);
    std::future::pending().await
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    // --- ABI artifacts ---
    let raffle_abi = abi::load_abi(&config.chain.raffle_abi_path)?;
    abi::verify_raffle_abi(&raffle_abi)?;
    let token_abi = abi::load_abi(&config.chain.token_abi_path)?;
    abi::verify_token_abi(&token_abi)?;
    info!(
        raffle = %config.chain.raffle_abi_path.display(),
        token = %config.chain.token_abi_path.display(),
        "ABI artifacts verified"
    );

    // --- Chain ---
    let raffle_address = config.chain.raffle_address()?;
    let token_address = config.chain.token_address()?;
    let chain = RpcChain::connect(
        &config.chain.rpc_url,
        config.chain.chain_id,
        raffle_address,
        token_address,
        config.chain.poll_interval(),
    )
    .await?;

    // --- Telegram ---
    let notifier = TelegramNotifier::new(
        config.telegram.api_url.clone(),
        config.telegram.token.clone(),
    );

    let ctx = Arc::new(RelayContext {
        chain: chain.clone(),
        notifier,
        raffle_address,
        destination: config.telegram.chat_id.clone(),
        template: config.message.template(config.chain.raffle_address.trim()),
        parse_mode: config.telegram.parse_mode,
        read_at_event_block: config.relay.read_at_event_block,
    });

    let supervisor = Supervisor::new(ctx, chain)
        .with_retry_delay(config.relay.resubscribe_delay())
        .with_max_in_flight(config.relay.max_concurrent_handlers);

    info!(chat = %config.telegram.chat_id, "monitoring started, waiting for RaffleEntered events");

    supervisor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("shutting down...");
    Ok(())
}
