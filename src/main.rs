use helpdesk::{bus, config, interface, manager};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // Not fatal, the defaults work without one
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Helpdesk starting...");

    let config = config::SupportConfig::from_env()?;
    info!(
        "Reply delay {:?}, live agent delay {:?}, {} quick replies",
        config.reply_delay,
        config.live_agent_delay,
        config.quick_replies.len()
    );

    let bus = Arc::new(bus::EventBus::new());
    let chat = manager::SupportChat::new(bus, config);
    let console = interface::console::ConsoleInterface::new(chat);

    let console_handle = tokio::spawn(async move { console.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = console_handle => {
            match res {
                Ok(Ok(())) => info!("Goodbye"),
                Ok(Err(e)) => error!("Console stopped with error: {:#}", e),
                Err(e) => error!("Console task failed: {}", e),
            }
        }
    }

    Ok(())
}
