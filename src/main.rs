use color_eyre::{eyre::eyre, Result};
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use iotbus::bus::{
    CommandChannel, CommandEvent, RawEvent, ReadingEvent, TelemetryHandler, TelemetryMonitor,
    TelemetryPublisher,
};
use iotbus::config::{BusConfig, DEFAULT_CONFIG_PATH};
use iotbus::sensor::Emitter;
use iotbus::topic::Address;

const USAGE: &str =
    "usage: iotbus [--config <path>] <publish | monitor | send <payload> [device_id]>";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let mut args = std::env::args().skip(1).peekable();
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        config_path = args.next().ok_or_else(|| eyre!("--config needs a path"))?;
    }
    let config = BusConfig::load(&config_path)?;

    match args.next().as_deref() {
        Some("publish") => run_publisher(config).await,
        Some("monitor") => run_monitor(config).await,
        Some("send") => {
            let payload = args.next().ok_or_else(|| eyre!("send needs a payload"))?;
            let device = args.next();
            run_send(config, payload, device).await
        }
        _ => Err(eyre!(USAGE)),
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();
    Ok(())
}

/// Flips to `true` once Ctrl-C arrives; both bus loops check it at their
/// boundaries.
fn stop_on_ctrl_c() -> watch::Receiver<bool> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = stop_tx.send(true);
        }
    });
    stop_rx
}

async fn run_publisher(config: BusConfig) -> Result<()> {
    let emitter = Emitter::new(config.emitter);
    let publisher = TelemetryPublisher::connect(
        config.namespace.clone(),
        &config.broker,
        config.publisher,
        emitter,
    )
    .await?;
    publisher.run_loop(stop_on_ctrl_c()).await?;
    Ok(())
}

async fn run_monitor(config: BusConfig) -> Result<()> {
    let mut monitor =
        TelemetryMonitor::connect(&config.namespace, &config.broker, &config.monitor).await?;
    let mut handler = ConsoleHandler;
    monitor.listen(&mut handler, stop_on_ctrl_c()).await?;
    Ok(())
}

async fn run_send(config: BusConfig, payload: String, device: Option<String>) -> Result<()> {
    let mut channel = CommandChannel::connect(&config.broker, config.command).await?;
    let user_id = channel.config().user_id.clone();
    let device_id = device.unwrap_or_else(|| channel.config().device_id.clone());
    let address = Address::command(&config.namespace, user_id, device_id);
    let receipt = channel.send(&address, &payload).await?;
    println!(
        "command delivered: message_id={} confirmed={}",
        receipt.message_id, receipt.confirmed
    );
    channel.disconnect().await;
    Ok(())
}

/// Prints the demultiplexed feed the way the fleet operators read it.
struct ConsoleHandler;

impl TelemetryHandler for ConsoleHandler {
    fn on_reading(&mut self, event: ReadingEvent) {
        println!(
            "[{}] User: {} | Device: {} | {}: {}",
            event.timestamp.format("%H:%M:%S"),
            event.user,
            event.device,
            event.kind.to_uppercase(),
            event.payload
        );
    }

    fn on_command(&mut self, event: CommandEvent) {
        println!(
            "[{}] User: {} | Device: {} | CMD: {}",
            event.timestamp.format("%H:%M:%S"),
            event.user,
            event.device,
            event.payload
        );
    }

    fn on_raw(&mut self, event: RawEvent) {
        println!(
            "[{}] {}: {}",
            event.timestamp.format("%H:%M:%S"),
            event.topic,
            event.payload
        );
    }
}
