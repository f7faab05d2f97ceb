pub mod config;
pub mod controller;
pub mod device;
pub mod mapping;

use crate::config::ReadErrorPolicy;
use crate::controller::{ControllerHandle, ControllerSettings};
use crate::device::usb::UsbReportSource;
use crate::device::{diagnostics, DeviceError, DeviceIdentity};
use crate::mapping::{KeyEmitter, KeyInjector, KeyMap};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "dial2key")]
#[command(version)]
#[command(about = "Turns presses and turns of a USB rotary dial into key strokes")]
struct Cli {
    /// Settings file (created with defaults when missing)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print every attached USB device and exit
    #[arg(short, long)]
    list: bool,

    /// Upper bound for a single device read in milliseconds
    #[arg(long, value_name = "MS")]
    read_timeout_ms: Option<u64>,

    /// Stop instead of retrying when a device read fails
    #[arg(long)]
    abort_on_read_error: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    if cli.list {
        diagnostics::print_all().map_err(|e| eyre!("Failed to list USB devices: {}", e))?;
        return Ok(());
    }

    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_settings_path()?,
    };
    let mut settings = config::load_or_create(&settings_path).await?;
    if let Some(ms) = cli.read_timeout_ms {
        settings.read_timeout_ms = Some(ms);
    }
    if cli.abort_on_read_error {
        settings.on_read_error = Some(ReadErrorPolicy::Abort);
    }

    let key_map = settings.key_map()?;
    let controller_settings = ControllerSettings::from_settings(&settings)?;
    info!(
        "Key map: down={} up={} left={} right={} delay={:?}",
        key_map.key(mapping::Direction::Down),
        key_map.key(mapping::Direction::Up),
        key_map.key(mapping::Direction::Left),
        key_map.key(mapping::Direction::Right),
        key_map.delay()
    );

    describe_target(controller_settings.identity);

    let injector = create_injector(&key_map)?;
    // give the desktop a moment to pick up the new keyboard
    tokio::time::sleep(Duration::from_millis(200)).await;
    let emitter = KeyEmitter::new(key_map, injector);

    let mut handle = ControllerHandle::spawn(
        controller_settings,
        Box::new(UsbReportSource::new()),
        emitter,
        CancellationToken::new(),
    );

    let ctrl_c = handle.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Stopping read loop");
                ctrl_c.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl+C: {}", e),
        }
    });

    let summary = handle.join().await?;
    info!("Finished: {}", summary);

    Ok(())
}

fn setup(verbose: u8) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(verbose);
    Ok(())
}

fn setup_logging_env(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Prints the target's descriptor fields; failures only affect the printout
fn describe_target(identity: DeviceIdentity) {
    info!(
        "Searching for device with Vendor ID: 0x{:04x} and Product ID: 0x{:04x}",
        identity.vendor_id, identity.product_id
    );
    match diagnostics::describe(identity) {
        Ok(summary) => {
            println!("Device found!");
            println!("{}", summary);
        }
        Err(DeviceError::NotFound(_)) => {
            warn!("Device {} not found", identity);
            match diagnostics::list_devices() {
                Ok(devices) => {
                    for device in devices {
                        debug!("Attached device:\n{}", device);
                    }
                }
                Err(e) => debug!("Unable to list attached devices: {}", e),
            }
        }
        Err(e) => warn!("Unable to describe device {}: {}", identity, e),
    }
}

#[cfg(target_os = "linux")]
fn create_injector(key_map: &KeyMap) -> Result<Box<dyn KeyInjector>> {
    let injector = mapping::keyboard::UinputInjector::create(key_map)
        .map_err(|e| eyre!("{} (is /dev/uinput writable?)", e))?;
    Ok(Box::new(injector))
}

#[cfg(not(target_os = "linux"))]
fn create_injector(_key_map: &KeyMap) -> Result<Box<dyn KeyInjector>> {
    Err(eyre!(
        "Synthetic key injection is only supported on Linux (uinput)"
    ))
}
