//! joy2hid - Gamepad to USB HID keyboard converter
//!
//! Command-line entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use std::fs;
use std::path::{Path, PathBuf};

use joy2hid::config::{config_path, MappingEntry, MappingHandle, MappingTable};
use joy2hid::device::CancelToken;
use joy2hid::keyboard::keymap;

#[derive(Parser)]
#[command(name = "joy2hid", version)]
#[command(about = "Turn a gamepad into a USB HID keyboard")]
struct Cli {
    /// Mapping file (default: ~/.config/joy2hid/mappings.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Input event node (default: first detected gamepad)
    #[arg(short, long, global = true)]
    device: Option<PathBuf>,

    /// HID gadget node to write reports to
    #[arg(long, default_value = "/dev/hidg0")]
    hidg: PathBuf,

    /// Create and bind the USB gadget if the node is missing (needs root)
    #[arg(long)]
    setup_gadget: bool,

    /// Log reports instead of writing them to the gadget
    #[arg(long)]
    dry_run: bool,

    /// More output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Convert gamepad input to keyboard reports (default)
    Run,
    /// List input devices and their classification
    ListDevices,
    /// List key and modifier names usable in mappings
    Keys,
    /// Print the mapping file as JSON
    ShowConfig,
    /// Print normalized gamepad events until Ctrl+C
    Monitor,
    /// Add or replace one mapping, e.g. map BTN_A '{"type":"keyboard","key":"SPACE"}'
    Map {
        /// Event name as printed by `monitor`
        event: String,
        /// Mapping entry as JSON
        entry: String,
    },
    /// Remove the mapping for one event
    Unmap { event: String },
    /// Set the device name stored in the mapping file
    Rename { name: String },
    /// Replace the whole mapping file with a JSON document
    Import { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => run(&cli),
        Command::ListDevices => list_devices(),
        Command::Keys => {
            print_keys();
            Ok(())
        }
        Command::ShowConfig => show_config(&cli),
        Command::Monitor => monitor(&cli),
        Command::Map { event, entry } => map(&cli, &event, &entry),
        Command::Unmap { event } => unmap(&cli, &event),
        Command::Rename { name } => {
            open_mappings(&cli)?.rename_device(&name)?;
            println!("Device name set to {}", name);
            Ok(())
        }
        Command::Import { file } => import(&cli, &file),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn load_mappings(cli: &Cli) -> Result<MappingTable> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config_path()?,
    };
    info!("Loading mappings from {}", path.display());
    MappingTable::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

fn open_mappings(cli: &Cli) -> Result<MappingHandle> {
    Ok(MappingHandle::new(load_mappings(cli)?))
}

fn map(cli: &Cli, event: &str, entry: &str) -> Result<()> {
    let entry = MappingEntry::from_json_str(entry).context("invalid mapping entry")?;
    let previous = open_mappings(cli)?.set_mapping(event, entry)?;
    match previous {
        Some(old) => println!("Replaced {} mapping for {}", old.type_name(), event),
        None => println!("Added mapping for {}", event),
    }
    Ok(())
}

fn unmap(cli: &Cli, event: &str) -> Result<()> {
    if !open_mappings(cli)?.remove_mapping(event)? {
        anyhow::bail!("no mapping for {}", event);
    }
    println!("Removed mapping for {}", event);
    Ok(())
}

fn import(cli: &Cli, file: &Path) -> Result<()> {
    let json = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let count = open_mappings(cli)?
        .import_json(&json)
        .with_context(|| format!("failed to import {}", file.display()))?;
    println!("Imported {} mappings", count);
    Ok(())
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn install_cancel_handler() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        handler_cancel.cancel();
    })
    .context("failed to install signal handler")?;
    Ok(cancel)
}

fn print_keys() {
    println!("Keys:");
    for name in keymap::all_key_names() {
        println!("  {}", name);
    }
    println!("\nModifiers:");
    for name in keymap::all_modifier_names() {
        println!("  {}", name);
    }
}

fn show_config(cli: &Cli) -> Result<()> {
    let table = load_mappings(cli)?;
    println!("{}", table.to_json_string()?);
    Ok(())
}

#[cfg(target_os = "linux")]
fn run(cli: &Cli) -> Result<()> {
    use joy2hid::device::ReportSink;
    use joy2hid::input::EvdevSource;
    use joy2hid::output::LogSink;
    use joy2hid::Dispatcher;

    let mappings = open_mappings(cli)?;
    let mut source = EvdevSource::open_or_detect(cli.device.as_deref())
        .context("failed to open input device")?;

    let sink: Box<dyn ReportSink> = if cli.dry_run {
        info!("Dry run: reports are logged, not sent");
        Box::new(LogSink::new())
    } else {
        Box::new(open_gadget(cli)?)
    };

    let cancel = install_cancel_handler()?;
    let mut dispatcher = Dispatcher::new(mappings, sink);
    info!("Converter running. Press Ctrl+C to exit.");

    let result = dispatcher.run(&mut source, &cancel);

    let stats = dispatcher.stats();
    info!(
        "Processed {} events ({} unmapped), sent {} reports ({} deferred)",
        stats.events_seen, stats.translate.unmapped, stats.reports_sent, stats.reports_deferred
    );
    result.context("converter stopped")
}

#[cfg(target_os = "linux")]
fn open_gadget(cli: &Cli) -> Result<joy2hid::output::HidGadget> {
    use joy2hid::output::{gadget, wait_for_node, HidGadget};
    use std::time::Duration;

    if cli.setup_gadget && !cli.hidg.exists() {
        let status = gadget::setup_usb_gadget().context("USB gadget setup failed")?;
        info!("USB gadget: {:?}", status);
        if !wait_for_node(&cli.hidg, Duration::from_secs(5)) {
            anyhow::bail!("{} did not appear after gadget setup", cli.hidg.display());
        }
    }

    HidGadget::open(&cli.hidg).with_context(|| format!("failed to open {}", cli.hidg.display()))
}

#[cfg(target_os = "linux")]
fn list_devices() -> Result<()> {
    let devices = joy2hid::input::list_devices();
    if devices.is_empty() {
        println!("No input devices found (are you in the 'input' group?)");
        return Ok(());
    }

    for info in devices {
        println!("{}", info.path.display());
        println!("  Name: {}", info.name);
        println!("  Phys: {}", info.phys.as_deref().unwrap_or("-"));
        if let Some(unique) = &info.unique {
            println!("  Uniq: {}", unique);
        }
        println!("  Type: {}", info.kind.label());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn monitor(cli: &Cli) -> Result<()> {
    use joy2hid::input::{EvdevSource, EventMonitor};
    use std::time::Duration;

    let source = EvdevSource::open_or_detect(cli.device.as_deref())
        .context("failed to open input device")?;
    let monitor = EventMonitor::spawn(source).context("failed to start event monitor")?;
    let cancel = install_cancel_handler()?;
    println!("Monitoring events. Press Ctrl+C to exit.");

    while !cancel.is_cancelled() && !monitor.is_finished() {
        if let Some(event) = monitor.next_event(Duration::from_millis(100)) {
            println!("{}", event);
        }
    }

    let dropped = monitor.dropped();
    if dropped > 0 {
        info!("{} events dropped while the output was busy", dropped);
    }
    match monitor.stop(Duration::from_secs(1)) {
        Some(result) => result.context("event monitor failed"),
        None => Ok(()),
    }
}

#[cfg(not(target_os = "linux"))]
fn run(_cli: &Cli) -> Result<()> {
    anyhow::bail!("the converter needs Linux evdev and USB gadget support")
}

#[cfg(not(target_os = "linux"))]
fn list_devices() -> Result<()> {
    anyhow::bail!("device listing needs Linux evdev")
}

#[cfg(not(target_os = "linux"))]
fn monitor(_cli: &Cli) -> Result<()> {
    anyhow::bail!("event monitoring needs Linux evdev")
}
