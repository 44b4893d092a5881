//! transwacom CLI: share graphics tablets and gamepads across machines.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use transwacom_daemon::config::StartupMode;
use transwacom_daemon::{ConfigManager, LogNotifier, Supervisor, TerminalPrompt};
use transwacom_input::linux::{DeviceDetector, UinputInjector};
use transwacom_input::CaptureOptions;
use transwacom_types::DeviceDescriptor;

const DEFAULT_PORT: u16 = 3333;

/// How long `--discover` browses before presenting the menu.
const DISCOVER_WINDOW: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "transwacom",
    about = "Share graphics tablets and gamepads across machines",
    version
)]
struct Cli {
    /// Host role only: capture and send device events.
    #[arg(long, conflicts_with_all = ["consumer", "unified"])]
    host: bool,

    /// Consumer role only: receive events into virtual devices.
    #[arg(long, conflicts_with = "unified")]
    consumer: bool,

    /// Both roles at once (the default).
    #[arg(long)]
    unified: bool,

    /// Browse for consumers for 10 seconds, then present a menu (host).
    #[arg(long)]
    discover: bool,

    /// Connect directly to a consumer (host).
    #[arg(long, value_name = "ADDR[:PORT]")]
    connect: Option<String>,

    /// Pin a specific local device (e.g. /dev/input/event11).
    #[arg(long, value_name = "PATH")]
    device: Option<String>,

    /// Print detected devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Override the listen port.
    #[arg(long, value_name = "N")]
    port: Option<u16>,

    /// Keep the tablet in absolute mode while sharing.
    #[arg(long)]
    no_relative_mode: bool,

    /// Keep the device active locally while sharing.
    #[arg(long)]
    no_disable_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Host,
    Consumer,
    Unified,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        list_devices();
        return Ok(());
    }

    let config = ConfigManager::load_default()?;
    init_logging(config.log_level());

    let mode = if cli.host {
        Mode::Host
    } else if cli.consumer {
        Mode::Consumer
    } else if cli.unified {
        Mode::Unified
    } else {
        match config.startup_mode() {
            StartupMode::Host => Mode::Host,
            StartupMode::Consumer => Mode::Consumer,
            StartupMode::Unified | StartupMode::None => Mode::Unified,
        }
    };

    let options = CaptureOptions {
        relative_mode: config.relative_mode() && !cli.no_relative_mode,
        disable_local: config.disable_local() && !cli.no_disable_local,
    };

    let supervisor = Supervisor::new(
        config,
        Box::new(UinputInjector::new()),
        Arc::new(TerminalPrompt),
        Arc::new(LogNotifier),
    );
    tracing::info!(identity = %supervisor.identity(), "starting");

    let args = RunArgs {
        mode,
        discover: cli.discover,
        connect: cli.connect,
        device: cli.device,
        port: cli.port,
        options,
    };

    // The role runs in its own task so that a panic still reaches the
    // cleanup below instead of tearing the process down around it.
    let role = tokio::spawn(run_mode(args, Arc::clone(&supervisor)));
    let result = tokio::select! {
        joined = role => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(anyhow::anyhow!("internal error: {e}")),
            Err(_) => Ok(()),
        },
        () = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    supervisor.emergency_cleanup().await;
    result
}

struct RunArgs {
    mode: Mode,
    discover: bool,
    connect: Option<String>,
    device: Option<String>,
    port: Option<u16>,
    options: CaptureOptions,
}

async fn run_mode(args: RunArgs, supervisor: Arc<Supervisor>) -> anyhow::Result<()> {
    match args.mode {
        Mode::Host => run_host(args, supervisor).await,
        Mode::Consumer => run_consumer(args, supervisor).await,
        Mode::Unified => run_unified(args, supervisor).await,
    }
}

async fn run_host(args: RunArgs, supervisor: Arc<Supervisor>) -> anyhow::Result<()> {
    if let Some(target) = &args.connect {
        let addr = resolve_addr(target, args.port.unwrap_or(DEFAULT_PORT)).await?;
        let device = pick_device(args.device.as_deref())?;
        share_until_closed(&supervisor, addr, device, args.options).await
    } else if args.discover {
        discover_and_connect(&supervisor, args.options).await
    } else {
        anyhow::bail!("host mode: use --discover or --connect ADDR[:PORT]")
    }
}

async fn run_consumer(args: RunArgs, supervisor: Arc<Supervisor>) -> anyhow::Result<()> {
    let addr = supervisor.start_consumer(args.port, None).await?;
    println!("Consumer service started on port {}", addr.port());
    println!("Press Ctrl+C to stop...");
    std::future::pending().await
}

async fn run_unified(args: RunArgs, supervisor: Arc<Supervisor>) -> anyhow::Result<()> {
    let addr = supervisor.start_consumer(args.port, None).await?;
    supervisor.start_discovery()?;

    println!("TransWacom unified service on port {}", addr.port());
    println!("This peer can both share and receive devices.");
    println!("Commands: discover, devices, connect, status, quit");

    loop {
        let Some(line) = read_line("\n> ").await else {
            break;
        };
        match line.as_str() {
            "discover" => {
                println!("Discovering consumers for 5 seconds...");
                tokio::time::sleep(Duration::from_secs(5)).await;
                print_peers(&supervisor);
            }
            "devices" => list_devices(),
            "connect" => {
                if let Err(e) = interactive_connect(&supervisor, args.options).await {
                    println!("Connect failed: {e}");
                }
            }
            "status" => print_status(&supervisor),
            "quit" | "exit" => break,
            "help" => println!("Commands: discover, devices, connect, status, quit"),
            "" => {}
            other => println!("Unknown command '{other}'. Type 'help' for commands."),
        }
    }
    Ok(())
}

/// Browse for a fixed window, show the menu, connect, block until the
/// share ends.
async fn discover_and_connect(
    supervisor: &Arc<Supervisor>,
    options: CaptureOptions,
) -> anyhow::Result<()> {
    supervisor.start_discovery()?;
    println!("Discovering consumers for {} seconds...", DISCOVER_WINDOW.as_secs());
    tokio::time::sleep(DISCOVER_WINDOW).await;

    let peers = supervisor.discovered_peers();
    if peers.is_empty() {
        anyhow::bail!("no consumers found");
    }

    println!("\nAvailable consumers:");
    for (i, peer) in peers.iter().enumerate() {
        println!(
            "  {}. {} ({}:{}) [{}]",
            i + 1,
            peer.name,
            peer.address,
            peer.port,
            peer.capabilities.join(", ")
        );
    }

    let devices = DeviceDetector::new().detect_all();
    if devices.is_empty() {
        anyhow::bail!("no input devices detected");
    }
    println!("\nAvailable devices:");
    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {device}", i + 1);
    }

    let peer_idx = read_index("Select consumer (number): ", peers.len()).await?;
    let device_idx = read_index("Select device (number): ", devices.len()).await?;

    let peer = &peers[peer_idx];
    let addr = SocketAddr::new(peer.address, peer.port);
    share_until_closed(supervisor, addr, devices[device_idx].clone(), options).await
}

async fn interactive_connect(
    supervisor: &Arc<Supervisor>,
    options: CaptureOptions,
) -> anyhow::Result<()> {
    let peers = supervisor.discovered_peers();
    if peers.is_empty() {
        anyhow::bail!("no consumers discovered yet; run 'discover' first");
    }
    let devices = DeviceDetector::new().detect_all();
    if devices.is_empty() {
        anyhow::bail!("no local devices available");
    }

    println!("Available devices:");
    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {device}", i + 1);
    }
    println!("Available consumers:");
    for (i, peer) in peers.iter().enumerate() {
        println!("  {}. {} ({}:{})", i + 1, peer.name, peer.address, peer.port);
    }

    let device_idx = read_index("Select device (number): ", devices.len()).await?;
    let peer_idx = read_index("Select consumer (number): ", peers.len()).await?;

    let peer = &peers[peer_idx];
    let addr = SocketAddr::new(peer.address, peer.port);
    let device = devices[device_idx].clone();
    println!("Connecting {} to {}...", device.name, peer.name);
    supervisor.start_share(addr, device, options).await?;
    println!("Sharing started.");
    Ok(())
}

/// Start a share and block until it ends, from either side.
async fn share_until_closed(
    supervisor: &Arc<Supervisor>,
    addr: SocketAddr,
    device: DeviceDescriptor,
    options: CaptureOptions,
) -> anyhow::Result<()> {
    println!("Connecting to {addr} with {}...", device.name);
    supervisor.start_share(addr, device, options).await?;
    println!("Connected! Press Ctrl+C to disconnect...");

    supervisor.wait_while_sharing(&addr.to_string()).await;
    println!("Share ended.");
    Ok(())
}

fn list_devices() {
    let devices = DeviceDetector::new().detect_all();
    println!("Detected devices:");
    if devices.is_empty() {
        println!("  No devices found.");
        return;
    }
    for device in devices {
        println!("  {device}");
        if !device.capabilities.is_empty() {
            println!("    Capabilities: {}", device.capabilities.join(", "));
        }
    }
}

fn pick_device(path: Option<&str>) -> anyhow::Result<DeviceDescriptor> {
    let detector = DeviceDetector::new();
    if let Some(path) = path {
        return detector
            .detect_path(std::path::Path::new(path))
            .ok_or_else(|| anyhow::anyhow!("device {path} not found or not shareable"));
    }
    let devices = detector.detect_all();
    let first = devices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no devices detected; use --device to specify one"))?;
    println!("Auto-selected device: {} ({})", first.name, first.path);
    Ok(first)
}

fn print_peers(supervisor: &Arc<Supervisor>) {
    let peers = supervisor.discovered_peers();
    if peers.is_empty() {
        println!("No consumers found");
        return;
    }
    println!("Found {} consumers:", peers.len());
    for (i, peer) in peers.iter().enumerate() {
        println!("  {}. {} at {}:{}", i + 1, peer.name, peer.address, peer.port);
        println!("     Capabilities: {}", peer.capabilities.join(", "));
    }
}

fn print_status(supervisor: &Arc<Supervisor>) {
    let status = supervisor.status();
    println!("Status:");
    println!("  Outgoing connections: {}", status.outbound.len());
    for id in &status.outbound {
        println!("    sharing with {id}");
    }
    println!("  Incoming connections: {}", status.inbound.len());
    for (host, sockets) in &status.inbound {
        println!("    receiving from {host} ({sockets} socket(s))");
    }
    println!("  Discovered consumers: {}", status.discovered_peers);
}

async fn resolve_addr(target: &str, default_port: u16) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let with_port = if target.contains(':') {
        target.to_string()
    } else {
        format!("{target}:{default_port}")
    };
    let resolved = tokio::net::lookup_host(&with_port)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve {target}"));
    resolved
}

async fn read_line(prompt: &str) -> Option<String> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush().ok();
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_lowercase()),
        }
    })
    .await
    .ok()
    .flatten()
}

async fn read_index(prompt: &str, len: usize) -> anyhow::Result<usize> {
    let line = read_line(prompt)
        .await
        .ok_or_else(|| anyhow::anyhow!("cancelled"))?;
    let choice: usize = line.parse().map_err(|_| anyhow::anyhow!("invalid selection"))?;
    if choice == 0 || choice > len {
        anyhow::bail!("invalid selection");
    }
    Ok(choice - 1)
}

fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_lowercase())),
        )
        .init();
}

async fn shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}
