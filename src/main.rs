//! Spalink CLI - local-network client for Balboa spa control boards.

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use spalink::cli::{Cli, Commands, DiscoverArgs, SetArgs, Setting, WatchArgs};
use spalink::config::{init_logging, Config, DiscoveryConfig, LoggingConfig};
use spalink::error::Result;
use spalink::{discovery, ClientConfig, SpaClient, SpaEvent};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LoggingConfig {
        level: cli.log_level.clone(),
        color: !cli.no_color,
        ..Default::default()
    };
    init_logging(&log_config)?;

    let config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Discover(args) => run_discover(args, config).await,
        Commands::Watch(args) => run_watch(args, config).await,
        Commands::Set(args) => run_set(args, config).await,
    }
}

/// Scan the local subnets and print what answered.
async fn run_discover(args: DiscoverArgs, config: Config) -> Result<()> {
    let scan = DiscoveryConfig {
        overall_timeout: Duration::from_secs(args.timeout),
        concurrency: args.concurrency,
        ..config.discovery
    };

    println!("Scanning local subnets for spa boards (up to {}s)...", args.timeout);
    let found = discovery::discover_with(&scan).await;

    if found.is_empty() {
        println!("{}", "No spa boards found.".yellow());
    } else {
        for ip in found {
            println!("{} {}", "✓".green(), ip.to_string().bright_white());
        }
    }

    Ok(())
}

/// Connect and stream decoded events until Ctrl-C.
async fn run_watch(args: WatchArgs, config: Config) -> Result<()> {
    let client = SpaClient::with_config(
        args.host,
        ClientConfig {
            port: args.port,
            ..config.client
        },
    );

    let mut events = client.subscribe();
    client.connect().await?;

    println!(
        "Watching {} (Ctrl-C to stop)",
        client.addr().to_string().bright_white()
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("{} dropped {missed} events", "⚠".yellow());
                }
                Err(RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => break,
        }
    }

    client.disconnect().await;
    Ok(())
}

/// Apply one setting: connect, wait for the baseline status, send.
async fn run_set(args: SetArgs, config: Config) -> Result<()> {
    let client = SpaClient::with_config(
        args.host,
        ClientConfig {
            port: args.port,
            ..config.client
        },
    );

    let mut events = client.subscribe();
    client.connect().await?;

    // Toggle decisions need a baseline; wait for the first status.
    let deadline = Duration::from_secs(args.wait);
    let baseline = tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(SpaEvent::Status(_)) => return true,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return false,
            }
        }
    })
    .await;

    if !matches!(baseline, Ok(true)) {
        client.disconnect().await;
        return Err(spalink::Error::StateUnknown);
    }

    let sent = match args.setting {
        Setting::Temp { celsius } => {
            client.set_temperature(celsius).await?;
            true
        }
        Setting::Jet { port, state } => client.set_jet_state(port, state.as_bool()).await?,
        Setting::Light { state } => client.set_light_state(0, state.as_bool()).await?,
        Setting::Blower { state } => client.set_blower_state(state.as_bool()).await?,
        Setting::HeaterMode { mode } => client.set_heater_mode(mode.into()).await?,
        Setting::TempRange { range } => client.set_temp_range(range.into()).await?,
    };

    if sent {
        println!("{} command sent", "✓".green());
    } else {
        println!("{} already in the requested state", "✓".green());
    }

    client.disconnect().await;
    Ok(())
}

fn print_event(event: &SpaEvent) {
    match event {
        SpaEvent::Connected => println!("{} connected", "✓".green()),
        SpaEvent::Status(status) => {
            let heating = if status.heating {
                "heating".red().to_string()
            } else {
                "idle".normal().to_string()
            };
            println!(
                "{:02}:{:02}  water {:.1}{} → {:.1}{}  [{} | {} range | {}]",
                status.hour,
                status.minute,
                status.current_temperature,
                status.scale,
                status.target_temperature,
                status.scale,
                heating,
                status.range,
                status
                    .components
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        SpaEvent::Config(config) => {
            println!(
                "hardware: pumps {:?} lights {:?} blower {} mister {}",
                config.pumps, config.lights, config.blower, config.mister
            );
        }
        SpaEvent::Error(message) => eprintln!("{} {message}", "✗".red()),
    }
}
