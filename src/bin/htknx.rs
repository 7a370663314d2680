use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use htknx::{Bridge, BridgeConfig, DatapointValue, LogBus, MemoryHeatPump, Telegram};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{info, Level};

const DEFAULT_TICKS: &str = "5";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("htknx")
        .version("0.1.0")
        .about("🌡️  KNX bridge for Heliotherm heat pumps")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("✅ Validate a configuration file and list its devices")
                .arg(
                    Arg::with_name("config")
                        .help("Path to the JSON configuration file")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("🧪 Run the bridge against a simulated heat pump")
                .long_about(
                    "Runs the configured devices against an in-memory heat pump. Outbound \
                     telegrams are written to the log instead of a KNX connection.",
                )
                .arg(
                    Arg::with_name("config")
                        .help("Path to the JSON configuration file")
                        .required(true),
                )
                .arg(
                    Arg::with_name("ticks")
                        .long("ticks")
                        .value_name("N")
                        .help("Number of poll cycles to run")
                        .takes_value(true)
                        .default_value(DEFAULT_TICKS)
                        .validator(|v| match v.parse::<u32>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Ticks must be a positive number".into()),
                        }),
                )
                .arg(
                    Arg::with_name("interval-ms")
                        .long("interval-ms")
                        .value_name("MS")
                        .help("Override the configured poll interval")
                        .takes_value(true)
                        .validator(|v| match v.parse::<u64>() {
                            Ok(ms) if ms > 0 => Ok(()),
                            _ => Err("Interval must be a positive number of milliseconds".into()),
                        }),
                )
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("Print the final statistics as JSON"),
                ),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match matches.subcommand() {
        ("check", Some(sub)) => check(sub),
        ("simulate", Some(sub)) => simulate(sub).await,
        _ => Ok(()),
    }
}

fn load_config(matches: &ArgMatches) -> BridgeConfig {
    let path = matches.value_of("config").unwrap_or_default();
    match BridgeConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "✗ Invalid configuration:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn check(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(matches);
    let bridge = Bridge::from_config(&config, Arc::new(LogBus), Arc::new(MemoryHeatPump::new()));

    if config.errors().is_empty() {
        println!("{}", "✓ Configuration valid".green().bold());
    }
    if let Some(address) = config.individual_address {
        println!("  {} {}", "Individual address:".cyan(), address);
    }
    println!("  {} {:?}", "Poll interval:".cyan(), config.poll_interval);

    println!("{}", format!("Datapoints ({})", bridge.datapoints().len()).bold());
    for datapoint in bridge.datapoints() {
        println!("  {}", datapoint);
    }
    println!("{}", format!("Notifications ({})", bridge.notifications().len()).bold());
    for notification in bridge.notifications() {
        println!("  {}", notification);
    }

    if !config.errors().is_empty() {
        println!("{}", format!("Skipped devices ({})", config.errors().len()).red().bold());
        for e in config.errors() {
            println!("  {} {}", "✗".red(), e);
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn simulate(matches: &ArgMatches<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(matches);
    let ticks: u32 = matches.value_of("ticks").unwrap_or(DEFAULT_TICKS).parse()?;
    let interval = match matches.value_of("interval-ms") {
        Some(ms) => Duration::from_millis(ms.parse()?),
        None => config.poll_interval,
    };

    let heat_pump = Arc::new(MemoryHeatPump::with_params(config.datapoints.iter().map(
        |(name, dp)| {
            let initial = if dp.value_type.is_binary() {
                DatapointValue::Binary(false)
            } else {
                DatapointValue::Numeric(20.0)
            };
            (name.clone(), initial)
        },
    )));
    let mut bridge = Bridge::from_config(&config, Arc::new(LogBus), heat_pump.clone());

    let mut ticker = time::interval(interval);
    for tick in 0..ticks {
        ticker.tick().await;

        for (name, dp) in &config.datapoints {
            let next = match heat_pump.param(name) {
                Some(DatapointValue::Binary(on)) => DatapointValue::Binary(!on),
                Some(DatapointValue::Numeric(v)) if !dp.value_type.is_binary() => {
                    DatapointValue::Numeric(v + 0.5)
                }
                _ => continue,
            };
            heat_pump.set_local(name.clone(), next);
        }

        match tick {
            1 => heat_pump.raise_fault(25, "Hochdruck"),
            3 => heat_pump.clear_fault(),
            _ => {}
        }

        if let Some(datapoint) = bridge.datapoints().first() {
            let read = Telegram::read(datapoint.group_address());
            bridge.process_telegram(&read).await;
        }

        bridge.tick().await;
    }

    for datapoint in bridge.datapoints() {
        info!("{}", datapoint);
    }
    for notification in bridge.notifications() {
        info!("{}", notification);
    }
    let stats = bridge.stats();
    if matches.is_present("json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!(
        "{} {} ticks, {} telegrams, {} device errors",
        "Simulation finished:".green().bold(),
        stats.ticks,
        stats.telegrams_processed,
        stats.device_errors
    );
    Ok(())
}
