//! CLI Entry Point for PolyField
//!
//! Provides a command-line front end for:
//! - Running the complete calibration workflow against the simulator
//! - Driving connected instruments from an interactive console
//!
//! # Usage
//!
//! Simulated session:
//! ```bash
//! polyfield demo --circle discus --throws 3 --seed 7
//! ```
//!
//! Live session:
//! ```bash
//! polyfield console --edm-tcp 192.168.1.20:4001 --wind-serial /dev/ttyUSB1
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use polyfield::calibration::CircleType;
use polyfield::config::PolyfieldConfig;
use polyfield::{logging, Polyfield};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "polyfield")]
#[command(about = "EDM calibration and throw measurement engine", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = polyfield::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run centre, edge and throws against the simulator
    Demo {
        /// Device slot to calibrate
        #[arg(long, default_value = "circleA")]
        slot: String,

        /// Circle type (shot, discus, hammer, javelin_arc)
        #[arg(long, default_value = "shot")]
        circle: CircleType,

        /// Number of throws to measure
        #[arg(long, default_value_t = 3)]
        throws: u32,

        /// Fixed RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Skip the simulated instrument delays
        #[arg(long)]
        fast: bool,
    },

    /// Connect instruments and drive them from stdin
    Console(ConsoleArgs),
}

#[derive(Args)]
struct ConsoleArgs {
    /// EDM slot key
    #[arg(long, default_value = "circleA")]
    slot: String,

    /// EDM serial port
    #[arg(long, conflicts_with = "edm_tcp")]
    edm_serial: Option<String>,

    /// EDM network address (host:port)
    #[arg(long)]
    edm_tcp: Option<String>,

    /// Wind gauge serial port
    #[arg(long, conflicts_with = "wind_tcp")]
    wind_serial: Option<String>,

    /// Wind gauge network address (host:port)
    #[arg(long)]
    wind_tcp: Option<String>,

    /// Scoreboard serial port
    #[arg(long, conflicts_with = "scoreboard_tcp")]
    scoreboard_serial: Option<String>,

    /// Scoreboard network address (host:port)
    #[arg(long)]
    scoreboard_tcp: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PolyfieldConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Demo {
            slot,
            circle,
            throws,
            seed,
            fast,
        } => run_demo(config, &slot, circle, throws, seed, fast).await,
        Commands::Console(args) => run_console(config, args).await,
    }
}

async fn run_demo(
    mut config: PolyfieldConfig,
    slot: &str,
    circle: CircleType,
    throws: u32,
    seed: Option<u64>,
    fast: bool,
) -> Result<()> {
    if fast {
        let instant = PolyfieldConfig::instant();
        config.demo.centre_delay_ms = instant.demo.centre_delay_ms;
        config.demo.edge_delay_ms = instant.demo.edge_delay_ms;
        config.demo.throw_delay_ms = instant.demo.throw_delay_ms;
    }
    config.demo.enabled = true;
    config.demo.seed = seed.or(config.demo.seed);

    let engine = Polyfield::new(config);
    engine.select_circle(slot, circle);

    let record = engine.set_circle_centre(slot).await?;
    println!(
        "Centre set: station at X={:.4} m, Y={:.4} m",
        record.station_coordinates.x, record.station_coordinates.y
    );

    let record = engine.verify_circle_edge(slot).await?;
    if let Some(edge) = record.edge_verification_result {
        println!(
            "Edge: radius {:.4} m, difference {:+.1} mm (±{:.0} mm) {}",
            edge.measured_radius,
            edge.difference_mm,
            edge.tolerance_applied_mm,
            if edge.in_tolerance { "PASS" } else { "FAIL" }
        );
    }

    for n in 1..=throws {
        let throw = engine.measure_throw(slot).await?;
        let wind = engine.measure_wind(&engine.config().wind.slot)?;
        println!("Throw {n}: {throw} (wind {wind})");
    }

    engine.log_calibration_summary(slot);
    println!("{}", serde_json::to_string_pretty(&engine.calibration(slot))?);
    engine.shutdown();
    Ok(())
}

async fn connect(
    engine: &Polyfield,
    slot: &str,
    serial: Option<&str>,
    tcp: Option<&str>,
) -> Result<()> {
    let message = match (serial, tcp) {
        (Some(port), _) => engine.connect_serial(slot, port).await?,
        (None, Some(address)) => {
            let (host, port) = address
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("expected host:port, got '{address}'"))?;
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in '{address}'"))?;
            engine
                .connect_network(slot, host.trim_matches(['[', ']']), port)
                .await?
        }
        (None, None) => return Ok(()),
    };
    println!("{message}");
    Ok(())
}

async fn run_console(config: PolyfieldConfig, args: ConsoleArgs) -> Result<()> {
    let wind_slot = config.wind.slot.clone();
    let scoreboard_slot = config.scoreboard.slot.clone();
    let engine = Polyfield::new(config);

    connect(&engine, &args.slot, args.edm_serial.as_deref(), args.edm_tcp.as_deref()).await?;
    connect(&engine, &wind_slot, args.wind_serial.as_deref(), args.wind_tcp.as_deref()).await?;
    connect(
        &engine,
        &scoreboard_slot,
        args.scoreboard_serial.as_deref(),
        args.scoreboard_tcp.as_deref(),
    )
    .await?;

    println!("Commands: circle <type> | centre | edge | throw | wind | read | status | demo on|off | reset | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let outcome: Result<String> = match command {
            "circle" => match words.next().map(str::parse::<CircleType>) {
                Some(Ok(circle)) => {
                    let record = engine.select_circle(&args.slot, circle);
                    Ok(format!("{} ({:.4} m)", circle, record.target_radius))
                }
                Some(Err(e)) => Err(e.into()),
                None => Err(anyhow!("usage: circle <type>")),
            },
            "centre" | "center" => engine
                .set_circle_centre(&args.slot)
                .await
                .map(|r| {
                    format!(
                        "Station X={:.4} m, Y={:.4} m",
                        r.station_coordinates.x, r.station_coordinates.y
                    )
                })
                .map_err(Into::into),
            "edge" => engine
                .verify_circle_edge(&args.slot)
                .await
                .map(|r| match r.edge_verification_result {
                    Some(e) => format!(
                        "Radius {:.4} m, difference {:+.1} mm: {}",
                        e.measured_radius,
                        e.difference_mm,
                        if e.in_tolerance { "PASS" } else { "FAIL" }
                    ),
                    None => "No edge result".to_string(),
                })
                .map_err(Into::into),
            "throw" => engine
                .measure_throw(&args.slot)
                .await
                .map(|t| t.to_string())
                .map_err(Into::into),
            "wind" => engine
                .measure_wind(&wind_slot)
                .map(|w| w.to_string())
                .map_err(Into::into),
            "read" => engine
                .get_reliable_reading(&args.slot)
                .await
                .map(|r| {
                    format!(
                        "SD {:.0} mm, VAz {:.4}°, HAR {:.4}°",
                        r.slope_distance_mm, r.vertical_angle_deg, r.horizontal_angle_deg
                    )
                })
                .map_err(Into::into),
            "status" => {
                engine.log_calibration_summary(&args.slot);
                let slots: Vec<String> = engine
                    .connected_slots()
                    .into_iter()
                    .map(|c| format!("{} ({} {})", c.slot, c.kind, c.address))
                    .collect();
                serde_json::to_string_pretty(&engine.calibration(&args.slot))
                    .map(|json| format!("Connected: {}\n{json}", slots.join(", ")))
                    .map_err(Into::into)
            }
            "demo" => {
                let enabled = matches!(words.next(), Some("on"));
                engine.set_demo_mode(enabled);
                Ok(format!("Demo mode {}", if enabled { "on" } else { "off" }))
            }
            "reset" => {
                engine.reset_calibration(&args.slot);
                Ok("Calibration reset".to_string())
            }
            "quit" | "exit" => break,
            other => Err(anyhow!("unknown command '{other}'")),
        };

        match outcome {
            Ok(message) => println!("{message}"),
            Err(e) => {
                error!(command, error = %e, "command failed");
                println!("Error: {e}");
            }
        }
    }

    engine.shutdown();
    info!("console closed");
    Ok(())
}
