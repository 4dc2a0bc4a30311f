// botlink operator CLI -- build an instruction packet from the command line
// and send it to the robot over a serial port, or to a mock device.
//
// Usage:
//   botlink-cli catalog
//   botlink-cli ports
//   botlink-cli encode forward turn-left light
//   botlink-cli decode "02 01 05"
//   botlink-cli --port /dev/rfcomm0 send forward forward light
//   botlink-cli --port COM5 --baud 38400 send kill-all-humans --read 2
//   botlink-cli --port /dev/rfcomm0 probe
//   botlink-cli --mock -vv send forward right

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use botlink::serial::{SerialConfig, SerialConnector};
use botlink::{
    BotEvent, Connector, Controller, ControllerBuilder, Instruction, PortDescriptor, format_packet_hex,
    packet,
};
use botlink_test_harness::{MockConnector, MockDevice};

/// Port name used by `--mock`.
const MOCK_PORT: &str = "/dev/rfcomm0";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// botlink operator CLI -- queue robot instructions and send them as a packet.
#[derive(Parser)]
#[command(name = "botlink-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/rfcomm0, COM5).
    /// May be omitted when exactly one port is present.
    #[arg(long)]
    port: Option<String>,

    /// Baud rate (default: 9600, the HC-05 factory setting).
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Read and write timeout in milliseconds.
    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,

    /// Use a simulated Bluetooth device instead of real serial ports.
    #[arg(long)]
    mock: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    /// RUST_LOG takes precedence when set.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every instruction with its wire code.
    Catalog,

    /// List available serial ports.
    Ports,

    /// Print the packet for a list of instructions without sending it.
    Encode {
        /// Instructions in order (e.g. forward turn-left light).
        instructions: Vec<Instruction>,
    },

    /// Decode a hex packet (e.g. "02 01 05" or "020105").
    Decode {
        /// Packet bytes in hex. Spaces are ignored.
        hex: Vec<String>,
    },

    /// Queue instructions and send them to the robot as one packet.
    Send {
        /// Instructions in order (e.g. forward forward light).
        instructions: Vec<Instruction>,

        /// After sending, read up to this many reply bytes.
        #[arg(long)]
        read: Option<usize>,
    },

    /// Write a single '0' to check the device accepts data.
    Probe,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install log subscriber")?;
    Ok(())
}

/// The connector to use, plus the simulated device when `--mock` is set.
fn create_connector(cli: &Cli) -> (Box<dyn Connector>, Option<MockDevice>) {
    if cli.mock {
        let connector = MockConnector::new();
        let device = connector.add_port(MOCK_PORT, "Bluetooth");
        (Box::new(connector), Some(device))
    } else {
        let config = SerialConfig {
            baud_rate: cli.baud,
            ..SerialConfig::default()
        };
        (Box::new(SerialConnector::new(config)), None)
    }
}

fn create_controller(cli: &Cli, connector: Box<dyn Connector>) -> Arc<Controller> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    Arc::new(
        ControllerBuilder::new()
            .read_timeout(timeout)
            .write_timeout(timeout)
            .build(connector),
    )
}

/// Pick the port named by `--port`, or the only port present.
fn choose_port(cli: &Cli, controller: &Controller) -> Result<PortDescriptor> {
    let ports = controller.link().ports();
    let wanted = if cli.mock {
        cli.port.as_deref().or(Some(MOCK_PORT))
    } else {
        cli.port.as_deref()
    };

    match wanted {
        Some(name) => ports
            .into_iter()
            .find(|p| p.name() == name)
            .with_context(|| format!("port {name} not found (run `botlink-cli ports`)")),
        None => match ports.len() {
            0 => bail!("no serial ports found"),
            1 => Ok(ports.into_iter().next().context("port list changed")?),
            n => bail!("{n} ports found, choose one with --port"),
        },
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_catalog() -> Result<()> {
    println!("Code  Instruction");
    for instruction in Instruction::ALL {
        println!("{:>4}  {}", instruction.wire_code(), instruction.display_name());
    }
    Ok(())
}

fn cmd_ports(controller: &Controller) -> Result<()> {
    let ports = controller.link().ports();
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    println!("{:<24} Description", "Port");
    for port in ports {
        println!("{:<24} {}", port.name(), port.description());
    }
    Ok(())
}

fn cmd_encode(instructions: &[Instruction]) -> Result<()> {
    let packet = packet::encode(instructions)?;
    println!("{}", format_packet_hex(&packet));
    Ok(())
}

fn cmd_decode(hex_parts: &[String]) -> Result<()> {
    let joined: String = hex_parts.concat().chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&joined).with_context(|| format!("invalid hex: {joined}"))?;
    let instructions = packet::decode(&bytes)?;

    println!("{} instruction(s)", instructions.len());
    for (i, instruction) in instructions.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, instruction);
    }
    Ok(())
}

async fn cmd_send(
    controller: Arc<Controller>,
    instructions: &[Instruction],
    read: Option<usize>,
    mock: Option<&MockDevice>,
) -> Result<()> {
    if let (Some(device), Some(n)) = (mock, read) {
        device.push_response(&b"OK".repeat(n.div_ceil(2))[..n]);
    }

    let mut events = controller.subscribe_events();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BotEvent::StateChanged { state, reason } => match reason {
                    Some(reason) => println!("Status: {state} ({reason})"),
                    None => println!("Status: {state}"),
                },
                BotEvent::PacketSent { bytes } => println!("Sent {bytes} bytes"),
                BotEvent::QueueChanged { .. } | BotEvent::PortsRefreshed { .. } => {}
            }
        }
    });

    for instruction in instructions {
        controller.add_instruction(*instruction)?;
    }

    let result = controller.spawn_send().await.context("send task panicked")?;
    let reply = match (&result, read) {
        (Ok(_), Some(n)) => Some(controller.read_reply(n).await),
        _ => None,
    };
    controller.disconnect().await;

    // The controller holds the event sender; give the reporter a moment to
    // print the final transition, then stop it.
    tokio::time::sleep(Duration::from_millis(10)).await;
    reporter.abort();

    result.context("send failed")?;
    if let Some(reply) = reply.transpose().context("reading reply failed")? {
        if reply.is_empty() {
            println!("No reply within the read window.");
        } else {
            println!("Reply: {}", format_packet_hex(&reply));
        }
    }
    if let Some(device) = mock {
        for written in device.sent_data() {
            println!("[mock] device received {}", format_packet_hex(&written));
        }
    }
    Ok(())
}

async fn cmd_probe(controller: &Controller) -> Result<()> {
    controller.connect().await.context("connect failed")?;
    let result = controller.link().probe().await;
    controller.disconnect().await;
    result.context("probe failed")?;
    println!("Device accepted data.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    // These commands do not touch any port.
    match &cli.command {
        Command::Catalog => return cmd_catalog(),
        Command::Encode { instructions } => return cmd_encode(instructions),
        Command::Decode { hex } => return cmd_decode(hex),
        _ => {}
    }

    let (connector, mock_device) = create_connector(&cli);
    let controller = create_controller(&cli, connector);

    if matches!(cli.command, Command::Ports) {
        return cmd_ports(&controller);
    }

    let port = choose_port(&cli, &controller)?;
    controller.select_port(&port)?;
    println!("Using {port}");

    match &cli.command {
        Command::Send { instructions, read } => {
            cmd_send(controller, instructions, *read, mock_device.as_ref()).await
        }
        Command::Probe => cmd_probe(&controller).await,
        Command::Catalog | Command::Encode { .. } | Command::Decode { .. } | Command::Ports => {
            unreachable!("handled above")
        }
    }
}
