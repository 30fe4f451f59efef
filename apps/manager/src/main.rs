use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ebm_core::bootloader::{BootConfig, Bootloader};
use ebm_core::events::TracingObserver;
use ebm_core::mib::{MibValue, catalog};
use ebm_core::protocol::constants::ASSIGNED_ADDR_PREFIX;
use ebm_core::session::Session;
use ebm_core::transport::{MacAddr, PacketTransport};
use rand::Rng;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "ebm-manager",
    author,
    version,
    about = "Net-boot and manage a Metanoia MT-G5321 G.fast modem",
    long_about = "Associates with the modem's bootloader over raw Ethernet, streams the \
                  firmware, then dials the operational session and keeps the modem up."
)]
struct Args {
    /// Network interface the modem is connected to
    #[arg(long = "if")]
    interface: String,

    /// Path to the firmware file in Motorola S-record format
    #[arg(long)]
    fw: PathBuf,

    /// Optional TOML file with download tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => BootConfig::load_from_file(path)?,
        None => BootConfig::default(),
    };

    let transport = PacketTransport::open(&args.interface)?;

    let suffix: [u8; 3] = rand::rng().random();
    let addr = MacAddr([
        ASSIGNED_ADDR_PREFIX[0],
        ASSIGNED_ADDR_PREFIX[1],
        ASSIGNED_ADDR_PREFIX[2],
        suffix[0],
        suffix[1],
        suffix[2],
    ]);
    info!(addr = %addr, "assigning device address");

    let firmware = BufReader::new(std::fs::File::open(&args.fw)?);
    Bootloader::new(&transport, config).download_and_boot(addr, firmware)?;

    let session = Session::new(Arc::new(transport), addr, Arc::new(TracingObserver));
    session.dial()?;
    info!("session connected");

    // Enable log and console output, then bring the modem up.
    session.write_mib(&catalog::LOG_CONTROL, &MibValue::Uint32(0xfe))?;
    session.write_mib(&catalog::CONSOLE_CONTROL, &MibValue::Uint32(2))?;
    session.write_mib(&catalog::HOST_COMMAND, &MibValue::Uint8(1))?;
    session.write_mib(&catalog::REPEAT_COMMAND, &MibValue::Uint8(1))?;
    session.write_mib(&catalog::CMD_STATUS, &MibValue::Bool(true))?;

    // The tick counter stops when the modem wedges; polling it doubles as
    // the keep-alive the device needs to hold the session open.
    loop {
        std::thread::sleep(Duration::from_secs(5));
        let ticks = session.read_mib(&catalog::TICKS)?;
        info!(%ticks, "modem alive");
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args) {
        error!("manager failed: {e:#}");
        eprintln!("FAILED: {e:#}");
        std::process::exit(1);
    }
}
