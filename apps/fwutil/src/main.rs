use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use clap::Parser;
use ebm_core::fwpack;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "ebm-fwutil",
    author,
    version,
    about = "Extract the MT-G5321 firmware from a Metanoia firmware pack",
    long_about = "Selects the MT-G5321 image inside a vendor firmware pack, strips the \
                  XOR obfuscation and writes the result as a Motorola S-record file \
                  ready for net-booting."
)]
struct Args {
    /// Path to the Metanoia firmware pack
    #[arg(long = "fw-pack")]
    fw_pack: PathBuf,

    /// Path where the S-record file with the de-obfuscated firmware
    /// should be created
    #[arg(long)]
    out: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut pack = BufReader::new(File::open(&args.fw_pack)?);
    let mut out = BufWriter::new(File::create(&args.out)?);
    fwpack::extract_firmware(&mut pack, &mut out)?;
    Ok(())
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
        error!("extraction failed: {e:#}");
        eprintln!("FAILED: {e:#}");
        std::process::exit(1);
    }
}
