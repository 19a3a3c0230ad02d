//! `stewartd` — the Stewart platform control daemon.
//!
//! Listens for protocol clients on a TCP port, solves their pose requests
//! and drives the servos. The PWM chip driver itself is supplied by the
//! integration; this build runs with `--simulate` (solve and log, no
//! hardware output).

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rs_stewart_kinematics::kinematics_impl::StewartPlatform;
use rs_stewart_kinematics::parameters::PlatformConfig;
use rs_stewart_kinematics::server::PlatformServer;
use rs_stewart_kinematics::servo_driver::PULSE_FREQUENCY_HZ;
use rs_stewart_kinematics::trim_store::FileTrimStore;

#[derive(Parser, Debug)]
#[command(name = "stewartd", version, about = "Stewart platform control server")]
struct Args {
    /// TCP port to listen on for protocol clients.
    #[arg(short, long)]
    port: u16,

    /// Address to bind the listener to.
    #[arg(short = 'i', long, default_value = "127.0.0.1")]
    bind: String,

    /// Do not drive PWM hardware; solve and log only.
    #[arg(short, long)]
    simulate: bool,

    /// Verbose solver diagnostics.
    #[arg(short, long)]
    debug: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,

    /// File the servo trim table is loaded from and persisted to.
    #[arg(long, default_value = "stewart.cfg")]
    trim_file: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = PlatformConfig::reference();
    config.debug = args.debug;

    let trim_store = FileTrimStore::new(&args.trim_file);
    trim_store
        .load(&mut config.servo_trim)
        .with_context(|| format!("reading trim table {}", args.trim_file.display()))?;

    let platform = StewartPlatform::new(config);
    if args.debug {
        debug!("platform:\n{platform}");
    }

    let driver = if args.simulate {
        info!("simulating: PWM output disabled");
        None
    } else {
        // The register-level PWM driver lives with the hardware
        // integration, not in this crate.
        bail!("no PWM driver is linked into this build; run with --simulate");
    };

    let mut server = PlatformServer::bind(
        (args.bind.as_str(), args.port),
        platform,
        driver,
        Box::new(trim_store),
        PULSE_FREQUENCY_HZ,
    )
    .with_context(|| format!("binding {}:{}", args.bind, args.port))?;

    info!(addr = %format!("{}:{}", args.bind, args.port), "listening");
    server.run().context("control loop failed")?;
    Ok(())
}
