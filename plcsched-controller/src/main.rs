//! Drives PLC output coils from the schedules of a configuration file

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use plcsched::*;

mod wizard;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("unable to install the signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(name = "plcsched-controller")]
#[command(about = "Asserts PLC output coils over Modbus/TCP according to weekly and one-shot schedules")]
#[command(version)]
struct Cli {
    #[arg(default_value = "config/config.toml", help = "Path of the TOML configuration")]
    config: PathBuf,

    #[arg(short = 'i', long, help = "Build the configuration interactively instead of loading it")]
    interactive: bool,

    #[arg(
        short = 'd',
        long,
        default_value = "nothing",
        help = "Protocol decode logging: nothing, headers, values or full"
    )]
    decode: DecodeLevel,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        tracing::error!("fatal: {}", err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = if cli.interactive {
        let stdin = std::io::stdin();
        wizard::Wizard::new(stdin.lock(), std::io::stdout()).run()?
    } else {
        Configuration::load(&cli.config)?
    };

    log_summary(&config);

    let stop = StopSignals::install()?;
    let (handle, signal) = shutdown_channel();
    tokio::spawn(async move {
        stop.wait().await;
        tracing::info!("stop requested");
        handle.shutdown();
    });

    let mut controller = Controller::new(&config, SystemClock, cli.decode, signal);
    controller.run().await;

    Ok(())
}

fn log_summary(config: &Configuration) {
    tracing::info!(
        "PLC {} (unit: {}), {} area(s), {} schedule(s)",
        config.plc.socket_addr(),
        config.plc.unit_id,
        config.areas.len(),
        config.schedules.len()
    );
    match &config.heartbeat {
        Some(hb) => tracing::info!(
            "heartbeat on holding register {} every {} s",
            hb.register,
            hb.period.as_secs()
        ),
        None => tracing::info!("heartbeat disabled"),
    }
}

#[cfg(unix)]
struct StopSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl StopSignals {
    fn install() -> Result<Self, std::io::Error> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn wait(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct StopSignals;

#[cfg(not(unix))]
impl StopSignals {
    fn install() -> Result<Self, std::io::Error> {
        Ok(Self)
    }

    async fn wait(self) {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("unable to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

