//! Modbus/TCP PLC emulator exposing the schedule slot register map

use std::process::ExitCode;

use clap::Parser;

use plcsched::*;

#[derive(Parser)]
#[command(name = "plcsched-emulator")]
#[command(about = "Emulates a PLC that runs its own schedule slots and serves them over Modbus/TCP")]
#[command(version)]
struct Cli {
    #[arg(default_value_t = DEFAULT_EMULATOR_PORT, help = "TCP port to listen on")]
    port: u16,

    #[arg(default_value_t = 1, help = "Unit id served")]
    unit_id: u8,

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

    let config = EmulatorConfig {
        decode: cli.decode,
        ..EmulatorConfig::new(cli.port, UnitId::new(cli.unit_id))
    };

    let emulator = match spawn_emulator(config, SystemClock).await {
        Ok(emulator) => emulator,
        Err(err) => {
            tracing::error!("unable to listen on port {}: {}", cli.port, err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("unable to listen for ctrl-c: {}", err);
    }

    tracing::info!("stopping");
    emulator.shutdown().await;
    ExitCode::SUCCESS
}
