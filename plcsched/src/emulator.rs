use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::clock::Clock;
use crate::decode::DecodeLevel;
use crate::schedule::SlotScheduler;
use crate::server::handler::RequestHandler;
use crate::server::task::ServerTask;
use crate::server::{RegisterFile, SharedRegisterFile};
use crate::shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
use crate::types::UnitId;

/// Default listening port of the emulator
pub const DEFAULT_EMULATOR_PORT: u16 = 1502;

/// Settings of an emulated PLC
#[derive(Copy, Clone, Debug)]
pub struct EmulatorConfig {
    /// address to listen on
    pub addr: SocketAddr,
    /// unit id served, requests for other units are answered with an exception
    pub unit_id: UnitId,
    /// protocol decode logging
    pub decode: DecodeLevel,
    /// period of the internal scheduler
    pub tick_period: Duration,
}

impl EmulatorConfig {
    /// Listen on every interface at `port`
    pub fn new(port: u16, unit_id: UnitId) -> Self {
        Self::with_addr(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port), unit_id)
    }

    /// Listen on a specific address
    pub fn with_addr(addr: SocketAddr, unit_id: UnitId) -> Self {
        Self {
            addr,
            unit_id,
            decode: DecodeLevel::nothing(),
            tick_period: Duration::from_secs(1),
        }
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EMULATOR_PORT, UnitId::default())
    }
}

/// A running emulator. Its tasks stop when the handle is dropped
#[derive(Debug)]
pub struct EmulatorHandle {
    local_addr: SocketAddr,
    registers: SharedRegisterFile,
    shutdown: ShutdownHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl EmulatorHandle {
    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register file exposed by the server
    pub fn registers(&self) -> &SharedRegisterFile {
        &self.registers
    }

    /// Stop the scheduler and the server and wait for both to finish
    pub async fn shutdown(self) {
        self.shutdown.shutdown();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!("emulator task failed: {}", err);
            }
        }
    }
}

/// Bind the listener, resume the slot scheduler and spawn the scheduler and server tasks
///
/// This must be called from within the Tokio runtime.
pub async fn spawn_emulator<C>(
    config: EmulatorConfig,
    clock: C,
) -> Result<EmulatorHandle, std::io::Error>
where
    C: Clock + Send + 'static,
{
    let listener = TcpListener::bind(config.addr).await?;
    let local_addr = listener.local_addr()?;

    let mut scheduler = SlotScheduler::new(clock);
    let mut file = RegisterFile::new();
    scheduler.resume_after_restart(&mut file);
    let registers = file.wrap();

    let (shutdown, signal) = shutdown_channel();

    let scheduler_task = tokio::spawn(
        run_scheduler(scheduler, registers.clone(), config.tick_period, signal.clone())
            .instrument(tracing::info_span!("Emulator-Scheduler")),
    );

    let mut server = ServerTask::new(
        listener,
        RequestHandler::new(config.unit_id, registers.clone()),
        config.decode,
    );
    let server_task = tokio::spawn(
        async move { server.run(signal).await }
            .instrument(tracing::info_span!("Emulator-Server", "listen" = ?local_addr)),
    );

    tracing::info!("emulator listening on {} (unit: {})", local_addr, config.unit_id);

    Ok(EmulatorHandle {
        local_addr,
        registers,
        shutdown,
        tasks: vec![scheduler_task, server_task],
    })
}

async fn run_scheduler<C: Clock>(
    mut scheduler: SlotScheduler<C>,
    registers: SharedRegisterFile,
    period: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.requested() => {
                tracing::info!("scheduler shutdown");
                return;
            }
            _ = interval.tick() => {
                if !tick(&mut scheduler, &registers) {
                    return;
                }
            }
        }
    }
}

fn tick<C: Clock>(scheduler: &mut SlotScheduler<C>, registers: &SharedRegisterFile) -> bool {
    match registers.lock() {
        Ok(mut file) => {
            scheduler.tick(&mut file);
            true
        }
        Err(_) => {
            tracing::error!("register file lock is poisoned");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::constants::layout::{HR_HEARTBEAT, HR_NUM_SLOTS};

    #[tokio::test]
    async fn publishes_slot_count_and_heartbeat() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap());
        let mut config = EmulatorConfig::with_addr("127.0.0.1:0".parse().unwrap(), UnitId::new(1));
        config.tick_period = Duration::from_millis(10);

        let emulator = spawn_emulator(config, clock).await.unwrap();
        assert_ne!(emulator.local_addr().port(), 0);
        assert_eq!(
            emulator.registers().lock().unwrap().holding(HR_NUM_SLOTS),
            Some(16)
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let heartbeat = emulator.registers().lock().unwrap().holding(HR_HEARTBEAT);
        assert!(heartbeat.unwrap() > 0);

        emulator.shutdown().await;
    }
}
