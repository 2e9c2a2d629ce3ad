use std::net::SocketAddr;
use std::time::Duration;

use crate::client::session::{ModbusClient, DEFAULT_TIMEOUT};
use crate::clock::Clock;
use crate::config::Configuration;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::retry::{default_retry_strategy, RetryStrategy};
use crate::schedule::{OutputLink, ScheduleEngine};
use crate::shutdown::ShutdownSignal;

/// Period of the schedule evaluation loop
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Drives a [`ScheduleEngine`] against a PLC over Modbus/TCP
///
/// The controller connects, resumes the schedules from the wall clock, then
/// ticks the engine once per period until shutdown is requested. Every failed
/// request closes the connection and blocks the loop until it is re-established.
pub struct Controller<C: Clock> {
    engine: ScheduleEngine<C>,
    link: ClientLink,
    shutdown: ShutdownSignal,
    tick_period: Duration,
}

impl<C: Clock> Controller<C> {
    /// Create a controller for `config`
    pub fn new(
        config: &Configuration,
        clock: C,
        decode: DecodeLevel,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            engine: ScheduleEngine::new(config, clock),
            link: ClientLink {
                client: ModbusClient::new(config.plc.unit_id, DEFAULT_TIMEOUT, decode),
                addr: config.plc.socket_addr(),
                retry: default_retry_strategy(),
                shutdown: shutdown.clone(),
            },
            shutdown,
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }

    /// Replace the fixed one second retry strategy
    pub fn with_retry_strategy(mut self, retry: Box<dyn RetryStrategy>) -> Self {
        self.link.retry = retry;
        self
    }

    /// Replace the one second tick period
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// The engine driven by this controller
    pub fn engine(&self) -> &ScheduleEngine<C> {
        &self.engine
    }

    /// Run until shutdown is requested
    pub async fn run(&mut self) {
        if !self.link.connect().await {
            tracing::info!("shutdown before the first connection");
            return;
        }

        self.engine.resume_after_restart(&mut self.link).await;

        while !self.shutdown.is_requested() {
            self.engine.tick(&mut self.link).await;

            tokio::select! {
                _ = self.shutdown.requested() => {}
                _ = tokio::time::sleep(self.tick_period) => {}
            }
        }

        self.link.client.close();
        tracing::info!("controller stopped");
    }
}

struct ClientLink {
    client: ModbusClient,
    addr: SocketAddr,
    retry: Box<dyn RetryStrategy>,
    shutdown: ShutdownSignal,
}

impl ClientLink {
    /// Retry until connected. Returns false if shutdown was requested first
    async fn connect(&mut self) -> bool {
        loop {
            if self.shutdown.is_requested() {
                return false;
            }

            match self.client.connect(self.addr).await {
                Ok(()) => {
                    tracing::info!(
                        "connected to {} (unit: {})",
                        self.addr,
                        self.client.unit_id()
                    );
                    self.retry.reset();
                    return true;
                }
                Err(err) => {
                    let delay = self.retry.after_failed_connect();
                    tracing::warn!(
                        "connection to {} failed: {} - waiting {} ms before next attempt",
                        self.addr,
                        err,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = self.shutdown.requested() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

impl OutputLink for ClientLink {
    async fn read_coil(&mut self, address: u16) -> Result<Option<bool>, RequestError> {
        self.client.read_coil(address).await
    }

    async fn write_coil(&mut self, address: u16, value: bool) -> Result<(), RequestError> {
        self.client.write_coil(address, value).await
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), RequestError> {
        self.client.write_holding(address, value).await
    }

    async fn reconnect(&mut self, err: RequestError) {
        tracing::warn!("reconnecting to {} after: {}", self.addr, err);
        self.client.close();
        self.connect().await;
    }
}
