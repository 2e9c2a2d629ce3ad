use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone};

use crate::clock::{self, Clock};
use crate::config::{Configuration, HeartbeatConfig};
use crate::error::RequestError;
use crate::schedule::model::{Schedule, ScheduleKind};
use crate::schedule::window;

/// Output side of the [`ScheduleEngine`]
///
/// The controller implements this on top of a Modbus client. Any error returned
/// by an operation is handed back through [`OutputLink::reconnect`], the engine
/// never retries on its own.
#[allow(async_fn_in_trait)]
pub trait OutputLink {
    /// Read a single coil. `Ok(None)` means the value is unavailable.
    async fn read_coil(&mut self, address: u16) -> Result<Option<bool>, RequestError>;
    /// Write a single coil
    async fn write_coil(&mut self, address: u16, value: bool) -> Result<(), RequestError>;
    /// Write a single holding register
    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), RequestError>;
    /// Called after any failed operation, before the engine proceeds
    async fn reconnect(&mut self, err: RequestError);
}

/// Runtime state of one schedule, owned by the engine and never persisted
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeState<Tz: TimeZone> {
    /// true while the engine believes the coil is asserted
    pub active: bool,
    /// end of the current window
    pub active_until: Option<DateTime<Tz>>,
    /// day of the year of the last weekly firing
    pub last_fired_day: Option<u32>,
    /// one-shot window is over, the schedule is never evaluated again
    pub consumed: bool,
}

impl<Tz: TimeZone> Default for RuntimeState<Tz> {
    fn default() -> Self {
        Self {
            active: false,
            active_until: None,
            last_fired_day: None,
            consumed: false,
        }
    }
}

struct Entry<Tz: TimeZone> {
    schedule: Schedule,
    state: RuntimeState<Tz>,
}

struct Heartbeat {
    register: u16,
    period: Duration,
    counter: u16,
    last: Instant,
}

impl Heartbeat {
    fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            register: config.register,
            period: config.period,
            counter: 0,
            last: now,
        }
    }
}

/// Decides at each tick which schedule coils must be asserted or cleared
pub struct ScheduleEngine<C: Clock> {
    clock: C,
    areas: BTreeMap<String, u16>,
    entries: Vec<Entry<C::Tz>>,
    heartbeat: Option<Heartbeat>,
}

impl<C: Clock> ScheduleEngine<C> {
    /// Create an engine for the schedules of `config`
    pub fn new(config: &Configuration, clock: C) -> Self {
        let heartbeat = config
            .heartbeat
            .map(|hb| Heartbeat::new(hb, clock.steady_now()));
        Self {
            areas: config.areas.clone(),
            entries: config
                .schedules
                .iter()
                .map(|schedule| Entry {
                    schedule: schedule.clone(),
                    state: RuntimeState::default(),
                })
                .collect(),
            heartbeat,
            clock,
        }
    }

    /// Runtime state of the schedule with the given id
    pub fn state(&self, id: &str) -> Option<&RuntimeState<C::Tz>> {
        self.entries
            .iter()
            .find(|entry| entry.schedule.id == id)
            .map(|entry| &entry.state)
    }

    /// Re-derive the runtime state of every schedule from the wall clock
    ///
    /// Any previous runtime state is discarded. Schedules whose window covers the
    /// current time are asserted, one-shot schedules whose window is over are
    /// marked consumed without touching their coil.
    pub async fn resume_after_restart<L: OutputLink>(&mut self, link: &mut L) {
        let now = self.clock.now();
        let tz = now.timezone();
        let weekday = clock::weekday_index(&now);
        let minute = clock::minute_of_day(&now);
        let today = clock::day_of_year(&now);

        for entry in self.entries.iter_mut() {
            entry.state = RuntimeState::default();

            let coil = match self.areas.get(&entry.schedule.area) {
                Some(coil) => *coil,
                None => continue,
            };

            if !effective_enabled(link, &entry.schedule).await {
                continue;
            }

            let schedule = &entry.schedule;
            match schedule.kind {
                ScheduleKind::Weekly { days } => {
                    if window::weekly_contains(
                        days,
                        schedule.start_minute,
                        schedule.duration_minutes,
                        weekday,
                        minute,
                    ) && switch(link, schedule, coil, true).await
                    {
                        tracing::info!("resumed {}", schedule.id);
                        entry.state.active = true;
                        entry.state.active_until = Some(window::weekly_end(
                            &now,
                            schedule.start_minute,
                            schedule.duration_minutes,
                        ));
                        entry.state.last_fired_day = Some(today);
                    }
                }
                ScheduleKind::Once { date } => {
                    let (start, end) = match window::once_bounds(
                        &tz,
                        date,
                        schedule.start_minute,
                        schedule.duration_minutes,
                    ) {
                        Some(bounds) => bounds,
                        None => continue,
                    };
                    if now >= end {
                        entry.state.consumed = true;
                    } else if now >= start && switch(link, schedule, coil, true).await {
                        tracing::info!("resumed {}", schedule.id);
                        entry.state.active = true;
                        entry.state.active_until = Some(end);
                    }
                }
            }
        }
    }

    /// Evaluate the heartbeat and every schedule once
    pub async fn tick<L: OutputLink>(&mut self, link: &mut L) {
        self.heartbeat(link).await;

        let now = self.clock.now();
        let tz = now.timezone();
        let weekday = clock::weekday_index(&now);
        let minute = clock::minute_of_day(&now);
        let today = clock::day_of_year(&now);

        for entry in self.entries.iter_mut() {
            let coil = match self.areas.get(&entry.schedule.area) {
                Some(coil) => *coil,
                None => continue,
            };

            if entry.state.consumed {
                continue;
            }

            let schedule = &entry.schedule;
            let state = &mut entry.state;

            if !effective_enabled(link, schedule).await {
                if state.active && switch(link, schedule, coil, false).await {
                    state.active = false;
                }
                continue;
            }

            match schedule.kind {
                ScheduleKind::Weekly { days } => {
                    if days.contains(weekday) {
                        if minute == schedule.start_minute
                            && state.last_fired_day != Some(today)
                            && !state.active
                            && switch(link, schedule, coil, true).await
                        {
                            state.active = true;
                            state.active_until = Some(window::weekly_end(
                                &now,
                                schedule.start_minute,
                                schedule.duration_minutes,
                            ));
                            state.last_fired_day = Some(today);
                        }
                    } else {
                        state.last_fired_day = None;
                    }

                    let expired = state
                        .active_until
                        .as_ref()
                        .map_or(true, |until| now >= *until);
                    if state.active && expired && switch(link, schedule, coil, false).await {
                        state.active = false;
                    }
                }
                ScheduleKind::Once { date } => {
                    let (start, end) = match window::once_bounds(
                        &tz,
                        date,
                        schedule.start_minute,
                        schedule.duration_minutes,
                    ) {
                        Some(bounds) => bounds,
                        None => {
                            tracing::warn!("{} has no valid local start time", schedule.id);
                            continue;
                        }
                    };

                    if !state.active
                        && now >= start
                        && now < end
                        && switch(link, schedule, coil, true).await
                    {
                        state.active = true;
                        state.active_until = Some(end.clone());
                    }

                    if now >= end {
                        if !state.active {
                            state.consumed = true;
                        } else if switch(link, schedule, coil, false).await {
                            state.active = false;
                            state.consumed = true;
                        }
                    }
                }
            }
        }
    }

    async fn heartbeat<L: OutputLink>(&mut self, link: &mut L) {
        let heartbeat = match self.heartbeat.as_mut() {
            Some(heartbeat) => heartbeat,
            None => return,
        };

        let now = self.clock.steady_now();
        if now.saturating_duration_since(heartbeat.last) < heartbeat.period {
            return;
        }

        match link
            .write_register(heartbeat.register, heartbeat.counter)
            .await
        {
            Ok(()) => {
                tracing::debug!("heartbeat {} -> HR {}", heartbeat.counter, heartbeat.register);
                heartbeat.counter = heartbeat.counter.wrapping_add(1);
                heartbeat.last = now;
            }
            Err(err) => {
                tracing::warn!("heartbeat write failed: {}", err);
                link.reconnect(err).await;
            }
        }
    }
}

async fn effective_enabled<L: OutputLink>(link: &mut L, schedule: &Schedule) -> bool {
    if !schedule.enabled {
        return false;
    }

    let coil = match schedule.remote_enable_coil {
        Some(coil) => coil,
        None => return true,
    };

    match link.read_coil(coil).await {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::warn!("remote enable coil {} of {} unavailable", coil, schedule.id);
            false
        }
        Err(err) => {
            tracing::warn!("unable to read remote enable coil {}: {}", coil, err);
            link.reconnect(err).await;
            false
        }
    }
}

async fn switch<L: OutputLink>(link: &mut L, schedule: &Schedule, coil: u16, value: bool) -> bool {
    let label = if value { "ON" } else { "OFF" };
    match link.write_coil(coil, value).await {
        Ok(()) => {
            tracing::info!(
                "{} {} (area: {}, coil: {})",
                label,
                schedule.id,
                schedule.area,
                coil
            );
            true
        }
        Err(err) => {
            tracing::warn!("unable to switch {} {}: {}", label, schedule.id, err);
            link.reconnect(err).await;
            false
        }
    }
}
