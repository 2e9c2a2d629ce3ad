use chrono::{DateTime, NaiveDate, TimeZone};

use crate::clock::{self, Clock};
use crate::constants::layout::{self, slot, HR_HEARTBEAT, HR_NUM_SLOTS, MAX_COILS, MAX_SLOTS};
use crate::schedule::model::DaySet;
use crate::schedule::window;
use crate::server::RegisterFile;

/// Value of the status register of a slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// outside of the window
    Idle,
    /// window open, area coil asserted
    Active,
    /// one-shot window is over
    Consumed,
}

impl SlotStatus {
    /// Decode the status register, unknown values read as idle
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => SlotStatus::Active,
            2 => SlotStatus::Consumed,
            _ => SlotStatus::Idle,
        }
    }

    /// Value stored in the status register
    pub fn to_u16(self) -> u16 {
        match self {
            SlotStatus::Idle => 0,
            SlotStatus::Active => 1,
            SlotStatus::Consumed => 2,
        }
    }
}

/// Parameter block of one slot as stored in the holding registers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct SlotParams {
    enabled: bool,
    once: bool,
    area: u16,
    days: DaySet,
    start: u16,
    duration: u16,
    year: u16,
    month: u16,
    day: u16,
}

impl SlotParams {
    fn read(file: &RegisterFile, index: usize) -> Self {
        let get = |field| file.holding(layout::slot_register(index, field)).unwrap_or(0);
        Self {
            enabled: get(slot::ENABLED) != 0,
            once: get(slot::TYPE) != 0,
            area: get(slot::AREA),
            days: DaySet::from_mask(get(slot::DAYS)),
            start: get(slot::START),
            duration: get(slot::DURATION),
            year: get(slot::YEAR),
            month: get(slot::MONTH),
            day: get(slot::DAY),
        }
    }

    fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )
    }
}

/// Schedule engine of the emulator
///
/// Unlike the controller's engine this one is level based: every evaluation
/// derives the state of each slot from its parameter block and the clock, and
/// drives the area coil directly in the register file.
pub struct SlotScheduler<C: Clock> {
    clock: C,
    heartbeat: u16,
}

impl<C: Clock> SlotScheduler<C> {
    /// Create a scheduler reading time from `clock`
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            heartbeat: 0,
        }
    }

    /// Publish the number of slots and derive the state of every slot from the clock
    pub fn resume_after_restart(&mut self, file: &mut RegisterFile) {
        file.set_holding(HR_NUM_SLOTS, MAX_SLOTS as u16);
        self.evaluate(file);
    }

    /// Write the heartbeat counter and evaluate every slot once
    pub fn tick(&mut self, file: &mut RegisterFile) {
        file.set_holding(HR_HEARTBEAT, self.heartbeat);
        self.heartbeat = self.heartbeat.wrapping_add(1);
        self.evaluate(file);
    }

    fn evaluate(&self, file: &mut RegisterFile) {
        let now = self.clock.now();
        for index in 0..MAX_SLOTS {
            let params = SlotParams::read(file, index);
            let status_register = layout::slot_register(index, slot::STATUS);
            let status = SlotStatus::from_u16(file.holding(status_register).unwrap_or(0));
            let next = next_status(file, index, &params, status, &now);

            match next {
                SlotStatus::Active => {
                    file.set_coil(params.area, true);
                }
                SlotStatus::Idle | SlotStatus::Consumed => {
                    if status == SlotStatus::Active {
                        // out of range areas are silently ignored by set_coil
                        file.set_coil(params.area, false);
                    }
                }
            }

            if next != status {
                tracing::info!("slot {}: {:?} -> {:?}", index, status, next);
            }
            file.set_holding(status_register, next.to_u16());
        }
    }
}

fn remote_enabled(file: &RegisterFile, index: usize) -> bool {
    let coil = layout::remote_enable_coil(index);
    // a slot without an addressable enable coil counts as enabled
    if coil >= MAX_COILS {
        return true;
    }
    file.coil(coil as u16).unwrap_or(false)
}

fn next_status<Tz: TimeZone>(
    file: &RegisterFile,
    index: usize,
    params: &SlotParams,
    status: SlotStatus,
    now: &DateTime<Tz>,
) -> SlotStatus {
    let keep_consumed = if params.once && status == SlotStatus::Consumed {
        SlotStatus::Consumed
    } else {
        SlotStatus::Idle
    };

    if !params.enabled || !remote_enabled(file, index) || params.duration == 0 {
        return keep_consumed;
    }

    if !params.once {
        let active = window::weekly_contains(
            params.days,
            params.start,
            params.duration,
            clock::weekday_index(now),
            clock::minute_of_day(now),
        );
        return if active {
            SlotStatus::Active
        } else {
            SlotStatus::Idle
        };
    }

    let bounds = params.date().and_then(|date| {
        window::once_bounds(&now.timezone(), date, params.start, params.duration)
    });

    match bounds {
        None => SlotStatus::Idle,
        Some((start, end)) => {
            if *now >= start && *now < end {
                SlotStatus::Active
            } else if *now >= end {
                SlotStatus::Consumed
            } else {
                keep_consumed
            }
        }
    }
}
