use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use plcsched::*;

const DEFAULT_WEEKLY_DURATION: u16 = 60;
const DEFAULT_ONCE_DURATION: u16 = 30;
const DEFAULT_START: &str = "08:00";
const DEFAULT_DAYS: &str = "Mon,Tue,Wed,Thu,Fri";

/// Builds a [`Configuration`] by prompting on a terminal
pub(crate) struct Wizard<R, W> {
    input: R,
    output: W,
}

fn input_error(err: std::io::Error) -> ConfigError {
    ConfigError::Input(err.to_string())
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub(crate) fn run(mut self) -> Result<Configuration, ConfigError> {
        let plc = PlcAddress {
            ip: self.ask_parsed("PLC IP", IpAddr::V4(Ipv4Addr::LOCALHOST))?,
            port: self.ask_parsed("PLC port", DEFAULT_EMULATOR_PORT)?,
            unit_id: UnitId::new(self.ask_parsed("PLC unit_id", 1u8)?),
        };

        self.say("\n=== Areas (name -> coil offset) ===")?;
        let mut areas = BTreeMap::new();
        loop {
            let name = self.ask("Area name (empty to finish)", "")?;
            if name.is_empty() {
                break;
            }
            let coil: i64 = self.ask_parsed("Coil offset (0-based)", 0)?;
            match u16::try_from(coil) {
                Ok(coil) => {
                    areas.insert(name, coil);
                }
                Err(_) => self.say("Range 0..65535")?,
            }
        }
        if areas.is_empty() {
            return Err(ConfigError::NoAreas);
        }

        self.say("\n=== Heartbeat ===")?;
        let register: i64 =
            self.ask_parsed("Holding register offset (40001 -> 0, -1 to disable)", 0)?;
        let period: u64 = self.ask_parsed("Heartbeat period, seconds", 5)?;
        let heartbeat = u16::try_from(register).ok().map(|register| HeartbeatConfig {
            register,
            period: Duration::from_secs(period.max(1)),
        });

        self.say("\n=== Schedules ===")?;
        let mut schedules = Vec::new();
        for index in 1.. {
            if !self.ask_yes_no("Add a schedule?", index == 1)? {
                break;
            }
            match self.ask_schedule(index, &areas)? {
                Ok(schedule) => schedules.push(schedule),
                Err(err) => self.say(&format!("Schedule discarded: {err}"))?,
            }
        }

        let config = Configuration {
            plc,
            areas,
            heartbeat,
            schedules,
        };
        config.validate()?;

        self.summary(&config)?;
        if !self.ask_yes_no("Start with these settings?", true)? {
            return Err(ConfigError::Input("cancelled by user".to_string()));
        }

        Ok(config)
    }

    /// The outer error aborts the wizard, the inner one only discards the schedule
    fn ask_schedule(
        &mut self,
        index: usize,
        areas: &BTreeMap<String, u16>,
    ) -> Result<Result<Schedule, ConfigError>, ConfigError> {
        let id = self.ask("Schedule ID", &format!("ev{index}"))?;
        let enabled = self.ask_yes_no("enabled?", true)?;

        let area = self.ask("area (one of declared)", "")?;
        if !areas.contains_key(&area) {
            let available: Vec<&str> = areas.keys().map(String::as_str).collect();
            self.say(&format!("Unknown area. Available: {}", available.join(" ")))?;
            return Ok(Err(ConfigError::UnknownArea { schedule: id, area }));
        }

        let kind = self.ask("type weekly/once", "weekly")?.to_ascii_lowercase();
        let schedule = match kind.as_str() {
            "weekly" => {
                let days = self.ask("days (Mon,Tue,Wed,Thu,Fri,Sat,Sun)", DEFAULT_DAYS)?;
                let days: Vec<&str> = days
                    .split(',')
                    .map(str::trim)
                    .filter(|day| !day.is_empty())
                    .collect();
                let days = match DaySet::parse(&days) {
                    Ok(days) => days,
                    Err(err) => return Ok(Err(err)),
                };
                let start = match parse_hhmm(&self.ask("start (HH:MM)", DEFAULT_START)?) {
                    Ok(start) => start,
                    Err(err) => return Ok(Err(err)),
                };
                let duration = self.ask_parsed("duration (minutes)", DEFAULT_WEEKLY_DURATION)?;
                Schedule::weekly(id, area, days, start, duration)
            }
            "once" => {
                let date = match parse_date(&self.ask("date (YYYY-MM-DD)", "")?) {
                    Ok(date) => date,
                    Err(err) => return Ok(Err(err)),
                };
                let start = match parse_hhmm(&self.ask("time (HH:MM)", "")?) {
                    Ok(start) => start,
                    Err(err) => return Ok(Err(err)),
                };
                let duration = self.ask_parsed("duration (minutes)", DEFAULT_ONCE_DURATION)?;
                Schedule::once(id, area, date, start, duration)
            }
            _ => {
                self.say("Unknown type.")?;
                return Ok(Err(ConfigError::UnknownType(kind)));
            }
        };

        let remote: i64 = self.ask_parsed("remote_enable_coil offset (-1 to skip)", -1)?;
        let schedule = match u16::try_from(remote) {
            Ok(coil) => schedule.with_remote_enable(coil),
            Err(_) => schedule,
        };

        Ok(Ok(schedule.with_enabled(enabled)))
    }

    fn summary(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        let mut text = String::from("\n=== SUMMARY ===\n");
        text.push_str(&format!(
            "PLC {} uid={}\nAreas:\n",
            config.plc.socket_addr(),
            config.plc.unit_id
        ));
        for (name, coil) in &config.areas {
            text.push_str(&format!("  {name} -> {coil}\n"));
        }
        match &config.heartbeat {
            Some(hb) => text.push_str(&format!(
                "Heartbeat HR@{} / {}s\n",
                hb.register,
                hb.period.as_secs()
            )),
            None => text.push_str("Heartbeat: OFF\n"),
        }
        text.push_str(&format!("Schedules: {}\n", config.schedules.len()));
        for schedule in &config.schedules {
            let kind = match schedule.kind {
                ScheduleKind::Weekly { days } => format!("weekly {days}"),
                ScheduleKind::Once { date } => format!("once {date}"),
            };
            text.push_str(&format!(
                "  [{}] {} area={} type={}",
                schedule.id,
                if schedule.enabled { "EN" } else { "DIS" },
                schedule.area,
                kind
            ));
            if let Some(coil) = schedule.remote_enable_coil {
                text.push_str(&format!(" rem={coil}"));
            }
            text.push('\n');
        }
        self.say(&text)
    }

    fn say(&mut self, text: &str) -> Result<(), ConfigError> {
        writeln!(self.output, "{text}").map_err(input_error)
    }

    fn ask(&mut self, prompt: &str, default: &str) -> Result<String, ConfigError> {
        if default.is_empty() {
            write!(self.output, "{prompt}: ")
        } else {
            write!(self.output, "{prompt} [{default}]: ")
        }
        .map_err(input_error)?;
        self.output.flush().map_err(input_error)?;

        let mut line = String::new();
        if self.input.read_line(&mut line).map_err(input_error)? == 0 {
            return Err(ConfigError::Input("unexpected end of input".to_string()));
        }

        let line = line.trim();
        if line.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(line.to_string())
        }
    }

    fn ask_parsed<T>(&mut self, prompt: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Display,
    {
        let default = default.to_string();
        loop {
            match self.ask(prompt, &default)?.parse() {
                Ok(value) => return Ok(value),
                Err(_) => self.say("Invalid value.")?,
            }
        }
    }

    fn ask_yes_no(&mut self, prompt: &str, default: bool) -> Result<bool, ConfigError> {
        loop {
            let answer = self.ask(prompt, if default { "y" } else { "n" })?;
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Enter y/n.")?,
            }
        }
    }
}
