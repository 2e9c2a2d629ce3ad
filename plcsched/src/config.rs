use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::clock::MINUTES_PER_DAY;
use crate::error::ConfigError;
use crate::schedule::{parse_date, parse_hhmm, DaySet, Schedule, ScheduleKind};
use crate::types::UnitId;

/// Default Modbus/TCP port of the PLC
pub const DEFAULT_PORT: u16 = 502;
/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// Address and unit id of the controlled PLC
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlcAddress {
    /// IP address of the PLC
    pub ip: IpAddr,
    /// TCP port
    pub port: u16,
    /// unit id expected in every response
    pub unit_id: UnitId,
}

impl PlcAddress {
    /// Socket address of the PLC
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl Default for PlcAddress {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            unit_id: UnitId::default(),
        }
    }
}

/// Periodic heartbeat written to a holding register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// holding register receiving the counter
    pub register: u16,
    /// time between two writes, at least one second
    pub period: Duration,
}

/// Validated configuration of the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    /// PLC to connect to
    pub plc: PlcAddress,
    /// area name to coil address, all coils distinct
    pub areas: BTreeMap<String, u16>,
    /// optional heartbeat
    pub heartbeat: Option<HeartbeatConfig>,
    /// schedules in evaluation order
    pub schedules: Vec<Schedule>,
}

impl Configuration {
    /// Read and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let config = file.into_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant of the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.areas.is_empty() {
            return Err(ConfigError::NoAreas);
        }

        let mut coils: BTreeMap<u16, &str> = BTreeMap::new();
        for (name, coil) in &self.areas {
            if let Some(other) = coils.insert(*coil, name) {
                return Err(ConfigError::DuplicateCoil(
                    other.to_string(),
                    name.clone(),
                    *coil,
                ));
            }
        }

        if self.schedules.is_empty() {
            return Err(ConfigError::NoSchedules);
        }

        let mut ids = BTreeSet::new();
        for schedule in &self.schedules {
            if schedule.id.is_empty() {
                return Err(ConfigError::MissingId);
            }
            if !ids.insert(schedule.id.as_str()) {
                return Err(ConfigError::DuplicateId(schedule.id.clone()));
            }
            if !self.areas.contains_key(&schedule.area) {
                return Err(ConfigError::UnknownArea {
                    schedule: schedule.id.clone(),
                    area: schedule.area.clone(),
                });
            }
            if schedule.duration_minutes == 0 {
                return Err(ConfigError::ZeroDuration(schedule.id.clone()));
            }
            if schedule.start_minute >= MINUTES_PER_DAY {
                return Err(ConfigError::BadTime(format!(
                    "{} (minute {})",
                    schedule.id, schedule.start_minute
                )));
            }
            if let ScheduleKind::Weekly { days } = schedule.kind {
                if days.is_empty() {
                    return Err(ConfigError::NoDays(schedule.id.clone()));
                }
            }
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    plc: PlcSection,
    areas: BTreeMap<String, u16>,
    heartbeat: Option<HeartbeatSection>,
    #[serde(default, rename = "schedule")]
    schedules: Vec<ScheduleSection>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PlcSection {
    #[serde(default = "default_ip")]
    ip: IpAddr,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_unit_id")]
    unit_id: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HeartbeatSection {
    holding: u16,
    period: Option<u64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleSection {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    area: String,
    #[serde(default)]
    days: Vec<String>,
    start: Option<String>,
    time: Option<String>,
    #[serde(default)]
    duration: u16,
    date: Option<String>,
    remote_enable_coil: Option<u16>,
}

fn default_ip() -> IpAddr {
    PlcAddress::default().ip
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_unit_id() -> u8 {
    UnitId::default().value
}

fn default_enabled() -> bool {
    true
}

impl ConfigFile {
    fn into_config(self) -> Result<Configuration, ConfigError> {
        let heartbeat = self.heartbeat.map(|hb| HeartbeatConfig {
            register: hb.holding,
            period: hb
                .period
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(DEFAULT_HEARTBEAT_PERIOD),
        });

        let schedules = self
            .schedules
            .into_iter()
            .map(ScheduleSection::into_schedule)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Configuration {
            plc: PlcAddress {
                ip: self.plc.ip,
                port: self.plc.port,
                unit_id: UnitId::new(self.plc.unit_id),
            },
            areas: self.areas,
            heartbeat,
            schedules,
        })
    }
}

impl ScheduleSection {
    fn into_schedule(self) -> Result<Schedule, ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::MissingId);
        }

        // `time` is an alias of `start`
        let start_minute = match self.start.as_deref().or(self.time.as_deref()) {
            Some(text) => parse_hhmm(text)?,
            None => 0,
        };

        let kind = match self.kind.to_ascii_lowercase().as_str() {
            "weekly" => ScheduleKind::Weekly {
                days: DaySet::parse(&self.days)?,
            },
            "once" => match self.date.as_deref() {
                Some(text) => ScheduleKind::Once {
                    date: parse_date(text)?,
                },
                None => return Err(ConfigError::MissingDate(self.id)),
            },
            _ => return Err(ConfigError::UnknownType(self.kind)),
        };

        Ok(Schedule {
            id: self.id,
            enabled: self.enabled,
            remote_enable_coil: self.remote_enable_coil,
            area: self.area,
            kind,
            start_minute,
            duration_minutes: self.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const SAMPLE: &str = r#"
[plc]
ip = "192.168.1.10"
port = 1502

[areas]
Pump1 = 5
Valve2 = 6

[heartbeat]
holding = 0
period = 0

[[schedule]]
id = "morning"
type = "weekly"
area = "Pump1"
days = ["Mon", "wed", "FRIDAY"]
start = "08:00"
duration = 60
remote_enable_coil = 500

[[schedule]]
id = "flush"
type = "Once"
enabled = false
area = "Valve2"
date = "2024-06-01"
time = "10:00"
duration = 30
"#;

    #[test]
    fn loads_complete_configuration() {
        let config = Configuration::from_toml(SAMPLE).unwrap();

        assert_eq!(config.plc.socket_addr(), "192.168.1.10:1502".parse().unwrap());
        assert_eq!(config.plc.unit_id, UnitId::new(1));
        assert_eq!(config.areas.get("Pump1"), Some(&5));
        assert_eq!(
            config.heartbeat,
            Some(HeartbeatConfig {
                register: 0,
                period: Duration::from_secs(1)
            })
        );

        assert_eq!(
            config.schedules[0],
            Schedule::weekly("morning", "Pump1", DaySet::from_iter([1, 3, 5]), 480, 60)
                .with_remote_enable(500)
        );
        assert_eq!(
            config.schedules[1],
            Schedule::once(
                "flush",
                "Valve2",
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                600,
                30
            )
            .with_enabled(false)
        );
    }

    #[test]
    fn plc_section_defaults() {
        let text = r#"
[plc]
[areas]
A = 1
[[schedule]]
id = "s"
type = "weekly"
area = "A"
days = ["sun"]
start = "00:00"
duration = 1
"#;
        let config = Configuration::from_toml(text).unwrap();
        assert_eq!(config.plc, PlcAddress::default());
        assert_eq!(config.heartbeat, None);
    }

    #[test]
    fn missing_plc_section_is_fatal() {
        let text = r#"
[areas]
A = 1
"#;
        assert!(matches!(
            Configuration::from_toml(text),
            Err(ConfigError::Syntax(_))
        ));
    }

    fn with_schedule(schedule: &str) -> Result<Configuration, ConfigError> {
        Configuration::from_toml(&format!("[plc]\n[areas]\nA = 1\n[[schedule]]\n{schedule}"))
    }

    #[test]
    fn rejects_invalid_schedules() {
        assert!(matches!(
            with_schedule("id = \"s\"\ntype = \"weekly\"\narea = \"A\"\nstart = \"08:00\"\nduration = 5"),
            Err(ConfigError::NoDays(_))
        ));
        assert!(matches!(
            with_schedule("id = \"s\"\ntype = \"once\"\narea = \"A\"\nstart = \"08:00\"\nduration = 5"),
            Err(ConfigError::MissingDate(_))
        ));
        assert!(matches!(
            with_schedule("id = \"s\"\ntype = \"weekly\"\narea = \"A\"\ndays = [\"mon\"]\nduration = 0"),
            Err(ConfigError::ZeroDuration(_))
        ));
        assert!(matches!(
            with_schedule("id = \"s\"\ntype = \"weekly\"\narea = \"B\"\ndays = [\"mon\"]\nduration = 5"),
            Err(ConfigError::UnknownArea { .. })
        ));
        assert!(matches!(
            with_schedule("type = \"weekly\"\narea = \"A\"\ndays = [\"mon\"]\nduration = 5"),
            Err(ConfigError::MissingId)
        ));
        assert!(matches!(
            with_schedule("id = \"s\"\ntype = \"monthly\"\narea = \"A\"\nduration = 5"),
            Err(ConfigError::UnknownType(_))
        ));
        assert!(matches!(
            with_schedule("id = \"s\"\ntype = \"weekly\"\narea = \"A\"\ndays = [\"xyz\"]\nduration = 5"),
            Err(ConfigError::BadDay(_))
        ));
    }

    #[test]
    fn rejects_empty_and_conflicting_maps() {
        let text = "[plc]\n[areas]\n";
        assert!(matches!(
            Configuration::from_toml(text),
            Err(ConfigError::NoAreas)
        ));

        let text = "[plc]\n[areas]\nA = 1\n";
        assert!(matches!(
            Configuration::from_toml(text),
            Err(ConfigError::NoSchedules)
        ));

        let text = "[plc]\n[areas]\nA = 1\nB = 1\n";
        assert!(matches!(
            Configuration::from_toml(text),
            Err(ConfigError::DuplicateCoil(_, _, 1))
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut config = Configuration::from_toml(SAMPLE).unwrap();
        config.schedules[1].id = "morning".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateId(_))
        ));
    }
}
