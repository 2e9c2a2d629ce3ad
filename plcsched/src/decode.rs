use std::str::FromStr;

use crate::error::InvalidDecodeLevel;

/// Verbosity of frame logging, per protocol layer
///
/// All output goes to `tracing` at the INFO level. Each layer is independent, so
/// hex dumps of the socket can be enabled without decoding the PDUs and the
/// other way around.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct DecodeLevel {
    /// function codes and request/reply contents
    pub pdu: PduDecodeLevel,
    /// MBAP header and raw payload
    pub adu: AduDecodeLevel,
    /// bytes read from and written to the socket
    pub physical: PhysDecodeLevel,
}

/// PDU logging, from least to most verbose
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PduDecodeLevel {
    /// no logging
    #[default]
    Nothing,
    /// function code
    Function,
    /// function code plus address and count
    Headers,
    /// function code, address and count plus the values
    Values,
}

/// MBAP logging, from least to most verbose
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum AduDecodeLevel {
    /// no logging
    #[default]
    Nothing,
    /// transaction id, unit id and length
    Header,
    /// header plus the payload in hex
    Payload,
}

/// Socket logging, from least to most verbose
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PhysDecodeLevel {
    /// no logging
    #[default]
    Nothing,
    /// number of bytes per read and write
    Length,
    /// number of bytes plus a hex dump
    Data,
}

impl DecodeLevel {
    /// Log nothing
    pub fn nothing() -> Self {
        Self::default()
    }

    /// Combine explicit levels
    pub fn new(pdu: PduDecodeLevel, adu: AduDecodeLevel, physical: PhysDecodeLevel) -> Self {
        Self { pdu, adu, physical }
    }

    /// Function code, address and count of every request and reply
    pub fn headers() -> Self {
        PduDecodeLevel::Headers.into()
    }

    /// Like [`headers`](Self::headers), plus the coil and register values
    pub fn values() -> Self {
        PduDecodeLevel::Values.into()
    }

    /// Every layer at its most verbose
    pub fn full() -> Self {
        Self::new(
            PduDecodeLevel::Values,
            AduDecodeLevel::Payload,
            PhysDecodeLevel::Data,
        )
    }
}

impl From<PduDecodeLevel> for DecodeLevel {
    fn from(pdu: PduDecodeLevel) -> Self {
        Self {
            pdu,
            ..Self::default()
        }
    }
}

/// Parses the preset names `nothing`, `headers`, `values` and `full`, ignoring case
impl FromStr for DecodeLevel {
    type Err = InvalidDecodeLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nothing" => Ok(Self::nothing()),
            "headers" => Ok(Self::headers()),
            "values" => Ok(Self::values()),
            "full" => Ok(Self::full()),
            _ => Err(InvalidDecodeLevel::new(s)),
        }
    }
}

impl PduDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        *self > Self::Nothing
    }

    pub(crate) fn data_headers(&self) -> bool {
        *self >= Self::Headers
    }

    pub(crate) fn data_values(&self) -> bool {
        *self == Self::Values
    }
}

impl AduDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        *self > Self::Nothing
    }

    pub(crate) fn payload_enabled(&self) -> bool {
        *self == Self::Payload
    }
}

impl PhysDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        *self > Self::Nothing
    }

    pub(crate) fn data_enabled(&self) -> bool {
        *self == Self::Data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_only_raise_the_pdu_level() {
        let headers = DecodeLevel::headers();
        assert!(headers.pdu.data_headers());
        assert!(!headers.pdu.data_values());
        assert!(!headers.adu.enabled());
        assert!(!headers.physical.enabled());

        assert!(DecodeLevel::values().pdu.data_values());
        assert!(!DecodeLevel::nothing().pdu.enabled());
    }

    #[test]
    fn full_enables_every_layer() {
        let full = DecodeLevel::full();
        assert!(full.pdu.data_values());
        assert!(full.adu.payload_enabled());
        assert!(full.physical.data_enabled());
    }

    #[test]
    fn parses_preset_names() {
        assert_eq!("nothing".parse::<DecodeLevel>(), Ok(DecodeLevel::nothing()));
        assert_eq!("headers".parse::<DecodeLevel>(), Ok(DecodeLevel::headers()));
        assert_eq!("Values".parse::<DecodeLevel>(), Ok(DecodeLevel::values()));
        assert_eq!("FULL".parse::<DecodeLevel>(), Ok(DecodeLevel::full()));
        assert_eq!(
            "verbose".parse::<DecodeLevel>(),
            Err(InvalidDecodeLevel::new("verbose"))
        );
    }
}
