#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible in the modules below.
#[macro_use]
mod fmt;

pub mod config;
mod poller;

#[cfg(feature = "esp32c3")]
mod adc_esp;

pub use poller::{PollConfig, PollError, SensorPoller, ThresholdRule, LINE_CAPACITY};

#[cfg(feature = "esp32c3")]
pub use adc_esp::EspAnalogInput;

/// Largest value a [`Reading`] is expected to carry (10-bit ADC range).
pub const MAX_READING: u16 = 1023;

/// What a sensor on a channel measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Purpose {
    /// Water level / moisture probe, reported as rain or no rain
    Water,
    /// Photoresistor, reported as the raw value
    Light,
}

/// Identifies one analog input by physical pin and purpose.
///
/// Two sensors on different pins never compare equal, even if they measure
/// the same thing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId {
    pin: u8,
    purpose: Purpose,
}

impl ChannelId {
    pub const fn new(pin: u8, purpose: Purpose) -> Self {
        Self { pin, purpose }
    }

    pub const fn pin(&self) -> u8 {
        self.pin
    }

    pub const fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub const fn as_str(&self) -> &'static str {
        match self.purpose {
            Purpose::Water => "water",
            Purpose::Light => "light",
        }
    }
}

/// One sample taken from a channel. Never stored past the poll step that
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading(u16);

impl Reading {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl core::fmt::Display for Reading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The ADC conversion did not complete
    ReadFailed,
    /// The input has no pin wired for this channel
    UnknownChannel,
}

/// Source of analog samples, one per [`ChannelId`].
pub trait AnalogInput {
    type Error: core::fmt::Debug;

    /// Prepares the pin behind `channel` for reading.
    fn setup(&mut self, _channel: ChannelId) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Takes one sample, already scaled to `0..=MAX_READING`.
    fn read(&mut self, channel: ChannelId) -> Result<Reading, Self::Error>;
}

/// Maps a sample of an ADC with `bits` of resolution onto `0..=1023`.
///
/// Truncates, so full scale maps to exactly 1023 and anything below it
/// rounds down.
pub fn scale_to_10bit(raw: u16, bits: u32) -> u16 {
    let bits = bits.min(16);
    if bits == 0 {
        return 0;
    }
    let max = (1u32 << bits) - 1;
    let raw = u32::from(raw).min(max);
    (raw * u32::from(MAX_READING) / max) as u16
}
