//! Board wiring and reporting constants.
//!
//! Everything here is fixed at build time. The threshold, the strings and the
//! delays are the reporting policy of the gauge and must not be tuned.

use crate::{ChannelId, PollConfig, Purpose, ThresholdRule};

/// Data UART (UART0, TX GPIO21 / RX GPIO20)
pub const BAUD_RATE: u32 = 9600;

/// Native resolution of the ESP32-C3 ADC1
pub const ADC_BITS: u32 = 12;

// Light on ADC1_CH2, water on ADC1_CH3
pub const LIGHT_CHANNEL: ChannelId = ChannelId::new(2, Purpose::Light);
pub const WATER_CHANNEL: ChannelId = ChannelId::new(3, Purpose::Water);

/// Readings strictly above this are reported as rain.
pub const RAIN_THRESHOLD: u16 = 10;
pub const RAIN: &str = "rain";
pub const NO_RAIN: &str = "no rain";

pub const WATER_POLL_MS: u32 = 500;
pub const LIGHT_POLL_MS: u32 = 100;

pub const RAIN_RULE: ThresholdRule = ThresholdRule::new(RAIN_THRESHOLD, RAIN, NO_RAIN);

/// Water sensor on its own: rain / no rain every 500 ms.
pub const WATER_LEVEL: PollConfig = PollConfig::threshold(WATER_CHANNEL, RAIN_RULE, WATER_POLL_MS);

/// Photoresistor on its own: raw value every 100 ms.
pub const LIGHT_LEVEL: PollConfig = PollConfig::raw(LIGHT_CHANNEL, LIGHT_POLL_MS);

/// Both sensors in one loop, light first.
pub const COMBINED: [PollConfig; 2] = [LIGHT_LEVEL, WATER_LEVEL];
