// src/adc_esp.rs

use esp_hal::analog::adc::{Adc, AdcChannel, AdcPin};
use esp_hal::peripherals::ADC1;
use esp_hal::Blocking;

use crate::{config, scale_to_10bit, AnalogInput, ChannelId, Reading, SensorError};

/// Light and water sensors on the one-shot ADC1 of an ESP32-C3.
///
/// Samples are scaled from the 12-bit native range to `0..=1023`.
pub struct EspAnalogInput<'d, L, W> {
    adc: Adc<'d, ADC1<'d>, Blocking>,
    light: AdcPin<L, ADC1<'d>>,
    water: AdcPin<W, ADC1<'d>>,
}

impl<'d, L, W> EspAnalogInput<'d, L, W>
where
    L: AdcChannel,
    W: AdcChannel,
{
    /// `light` and `water` must have been enabled on the config `adc` was
    /// built from.
    pub fn new(
        adc: Adc<'d, ADC1<'d>, Blocking>,
        light: AdcPin<L, ADC1<'d>>,
        water: AdcPin<W, ADC1<'d>>,
    ) -> Self {
        Self { adc, light, water }
    }

    fn sample(&mut self, channel: ChannelId) -> Result<u16, SensorError> {
        let raw = if channel == config::LIGHT_CHANNEL {
            nb::block!(self.adc.read_oneshot(&mut self.light))
        } else if channel == config::WATER_CHANNEL {
            nb::block!(self.adc.read_oneshot(&mut self.water))
        } else {
            return Err(SensorError::UnknownChannel);
        };
        raw.map_err(|_| SensorError::ReadFailed)
    }
}

impl<'d, L, W> AnalogInput for EspAnalogInput<'d, L, W>
where
    L: AdcChannel,
    W: AdcChannel,
{
    type Error = SensorError;

    // Pins are already in analog mode once enabled on the ADC config, so
    // setup only checks that the channel is one of ours.
    fn setup(&mut self, channel: ChannelId) -> Result<(), SensorError> {
        if channel == config::LIGHT_CHANNEL || channel == config::WATER_CHANNEL {
            Ok(())
        } else {
            Err(SensorError::UnknownChannel)
        }
    }

    fn read(&mut self, channel: ChannelId) -> Result<Reading, SensorError> {
        let raw = self.sample(channel)?;
        Ok(Reading::new(scale_to_10bit(raw, config::ADC_BITS)))
    }
}
