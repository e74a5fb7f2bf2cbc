//! The polling loop: read a channel, report it on the sink, wait, repeat.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_io::{Error as _, ErrorKind, Write};
use heapless::String;

use crate::fmt::Dbg;
use crate::{AnalogInput, ChannelId, Reading};

/// Longest line the poller emits, newline included.
pub const LINE_CAPACITY: usize = 32;

type Line = String<LINE_CAPACITY>;

/// Binarizes a reading into one of two fixed strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThresholdRule {
    threshold: u16,
    above: &'static str,
    at_or_below: &'static str,
}

impl ThresholdRule {
    /// # Panics
    ///
    /// If either label does not fit on one line. In a `const` this is a
    /// build error.
    pub const fn new(threshold: u16, above: &'static str, at_or_below: &'static str) -> Self {
        assert!(above.len() < LINE_CAPACITY, "label too long for one line");
        assert!(at_or_below.len() < LINE_CAPACITY, "label too long for one line");
        Self {
            threshold,
            above,
            at_or_below,
        }
    }

    pub const fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Strictly greater than the threshold is "above"; equal is not.
    pub const fn classify(&self, reading: Reading) -> &'static str {
        if reading.value() > self.threshold {
            self.above
        } else {
            self.at_or_below
        }
    }
}

/// How one sensor is polled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollConfig {
    pub channel: ChannelId,
    /// `None` reports the raw value
    pub rule: Option<ThresholdRule>,
    /// Wait after this sensor's line is written
    pub delay_ms: u32,
}

impl PollConfig {
    pub const fn raw(channel: ChannelId, delay_ms: u32) -> Self {
        Self {
            channel,
            rule: None,
            delay_ms,
        }
    }

    pub const fn threshold(channel: ChannelId, rule: ThresholdRule, delay_ms: u32) -> Self {
        Self {
            channel,
            rule: Some(rule),
            delay_ms,
        }
    }

    fn report(&self, reading: Reading) -> Report {
        match self.rule {
            Some(rule) => Report::Label(rule.classify(reading)),
            None => Report::Value(reading),
        }
    }
}

enum Report {
    Label(&'static str),
    Value(Reading),
}

impl Report {
    fn render(&self) -> Line {
        let mut line = Line::new();
        // Labels are length-checked in ThresholdRule::new and a u16 is at
        // most five digits, so neither push can overflow.
        let text = match self {
            Report::Label(label) => line.push_str(label),
            Report::Value(reading) => write!(line, "{}", reading.value()).map_err(|_| ()),
        };
        let newline = line.push('\n');
        debug_assert!(text.is_ok() && newline.is_ok(), "report line overflowed");
        line
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollError<E> {
    /// Reading a channel failed
    Sensor { channel: ChannelId, error: E },
    /// Writing a line to the output failed
    Sink(ErrorKind),
}

/// Reads every configured sensor in order, writes one line each to the sink
/// and waits that sensor's delay before moving on.
///
/// Delays add up: with two sensors one full cycle takes the sum of both.
pub struct SensorPoller<A, W, D, const N: usize> {
    input: A,
    sink: W,
    delay: D,
    configs: [PollConfig; N],
    cycles: u32,
}

impl<A, W, D, const N: usize> SensorPoller<A, W, D, N>
where
    A: AnalogInput,
    W: Write,
    D: DelayNs,
{
    /// Sets up every channel and takes over the sink, which must already be
    /// open at the right baud rate.
    ///
    /// A channel that fails setup is logged and polled anyway.
    pub fn initialize(mut input: A, sink: W, delay: D, configs: [PollConfig; N]) -> Self {
        info!("starting sensor poller with {} sensor(s)", N);
        for config in &configs {
            let channel = config.channel;
            match input.setup(channel) {
                Ok(()) => debug!("{} sensor on pin {} ready", channel.as_str(), channel.pin()),
                Err(e) => warn!(
                    "setup of {} sensor on pin {} failed: {}",
                    channel.as_str(),
                    channel.pin(),
                    Dbg(&e)
                ),
            }
        }

        Self {
            input,
            sink,
            delay,
            configs,
            cycles: 0,
        }
    }

    pub fn configs(&self) -> &[PollConfig; N] {
        &self.configs
    }

    /// Number of completed cycles, wrapping.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Runs one pass over all sensors.
    ///
    /// Stops at the first failing sensor; lines already written for earlier
    /// sensors in the pass stay written.
    pub fn poll_cycle(&mut self) -> Result<(), PollError<A::Error>> {
        for config in self.configs {
            let reading = self.poll_sensor(config)?;
            debug!("{} = {}", config.channel.as_str(), reading.value());
        }
        self.cycles = self.cycles.wrapping_add(1);
        Ok(())
    }

    /// Polls until the device is reset.
    ///
    /// # Panics
    ///
    /// On the first failed read or write. There is nothing to recover to on
    /// the device, so the panic handler takes over.
    pub fn run_forever(&mut self) -> ! {
        loop {
            if let Err(e) = self.poll_cycle() {
                error!("poll cycle {} failed: {}", self.cycles, Dbg(&e));
                panic!("sensor poll failed");
            }
        }
    }

    /// Gives back the input, sink and delay.
    pub fn release(self) -> (A, W, D) {
        (self.input, self.sink, self.delay)
    }

    fn poll_sensor(&mut self, config: PollConfig) -> Result<Reading, PollError<A::Error>> {
        let reading = self
            .input
            .read(config.channel)
            .map_err(|error| PollError::Sensor {
                channel: config.channel,
                error,
            })?;

        let line = config.report(reading).render();
        self.sink
            .write_all(line.as_bytes())
            .map_err(|e| PollError::Sink(e.kind()))?;

        self.delay.delay_ms(config.delay_ms);
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, COMBINED, LIGHT_CHANNEL, LIGHT_LEVEL, WATER_CHANNEL, WATER_LEVEL};
    use crate::SensorError;
    use std::collections::VecDeque;

    /// Plays back scripted samples per channel. The last sample repeats once
    /// the script runs out.
    #[derive(Default)]
    struct ScriptedInput {
        samples: Vec<(ChannelId, VecDeque<Result<u16, SensorError>>)>,
        setups: Vec<ChannelId>,
        reject_setup: Option<ChannelId>,
    }

    impl ScriptedInput {
        fn with(mut self, channel: ChannelId, values: &[u16]) -> Self {
            self.samples
                .push((channel, values.iter().map(|&v| Ok(v)).collect()));
            self
        }

        fn failing(mut self, channel: ChannelId) -> Self {
            self.samples
                .push((channel, VecDeque::from([Err(SensorError::ReadFailed)])));
            self
        }
    }

    impl AnalogInput for ScriptedInput {
        type Error = SensorError;

        fn setup(&mut self, channel: ChannelId) -> Result<(), SensorError> {
            self.setups.push(channel);
            if self.reject_setup == Some(channel) {
                return Err(SensorError::UnknownChannel);
            }
            Ok(())
        }

        fn read(&mut self, channel: ChannelId) -> Result<Reading, SensorError> {
            let queue = self
                .samples
                .iter_mut()
                .find(|(id, _)| *id == channel)
                .map(|(_, queue)| queue)
                .ok_or(SensorError::UnknownChannel)?;
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().copied()
            };
            next.ok_or(SensorError::ReadFailed)?.map(Reading::new)
        }
    }

    #[derive(Default)]
    struct CaptureSink {
        bytes: Vec<u8>,
        broken: bool,
    }

    impl CaptureSink {
        fn lines(&self) -> Vec<&str> {
            std::str::from_utf8(&self.bytes).unwrap().lines().collect()
        }
    }

    impl embedded_io::ErrorType for CaptureSink {
        type Error = ErrorKind;
    }

    impl Write for CaptureSink {
        fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
            if self.broken {
                return Err(ErrorKind::Other);
            }
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        waits_ms: Vec<u32>,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.waits_ms.push(ns / 1_000_000);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.waits_ms.push(ms);
        }
    }

    fn poller<const N: usize>(
        input: ScriptedInput,
        configs: [PollConfig; N],
    ) -> SensorPoller<ScriptedInput, CaptureSink, RecordingDelay, N> {
        SensorPoller::initialize(
            input,
            CaptureSink::default(),
            RecordingDelay::default(),
            configs,
        )
    }

    #[test]
    fn test_classify_is_strictly_greater_than() {
        let rule = config::RAIN_RULE;
        assert_eq!(rule.threshold(), 10);
        assert_eq!(rule.classify(Reading::new(0)), "no rain");
        assert_eq!(rule.classify(Reading::new(10)), "no rain");
        assert_eq!(rule.classify(Reading::new(11)), "rain");
        assert_eq!(rule.classify(Reading::new(1023)), "rain");
    }

    #[test]
    fn test_raw_mode_writes_decimal_value() {
        let input = ScriptedInput::default().with(LIGHT_CHANNEL, &[512]);
        let mut poller = poller(input, [LIGHT_LEVEL]);

        poller.poll_cycle().unwrap();

        let (_, sink, delay) = poller.release();
        assert_eq!(sink.bytes, b"512\n");
        assert_eq!(delay.waits_ms, [100]);
    }

    #[test]
    fn test_water_sensor_alone() {
        let input = ScriptedInput::default().with(WATER_CHANNEL, &[0, 10, 11]);
        let mut poller = poller(input, [WATER_LEVEL]);

        for _ in 0..3 {
            poller.poll_cycle().unwrap();
        }

        let (_, sink, delay) = poller.release();
        assert_eq!(sink.lines(), ["no rain", "no rain", "rain"]);
        assert_eq!(delay.waits_ms, [500, 500, 500]);
    }

    #[test]
    fn test_combined_sensors_run_serially_in_order() {
        let input = ScriptedInput::default()
            .with(LIGHT_CHANNEL, &[300, 301, 302])
            .with(WATER_CHANNEL, &[5, 15, 10]);
        let mut poller = poller(input, COMBINED);

        for _ in 0..3 {
            poller.poll_cycle().unwrap();
        }

        assert_eq!(poller.cycles(), 3);
        let (_, sink, delay) = poller.release();
        assert_eq!(
            sink.lines(),
            ["300", "no rain", "301", "rain", "302", "no rain"]
        );
        assert_eq!(delay.waits_ms, [100, 500, 100, 500, 100, 500]);
    }

    #[test]
    fn test_unchanged_values_are_still_reported() {
        let input = ScriptedInput::default()
            .with(LIGHT_CHANNEL, &[42])
            .with(WATER_CHANNEL, &[3]);
        let mut poller = poller(input, COMBINED);

        for _ in 0..10 {
            poller.poll_cycle().unwrap();
        }
        let before = poller.sink.lines().len();
        poller.poll_cycle().unwrap();

        assert_eq!(before, 20);
        assert_eq!(poller.sink.lines().len(), 22);
        assert_eq!(poller.cycles(), 11);
        assert!(poller.delay.waits_ms.chunks(2).all(|pair| pair == [100, 500]));
    }

    #[test]
    fn test_initialize_sets_up_channels_in_order() {
        let input = ScriptedInput::default()
            .with(LIGHT_CHANNEL, &[1])
            .with(WATER_CHANNEL, &[1]);
        let poller = poller(input, COMBINED);

        assert_eq!(poller.configs(), &COMBINED);
        assert_eq!(poller.cycles(), 0);
        let (input, sink, _) = poller.release();
        assert_eq!(input.setups, [LIGHT_CHANNEL, WATER_CHANNEL]);
        assert!(sink.bytes.is_empty());
    }

    #[test]
    fn test_failed_setup_still_polls() {
        let mut input = ScriptedInput::default()
            .with(LIGHT_CHANNEL, &[7])
            .with(WATER_CHANNEL, &[20]);
        input.reject_setup = Some(WATER_CHANNEL);
        let mut poller = poller(input, COMBINED);

        poller.poll_cycle().unwrap();

        assert_eq!(poller.sink.lines(), ["7", "rain"]);
    }

    #[test]
    fn test_read_failure_stops_the_cycle() {
        let input = ScriptedInput::default()
            .with(LIGHT_CHANNEL, &[99])
            .failing(WATER_CHANNEL);
        let mut poller = poller(input, COMBINED);

        let err = poller.poll_cycle().unwrap_err();

        assert_eq!(
            err,
            PollError::Sensor {
                channel: WATER_CHANNEL,
                error: SensorError::ReadFailed,
            }
        );
        assert_eq!(poller.cycles(), 0);
        assert_eq!(poller.sink.lines(), ["99"]);
        assert_eq!(poller.delay.waits_ms, [100]);
    }

    #[test]
    fn test_sink_failure_skips_the_delay() {
        let input = ScriptedInput::default().with(WATER_CHANNEL, &[50]);
        let mut poller = poller(input, [WATER_LEVEL]);
        poller.sink.broken = true;

        let err = poller.poll_cycle().unwrap_err();

        assert_eq!(err, PollError::Sink(ErrorKind::Other));
        assert!(poller.delay.waits_ms.is_empty());
    }

    #[test]
    #[should_panic(expected = "sensor poll failed")]
    fn test_run_forever_fails_fast() {
        let input = ScriptedInput::default().failing(LIGHT_CHANNEL);
        poller(input, [LIGHT_LEVEL]).run_forever();
    }

    #[test]
    fn test_labels_up_to_capacity_fit() {
        let label: &'static str = "x".repeat(LINE_CAPACITY - 1).leak();
        let rule = ThresholdRule::new(0, label, "dry");
        let input = ScriptedInput::default().with(WATER_CHANNEL, &[1]);
        let mut poller = poller(input, [PollConfig::threshold(WATER_CHANNEL, rule, 1)]);

        poller.poll_cycle().unwrap();

        assert_eq!(poller.sink.lines(), [label]);
    }

    #[test]
    fn test_render_fills_a_line_without_truncating() {
        let label: &'static str = "y".repeat(LINE_CAPACITY - 1).leak();
        let line = Report::Label(label).render();
        assert_eq!(line.len(), LINE_CAPACITY);
        assert!(line.ends_with('\n'));

        let line = Report::Value(Reading::new(u16::MAX)).render();
        assert_eq!(line.as_str(), "65535\n");
    }

    #[test]
    #[should_panic(expected = "label too long")]
    fn test_label_longer_than_a_line_is_rejected() {
        let label: &'static str = "x".repeat(LINE_CAPACITY).leak();
        ThresholdRule::new(0, label, "dry");
    }
}
