#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::info;
use esp_hal::{
    analog::adc::{Adc, AdcConfig, AdcPin, Attenuation},
    clock::CpuClock,
    delay::Delay,
    main,
    peripherals::{ADC1, GPIO2, GPIO3},
    uart::{Config as UartConfig, Uart},
    Blocking,
};
use rain_gauge::{config, EspAnalogInput, SensorPoller};
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

type Input = EspAnalogInput<'static, GPIO2<'static>, GPIO3<'static>>;
type Poller = SensorPoller<Input, Uart<'static, Blocking>, Delay, 2>;

#[main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    info!("rain gauge booting");

    // Data lines go out on UART0. esp-println is built for USB serial JTAG
    // only, so defmt and backtrace output never reach this UART.
    let uart = Uart::new(
        peripherals.UART0,
        UartConfig::default().with_baudrate(config::BAUD_RATE),
    )
    .expect("Failed to configure UART0")
    .with_tx(peripherals.GPIO21)
    .with_rx(peripherals.GPIO20);
    info!("UART0 open at {} baud", config::BAUD_RATE);

    let mut adc_config = AdcConfig::<ADC1<'static>>::new();
    let light: AdcPin<GPIO2<'static>, ADC1<'static>> =
        adc_config.enable_pin(peripherals.GPIO2, Attenuation::_11dB);
    let water: AdcPin<GPIO3<'static>, ADC1<'static>> =
        adc_config.enable_pin(peripherals.GPIO3, Attenuation::_11dB);
    let adc = Adc::new(peripherals.ADC1, adc_config);
    let input = EspAnalogInput::new(adc, light, water);

    // Lives until reset.
    let poller = mk_static!(
        Poller,
        SensorPoller::initialize(input, uart, Delay::new(), config::COMBINED)
    );
    poller.run_forever()
}
