//! ESP32 wiring for RFM95/RFM96 modules.
//!
//! # Pin Configuration (TTGO T-Beam)
//!
//! | Signal | GPIO | Notes |
//! |--------|------|-------|
//! | SPI CLK | 5 | SPI Clock |
//! | SPI MISO | 19 | Master In Slave Out |
//! | SPI MOSI | 27 | Master Out Slave In |
//! | NSS (CS) | 18 | Chip Select |
//! | RESET | 23 | Radio Reset |
//! | DIO0 | 26 | RxDone / TxDone interrupt |

use super::chip::{InterruptTrigger, IrqAction};
use super::sx127x::{InterruptLine, Sx127x};
use super::variant::Band;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{
    Gpio18, Gpio19, Gpio23, Gpio26, Gpio27, Gpio5, Input, InputPin, InterruptType, Output,
    OutputPin, PinDriver,
};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::spi::config::Config as SpiConfig;
use esp_idf_hal::spi::config::DriverConfig;
use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriver, SPI2};
use esp_idf_hal::units::FromValueType;
use esp_idf_sys::EspError;
use log::debug;

/// SX127x on the ESP32 SPI2 bus with DIO0 on GPIO26.
pub type EspSx127x<'d> = Sx127x<SpiDeviceDriver<'d, SpiDriver<'d>>, PinDriver<'d, Gpio26, Input>>;

impl<'d, T: InputPin> InterruptLine for PinDriver<'d, T, Input> {
    type Error = EspError;

    fn attach(&mut self, mut action: IrqAction, trigger: InterruptTrigger) -> Result<(), EspError> {
        self.set_interrupt_type(interrupt_type(trigger))?;
        // SAFETY: the action only stores to atomics, which is sound in ISR context
        unsafe {
            self.subscribe(move || action())?;
        }
        self.enable_interrupt()
    }

    fn detach(&mut self) -> Result<(), EspError> {
        self.unsubscribe()
    }
}

fn interrupt_type(trigger: InterruptTrigger) -> InterruptType {
    match trigger {
        InterruptTrigger::RisingEdge => InterruptType::PosEdge,
        InterruptTrigger::FallingEdge => InterruptType::NegEdge,
        InterruptTrigger::HighLevel => InterruptType::HighLevel,
        InterruptTrigger::LowLevel => InterruptType::LowLevel,
    }
}

/// SPI bus and DIO0 line for the module, before a band is known.
pub struct Rfm9xPins<'d> {
    spi: SpiDeviceDriver<'d, SpiDriver<'d>>,
    dio0: PinDriver<'d, Gpio26, Input>,
}

impl<'d> Rfm9xPins<'d> {
    /// Set up SPI and the DIO0 input.
    pub fn new(
        spi: impl Peripheral<P = SPI2> + 'd,
        sclk: impl Peripheral<P = Gpio5> + 'd,
        mosi: impl Peripheral<P = Gpio27> + 'd,
        miso: impl Peripheral<P = Gpio19> + 'd,
        cs: impl Peripheral<P = Gpio18> + 'd,
        dio0: impl Peripheral<P = Gpio26> + 'd,
    ) -> Result<Self, EspError> {
        // SX127x supports up to 10MHz, use conservative 2MHz
        let spi_config = SpiConfig::new().baudrate(2.MHz().into());
        let driver_config = DriverConfig::new();

        let spi_driver = SpiDriver::new(spi, sclk, mosi, Some(miso), &driver_config)?;
        let spi = SpiDeviceDriver::new(spi_driver, Some(cs), &spi_config)?;
        let dio0 = PinDriver::input(dio0)?;

        Ok(Self { spi, dio0 })
    }

    /// Build the chip for the selected band.
    pub fn into_chip(self, band: Band) -> EspSx127x<'d> {
        Sx127x::new(self.spi, self.dio0, band)
    }
}

/// Pulse the module's reset line.
pub fn hardware_reset<T: OutputPin>(reset: &mut PinDriver<'_, T, Output>) -> Result<(), EspError> {
    debug!("Resetting radio");
    reset.set_low()?;
    FreeRtos::delay_ms(1);
    reset.set_high()?;
    FreeRtos::delay_ms(10);
    Ok(())
}

/// Claim the reset pin and pulse it.
pub fn reset_module<'d>(
    reset: impl Peripheral<P = Gpio23> + 'd,
) -> Result<PinDriver<'d, Gpio23, Output>, EspError> {
    let mut pin = PinDriver::output(reset)?;
    hardware_reset(&mut pin)?;
    Ok(pin)
}
