//! Radio node binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin node` (simulated chip)
//! - **ESP32**: `cargo espflash flash --bin node --features esp32 --release`
//!
//! Brings the radio up, then services receive events until the process is
//! stopped. Packet framing belongs to the mesh layer and is not done here.

use log::{error, info, warn};
use rf95_radio::lora::{LoRaChip, RadioConfig, Rf95Interface};
use std::time::Duration;

/// Main loop poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Log a heartbeat every this many polls.
const HEARTBEAT_POLLS: u64 = 500;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() {
    platform_init();

    info!("=== RF95 radio node starting ===");

    let config = RadioConfig::default();
    info!(
        "Region {:?}: {} MHz, SF{}, {} kHz, CR 4/{}, {} dBm requested",
        config.region,
        config.frequency_mhz,
        config.spreading_factor,
        config.bandwidth_khz,
        config.coding_rate,
        config.power_dbm
    );

    #[cfg(feature = "esp32")]
    {
        use esp_idf_hal::peripherals::Peripherals;
        use rf95_radio::lora::{reset_module, Rfm9xPins};

        let peripherals = Peripherals::take().expect("Failed to take peripherals");
        let pins = peripherals.pins;

        // Held for the lifetime of the radio so RESET stays driven high
        let _reset = reset_module(pins.gpio23).expect("Failed to reset radio");
        let rfm = Rfm9xPins::new(
            peripherals.spi2,
            pins.gpio5,
            pins.gpio27,
            pins.gpio19,
            pins.gpio18,
            pins.gpio26,
        )
        .expect("Failed to set up radio SPI");

        let radio = Rf95Interface::new(config, |band| rfm.into_chip(band));
        run(radio);
    }

    #[cfg(not(feature = "esp32"))]
    {
        use rf95_radio::lora::SimChip;

        info!("Platform: Host (simulated radio)");
        let (radio, handle) = {
            let handle = rf95_radio::lora::SimHandle::default();
            let chip_handle = handle.clone();
            let radio =
                Rf95Interface::new(config, move |band| SimChip::with_handle(band, chip_handle));
            (radio, handle)
        };

        // Stand-in for DIO0: raise a receive event now and then
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(3));
            handle.fire_interrupt();
        });

        run(radio);
    }
}

fn run<C: LoRaChip>(mut radio: Rf95Interface<C>) {
    if !radio.init() {
        error!("Radio failed to start, idling");
        loop {
            std::thread::sleep(Duration::from_secs(60));
        }
    }
    info!("Radio receiving on {}", radio.band().part_name());

    let mut polls = 0u64;
    loop {
        if radio.take_rx_event() {
            // The mesh layer would drain the FIFO here
            info!("Receive event");
            radio.start_receive();
        }

        polls += 1;
        if polls % HEARTBEAT_POLLS == 0 {
            let spurious = radio.spurious_interrupts();
            if spurious > 0 {
                warn!("{} spurious interrupts so far", spurious);
            }
            info!(
                "Heartbeat: state {:?}, can send: {}",
                radio.state(),
                radio.can_send_immediately()
            );
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
