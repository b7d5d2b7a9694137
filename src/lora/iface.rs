//! RFM95/RFM96 radio interface.
//!
//! Sequences the modem through configuration, standby, receive, transmit
//! and sleep on behalf of the mesh layer, which decides what to send.
//!
//! # Half-Duplex Management
//!
//! The radio cannot transmit and receive at once. Every path from receiving
//! to transmitting (and back) goes through the standby transition, which
//! quiesces the chip, drops the interrupt action and releases any in-flight
//! transmission before anything else happens.
//!
//! # Fault Policy
//!
//! - `init` reports failure as `false`; the caller decides what to do.
//! - Until `init` has begun the chip, standby, receive and transmit requests
//!   are ignored with a warning. The chip is still in its reset mode then.
//! - Once the radio is live, a chip command that fails while reconfiguring,
//!   entering standby or starting receive halts the firmware. A modem left
//!   with half its parameters applied must not go back on air.
//!
//! # Usage
//!
//! ```
//! use rf95_radio::lora::{Rf95Interface, RadioConfig, Region, SimChip};
//!
//! let config = RadioConfig::for_region(Region::Eu433);
//! let mut radio = Rf95Interface::new(config, |band| SimChip::new(band).0);
//! assert!(radio.init());
//! assert!(radio.is_receiving());
//! assert!(radio.can_send_immediately());
//! ```

use super::chip::{ChipError, InterruptTrigger, LoRaChip};
use super::config::{ConfigError, RadioConfig};
use super::irq::{InterruptBridge, RxSignal};
use super::variant::{Band, ChipVariant};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;

/// DIO0 goes high on RxDone.
const RX_DONE_TRIGGER: InterruptTrigger = InterruptTrigger::RisingEdge;

/// Radio operating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Standby,
    Receiving,
    /// A send started by the mesh layer is in flight.
    Transmitting,
    Sleeping,
}

/// Marker for a send in flight, owned by the interface until completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransmission {
    /// Sender-assigned packet id.
    pub id: u32,
    /// Payload length in bytes.
    pub len: usize,
}

/// Chip command being executed when a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    Begin,
    EnableCrc,
    Standby,
    SpreadingFactor,
    Bandwidth,
    CodingRate,
    SyncWord,
    CurrentLimit,
    PreambleLength,
    Frequency,
    OutputPower,
    StartReceive,
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Begin => "begin",
            Self::EnableCrc => "enable CRC",
            Self::Standby => "standby",
            Self::SpreadingFactor => "set spreading factor",
            Self::Bandwidth => "set bandwidth",
            Self::CodingRate => "set coding rate",
            Self::SyncWord => "set sync word",
            Self::CurrentLimit => "set current limit",
            Self::PreambleLength => "set preamble length",
            Self::Frequency => "set frequency",
            Self::OutputPower => "set output power",
            Self::StartReceive => "start receive",
        };
        f.write_str(name)
    }
}

/// A chip command failed on a live radio. Not recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipFault {
    pub step: ConfigStep,
    pub error: ChipError,
}

impl fmt::Display for ChipFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.error)
    }
}

impl std::error::Error for ChipFault {}

/// Why `init` did not bring the radio up.
#[derive(Debug, Clone, PartialEq)]
pub enum InitError {
    /// Stored configuration failed validation.
    InvalidConfig(ConfigError),
    /// `begin` rejected the configuration or the chip did not answer.
    Begin(ChipError),
    /// CRC could not be enabled.
    EnableCrc(ChipError),
    /// The first receive could not be started.
    StartReceive(ChipFault),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(e) => write!(f, "invalid config: {}", e),
            Self::Begin(e) => write!(f, "begin failed: {}", e),
            Self::EnableCrc(e) => write!(f, "enabling CRC failed: {}", e),
            Self::StartReceive(e) => write!(f, "starting receive failed: {}", e),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidConfig(e) => Some(e),
            Self::Begin(e) | Self::EnableCrc(e) => Some(e),
            Self::StartReceive(e) => Some(e),
        }
    }
}

fn check(step: ConfigStep, result: Result<(), ChipError>) -> Result<(), ChipFault> {
    result.map_err(|error| ChipFault { step, error })
}

/// Halt on a fault that leaves the modem in an unknown configuration.
fn fatal(fault: ChipFault) -> ! {
    error!("LoRa chip fault, halting: {}", fault);
    panic!("LoRa chip fault: {}", fault);
}

/// Radio interface for the RFM95/RFM96 family.
///
/// Owns the chip for its whole lifetime. Dropping the interface removes the
/// interrupt action and, if the chip was started, puts it to sleep.
pub struct Rf95Interface<C: LoRaChip> {
    chip: ChipVariant<C>,
    config: RadioConfig,
    state: Option<RadioState>,
    bridge: InterruptBridge,
    pending_tx: Option<PendingTransmission>,
}

impl<C: LoRaChip> Rf95Interface<C> {
    /// Create the interface, building the chip variant for the configured
    /// base frequency. No chip commands are sent until [`init`](Self::init).
    pub fn new(config: RadioConfig, make_chip: impl FnOnce(Band) -> C) -> Self {
        let chip = ChipVariant::select(config.base_frequency_mhz(), make_chip);
        info!(
            "Selected {} for base frequency {} MHz",
            chip.band().part_name(),
            config.base_frequency_mhz()
        );
        Self {
            chip,
            config,
            state: None,
            bridge: InterruptBridge::new(),
            pending_tx: None,
        }
    }

    /// Bring the radio up and start receiving.
    ///
    /// Returns `false` (after logging why) if the chip could not be started.
    pub fn init(&mut self) -> bool {
        match self.try_init() {
            Ok(()) => true,
            Err(e) => {
                error!("LoRa init failed: {}", e);
                false
            }
        }
    }

    /// [`init`](Self::init) with the failure reason.
    pub fn try_init(&mut self) -> Result<(), InitError> {
        self.config
            .validate_for_band(self.chip.band())
            .map_err(InitError::InvalidConfig)?;

        // begin() passes through sleep, so nothing may still be listening
        if self.state.take().is_some() {
            debug!("Re-initializing live radio");
            self.quiesce_rx();
            self.release_pending();
        }

        self.apply_and_begin()?;
        self.state = Some(RadioState::Standby);
        self.enter_receive().map_err(InitError::StartReceive)
    }

    fn apply_and_begin(&mut self) -> Result<(), InitError> {
        let settings = self.config.with_power_ceiling();
        let chip = self.chip.chip_mut();

        let result = chip.begin(&settings);
        match &result {
            Ok(()) => info!("LoRa init result: ok"),
            Err(e) => info!("LoRa init result: {}", e),
        }
        result.map_err(InitError::Begin)?;

        // Integrity checking is always on
        chip.set_crc(true).map_err(InitError::EnableCrc)
    }

    /// Apply a new configuration to the live radio and resume receiving.
    ///
    /// An invalid configuration, or one the fitted chip variant cannot serve,
    /// is rejected before any chip command. If the radio has not been
    /// initialized yet the configuration is only stored.
    ///
    /// # Panics
    ///
    /// If any chip command fails while the new parameters are applied.
    pub fn reconfigure(&mut self, config: RadioConfig) -> Result<(), ConfigError> {
        config.validate_for_band(self.chip.band())?;
        self.config = config;

        if self.state.is_none() {
            debug!("Radio not started, configuration stored for init");
            return Ok(());
        }

        if let Err(fault) = self.try_reconfigure() {
            fatal(fault);
        }
        Ok(())
    }

    fn try_reconfigure(&mut self) -> Result<(), ChipFault> {
        self.enter_standby()?;
        self.apply_modem_params()?;
        self.enter_receive()
    }

    /// Push every modem parameter, stopping at the first failure.
    fn apply_modem_params(&mut self) -> Result<(), ChipFault> {
        let cfg = self.config.with_power_ceiling();
        let chip = self.chip.chip_mut();

        check(
            ConfigStep::SpreadingFactor,
            chip.set_spreading_factor(cfg.spreading_factor),
        )?;
        check(ConfigStep::Bandwidth, chip.set_bandwidth(cfg.bandwidth_khz))?;
        check(ConfigStep::CodingRate, chip.set_coding_rate(cfg.coding_rate))?;
        check(ConfigStep::SyncWord, chip.set_sync_word(cfg.sync_word))?;
        check(
            ConfigStep::CurrentLimit,
            chip.set_current_limit(cfg.current_limit_ma),
        )?;
        check(
            ConfigStep::PreambleLength,
            chip.set_preamble_length(cfg.preamble_length),
        )?;
        check(ConfigStep::Frequency, chip.set_frequency(cfg.frequency_mhz))?;
        check(ConfigStep::OutputPower, chip.set_output_power(cfg.power_dbm))
    }

    /// Quiesce the radio.
    ///
    /// # Panics
    ///
    /// If the chip rejects the standby command.
    pub fn set_standby(&mut self) {
        if self.state.is_none() {
            warn!("Standby requested before init, ignored");
            return;
        }
        if let Err(fault) = self.enter_standby() {
            fatal(fault);
        }
    }

    fn enter_standby(&mut self) -> Result<(), ChipFault> {
        self.bridge.disable(self.chip.chip_mut());
        check(ConfigStep::Standby, self.chip.chip_mut().standby())?;

        let signal = self.bridge.signal();
        signal.set_receiving(false);
        // A late RxDone belongs to the session that just ended
        signal.clear_rx_event();
        self.release_pending();
        self.state = Some(RadioState::Standby);
        Ok(())
    }

    /// Drop the interrupt action and any unconsumed receive event.
    fn quiesce_rx(&mut self) {
        self.bridge.disable(self.chip.chip_mut());
        let signal = self.bridge.signal();
        signal.set_receiving(false);
        signal.clear_rx_event();
    }

    fn release_pending(&mut self) {
        if let Some(tx) = self.pending_tx.take() {
            debug!("Releasing in-flight transmission {} ({} bytes)", tx.id, tx.len);
        }
    }

    /// Go through standby and start continuous receive.
    ///
    /// # Panics
    ///
    /// If the chip rejects standby or receive.
    pub fn start_receive(&mut self) {
        if self.state.is_none() {
            warn!("Receive requested before init, ignored");
            return;
        }
        if let Err(fault) = self.enter_receive() {
            fatal(fault);
        }
    }

    fn enter_receive(&mut self) -> Result<(), ChipFault> {
        self.enter_standby()?;
        check(
            ConfigStep::StartReceive,
            self.chip.chip_mut().start_receive(),
        )?;
        self.bridge.signal().set_receiving(true);

        // Only now: starting receive clears stale interrupt flags in the chip
        self.bridge.enable(self.chip.chip_mut(), RX_DONE_TRIGGER);
        self.state = Some(RadioState::Receiving);
        Ok(())
    }

    /// Whether a new transmission may start right now.
    ///
    /// Only an in-flight transmission blocks. Detecting a packet that is
    /// part-way through reception is not implemented, so an incoming packet
    /// never holds off a send.
    pub fn can_send_immediately(&self) -> bool {
        let busy_tx = self.pending_tx.is_some();
        // TODO: report busy while the modem has a valid header but RxDone has not fired
        let busy_rx = false;

        if busy_tx || busy_rx {
            debug!(
                "Can not send now, busy_tx={}, busy_rx={}",
                busy_tx, busy_rx
            );
        }
        !busy_tx && !busy_rx
    }

    /// Put the chip to sleep. Waking requires a fresh [`init`](Self::init).
    ///
    /// On a radio that was never started the chip is still put to sleep,
    /// but the state stays unset.
    pub fn sleep(&mut self) -> bool {
        self.quiesce_rx();
        if let Err(e) = self.chip.chip_mut().sleep() {
            warn!("LoRa sleep failed: {}", e);
        }
        if self.state.is_some() {
            self.state = Some(RadioState::Sleeping);
        }
        true
    }

    /// Remove the receive-event action from the chip.
    pub fn disable_interrupt(&mut self) {
        self.bridge.disable(self.chip.chip_mut());
    }

    /// Record a send started by the mesh layer.
    ///
    /// Runs the standby transition first, so any receive in progress is
    /// stopped and any earlier transmission released.
    ///
    /// Ignored with a warning before [`init`](Self::init).
    ///
    /// # Panics
    ///
    /// If the chip rejects the standby command.
    pub fn begin_transmission(&mut self, tx: PendingTransmission) {
        if self.state.is_none() {
            warn!("Transmission {} requested before init, ignored", tx.id);
            return;
        }
        self.set_standby();
        debug!("Transmission {} started ({} bytes)", tx.id, tx.len);
        self.pending_tx = Some(tx);
    }

    /// Normal completion of the in-flight send, called by the mesh layer.
    pub fn complete_transmission(&mut self) -> Option<PendingTransmission> {
        self.pending_tx.take()
    }

    pub fn pending_transmission(&self) -> Option<&PendingTransmission> {
        self.pending_tx.as_ref()
    }

    /// Current state; `None` until the radio has been started.
    pub fn state(&self) -> Option<RadioState> {
        match self.state {
            Some(RadioState::Standby) if self.pending_tx.is_some() => {
                Some(RadioState::Transmitting)
            }
            state => state,
        }
    }

    pub fn is_receiving(&self) -> bool {
        self.bridge.signal().is_receiving()
    }

    pub fn is_interrupt_enabled(&self) -> bool {
        self.bridge.is_enabled()
    }

    /// Consume a receive event raised by the interrupt action.
    pub fn take_rx_event(&self) -> bool {
        self.bridge.signal().take_rx_event()
    }

    /// Signal shared with the interrupt action, for a receive handler
    /// running elsewhere.
    pub fn rx_signal(&self) -> Arc<RxSignal> {
        Arc::clone(self.bridge.signal())
    }

    pub fn spurious_interrupts(&self) -> u32 {
        self.bridge.signal().spurious_count()
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    pub fn band(&self) -> Band {
        self.chip.band()
    }
}

impl<C: LoRaChip> Drop for Rf95Interface<C> {
    fn drop(&mut self) {
        self.bridge.disable(self.chip.chip_mut());
        if matches!(
            self.state,
            Some(RadioState::Standby | RadioState::Receiving | RadioState::Transmitting)
        ) {
            if let Err(e) = self.chip.chip_mut().sleep() {
                warn!("LoRa sleep on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::config::{ModemPreset, Region};
    use crate::lora::sim::{ChipCall, ChipOp, SimChip, SimHandle};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn sim_radio(config: RadioConfig) -> (Rf95Interface<SimChip>, SimHandle) {
        let handle = SimHandle::default();
        let chip_handle = handle.clone();
        let radio = Rf95Interface::new(config, move |band| SimChip::with_handle(band, chip_handle));
        (radio, handle)
    }

    fn live_radio() -> (Rf95Interface<SimChip>, SimHandle) {
        let (mut radio, handle) = sim_radio(RadioConfig::for_region(Region::Us915));
        assert!(radio.init());
        handle.clear_calls();
        (radio, handle)
    }

    fn tx(id: u32) -> PendingTransmission {
        PendingTransmission { id, len: 42 }
    }

    fn position(calls: &[ChipCall], op: ChipOp) -> usize {
        calls
            .iter()
            .position(|c| c.op() == op)
            .unwrap_or_else(|| panic!("{:?} not called", op))
    }

    #[test]
    fn test_init_low_band_clamps_power() {
        let config = RadioConfig {
            frequency_mhz: 433.0,
            power_dbm: 30,
            ..RadioConfig::for_region(Region::Eu433)
        };
        let (mut radio, handle) = sim_radio(config);

        assert_eq!(radio.band(), Band::Low);
        assert_eq!(radio.state(), None);
        assert!(radio.init());

        let calls = handle.calls();
        match &calls[0] {
            ChipCall::Begin(sent) => {
                assert_eq!(sent.power_dbm, 20);
                assert_eq!(sent.frequency_mhz, 433.0);
            }
            other => panic!("expected begin, got {:?}", other),
        }
        assert_eq!(calls[1], ChipCall::SetCrc(true));
        assert_eq!(radio.state(), Some(RadioState::Receiving));
        assert!(radio.is_receiving());
        assert!(radio.is_interrupt_enabled());
        // Stored request is untouched
        assert_eq!(radio.config().power_dbm, 30);
    }

    #[test]
    fn test_high_band_selected() {
        let (radio, _) = sim_radio(RadioConfig::for_region(Region::Eu868));
        assert_eq!(radio.band(), Band::High);
    }

    #[test]
    fn test_init_begin_failure_returns_false() {
        let (mut radio, handle) = sim_radio(RadioConfig::default());
        handle.fail_on(ChipOp::Begin, ChipError::ChipNotFound { version: 0 });

        assert!(!radio.init());
        assert_eq!(radio.state(), None);
        assert!(!radio.is_receiving());
        assert!(!handle.calls().iter().any(|c| c.op() == ChipOp::SetCrc));
        assert!(!handle.calls().iter().any(|c| c.op() == ChipOp::StartReceive));
    }

    #[test]
    fn test_init_crc_failure_returns_false() {
        let (mut radio, handle) = sim_radio(RadioConfig::default());
        handle.fail_on(ChipOp::SetCrc, ChipError::Bus);

        assert_eq!(radio.try_init(), Err(InitError::EnableCrc(ChipError::Bus)));
        assert_eq!(radio.state(), None);
        assert!(!handle.calls().iter().any(|c| c.op() == ChipOp::StartReceive));
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = RadioConfig {
            spreading_factor: 4,
            ..RadioConfig::default()
        };
        let (mut radio, handle) = sim_radio(config);

        assert!(matches!(radio.try_init(), Err(InitError::InvalidConfig(_))));
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn test_init_out_of_band_frequency_fails() {
        // Channel plan says low band, operating frequency is high band
        let config = RadioConfig {
            frequency_mhz: 915.0,
            ..RadioConfig::for_region(Region::Eu433)
        };
        let (mut radio, handle) = sim_radio(config);
        assert_eq!(
            radio.try_init(),
            Err(InitError::InvalidConfig(ConfigError::FrequencyOutOfBand {
                frequency_mhz: 915.0,
                band: Band::Low,
            }))
        );
        assert!(handle.calls().is_empty());
        assert_eq!(radio.state(), None);
    }

    #[test]
    fn test_requests_before_init_are_ignored() {
        let (mut radio, handle) = sim_radio(RadioConfig::default());

        radio.start_receive();
        radio.set_standby();
        radio.begin_transmission(tx(1));

        assert!(handle.calls().is_empty());
        assert_eq!(radio.state(), None);
        assert!(!radio.is_receiving());
        assert!(!radio.is_interrupt_enabled());
        assert_eq!(radio.pending_transmission(), None);
    }

    #[test]
    fn test_start_receive_after_failed_crc_init_is_ignored() {
        let (mut radio, handle) = sim_radio(RadioConfig::default());
        handle.fail_on(ChipOp::SetCrc, ChipError::Bus);
        assert!(!radio.init());
        handle.clear_calls();

        radio.start_receive();
        assert!(handle.calls().is_empty());
        assert_eq!(radio.state(), None);
        assert!(!radio.is_receiving());
    }

    #[test]
    fn test_sleep_then_reconfigure_before_init() {
        let (mut radio, handle) = sim_radio(RadioConfig::default());

        assert!(radio.sleep());
        assert_eq!(
            handle.calls(),
            vec![ChipCall::ClearInterruptAction, ChipCall::Sleep]
        );
        assert_eq!(radio.state(), None);
        handle.clear_calls();

        radio.reconfigure(RadioConfig::default()).unwrap();
        assert!(handle.calls().is_empty());
        assert_eq!(radio.state(), None);

        assert!(radio.init());
        assert!(matches!(handle.calls()[0], ChipCall::Begin(_)));
        assert_eq!(handle.calls()[1], ChipCall::SetCrc(true));
        assert_eq!(radio.state(), Some(RadioState::Receiving));
    }

    #[test]
    fn test_reinit_quiesces_receive_before_begin() {
        let (mut radio, handle) = live_radio();
        assert!(handle.fire_interrupt());
        handle.fail_on(ChipOp::Begin, ChipError::Bus);

        assert!(!radio.init());
        assert_eq!(handle.calls()[0], ChipCall::ClearInterruptAction);
        assert!(matches!(handle.calls()[1], ChipCall::Begin(_)));
        assert_eq!(radio.state(), None);
        assert!(!radio.is_receiving());
        assert!(!radio.is_interrupt_enabled());
        assert!(!handle.has_interrupt_action());
        assert!(!radio.take_rx_event());
    }

    #[test]
    fn test_reinit_live_radio() {
        let (mut radio, handle) = live_radio();
        radio.begin_transmission(tx(4));
        handle.clear_calls();

        assert!(radio.init());
        let calls = handle.calls();
        assert!(position(&calls, ChipOp::ClearInterruptAction) < position(&calls, ChipOp::Begin));
        assert_eq!(radio.pending_transmission(), None);
        assert_eq!(radio.state(), Some(RadioState::Receiving));
    }

    #[test]
    fn test_start_receive_ordering() {
        let (mut radio, handle) = live_radio();
        radio.start_receive();

        let calls = handle.calls();
        let clear = position(&calls, ChipOp::ClearInterruptAction);
        let standby = position(&calls, ChipOp::Standby);
        let receive = position(&calls, ChipOp::StartReceive);
        let enable = position(&calls, ChipOp::SetInterruptAction);

        assert!(clear < receive);
        assert!(standby < receive);
        assert!(receive < enable);
        assert_eq!(radio.state(), Some(RadioState::Receiving));
    }

    #[test]
    fn test_start_receive_failure_leaves_bridge_disabled() {
        let (mut radio, handle) = live_radio();
        handle.fail_on(ChipOp::StartReceive, ChipError::Bus);

        let result = catch_unwind(AssertUnwindSafe(|| radio.start_receive()));
        assert!(result.is_err());
        assert!(!radio.is_interrupt_enabled());
        assert!(!radio.is_receiving());
        assert!(!handle.has_interrupt_action());
    }

    #[test]
    fn test_standby_is_idempotent() {
        let (mut radio, handle) = live_radio();
        radio.begin_transmission(tx(1));

        radio.set_standby();
        let once = (
            radio.state(),
            radio.is_receiving(),
            radio.is_interrupt_enabled(),
            radio.pending_transmission().cloned(),
        );
        let calls_once = handle.calls().len();

        radio.set_standby();
        let twice = (
            radio.state(),
            radio.is_receiving(),
            radio.is_interrupt_enabled(),
            radio.pending_transmission().cloned(),
        );

        assert_eq!(once, (Some(RadioState::Standby), false, false, None));
        assert_eq!(once, twice);
        // Only the redundant clear + standby commands
        assert_eq!(
            handle.calls()[calls_once..],
            [ChipCall::ClearInterruptAction, ChipCall::Standby]
        );
    }

    #[test]
    fn test_can_send_immediately() {
        let (mut radio, _) = live_radio();
        assert!(radio.can_send_immediately());

        radio.begin_transmission(tx(7));
        assert_eq!(radio.state(), Some(RadioState::Transmitting));
        assert!(!radio.can_send_immediately());

        assert_eq!(radio.complete_transmission(), Some(tx(7)));
        assert!(radio.can_send_immediately());
        assert_eq!(radio.state(), Some(RadioState::Standby));
    }

    #[test]
    fn test_pending_transmission_blocks_in_any_receive_state() {
        let (mut radio, handle) = live_radio();
        radio.begin_transmission(tx(3));

        // Receive event flagged by the chip does not change the answer
        radio.rx_signal().set_receiving(true);
        handle.fire_interrupt();
        assert!(!radio.can_send_immediately());
    }

    #[test]
    fn test_receive_does_not_block_send() {
        let (mut radio, handle) = live_radio();
        radio.start_receive();
        assert!(handle.fire_interrupt());
        assert!(radio.can_send_immediately());
        assert!(radio.take_rx_event());
    }

    #[test]
    fn test_begin_transmission_quiesces_receive() {
        let (mut radio, handle) = live_radio();
        assert!(radio.is_receiving());

        radio.begin_transmission(tx(9));

        assert!(!radio.is_receiving());
        assert!(!radio.is_interrupt_enabled());
        assert!(!handle.has_interrupt_action());
        assert_eq!(radio.pending_transmission(), Some(&tx(9)));
    }

    #[test]
    fn test_reconfigure_releases_pending_and_resumes_receive() {
        let (mut radio, handle) = live_radio();
        radio.begin_transmission(tx(5));
        handle.clear_calls();

        let config = RadioConfig::new(Region::Us915, 3, ModemPreset::VeryLongSlow, 25).unwrap();
        radio.reconfigure(config).unwrap();

        assert_eq!(radio.pending_transmission(), None);
        assert_eq!(radio.state(), Some(RadioState::Receiving));
        assert!(radio.is_receiving());
        assert!(radio.is_interrupt_enabled());

        let setters: Vec<ChipCall> = handle
            .calls()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    ChipCall::Standby
                        | ChipCall::StartReceive
                        | ChipCall::SetInterruptAction(_)
                        | ChipCall::ClearInterruptAction
                )
            })
            .collect();
        assert_eq!(
            setters,
            vec![
                ChipCall::SetSpreadingFactor(12),
                ChipCall::SetBandwidth(125.0),
                ChipCall::SetCodingRate(8),
                ChipCall::SetSyncWord(0x12),
                ChipCall::SetCurrentLimit(100),
                ChipCall::SetPreambleLength(32),
                ChipCall::SetFrequency(config.frequency_mhz),
                ChipCall::SetOutputPower(20),
            ]
        );

        // Standby happens before the first setter
        let calls = handle.calls();
        assert!(position(&calls, ChipOp::Standby) < position(&calls, ChipOp::SetSpreadingFactor));
        assert_eq!(calls.last(), Some(&ChipCall::SetInterruptAction(RX_DONE_TRIGGER)));
    }

    #[test]
    fn test_reconfigure_setter_failure_halts() {
        let (mut radio, handle) = live_radio();
        handle.fail_on(ChipOp::SetCodingRate, ChipError::InvalidCodingRate);

        let config = *radio.config();
        let result = catch_unwind(AssertUnwindSafe(|| radio.reconfigure(config)));
        assert!(result.is_err());

        let ops: Vec<ChipOp> = handle.calls().iter().map(ChipCall::op).collect();
        assert_eq!(
            ops,
            vec![
                ChipOp::ClearInterruptAction,
                ChipOp::Standby,
                ChipOp::SetSpreadingFactor,
                ChipOp::SetBandwidth,
                ChipOp::SetCodingRate,
            ]
        );
        assert_eq!(radio.state(), Some(RadioState::Standby));
        assert!(!radio.is_receiving());
        assert!(!radio.is_interrupt_enabled());
    }

    #[test]
    fn test_reconfigure_rejects_other_band() {
        let (mut radio, handle) = live_radio();
        let before = *radio.config();

        let config = RadioConfig {
            frequency_mhz: 433.175,
            ..before
        };
        assert_eq!(
            radio.reconfigure(config),
            Err(ConfigError::FrequencyOutOfBand {
                frequency_mhz: 433.175,
                band: Band::High,
            })
        );

        assert_eq!(
            radio.reconfigure(RadioConfig::for_region(Region::Eu433)),
            Err(ConfigError::RegionOutOfBand {
                region: Region::Eu433,
                band: Band::High,
            })
        );

        assert!(handle.calls().is_empty());
        assert_eq!(radio.config(), &before);
        assert_eq!(radio.state(), Some(RadioState::Receiving));
        assert!(radio.is_interrupt_enabled());
    }

    #[test]
    fn test_reconfigure_rejects_invalid_config_without_touching_chip() {
        let (mut radio, handle) = live_radio();
        let config = RadioConfig {
            coding_rate: 9,
            ..*radio.config()
        };

        assert_eq!(
            radio.reconfigure(config),
            Err(ConfigError::InvalidCodingRate(9))
        );
        assert!(handle.calls().is_empty());
        assert_eq!(radio.state(), Some(RadioState::Receiving));
        assert_eq!(radio.config().coding_rate, 5);
    }

    #[test]
    fn test_reconfigure_before_init_only_stores() {
        let (mut radio, handle) = sim_radio(RadioConfig::default());
        let config = RadioConfig {
            power_dbm: 10,
            ..RadioConfig::default()
        };

        radio.reconfigure(config).unwrap();
        assert!(handle.calls().is_empty());
        assert_eq!(radio.state(), None);

        assert!(radio.init());
        match &handle.calls()[0] {
            ChipCall::Begin(sent) => assert_eq!(sent.power_dbm, 10),
            other => panic!("expected begin, got {:?}", other),
        }
    }

    #[test]
    fn test_sleep() {
        let (mut radio, handle) = live_radio();
        assert!(radio.sleep());

        assert_eq!(
            handle.calls(),
            vec![ChipCall::ClearInterruptAction, ChipCall::Sleep]
        );
        assert_eq!(radio.state(), Some(RadioState::Sleeping));
        assert!(!radio.is_receiving());
        assert!(!radio.is_interrupt_enabled());
    }

    #[test]
    fn test_stale_rx_event_dropped() {
        let (mut radio, handle) = live_radio();
        assert!(handle.fire_interrupt());
        let config = *radio.config();
        radio.reconfigure(config).unwrap();
        assert!(!radio.take_rx_event());

        assert!(handle.fire_interrupt());
        radio.sleep();
        assert!(!radio.take_rx_event());
    }

    #[test]
    fn test_sleep_failure_still_reports_true() {
        let (mut radio, handle) = live_radio();
        handle.fail_on(ChipOp::Sleep, ChipError::Bus);
        assert!(radio.sleep());
        assert_eq!(radio.state(), Some(RadioState::Sleeping));
    }

    #[test]
    fn test_interrupt_after_sleep_is_spurious() {
        let (mut radio, _) = live_radio();
        let signal = radio.rx_signal();
        radio.sleep();

        signal.on_rx_interrupt();
        assert!(!radio.take_rx_event());
        assert_eq!(radio.spurious_interrupts(), 1);
    }

    #[test]
    fn test_disable_interrupt() {
        let (mut radio, handle) = live_radio();
        radio.disable_interrupt();
        radio.disable_interrupt();
        assert!(!radio.is_interrupt_enabled());
        assert!(!handle.fire_interrupt());
    }

    #[test]
    fn test_drop_sleeps_started_chip() {
        let (radio, handle) = live_radio();
        drop(radio);
        assert_eq!(
            handle.calls(),
            vec![ChipCall::ClearInterruptAction, ChipCall::Sleep]
        );
    }

    #[test]
    fn test_drop_leaves_unstarted_chip_alone() {
        let (radio, handle) = sim_radio(RadioConfig::default());
        drop(radio);
        assert_eq!(handle.calls(), vec![ChipCall::ClearInterruptAction]);
    }
}
