//! Simulated LoRa chip for host runs and tests.
//!
//! [`SimChip`] accepts every command, records it, and can be told to fail a
//! given operation. The matching [`SimHandle`] stays with the caller after
//! the chip is moved into an interface, to inspect the call log and to fire
//! the registered interrupt action as the DIO0 line would.

use super::chip::{ChipError, InterruptTrigger, IrqAction, LoRaChip};
use super::config::RadioConfig;
use super::variant::Band;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A command as received by the simulated chip.
#[derive(Debug, Clone, PartialEq)]
pub enum ChipCall {
    Begin(RadioConfig),
    SetFrequency(f32),
    SetBandwidth(f32),
    SetSpreadingFactor(u8),
    SetCodingRate(u8),
    SetSyncWord(u8),
    SetOutputPower(i8),
    SetCurrentLimit(u8),
    SetPreambleLength(u16),
    SetCrc(bool),
    Standby,
    StartReceive,
    Sleep,
    SetInterruptAction(InterruptTrigger),
    ClearInterruptAction,
}

impl ChipCall {
    pub fn op(&self) -> ChipOp {
        match self {
            Self::Begin(_) => ChipOp::Begin,
            Self::SetFrequency(_) => ChipOp::SetFrequency,
            Self::SetBandwidth(_) => ChipOp::SetBandwidth,
            Self::SetSpreadingFactor(_) => ChipOp::SetSpreadingFactor,
            Self::SetCodingRate(_) => ChipOp::SetCodingRate,
            Self::SetSyncWord(_) => ChipOp::SetSyncWord,
            Self::SetOutputPower(_) => ChipOp::SetOutputPower,
            Self::SetCurrentLimit(_) => ChipOp::SetCurrentLimit,
            Self::SetPreambleLength(_) => ChipOp::SetPreambleLength,
            Self::SetCrc(_) => ChipOp::SetCrc,
            Self::Standby => ChipOp::Standby,
            Self::StartReceive => ChipOp::StartReceive,
            Self::Sleep => ChipOp::Sleep,
            Self::SetInterruptAction(_) => ChipOp::SetInterruptAction,
            Self::ClearInterruptAction => ChipOp::ClearInterruptAction,
        }
    }
}

/// Command kind, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipOp {
    Begin,
    SetFrequency,
    SetBandwidth,
    SetSpreadingFactor,
    SetCodingRate,
    SetSyncWord,
    SetOutputPower,
    SetCurrentLimit,
    SetPreambleLength,
    SetCrc,
    Standby,
    StartReceive,
    Sleep,
    SetInterruptAction,
    ClearInterruptAction,
}

#[derive(Default)]
struct SimState {
    calls: Vec<ChipCall>,
    failures: HashMap<ChipOp, ChipError>,
    action: Option<IrqAction>,
}

/// Inspection and control handle for a [`SimChip`].
#[derive(Clone, Default)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test must not hide the call log from the next assertion
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Every command received so far, in order.
    pub fn calls(&self) -> Vec<ChipCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make every future `op` command fail with `error`.
    pub fn fail_on(&self, op: ChipOp, error: ChipError) {
        self.lock().failures.insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn has_interrupt_action(&self) -> bool {
        self.lock().action.is_some()
    }

    /// Run the registered interrupt action, as a DIO0 edge would.
    ///
    /// Returns `false` when no action is registered.
    pub fn fire_interrupt(&self) -> bool {
        match self.lock().action.as_mut() {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    fn record(&self, call: ChipCall) -> Result<(), ChipError> {
        let mut state = self.lock();
        let failure = state.failures.get(&call.op()).copied();
        debug!("sim chip: {:?}", call);
        state.calls.push(call);
        match failure {
            Some(error) => {
                warn!("sim chip: injected failure {}", error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

/// Simulated RFM95/RFM96 chip.
///
/// Rejects frequencies outside its band like the real part.
pub struct SimChip {
    band: Band,
    handle: SimHandle,
}

impl SimChip {
    /// Create a chip for `band` and a handle to observe it.
    pub fn new(band: Band) -> (Self, SimHandle) {
        let handle = SimHandle::default();
        (Self::with_handle(band, handle.clone()), handle)
    }

    /// Create a chip reporting to an existing handle.
    pub fn with_handle(band: Band, handle: SimHandle) -> Self {
        Self { band, handle }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    fn check_frequency(&self, mhz: f32) -> Result<(), ChipError> {
        if self.band.frequency_range().contains(&mhz) {
            Ok(())
        } else {
            Err(ChipError::InvalidFrequency)
        }
    }
}

impl LoRaChip for SimChip {
    fn begin(&mut self, config: &RadioConfig) -> Result<(), ChipError> {
        self.handle.record(ChipCall::Begin(*config))?;
        self.check_frequency(config.frequency_mhz)
    }

    fn set_frequency(&mut self, mhz: f32) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetFrequency(mhz))?;
        self.check_frequency(mhz)
    }

    fn set_bandwidth(&mut self, khz: f32) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetBandwidth(khz))
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetSpreadingFactor(sf))
    }

    fn set_coding_rate(&mut self, cr: u8) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetCodingRate(cr))
    }

    fn set_sync_word(&mut self, sync_word: u8) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetSyncWord(sync_word))
    }

    fn set_output_power(&mut self, dbm: i8) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetOutputPower(dbm))
    }

    fn set_current_limit(&mut self, ma: u8) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetCurrentLimit(ma))
    }

    fn set_preamble_length(&mut self, symbols: u16) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetPreambleLength(symbols))
    }

    fn set_crc(&mut self, enabled: bool) -> Result<(), ChipError> {
        self.handle.record(ChipCall::SetCrc(enabled))
    }

    fn standby(&mut self) -> Result<(), ChipError> {
        self.handle.record(ChipCall::Standby)
    }

    fn start_receive(&mut self) -> Result<(), ChipError> {
        self.handle.record(ChipCall::StartReceive)
    }

    fn sleep(&mut self) -> Result<(), ChipError> {
        self.handle.record(ChipCall::Sleep)
    }

    fn set_interrupt_action(&mut self, action: IrqAction, trigger: InterruptTrigger) {
        let _ = self.handle.record(ChipCall::SetInterruptAction(trigger));
        self.handle.lock().action = Some(action);
    }

    fn clear_interrupt_action(&mut self) {
        let _ = self.handle.record(ChipCall::ClearInterruptAction);
        self.handle.lock().action = None;
    }
}
