//! Receive-event interrupt bridge.
//!
//! The chip's DIO0 line fires on RxDone. The registered action runs in
//! interrupt context, so it only touches the atomics in [`RxSignal`]; the
//! receive-completion handler drains the packet later from the main loop.

use super::chip::{InterruptTrigger, LoRaChip};
use log::warn;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// State shared between the main context and the interrupt action.
#[derive(Debug, Default)]
pub struct RxSignal {
    receiving: AtomicBool,
    rx_pending: AtomicBool,
    spurious: AtomicU32,
}

impl RxSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the radio is in receive mode.
    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::Acquire)
    }

    pub(crate) fn set_receiving(&self, receiving: bool) {
        self.receiving.store(receiving, Ordering::Release);
    }

    /// Interrupt-context entry point.
    ///
    /// Events arriving while not receiving are counted and dropped.
    pub fn on_rx_interrupt(&self) {
        if self.receiving.load(Ordering::Acquire) {
            self.rx_pending.store(true, Ordering::Release);
        } else {
            self.spurious.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Consume a pending receive event.
    pub fn take_rx_event(&self) -> bool {
        self.rx_pending.swap(false, Ordering::AcqRel)
    }

    /// Drop an unconsumed event from a receive session that has ended.
    pub(crate) fn clear_rx_event(&self) {
        self.rx_pending.store(false, Ordering::Release);
    }

    /// Number of interrupts that fired while not receiving.
    pub fn spurious_count(&self) -> u32 {
        self.spurious.load(Ordering::Relaxed)
    }
}

/// Registers and unregisters the receive-event action on a chip.
#[derive(Debug, Default)]
pub struct InterruptBridge {
    signal: Arc<RxSignal>,
    enabled: bool,
}

impl InterruptBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared signal written by the interrupt action.
    pub fn signal(&self) -> &Arc<RxSignal> {
        &self.signal
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register the receive-event action with `chip`.
    pub fn enable<C: LoRaChip>(&mut self, chip: &mut C, trigger: InterruptTrigger) {
        if self.enabled {
            warn!("Interrupt bridge enabled twice, replacing action");
        }
        let signal = Arc::clone(&self.signal);
        chip.set_interrupt_action(Box::new(move || signal.on_rx_interrupt()), trigger);
        self.enabled = true;
    }

    /// Unregister the action. Always issues the clear to the chip, so a
    /// repeated call is harmless.
    pub fn disable<C: LoRaChip>(&mut self, chip: &mut C) {
        chip.clear_interrupt_action();
        self.enabled = false;
    }
}
