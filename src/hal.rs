//! Hardware capabilities the waveform generator needs.
//!
//! One 16-bit up-counting timer with an overflow interrupt ([`OverflowTimer`]) and one
//! digital output ([`embedded_hal::digital::OutputPin`]). Any platform that can provide
//! both can host the servo signal.

use embedded_hal::digital::PinState;

use crate::Result;
use crate::timing::Prescaler;

/// A 16-bit timer that counts up from a reload value and interrupts on overflow.
///
/// The timer overflows `65536 - reload` ticks after [`start`](Self::start). Only the
/// waveform generator calls these methods, from setup and from the overflow interrupt.
pub trait OverflowTimer {
    /// Select the internal clock, `prescaler`, 16-bit mode and no external sync.
    ///
    /// Leaves the timer stopped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedPrescaler`] if the hardware cannot divide by
    /// `prescaler`.
    fn configure(&mut self, prescaler: Prescaler) -> Result<()>;

    /// Write the counter. Only called while stopped.
    fn set_reload(&mut self, reload: u16);

    /// Start counting.
    fn start(&mut self);

    /// Stop counting. The counter keeps its value.
    fn stop(&mut self);

    /// Whether the overflow flag is set.
    fn is_pending(&self) -> bool;

    /// Clear the overflow flag.
    fn clear_pending(&mut self);

    /// Let the overflow flag raise an interrupt.
    fn enable_interrupt(&mut self);

    /// Stop the overflow flag from raising an interrupt.
    fn disable_interrupt(&mut self);
}

/// Which output level means "pulse".
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// Pulse drives the pin high. Use this for a servo wired straight to the pin.
    ActiveHigh,
    /// Pulse drives the pin low, for an inverting buffer between pin and servo.
    #[default]
    ActiveLow,
}

impl Polarity {
    /// Pin level for an active (`true`) or inactive (`false`) output.
    #[must_use]
    pub const fn level(self, active: bool) -> PinState {
        match (self, active) {
            (Self::ActiveHigh, true) | (Self::ActiveLow, false) => PinState::High,
            (Self::ActiveHigh, false) | (Self::ActiveLow, true) => PinState::Low,
        }
    }
}
