//! Error and result types shared across the crate.

use crate::timing::Prescaler;
use crate::waveform::Phase;

/// Errors reported by servo setup and configuration.
///
/// Runtime position requests never fail; they are clamped. Everything here is detected
/// before the timer is started.
#[derive(Clone, Copy, Debug, PartialEq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The oscillator frequency is zero.
    #[display("oscillator frequency must be non-zero")]
    ZeroOscillator,

    /// The minimum pulse width is not positive, not finite, or not below the maximum.
    #[display("invalid pulse range: min {min_us} us, max {max_us} us")]
    InvalidPulseRange {
        /// Configured minimum pulse width, microseconds.
        min_us: u32,
        /// Configured maximum pulse width, microseconds.
        max_us: u32,
    },

    /// The maximum pulse width does not leave room for the rest of the 20 ms period.
    #[display("max pulse {max_us} us does not fit the 20 ms period")]
    PulseExceedsPeriod {
        /// Configured maximum pulse width, microseconds.
        max_us: u32,
    },

    /// A phase needs more ticks than the 16-bit timer can count, or none at all.
    #[display("phase {phase:?} needs {ticks} ticks, timer counts 1..=65536")]
    PhaseOutOfRange {
        /// The offending phase.
        phase: Phase,
        /// Ticks the phase would need.
        ticks: u32,
    },

    /// The timer backend cannot divide its clock by this prescaler.
    #[display("unsupported prescaler {_0:?}")]
    UnsupportedPrescaler(#[error(not(source))] Prescaler),

    /// `setup` was already called on these static resources.
    #[display("servo already initialized")]
    AlreadyInitialized,

    /// The servo has not been set up yet.
    #[display("servo not initialized")]
    NotInitialized,
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
