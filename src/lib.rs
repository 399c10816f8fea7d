//! A single hobby-servo control signal generated from one 16-bit overflow timer.
//!
//! The signal is a 50 Hz pulse train built from four timer phases. Each overflow interrupt
//! advances a small state machine that reloads the timer and toggles one output pin, so
//! the application only publishes a position and never touches the hardware again.
//!
//! See [`servo::ServoStatic`] for a usage example.
//!
//! # Glossary
//!
//! - **Reload value:** the value written into a free-running up-counter so that it
//!   overflows (and interrupts) after `65536 - reload` ticks.
//! - **Prescaler:** a clock divider applied before the timer counts.
//! - **Phase:** one of the four sub-intervals of a 20 ms period, bounded by interrupts.
//! - **Duty span:** maximum pulse width minus minimum pulse width; the range of the
//!   variable part of the pulse.
#![cfg_attr(not(feature = "host"), no_std)]
#![cfg_attr(not(feature = "host"), no_main)]

// Compile-time checks: exactly one board must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "pico1", feature = "pico2")), not(feature = "host")))]
compile_error!("Must enable exactly one board feature: 'pico1' or 'pico2'");

#[cfg(all(feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

#[cfg(all(any(feature = "pico1", feature = "pico2"), not(feature = "arm")))]
compile_error!("Board features require the 'arm' architecture feature");

// Must come first so the logging macros are visible to the modules below.
mod fmt;

mod error;
pub mod hal;
#[cfg(any(feature = "pico1", feature = "pico2"))]
pub mod rp_timer;
pub mod servo;
#[cfg(feature = "host")]
pub mod sim;
pub mod timing;
pub mod waveform;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
