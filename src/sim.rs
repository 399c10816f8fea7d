//! Simulated timer and pin for testing on the host.
//!
//! [`SimBench`] hands out a [`SimTimer`] and a [`SimPin`] that share one record of every
//! register-level call, so tests can check ordering and rebuild the output waveform.
#![cfg(feature = "host")]

use std::sync::{Arc, Mutex, MutexGuard};

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::hal::OverflowTimer;
use crate::servo::ServoStatic;
use crate::timing::{Prescaler, overflow_ticks};
use crate::waveform::Phase;
use crate::{Error, Result};

/// One call made on the simulated hardware.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimEvent {
    /// [`OverflowTimer::configure`] with an accepted prescaler.
    Configure(Prescaler),
    /// [`OverflowTimer::set_reload`].
    SetReload(u16),
    /// [`OverflowTimer::start`].
    Start,
    /// [`OverflowTimer::stop`].
    Stop,
    /// [`OverflowTimer::clear_pending`].
    ClearPending,
    /// [`OverflowTimer::enable_interrupt`].
    EnableInterrupt,
    /// [`OverflowTimer::disable_interrupt`].
    DisableInterrupt,
    /// Output pin set high (`true`) or low (`false`).
    Pin(bool),
}

/// An interval the timer ran for, with the output level during it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Segment {
    /// Output level (high = `true`).
    pub high: bool,
    /// Ticks until the overflow that ended the segment.
    pub ticks: u32,
}

#[derive(Debug)]
struct SimState {
    supported: &'static [Prescaler],
    prescaler: Option<Prescaler>,
    reload: u16,
    running: bool,
    pending: bool,
    interrupt_enabled: bool,
    pin_high: bool,
    events: Vec<SimEvent>,
    segments: Vec<Segment>,
}

const ALL_PRESCALERS: &[Prescaler] = &[
    Prescaler::Div1,
    Prescaler::Div2,
    Prescaler::Div4,
    Prescaler::Div8,
    Prescaler::Div16,
    Prescaler::Div32,
];

const TIMER1_PRESCALERS: &[Prescaler] = &[
    Prescaler::Div1,
    Prescaler::Div2,
    Prescaler::Div4,
    Prescaler::Div8,
];

/// Test-side handle onto the simulated hardware.
#[derive(Clone, Debug)]
pub struct SimBench {
    state: Arc<Mutex<SimState>>,
}

impl SimBench {
    /// A timer that accepts every [`Prescaler`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_prescalers(ALL_PRESCALERS)
    }

    /// A timer limited to 1:1..1:8, like an 8-bit part's Timer1.
    #[must_use]
    pub fn timer1() -> Self {
        Self::with_prescalers(TIMER1_PRESCALERS)
    }

    fn with_prescalers(supported: &'static [Prescaler]) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                supported,
                prescaler: None,
                reload: 0,
                running: false,
                pending: false,
                interrupt_enabled: false,
                // Port latches reset high.
                pin_high: true,
                events: Vec::new(),
                segments: Vec::new(),
            })),
        }
    }

    /// The timer half of the bench.
    #[must_use]
    pub fn timer(&self) -> SimTimer {
        SimTimer {
            state: Arc::clone(&self.state),
        }
    }

    /// The pin half of the bench.
    #[must_use]
    pub fn pin(&self) -> SimPin {
        SimPin {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    /// Flag an overflow, as the hardware does when a running counter wraps.
    ///
    /// Returns `false` (and flags nothing) if the timer is stopped.
    pub fn raise_overflow(&self) -> bool {
        let mut state = self.state();
        if state.running {
            state.pending = true;
        }
        state.running
    }

    /// Let the running timer overflow and call the interrupt handler if the interrupt is
    /// enabled. Returns the phase entered.
    pub fn overflow(&self, servo: &ServoStatic<SimTimer, SimPin>) -> Option<Phase> {
        let deliver = self.raise_overflow() && self.interrupt_enabled();
        if deliver { servo.on_overflow() } else { None }
    }

    /// Every call made so far.
    #[must_use]
    pub fn events(&self) -> Vec<SimEvent> {
        self.state().events.clone()
    }

    /// Forget recorded events and segments.
    pub fn clear_log(&self) {
        let mut state = self.state();
        state.events.clear();
        state.segments.clear();
    }

    /// Every interval the timer was started for, in order.
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        self.state().segments.clone()
    }

    /// Current output level.
    #[must_use]
    pub fn pin_high(&self) -> bool {
        self.state().pin_high
    }

    /// Current counter value.
    #[must_use]
    pub fn reload(&self) -> u16 {
        self.state().reload
    }

    /// Whether the timer is counting.
    #[must_use]
    pub fn running(&self) -> bool {
        self.state().running
    }

    /// Whether the overflow flag is set.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.state().pending
    }

    /// Whether overflows raise interrupts.
    #[must_use]
    pub fn interrupt_enabled(&self) -> bool {
        self.state().interrupt_enabled
    }

    /// Prescaler accepted by the last `configure`.
    #[must_use]
    pub fn prescaler(&self) -> Option<Prescaler> {
        self.state().prescaler
    }
}

impl Default for SimBench {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    // A panicking test thread must not hide the log from the others.
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Simulated 16-bit overflow timer.
#[derive(Debug)]
pub struct SimTimer {
    state: Arc<Mutex<SimState>>,
}

impl OverflowTimer for SimTimer {
    fn configure(&mut self, prescaler: Prescaler) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.supported.contains(&prescaler) {
            return Err(Error::UnsupportedPrescaler(prescaler));
        }
        state.running = false;
        state.prescaler = Some(prescaler);
        state.events.push(SimEvent::Configure(prescaler));
        Ok(())
    }

    fn set_reload(&mut self, reload: u16) {
        let mut state = lock(&self.state);
        state.reload = reload;
        state.events.push(SimEvent::SetReload(reload));
    }

    fn start(&mut self) {
        let mut state = lock(&self.state);
        state.running = true;
        let segment = Segment {
            high: state.pin_high,
            ticks: overflow_ticks(state.reload),
        };
        state.segments.push(segment);
        state.events.push(SimEvent::Start);
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        state.running = false;
        state.events.push(SimEvent::Stop);
    }

    fn is_pending(&self) -> bool {
        lock(&self.state).pending
    }

    fn clear_pending(&mut self) {
        let mut state = lock(&self.state);
        state.pending = false;
        state.events.push(SimEvent::ClearPending);
    }

    fn enable_interrupt(&mut self) {
        let mut state = lock(&self.state);
        state.interrupt_enabled = true;
        state.events.push(SimEvent::EnableInterrupt);
    }

    fn disable_interrupt(&mut self) {
        let mut state = lock(&self.state);
        state.interrupt_enabled = false;
        state.events.push(SimEvent::DisableInterrupt);
    }
}

/// Simulated output pin.
#[derive(Debug)]
pub struct SimPin {
    state: Arc<Mutex<SimState>>,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.pin_high = false;
        state.events.push(SimEvent::Pin(false));
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.pin_high = true;
        state.events.push(SimEvent::Pin(true));
        Ok(())
    }
}
