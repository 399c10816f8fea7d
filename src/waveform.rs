//! The four-phase state machine that runs inside the timer overflow interrupt.
//!
//! One 20 ms frame is split into four timer phases:
//!
//! | Phase          | Length                    | Output   |
//! |----------------|---------------------------|----------|
//! | [`Phase::Lead`]       | 0° pulse width (fixed)    | active   |
//! | [`Phase::Pulse`]      | commanded pulse           | active   |
//! | [`Phase::Complement`] | duty span minus pulse     | inactive |
//! | [`Phase::Tail`]       | 20 ms minus 180° width (fixed) | inactive |
//!
//! `Pulse + Complement` always equals the duty span, so the frame stays 20 ms long
//! whatever the commanded position.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use portable_atomic::{AtomicU32, Ordering};

use crate::Result;
use crate::hal::{OverflowTimer, Polarity};
use crate::timing::{Prescaler, Timing, overflow_ticks};

// ============================================================================
// Phase
// ============================================================================

/// One of the four sub-intervals of a frame, each ended by an overflow interrupt.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Fixed lead time at the start of the pulse.
    Lead,
    /// Commanded part of the pulse.
    Pulse,
    /// Rest of the duty span after the pulse ends.
    Complement,
    /// Fixed tail completing the 20 ms frame.
    Tail,
}

/// Output level entered at each phase, in phase order.
pub const PIN_LEVELS: [bool; 4] = [
    Phase::Lead.drives_active(),
    Phase::Pulse.drives_active(),
    Phase::Complement.drives_active(),
    Phase::Tail.drives_active(),
];

impl Phase {
    /// All phases in frame order.
    pub const ALL: [Self; 4] = [Self::Lead, Self::Pulse, Self::Complement, Self::Tail];

    /// The phase after this one, wrapping from [`Phase::Tail`] to [`Phase::Lead`].
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Lead => Self::Pulse,
            Self::Pulse => Self::Complement,
            Self::Complement => Self::Tail,
            Self::Tail => Self::Lead,
        }
    }

    /// Position of this phase in the frame, 0..=3.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Lead => 0,
            Self::Pulse => 1,
            Self::Complement => 2,
            Self::Tail => 3,
        }
    }

    /// Whether the output is active while this phase is timed.
    #[must_use]
    pub const fn drives_active(self) -> bool {
        matches!(self, Self::Lead | Self::Pulse)
    }
}

// ============================================================================
// Reload pair and phase table
// ============================================================================

/// Reload values for the two variable phases.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReloadPair {
    /// Reload for [`Phase::Pulse`].
    pub start: u16,
    /// Reload for [`Phase::Complement`].
    pub complement: u16,
}

impl ReloadPair {
    /// Pack into one word so the pair can be published with a single store.
    #[must_use]
    pub const fn pack(self) -> u32 {
        ((self.start as u32) << 16) | self.complement as u32
    }

    /// Inverse of [`ReloadPair::pack`].
    #[must_use]
    pub const fn unpack(word: u32) -> Self {
        Self {
            start: (word >> 16) as u16,
            complement: (word & 0xFFFF) as u16,
        }
    }

    /// Ticks covered by both phases together.
    #[must_use]
    pub const fn total_ticks(self) -> u32 {
        overflow_ticks(self.start) + overflow_ticks(self.complement)
    }
}

/// Reload values for all four phases.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PhaseTable {
    lead: u16,
    pulse: ReloadPair,
    tail: u16,
}

impl PhaseTable {
    /// Table from the fixed lead and tail reloads and a variable pair.
    #[must_use]
    pub const fn new(lead: u16, pulse: ReloadPair, tail: u16) -> Self {
        Self { lead, pulse, tail }
    }

    /// Reload value for `phase`.
    #[must_use]
    pub const fn reload(&self, phase: Phase) -> u16 {
        match phase {
            Phase::Lead => self.lead,
            Phase::Pulse => self.pulse.start,
            Phase::Complement => self.pulse.complement,
            Phase::Tail => self.tail,
        }
    }

    /// The variable pair currently in the table.
    #[must_use]
    pub const fn pulse(&self) -> ReloadPair {
        self.pulse
    }

    /// Replace the variable pair. The fixed slots never change.
    pub const fn latch(&mut self, pulse: ReloadPair) {
        self.pulse = pulse;
    }

    /// Ticks in one frame built from this table.
    #[must_use]
    pub const fn total_ticks(&self) -> u32 {
        overflow_ticks(self.lead) + self.pulse.total_ticks() + overflow_ticks(self.tail)
    }
}

// ============================================================================
// Pending position
// ============================================================================

/// The commanded reload pair, shared between application code and the interrupt.
///
/// Both reloads travel in one atomic word, so the interrupt can never observe a start
/// value from one command and a complement from another.
#[derive(Debug)]
pub struct PulseSlots {
    pending: AtomicU32,
}

impl PulseSlots {
    /// Slots holding `pair`.
    #[must_use]
    pub const fn new(pair: ReloadPair) -> Self {
        Self {
            pending: AtomicU32::new(pair.pack()),
        }
    }

    /// Publish a new pair. The interrupt picks it up when it next enters
    /// [`Phase::Pulse`].
    pub fn publish(&self, pair: ReloadPair) {
        self.pending.store(pair.pack(), Ordering::Release);
    }

    /// The most recently published pair.
    #[must_use]
    pub fn snapshot(&self) -> ReloadPair {
        ReloadPair::unpack(self.pending.load(Ordering::Acquire))
    }
}

// ============================================================================
// Waveform
// ============================================================================

/// Waveform generator: owns the timer, the output pin and the phase cursor.
///
/// Call [`start`](Self::start) once, then [`advance`](Self::advance) from every overflow
/// interrupt.
pub struct Waveform<T, P> {
    timer: T,
    pin: P,
    polarity: Polarity,
    prescaler: Prescaler,
    phase: Phase,
    table: PhaseTable,
}

impl<T, P> Waveform<T, P>
where
    T: OverflowTimer,
    P: OutputPin<Error = Infallible>,
{
    /// Generator parked at the 0° position. Nothing touches the hardware until
    /// [`start`](Self::start).
    #[must_use]
    pub const fn new(timer: T, pin: P, timing: &Timing) -> Self {
        Self {
            timer,
            pin,
            polarity: timing.config().polarity,
            prescaler: timing.config().prescaler,
            phase: Phase::Lead,
            table: timing.initial_table(),
        }
    }

    /// Configure the timer and begin the frame at [`Phase::Lead`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedPrescaler`] if the timer cannot use the
    /// configured prescaler. The timer is left stopped.
    pub fn start(&mut self) -> Result<()> {
        self.timer.stop();
        self.timer.configure(self.prescaler)?;
        self.timer.clear_pending();
        self.timer.enable_interrupt();
        self.phase = Phase::Lead;
        self.timer.set_reload(self.table.reload(Phase::Lead));
        self.drive(Phase::Lead.drives_active());
        self.timer.start();
        Ok(())
    }

    /// Move to the next phase. Runs inside the overflow interrupt.
    ///
    /// The reload must be written while the timer is stopped, and the flag cleared and
    /// interrupt re-enabled only once the new reload is committed.
    pub fn advance(&mut self, slots: &PulseSlots) -> Phase {
        self.phase = self.phase.next();
        self.timer.stop();

        // Slots 1 and 2 of one frame come from a single published pair.
        if self.phase == Phase::Pulse {
            self.table.latch(slots.snapshot());
        }
        self.timer.set_reload(self.table.reload(self.phase));

        self.drive(self.phase.drives_active());
        self.timer.clear_pending();
        self.timer.enable_interrupt();
        self.timer.start();
        trace!("servo phase {}", self.phase.index());
        self.phase
    }

    /// Stop the signal and park the output inactive.
    pub fn halt(&mut self) {
        self.timer.stop();
        self.timer.disable_interrupt();
        self.timer.clear_pending();
        self.drive(false);
    }

    /// Whether the timer has flagged an overflow.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// The phase currently being timed.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Reload values in use for the current frame.
    #[must_use]
    pub const fn table(&self) -> &PhaseTable {
        &self.table
    }

    /// Give back the timer and pin.
    #[must_use]
    pub fn release(self) -> (T, P) {
        (self.timer, self.pin)
    }

    fn drive(&mut self, active: bool) {
        let Ok(()) = self.pin.set_state(self.polarity.level(active));
    }
}
