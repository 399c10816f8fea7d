//! Timing constants for the servo signal.
//!
//! Converts calibration values (pulse widths, oscillator frequency, prescaler) into the
//! 16-bit reload values the overflow timer is loaded with. Everything here is `const`, so
//! a configuration can be checked by the compiler:
//!
//! ```rust
//! use timer_servo::timing::{Prescaler, ServoConfig, Timing, overflow_ticks};
//!
//! const CONFIG: ServoConfig = ServoConfig::new()
//!     .with_fosc_hz(48_000_000)
//!     .with_pulse_range(0.0004, 0.0027)
//!     .with_prescaler(Prescaler::Div4);
//! const TIMING: Timing = Timing::validated(CONFIG);
//!
//! assert_eq!(overflow_ticks(TIMING.lead_reload()), 1_200);
//! ```

use crate::hal::Polarity;
use crate::waveform::{Phase, PhaseTable, ReloadPair};
use crate::{Error, Result};

/// Length of one servo frame (50 Hz), seconds.
pub const PERIOD_SECONDS: f32 = 0.02;

/// Number of ticks a 16-bit up-counter takes from zero to overflow.
pub const TIMER_SPAN: u32 = 65_536;

/// Largest commanded angle, degrees.
pub const MAX_DEGREES: i32 = 180;

/// Default oscillator frequency, Hz.
pub const FOSC_HZ_DEFAULT: u32 = 48_000_000;

/// Default pulse width for 0°, seconds.
pub const MIN_PULSE_SECONDS_DEFAULT: f32 = 0.0004;

/// Default pulse width for 180°, seconds.
pub const MAX_PULSE_SECONDS_DEFAULT: f32 = 0.0027;

// ============================================================================
// Prescaler
// ============================================================================

/// Clock divider applied before the timer counts.
///
/// Bigger dividers reduce control resolution but let the 16-bit timer span the long
/// tail phase of the frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    /// 1:1
    Div1,
    /// 1:2
    Div2,
    /// 1:4
    Div4,
    /// 1:8
    Div8,
    /// 1:16
    Div16,
    /// 1:32
    Div32,
}

impl Prescaler {
    /// The integer divider.
    #[must_use]
    pub const fn divider(self) -> u32 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div32 => 32,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Calibration values for one servo.
///
/// Hobby servos measure the pulse width and turn proportionally between 0° and 180°, but
/// most have their own offsets. Calibrate `min_pulse_seconds` (0°) and
/// `max_pulse_seconds` (180°) to match your servo.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ServoConfig {
    /// Oscillator frequency, Hz. The timer counts at `fosc_hz / (4 * prescaler)`.
    pub fosc_hz: u32,
    /// Pulse width for 0°, seconds.
    pub min_pulse_seconds: f32,
    /// Pulse width for 180°, seconds.
    pub max_pulse_seconds: f32,
    /// Timer prescaler.
    pub prescaler: Prescaler,
    /// Output level that means "pulse".
    pub polarity: Polarity,
}

impl ServoConfig {
    /// 48 MHz, 0.4 ms to 2.7 ms, 1:4 prescaler, active-low output.
    ///
    /// The prescaler is 1:4 rather than 1:2 because at 1:2 the 17.3 ms tail needs
    /// 103 800 ticks, more than the 16-bit timer can count.
    pub const DEFAULT: Self = Self {
        fosc_hz: FOSC_HZ_DEFAULT,
        min_pulse_seconds: MIN_PULSE_SECONDS_DEFAULT,
        max_pulse_seconds: MAX_PULSE_SECONDS_DEFAULT,
        prescaler: Prescaler::Div4,
        polarity: Polarity::ActiveLow,
    };

    /// Same as [`ServoConfig::DEFAULT`].
    #[must_use]
    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Set the oscillator frequency.
    #[must_use]
    pub const fn with_fosc_hz(mut self, fosc_hz: u32) -> Self {
        self.fosc_hz = fosc_hz;
        self
    }

    /// Set the pulse widths for 0° and 180°.
    #[must_use]
    pub const fn with_pulse_range(mut self, min_pulse_seconds: f32, max_pulse_seconds: f32) -> Self {
        self.min_pulse_seconds = min_pulse_seconds;
        self.max_pulse_seconds = max_pulse_seconds;
        self
    }

    /// Set the timer prescaler.
    #[must_use]
    pub const fn with_prescaler(mut self, prescaler: Prescaler) -> Self {
        self.prescaler = prescaler;
        self
    }

    /// Set the output polarity.
    #[must_use]
    pub const fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Interval between the 0° and 180° pulse widths, seconds.
    #[must_use]
    pub const fn duty_span_seconds(&self) -> f32 {
        self.max_pulse_seconds - self.min_pulse_seconds
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// Tick arithmetic
// ============================================================================

/// Timer ticks in `seconds`, before truncation. Negative durations give negative ticks.
#[must_use]
pub const fn exact_ticks(seconds: f32, fosc_hz: u32, prescaler: Prescaler) -> f32 {
    fosc_hz as f32 * seconds / (4 * prescaler.divider()) as f32
}

/// Reload value that makes the timer overflow after `seconds`.
///
/// Computes `65536 - fosc * seconds / (4 * prescaler)` truncated to 16 bits. A zero or
/// negative duration gives `0xFFFF` (one tick, the shortest interval a timer can time)
/// rather than wrapping to `0x0000`, which would count the full 65536 ticks. Durations
/// longer than the timer can count saturate at `0x0000`; [`Timing::new`] rejects
/// configurations that would need them.
#[must_use]
pub const fn ticks_for(seconds: f32, fosc_hz: u32, prescaler: Prescaler) -> u16 {
    let ticks = exact_ticks(seconds, fosc_hz, prescaler);
    if ticks.is_nan() || ticks <= 0.0 {
        return u16::MAX;
    }
    let reload = TIMER_SPAN as f32 - ticks;
    if reload >= u16::MAX as f32 {
        u16::MAX
    } else {
        // Negative saturates to 0.
        reload as u16
    }
}

/// Ticks from `reload` until the timer overflows.
#[must_use]
pub const fn overflow_ticks(reload: u16) -> u32 {
    TIMER_SPAN - reload as u32
}

/// Ticks `seconds` occupies once loaded into the timer, see [`ticks_for`].
#[must_use]
pub const fn tick_count(seconds: f32, fosc_hz: u32, prescaler: Prescaler) -> u32 {
    overflow_ticks(ticks_for(seconds, fosc_hz, prescaler))
}

const fn micros(seconds: f32) -> u32 {
    (seconds * 1_000_000.0) as u32
}

// A fixed phase must last at least one tick and at most one full timer span.
const fn check_phase_fits(phase: Phase, seconds: f32, config: &ServoConfig) -> Result<()> {
    let ticks = exact_ticks(seconds, config.fosc_hz, config.prescaler);
    if ticks < 1.0 || ticks > TIMER_SPAN as f32 {
        return Err(Error::PhaseOutOfRange {
            phase,
            ticks: ticks as u32,
        });
    }
    Ok(())
}

// ============================================================================
// Timing
// ============================================================================

/// Validated configuration and the reload values derived from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    config: ServoConfig,
    lead_reload: u16,
    tail_reload: u16,
    duty_span_reload: u16,
    zero_pulse_reload: u16,
}

impl Timing {
    /// Validate `config` and derive the fixed reload values.
    ///
    /// # Errors
    ///
    /// - [`Error::ZeroOscillator`] if `fosc_hz` is zero.
    /// - [`Error::InvalidPulseRange`] unless `0 < min < max` (both finite).
    /// - [`Error::PulseExceedsPeriod`] unless `max < 20 ms`.
    /// - [`Error::PhaseOutOfRange`] if the lead, duty span or tail phase does not fit
    ///   the 16-bit timer (1..=65536 ticks) at this oscillator and prescaler.
    pub const fn new(config: ServoConfig) -> Result<Self> {
        let min = config.min_pulse_seconds;
        let max = config.max_pulse_seconds;
        if config.fosc_hz == 0 {
            return Err(Error::ZeroOscillator);
        }
        if !min.is_finite() || !max.is_finite() || min <= 0.0 || min >= max {
            return Err(Error::InvalidPulseRange {
                min_us: micros(min),
                max_us: micros(max),
            });
        }
        if max >= PERIOD_SECONDS {
            return Err(Error::PulseExceedsPeriod {
                max_us: micros(max),
            });
        }

        if let Err(error) = check_phase_fits(Phase::Lead, min, &config) {
            return Err(error);
        }
        if let Err(error) = check_phase_fits(Phase::Complement, config.duty_span_seconds(), &config) {
            return Err(error);
        }
        if let Err(error) = check_phase_fits(Phase::Tail, PERIOD_SECONDS - max, &config) {
            return Err(error);
        }

        Ok(Self {
            config,
            lead_reload: ticks_for(min, config.fosc_hz, config.prescaler),
            tail_reload: ticks_for(PERIOD_SECONDS - max, config.fosc_hz, config.prescaler),
            duty_span_reload: ticks_for(
                config.duty_span_seconds(),
                config.fosc_hz,
                config.prescaler,
            ),
            zero_pulse_reload: ticks_for(0.0, config.fosc_hz, config.prescaler),
        })
    }

    /// Like [`Timing::new`], but panics on an invalid configuration.
    ///
    /// Use it to initialize a `const`, so a bad calibration fails the build.
    #[must_use]
    pub const fn validated(config: ServoConfig) -> Self {
        match Self::new(config) {
            Ok(timing) => timing,
            Err(_) => panic!("invalid servo timing configuration"),
        }
    }

    /// The configuration these values were derived from.
    #[must_use]
    pub const fn config(&self) -> &ServoConfig {
        &self.config
    }

    /// Reload for the fixed lead-in phase (the 0° pulse width).
    #[must_use]
    pub const fn lead_reload(&self) -> u16 {
        self.lead_reload
    }

    /// Reload for the fixed tail phase that completes the 20 ms frame.
    #[must_use]
    pub const fn tail_reload(&self) -> u16 {
        self.tail_reload
    }

    /// Reload for the full duty span (180° minus 0° pulse width).
    #[must_use]
    pub const fn duty_span_reload(&self) -> u16 {
        self.duty_span_reload
    }

    /// Reload for a zero-length variable pulse.
    #[must_use]
    pub const fn zero_pulse_reload(&self) -> u16 {
        self.zero_pulse_reload
    }

    /// Duration of one timer tick, seconds.
    #[must_use]
    pub const fn tick_seconds(&self) -> f32 {
        (4 * self.config.prescaler.divider()) as f32 / self.config.fosc_hz as f32
    }

    /// Ticks in one 20 ms frame, truncated.
    #[must_use]
    pub const fn period_ticks(&self) -> u32 {
        exact_ticks(PERIOD_SECONDS, self.config.fosc_hz, self.config.prescaler) as u32
    }

    /// Clamp a requested variable pulse to `[0, duty span]`. NaN counts as zero.
    #[must_use]
    pub const fn clamp_pulse_seconds(&self, seconds: f32) -> f32 {
        let span = self.config.duty_span_seconds();
        if seconds.is_nan() || seconds <= 0.0 {
            0.0
        } else if seconds > span {
            span
        } else {
            seconds
        }
    }

    /// Variable pulse width for `degrees`, clamped to `[0, 180]`.
    #[must_use]
    pub const fn angle_seconds(&self, degrees: i32) -> f32 {
        let degrees = if degrees < 0 {
            0
        } else if degrees > MAX_DEGREES {
            MAX_DEGREES
        } else {
            degrees
        };
        (self.config.duty_span_seconds() / MAX_DEGREES as f32) * degrees as f32
    }

    /// Reload pair for the pulse and complement phases, after clamping `seconds`.
    #[must_use]
    pub const fn pulse_pair(&self, seconds: f32) -> ReloadPair {
        let seconds = self.clamp_pulse_seconds(seconds);
        let fosc_hz = self.config.fosc_hz;
        let prescaler = self.config.prescaler;
        ReloadPair {
            start: ticks_for(seconds, fosc_hz, prescaler),
            complement: ticks_for(
                self.config.duty_span_seconds() - seconds,
                fosc_hz,
                prescaler,
            ),
        }
    }

    /// Phase table for the 0° position.
    #[must_use]
    pub const fn initial_table(&self) -> PhaseTable {
        PhaseTable::new(
            self.lead_reload,
            ReloadPair {
                start: self.zero_pulse_reload,
                complement: self.duty_span_reload,
            },
            self.tail_reload,
        )
    }
}
