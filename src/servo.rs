//! A device abstraction for a hobby servo driven by one overflow timer.
//!
//! See [`ServoStatic`] for usage.

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::digital::OutputPin;

use crate::hal::OverflowTimer;
use crate::timing::{MAX_DEGREES, ServoConfig, Timing};
use crate::waveform::{Phase, PulseSlots, ReloadPair, Waveform};
use crate::{Error, Result};

/// Static resources for one servo: the commanded position and the waveform generator.
///
/// Place it in a `static`, call [`setup`](Self::setup) once, and call
/// [`on_overflow`](Self::on_overflow) from the timer's overflow interrupt.
///
/// # Example
///
/// ```rust
/// use timer_servo::servo::ServoStatic;
/// use timer_servo::sim::{SimBench, SimPin, SimTimer};
/// use timer_servo::timing::ServoConfig;
///
/// static SERVO: ServoStatic<SimTimer, SimPin> = ServoStatic::new();
///
/// // In the overflow interrupt handler:
/// fn on_timer_overflow() {
///     SERVO.on_overflow();
/// }
///
/// # fn main() -> timer_servo::Result<()> {
/// let bench = SimBench::new();
/// let mut servo = SERVO.setup(bench.timer(), bench.pin(), ServoConfig::default())?;
/// servo.set_angle_degrees(90);
/// # bench.raise_overflow();
/// # on_timer_overflow();
/// # Ok(())
/// # }
/// ```
pub struct ServoStatic<T, P> {
    slots: PulseSlots,
    waveform: Mutex<CriticalSectionRawMutex, RefCell<Option<Waveform<T, P>>>>,
}

impl<T, P> ServoStatic<T, P> {
    /// Empty resources, usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: PulseSlots::new(ReloadPair {
                start: u16::MAX,
                complement: u16::MAX,
            }),
            waveform: Mutex::new(RefCell::new(None)),
        }
    }

    /// The most recently published reload pair.
    #[must_use]
    pub fn pending(&self) -> ReloadPair {
        self.slots.snapshot()
    }
}

impl<T, P> Default for ServoStatic<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P> ServoStatic<T, P>
where
    T: OverflowTimer + 'static,
    P: OutputPin<Error = Infallible> + 'static,
{
    /// Validate `config`, take the timer and pin, and start the signal at 0°.
    ///
    /// Runs with interrupts disabled. The signal is generated autonomously from here on.
    ///
    /// # Errors
    ///
    /// - Any configuration error from [`Timing::new`], reported before the timer is
    ///   touched.
    /// - [`Error::UnsupportedPrescaler`] if the timer rejects the prescaler.
    /// - [`Error::AlreadyInitialized`] if called a second time.
    pub fn setup(&'static self, timer: T, pin: P, config: ServoConfig) -> Result<Servo<T, P>> {
        self.try_setup(timer, pin, config)
            .map_err(|(error, _timer, _pin)| error)
    }

    /// Like [`setup`](Self::setup), but a failure hands the timer and pin back, so the
    /// caller can retry with another configuration.
    ///
    /// # Errors
    ///
    /// The same errors as [`setup`](Self::setup), paired with the unused timer and pin.
    pub fn try_setup(
        &'static self,
        timer: T,
        pin: P,
        config: ServoConfig,
    ) -> core::result::Result<Servo<T, P>, (Error, T, P)> {
        let timing = match Timing::new(config) {
            Ok(timing) => timing,
            Err(error) => return Err((error, timer, pin)),
        };
        info!(
            "servo setup: lead={=u16} tail={=u16} span={=u16} tick={}s",
            timing.lead_reload(),
            timing.tail_reload(),
            timing.duty_span_reload(),
            timing.tick_seconds()
        );

        self.waveform.lock(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_some() {
                return Err((Error::AlreadyInitialized, timer, pin));
            }
            self.slots.publish(timing.pulse_pair(0.0));
            let mut waveform = Waveform::new(timer, pin, &timing);
            if let Err(error) = waveform.start() {
                let (timer, pin) = waveform.release();
                return Err((error, timer, pin));
            }
            *slot = Some(waveform);
            Ok(())
        })?;

        Ok(Servo {
            resources: self,
            timing,
            pulse_seconds: 0.0,
        })
    }

    /// Interrupt handler body: advance the waveform one phase.
    ///
    /// Returns the phase entered, or `None` if the servo is not set up or its timer has
    /// not flagged an overflow (for example when the interrupt line is shared).
    pub fn on_overflow(&self) -> Option<Phase> {
        self.waveform.lock(|cell| {
            let mut slot = cell.borrow_mut();
            let waveform = slot.as_mut()?;
            if !waveform.is_pending() {
                return None;
            }
            Some(waveform.advance(&self.slots))
        })
    }

    /// Run `f` on the waveform generator, if set up.
    pub fn with_waveform<R>(&self, f: impl FnOnce(&mut Waveform<T, P>) -> R) -> Option<R> {
        self.waveform
            .lock(|cell| cell.borrow_mut().as_mut().map(f))
    }
}

/// Handle for positioning a servo, returned by [`ServoStatic::setup`].
///
/// Position changes are published to the interrupt and take effect at the start of the
/// next pulse, within one 20 ms frame.
pub struct Servo<T: 'static, P: 'static> {
    resources: &'static ServoStatic<T, P>,
    timing: Timing,
    pulse_seconds: f32,
}

impl<T, P> Servo<T, P>
where
    T: OverflowTimer + 'static,
    P: OutputPin<Error = Infallible> + 'static,
{
    /// Set the variable part of the pulse, seconds.
    ///
    /// Out-of-range values are clamped to `[0, max - min]`. The output stays active for
    /// the 0° pulse width plus this.
    pub fn set_pulse_seconds(&mut self, seconds: f32) {
        let seconds = self.timing.clamp_pulse_seconds(seconds);
        let pair = self.timing.pulse_pair(seconds);
        self.pulse_seconds = seconds;
        self.resources.slots.publish(pair);
        debug!(
            "servo pulse {}s -> start={=u16} complement={=u16}",
            seconds,
            pair.start,
            pair.complement
        );
    }

    /// Set the position in degrees, clamped to `0..=180`.
    pub fn set_angle_degrees(&mut self, degrees: i32) {
        self.set_pulse_seconds(self.timing.angle_seconds(degrees));
    }

    /// Move to 90°.
    pub fn center(&mut self) {
        self.set_angle_degrees(MAX_DEGREES / 2);
    }

    /// Last commanded variable pulse, seconds, after clamping.
    #[must_use]
    pub const fn pulse_seconds(&self) -> f32 {
        self.pulse_seconds
    }

    /// Total time the output is active per frame for the last command, seconds.
    #[must_use]
    pub const fn pulse_high_seconds(&self) -> f32 {
        self.timing.config().min_pulse_seconds + self.pulse_seconds
    }

    /// The reload pair the interrupt will use from the next pulse on.
    #[must_use]
    pub fn pending(&self) -> ReloadPair {
        self.resources.pending()
    }

    /// Validated timing constants.
    #[must_use]
    pub const fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Stop sending control pulses; the output is parked inactive.
    ///
    /// This lets the servo relax. The commanded position is kept.
    pub fn disable(&mut self) {
        self.resources.with_waveform(Waveform::halt);
        info!("servo disabled");
    }

    /// Resume the signal from the start of a frame at the last commanded position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the waveform is missing, or the timer's
    /// configuration error.
    pub fn enable(&mut self) -> Result<()> {
        self.resources
            .with_waveform(Waveform::start)
            .ok_or(Error::NotInitialized)??;
        info!("servo enabled");
        Ok(())
    }
}
