//! An [`OverflowTimer`] built from an RP2040/RP2350 PWM slice.
//!
//! The slice counts `0..=0xFFFF` with no output, so writing the counter acts as the reload
//! value and the slice's wrap interrupt acts as the overflow interrupt. The divider is
//! `4 * prescaler`, which makes `clk_sys` the oscillator frequency for the timing
//! constants (see [`PwmOverflowTimer::fosc_hz`]).
//!
//! # Example
//!
//! ```rust,no_run
//! # #![no_std]
//! # #![no_main]
//! use embassy_rp::gpio::{Level, Output};
//! use timer_servo::rp_timer::PwmOverflowTimer;
//! use timer_servo::servo::ServoStatic;
//! use timer_servo::timing::{Prescaler, ServoConfig};
//! # #[panic_handler]
//! # fn panic(_info: &core::panic::PanicInfo) -> ! { loop {} }
//!
//! static SERVO: ServoStatic<PwmOverflowTimer<'static>, Output<'static>> = ServoStatic::new();
//!
//! fn example(p: embassy_rp::Peripherals) -> timer_servo::Result<()> {
//!     // PWM_SLICE2 only counts; its pins stay free.
//!     let timer = PwmOverflowTimer::new(p.PWM_SLICE2, 2);
//!     let config = ServoConfig::new()
//!         .with_fosc_hz(PwmOverflowTimer::fosc_hz())
//!         .with_prescaler(Prescaler::Div16);
//!     let mut servo = SERVO.setup(timer, Output::new(p.PIN_11, Level::Low), config)?;
//!     servo.set_angle_degrees(45);
//!     Ok(())
//! }
//! ```

use embassy_rp::Peri;
use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::interrupt::typelevel::Interrupt;
use embassy_rp::pac;
use embassy_rp::pwm::{Config, Pwm, Slice};

use crate::hal::OverflowTimer;
use crate::timing::Prescaler;
use crate::{Error, Result};

/// The interrupt shared by every PWM slice's wrap flag. Bind it to a handler that calls
/// [`ServoStatic::on_overflow`](crate::servo::ServoStatic::on_overflow).
#[cfg(feature = "pico1")]
pub type WrapInterrupt = embassy_rp::interrupt::typelevel::PWM_IRQ_WRAP;

/// The interrupt shared by every PWM slice's wrap flag. Bind it to a handler that calls
/// [`ServoStatic::on_overflow`](crate::servo::ServoStatic::on_overflow).
#[cfg(feature = "pico2")]
pub type WrapInterrupt = embassy_rp::interrupt::typelevel::PWM_IRQ_WRAP_0;

/// A PWM slice used as a 16-bit overflow timer.
pub struct PwmOverflowTimer<'d> {
    pwm: Pwm<'d>,
    slice: usize,
    config: Config,
}

impl<'d> PwmOverflowTimer<'d> {
    /// Take a PWM slice; `slice` is its number (`PWM_SLICE2` is `2`).
    ///
    /// The slice is left stopped and its wrap interrupt unmasked in the NVIC.
    #[must_use]
    pub fn new<S: Slice>(pwm_slice: Peri<'d, S>, slice: usize) -> Self {
        let mut config = Config::default();
        config.top = u16::MAX;
        config.phase_correct = false;
        config.enable = false;
        let pwm = Pwm::new_free(pwm_slice, config.clone());

        WrapInterrupt::unpend();
        #[expect(unsafe_code, reason = "the wrap handler only touches servo statics")]
        // SAFETY: the bound handler locks the servo state through a critical section.
        unsafe {
            WrapInterrupt::enable();
        }

        Self { pwm, slice, config }
    }

    /// The frequency to configure the servo with: `clk_sys`, Hz.
    #[must_use]
    pub fn fosc_hz() -> u32 {
        clk_sys_freq()
    }

    fn set_enabled(&self, enabled: bool) {
        pac::PWM
            .ch(self.slice)
            .csr()
            .modify(|w| w.set_en(enabled));
    }

    fn set_interrupt(&self, enabled: bool) {
        #[cfg(feature = "pico1")]
        pac::PWM.inte().modify(|w| w.set_ch(self.slice, enabled));
        #[cfg(feature = "pico2")]
        pac::PWM.irq0_inte().modify(|w| w.set_ch(self.slice, enabled));
    }
}

impl OverflowTimer for PwmOverflowTimer<'_> {
    fn configure(&mut self, prescaler: Prescaler) -> Result<()> {
        // The integer part of the divider is 8 bits wide.
        let divider = u8::try_from(4 * prescaler.divider())
            .map_err(|_| Error::UnsupportedPrescaler(prescaler))?;
        self.config.divider = divider.into();
        self.config.enable = false;
        self.pwm.set_config(&self.config);
        debug!("servo pwm slice {} divider {}", self.slice, divider);
        Ok(())
    }

    fn set_reload(&mut self, reload: u16) {
        self.pwm.set_counter(reload);
    }

    fn start(&mut self) {
        self.set_enabled(true);
    }

    fn stop(&mut self) {
        self.set_enabled(false);
    }

    fn is_pending(&self) -> bool {
        pac::PWM.intr().read().ch(self.slice)
    }

    fn clear_pending(&mut self) {
        self.pwm.clear_wrapped();
    }

    fn enable_interrupt(&mut self) {
        self.set_interrupt(true);
    }

    fn disable_interrupt(&mut self) {
        self.set_interrupt(false);
    }
}
