#![allow(missing_docs)]
#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, future, panic};
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::interrupt::typelevel::{Handler, PWM_IRQ_WRAP};
use embassy_time::Timer;
use timer_servo::{
    Result,
    hal::Polarity,
    rp_timer::PwmOverflowTimer,
    servo::ServoStatic,
    timing::{Prescaler, ServoConfig},
};
use {defmt::info, defmt_rtt as _, panic_probe as _};

static SERVO: ServoStatic<PwmOverflowTimer<'static>, Output<'static>> = ServoStatic::new();

struct ServoWrap;

impl Handler<PWM_IRQ_WRAP> for ServoWrap {
    #[expect(unsafe_code, reason = "interrupt handlers are unsafe to call")]
    unsafe fn on_interrupt() {
        SERVO.on_overflow();
    }
}

bind_interrupts!(struct Irqs {
    PWM_IRQ_WRAP => ServoWrap;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    // An SG90 calibrated to 0.5 ms .. 2.5 ms instead of the 0.4 ms .. 2.7 ms default.
    let timer = PwmOverflowTimer::new(p.PWM_SLICE7, 7);
    let config = ServoConfig::new()
        .with_fosc_hz(PwmOverflowTimer::fosc_hz())
        .with_pulse_range(0.0005, 0.0025)
        .with_prescaler(Prescaler::Div16)
        .with_polarity(Polarity::ActiveHigh);
    let mut servo = SERVO.setup(timer, Output::new(p.PIN_11, Level::Low), config)?;

    // Step the variable part of the pulse through 0, 0.5, 1.0, 1.5, 2.0 ms, then relax.
    for step in 0..=4u8 {
        servo.set_pulse_seconds(f32::from(step) * 0.0005);
        info!("servo high for {} s", servo.pulse_high_seconds());
        Timer::after_millis(500).await;
    }
    servo.disable();
    Timer::after_secs(2).await;
    servo.enable()?;

    // Out-of-range requests clamp to the end stops.
    servo.set_pulse_seconds(-1.0);
    Timer::after_millis(500).await;
    servo.set_pulse_seconds(1.0);

    future::pending().await
}
