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

    // PWM_SLICE7 is only used as a counter; the servo signal is bit-banged on GPIO 11.
    let timer = PwmOverflowTimer::new(p.PWM_SLICE7, 7);
    let config = ServoConfig::new()
        .with_fosc_hz(PwmOverflowTimer::fosc_hz())
        // 125 MHz / 64: the 17.3 ms tail still fits the 16-bit counter.
        .with_prescaler(Prescaler::Div16)
        .with_polarity(Polarity::ActiveHigh);
    let mut servo = SERVO.setup(timer, Output::new(p.PIN_11, Level::Low), config)?;

    servo.set_angle_degrees(0);
    Timer::after_millis(400).await;
    servo.set_angle_degrees(180);
    Timer::after_millis(400).await;
    servo.center();
    Timer::after_millis(400).await;

    // Sweep by 10 degrees. Include 180 degrees.
    for degrees in (0..=180).step_by(10).chain((0..180).step_by(10).rev()).cycle() {
        servo.set_angle_degrees(degrees);
        info!("servo at {} degrees", degrees);
        Timer::after_millis(250).await;
    }

    future::pending().await
}
