#![allow(missing_docs)]
//! Host-level tests for the servo API, measured from the simulated output waveform.

use std::thread;

use timer_servo::Error;
use timer_servo::hal::Polarity;
use timer_servo::servo::ServoStatic;
use timer_servo::sim::{Segment, SimBench, SimEvent, SimPin, SimTimer};
use timer_servo::timing::{Prescaler, ServoConfig, overflow_ticks};
use timer_servo::waveform::Phase;

type SimServo = ServoStatic<SimTimer, SimPin>;

fn phase(servo: &SimServo) -> Phase {
    servo
        .with_waveform(|waveform| waveform.phase())
        .expect("servo is set up")
}

/// Run the simulated timer through the next complete frame and return its segments,
/// Lead first.
fn next_frame(bench: &SimBench, servo: &SimServo) -> [Segment; 4] {
    while phase(servo) != Phase::Tail {
        bench.overflow(servo).expect("overflow delivered");
    }
    for _ in 0..4 {
        bench.overflow(servo).expect("overflow delivered");
    }
    let segments = bench.segments();
    let [.., lead, pulse, complement, tail] = segments[..] else {
        panic!("expected a full frame");
    };
    [lead, pulse, complement, tail]
}

fn active_seconds(frame: &[Segment], active_high: bool, tick_seconds: f32) -> f32 {
    let ticks: u32 = frame
        .iter()
        .filter(|segment| segment.high == active_high)
        .map(|segment| segment.ticks)
        .sum();
    ticks as f32 * tick_seconds
}

fn frame_ticks(frame: &[Segment]) -> u32 {
    frame.iter().map(|segment| segment.ticks).sum()
}

#[test]
fn angles_produce_calibrated_pulse_widths() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let mut servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");
    let tick = servo.timing().tick_seconds();

    for (degrees, expected) in [(0, 0.000_4), (180, 0.002_7), (90, 0.001_55)] {
        servo.set_angle_degrees(degrees);
        let frame = next_frame(&bench, &SERVO);
        let active = active_seconds(&frame, false, tick);
        // Within two ticks of the calibrated width.
        assert!(
            (active - expected).abs() <= 2.0 * tick,
            "{degrees} degrees: {active} s"
        );
        assert!(
            frame_ticks(&frame).abs_diff(servo.timing().period_ticks()) <= 4,
            "{degrees} degrees"
        );
    }
}

#[test]
fn active_high_output_measures_the_same() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let config = ServoConfig::new().with_polarity(Polarity::ActiveHigh);
    let mut servo = SERVO
        .setup(bench.timer(), bench.pin(), config)
        .expect("valid config");
    let tick = servo.timing().tick_seconds();

    servo.center();
    let frame = next_frame(&bench, &SERVO);
    assert!((active_seconds(&frame, true, tick) - 0.001_55).abs() <= 2.0 * tick);
    assert!((servo.pulse_high_seconds() - 0.001_55).abs() < 1e-6);
}

#[test]
fn angle_is_pulse_seconds_scaled_by_span() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let mut servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");
    let span = servo.timing().config().duty_span_seconds();

    for degrees in 0..=180 {
        servo.set_pulse_seconds((span / 180.0) * degrees as f32);
        let by_seconds = servo.pending();
        servo.set_angle_degrees(degrees);
        assert_eq!(servo.pending(), by_seconds, "{degrees} degrees");
    }
}

#[test]
fn out_of_range_commands_are_clamped() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let mut servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");
    let span = servo.timing().config().duty_span_seconds();

    servo.set_pulse_seconds(0.0);
    let zero = servo.pending();
    servo.set_pulse_seconds(-1.0);
    assert_eq!(servo.pending(), zero);
    assert_eq!(servo.pulse_seconds(), 0.0);
    servo.set_angle_degrees(-30);
    assert_eq!(servo.pending(), zero);

    servo.set_pulse_seconds(span);
    let full = servo.pending();
    servo.set_pulse_seconds(span + 1.0);
    assert_eq!(servo.pending(), full);
    assert_eq!(servo.pulse_seconds(), span);
    servo.set_angle_degrees(400);
    assert_eq!(servo.pending(), servo.timing().pulse_pair(servo.timing().angle_seconds(180)));
}

#[test]
fn position_change_mid_pulse_keeps_frame_length() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let mut servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");
    let span_ticks = overflow_ticks(servo.timing().duty_span_reload());

    servo.set_angle_degrees(0);
    assert_eq!(bench.overflow(&SERVO), Some(Phase::Pulse));
    // Command 180 degrees after the 0 degree pulse started.
    servo.set_angle_degrees(180);
    assert_eq!(bench.overflow(&SERVO), Some(Phase::Complement));
    assert_eq!(bench.overflow(&SERVO), Some(Phase::Tail));

    let segments = bench.segments();
    let [.., pulse, complement, _tail] = segments[..] else {
        panic!("expected pulse, complement and tail segments");
    };
    // Mixing the 0 degree start with the 180 degree complement would give two ticks.
    assert!((pulse.ticks + complement.ticks).abs_diff(span_ticks) <= 1);

    let frame = next_frame(&bench, &SERVO);
    let [_, pulse, complement, _] = frame;
    assert!(pulse.ticks.abs_diff(span_ticks) <= 1);
    assert_eq!(complement.ticks, 1);
}

#[test]
fn concurrent_commands_never_tear_a_frame() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let mut servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");
    let span_ticks = overflow_ticks(servo.timing().duty_span_reload());
    let period_ticks = servo.timing().period_ticks();

    let commander = thread::spawn(move || {
        for step in 0..20_000 {
            servo.set_angle_degrees(if step % 2 == 0 { 0 } else { 180 });
        }
    });
    let mut frames = 0;
    while !commander.is_finished() || frames < 200 {
        for _ in 0..4 {
            bench.overflow(&SERVO).expect("overflow delivered");
        }
        frames += 1;
    }
    commander.join().expect("commander thread");

    let segments = bench.segments();
    for frame in segments.chunks_exact(4) {
        let [_, pulse, complement, _] = frame else {
            unreachable!("chunks_exact yields four segments");
        };
        assert!((pulse.ticks + complement.ticks).abs_diff(span_ticks) <= 1);
        assert!(frame_ticks(frame).abs_diff(period_ticks) <= 4);
    }
}

#[test]
fn setup_starts_at_zero_degrees_with_lead_active() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");

    assert_eq!(bench.events(), [
        SimEvent::Stop,
        SimEvent::Configure(Prescaler::Div4),
        SimEvent::ClearPending,
        SimEvent::EnableInterrupt,
        SimEvent::SetReload(servo.timing().lead_reload()),
        SimEvent::Pin(false),
        SimEvent::Start,
    ]);
    assert_eq!(servo.pending(), servo.timing().pulse_pair(0.0));
    assert_eq!(servo.pulse_seconds(), 0.0);
    assert_eq!(phase(&SERVO), Phase::Lead);
}

#[test]
fn second_setup_is_rejected() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let _servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");

    let other = SimBench::new();
    let result = SERVO.setup(other.timer(), other.pin(), ServoConfig::default());
    assert!(matches!(result, Err(Error::AlreadyInitialized)));
    assert!(other.events().is_empty());
    assert!(bench.running());
}

#[test]
fn invalid_config_never_touches_the_timer() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let config = ServoConfig::new().with_pulse_range(0.002, 0.001);

    let result = SERVO.setup(bench.timer(), bench.pin(), config);
    assert!(matches!(result, Err(Error::InvalidPulseRange { .. })));
    assert!(bench.events().is_empty());
    assert!(SERVO.with_waveform(|_| ()).is_none());
}

#[test]
fn unsupported_prescaler_leaves_servo_unset() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::timer1();
    let config = ServoConfig::new()
        .with_fosc_hz(125_000_000)
        .with_prescaler(Prescaler::Div16);

    let result = SERVO.setup(bench.timer(), bench.pin(), config);
    assert!(matches!(
        result,
        Err(Error::UnsupportedPrescaler(Prescaler::Div16))
    ));
    assert!(!bench.running());

    // The statics are still free for a supported configuration.
    let retry = SimBench::timer1();
    let config = ServoConfig::new().with_prescaler(Prescaler::Div8);
    assert!(SERVO.setup(retry.timer(), retry.pin(), config).is_ok());
    assert_eq!(retry.prescaler(), Some(Prescaler::Div8));
}

#[test]
fn failed_setup_hands_back_timer_and_pin() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::timer1();
    let config = ServoConfig::new()
        .with_fosc_hz(125_000_000)
        .with_prescaler(Prescaler::Div16);

    let Err((error, timer, pin)) = SERVO.try_setup(bench.timer(), bench.pin(), config) else {
        panic!("Div16 is not a Timer1 prescaler");
    };
    assert_eq!(error, Error::UnsupportedPrescaler(Prescaler::Div16));

    let bad_range = ServoConfig::new().with_pulse_range(0.0, 0.002);
    let Err((error, timer, pin)) = SERVO.try_setup(timer, pin, bad_range) else {
        panic!("a zero minimum pulse is rejected");
    };
    assert!(matches!(error, Error::InvalidPulseRange { .. }));

    // The same hardware drives the servo once the configuration fits it.
    let config = ServoConfig::new().with_prescaler(Prescaler::Div8);
    let Ok(mut servo) = SERVO.try_setup(timer, pin, config) else {
        panic!("Div8 is a Timer1 prescaler");
    };
    assert!(bench.running());
    assert_eq!(bench.prescaler(), Some(Prescaler::Div8));
    servo.center();
    assert_eq!(bench.overflow(&SERVO), Some(Phase::Pulse));
    assert_eq!(bench.reload(), servo.pending().start);
}

#[test]
fn spurious_interrupt_is_ignored() {
    static SERVO: SimServo = ServoStatic::new();
    assert_eq!(SERVO.on_overflow(), None);

    let bench = SimBench::new();
    let _servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");
    bench.clear_log();

    assert_eq!(SERVO.on_overflow(), None);
    assert!(bench.events().is_empty());
    assert_eq!(phase(&SERVO), Phase::Lead);
}

#[test]
fn disable_parks_output_and_enable_resumes() {
    static SERVO: SimServo = ServoStatic::new();
    let bench = SimBench::new();
    let mut servo = SERVO
        .setup(bench.timer(), bench.pin(), ServoConfig::default())
        .expect("default config is valid");
    let tick = servo.timing().tick_seconds();

    servo.set_angle_degrees(180);
    bench.overflow(&SERVO).expect("overflow delivered");
    servo.disable();
    assert!(!bench.running());
    assert!(bench.pin_high());
    assert_eq!(bench.overflow(&SERVO), None);
    assert_eq!(SERVO.on_overflow(), None);

    servo.enable().expect("prescaler supported");
    assert!(bench.running());
    assert_eq!(phase(&SERVO), Phase::Lead);
    let frame = next_frame(&bench, &SERVO);
    assert!((active_seconds(&frame, false, tick) - 0.002_7).abs() <= 2.0 * tick);
}
