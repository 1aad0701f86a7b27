//! The clock controller.
//!
//! All mutable state lives in one [`ClockContext`]. Its [`ClockContext::step`]
//! is a pure function of the raw button levels, the monotonic time and the wall
//! clock read for this tick, which makes the whole workflow testable without
//! hardware or real time. [`AlarmClock`] wraps the context with the hardware
//! collaborators and performs the reads and writes around each step.

use chrono::{NaiveDateTime, Timelike};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, InputPin, OutputPin, PinState};
use heapless::Vec;

use crate::alarm::{AlarmButtonOutcome, AlarmEngine};
use crate::debounce::{ButtonBank, ButtonId, ButtonInputs, PressEvent, RawLevels};
use crate::mode::{
    bump_clock_hour, bump_clock_minute, transition, Action, ClockMode, Transition,
};
use crate::render::{compute_display, DisplayFrame, DisplayOutput, Redraw, Renderer};
use crate::time::{MonotonicClock, TimeSource};
use crate::{Config, Error};

/// Everything a tick needs from the outside world.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TickInputs {
    pub levels: RawLevels,
    pub now_ms: u64,
    /// Wall clock read at the start of the tick
    pub now: NaiveDateTime,
}

/// What a tick asks the outside world to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickOutputs {
    pub events: Vec<PressEvent, 4>,
    /// New wall-clock time to write to the time source
    pub time_update: Option<NaiveDateTime>,
    /// New buzzer level
    pub buzzer: Option<bool>,
    pub frame: DisplayFrame,
}

/// The controller state.
#[derive(Clone, Debug)]
pub struct ClockContext {
    buttons: ButtonBank,
    mode: ClockMode,
    alarm: AlarmEngine,
}

impl ClockContext {
    pub fn new(config: &Config) -> Self {
        Self {
            buttons: ButtonBank::new(config.debounce_ms),
            mode: ClockMode::default(),
            alarm: AlarmEngine::new(
                config.initial_alarm,
                config.trigger_policy,
                config.beep_interval_ms,
            ),
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn alarm(&self) -> &AlarmEngine {
        &self.alarm
    }

    pub fn buttons(&self) -> &ButtonBank {
        &self.buttons
    }

    /// Applies one button press.
    ///
    /// Clock changes accumulate in `time_update`, starting from `now`. Returns
    /// the buzzer level when the press changes it.
    pub fn apply(
        &mut self,
        button: ButtonId,
        now: &NaiveDateTime,
        time_update: &mut Option<NaiveDateTime>,
    ) -> Option<bool> {
        let Transition { next, action } = transition(self.mode, button);
        if next != self.mode {
            info!("mode {:?} -> {:?}", self.mode, next);
            self.mode = next;
        }

        let base = time_update.unwrap_or(*now);
        match action {
            Action::None => None,
            Action::BumpClockHour => {
                *time_update = Some(bump_clock_hour(&base));
                None
            }
            Action::BumpClockMinute => {
                *time_update = Some(bump_clock_minute(&base));
                None
            }
            Action::BumpAlarmHour => {
                self.alarm.bump_hour();
                None
            }
            Action::BumpAlarmMinute => {
                self.alarm.bump_minute();
                None
            }
            Action::SilenceOrToggleAlarm => match self.alarm.press() {
                AlarmButtonOutcome::Silenced => Some(false),
                AlarmButtonOutcome::Toggled { .. } => None,
            },
        }
    }

    /// The frame for the current mode at `now`.
    pub fn frame(&self, now: &NaiveDateTime) -> DisplayFrame {
        compute_display(self.mode, now, self.alarm.setting())
    }

    /// One tick: debounce, apply presses, check the alarm, compute the frame.
    pub fn step(&mut self, inputs: &TickInputs) -> TickOutputs {
        let events = self.buttons.poll(inputs.levels, inputs.now_ms);

        let mut time_update = None;
        let mut buzzer = None;
        for event in &events {
            if let Some(level) = self.apply(event.button, &inputs.now, &mut time_update) {
                buzzer = Some(level);
            }
        }

        if let Some(level) = self.alarm.check(&inputs.now, inputs.now_ms) {
            buzzer = Some(level);
        }

        let shown = time_update.unwrap_or(inputs.now);
        TickOutputs {
            frame: self.frame(&shown),
            events,
            time_update,
            buzzer,
        }
    }
}

/// Outcome of [`AlarmClock::tick`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub events: Vec<PressEvent, 4>,
    /// Time written to the time source
    pub time_written: Option<NaiveDateTime>,
    pub buzzer: Option<bool>,
    pub redraw: Redraw,
}

/// The clock with its hardware.
pub struct AlarmClock<T, P, B, D>
where
    T: TimeSource,
    P: InputPin,
    B: OutputPin,
    D: DisplayOutput,
{
    rtc: T,
    inputs: ButtonInputs<P>,
    buzzer: B,
    // Commanded level, and whether the pin is known to be at it.
    buzzer_on: bool,
    buzzer_synced: bool,
    renderer: Renderer<D>,
    context: ClockContext,
    config: Config,
}

impl<T, P, B, D> AlarmClock<T, P, B, D>
where
    T: TimeSource,
    P: InputPin,
    B: OutputPin,
    D: DisplayOutput,
{
    /// Validates the configuration, switches the buzzer off, clears the screen
    /// and initialises the time source.
    ///
    /// # Errors
    ///
    /// A time source that fails to initialise is fatal: the error indicator is
    /// drawn and [`Error::TimeSourceInit`] returned. The caller is expected to
    /// [`halt`].
    pub fn boot(
        mut rtc: T,
        inputs: ButtonInputs<P>,
        mut buzzer: B,
        display: D,
        config: Config,
    ) -> Result<Self, Error<T::Error, D::Error>> {
        config.validate()?;
        buzzer
            .set_low()
            .map_err(|e| Error::Buzzer(e.kind()))?;

        let mut renderer = Renderer::new(display, config.layout);
        renderer.clear().map_err(Error::Display)?;

        if let Err(e) = rtc.init() {
            error!("time source init failed, halting");
            // The indicator is best effort, the init error is what matters.
            let _ = renderer.render_fault();
            return Err(Error::TimeSourceInit(e));
        }
        info!("clock booted, tick {} ms", config.tick_ms);

        Ok(Self {
            rtc,
            inputs,
            buzzer,
            buzzer_on: false,
            buzzer_synced: true,
            renderer,
            context: ClockContext::new(&config),
            config,
        })
    }

    pub fn context(&self) -> &ClockContext {
        &self.context
    }

    pub fn display(&self) -> &D {
        self.renderer.display()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drives the buzzer to `level`, or repeats the last commanded level if
    /// writing it failed before.
    fn drive_buzzer(&mut self, level: Option<bool>) -> Result<(), Error<T::Error, D::Error>> {
        match level {
            Some(on) => self.buzzer_on = on,
            None if self.buzzer_synced => return Ok(()),
            None => {}
        }
        let result = self
            .buzzer
            .set_state(PinState::from(self.buzzer_on))
            .map_err(|e| Error::Buzzer(e.kind()));
        self.buzzer_synced = result.is_ok();
        if result.is_err() {
            warn!("buzzer write failed, retrying next tick");
        }
        result
    }

    /// Runs one tick at monotonic time `now_ms`.
    ///
    /// # Errors
    ///
    /// [`Error::HardwareFault`] when the time source cannot be read, or when a
    /// time change cannot be written. In the latter case the change is dropped
    /// and the screen keeps showing the live clock.
    ///
    /// A failed buzzer or display write does not stop the rest of the tick; the
    /// first failure is returned afterwards, a time write failure first. A
    /// buzzer level that could not be written is retried on every later tick.
    pub fn tick(&mut self, now_ms: u64) -> Result<TickReport, Error<T::Error, D::Error>> {
        let levels = self.inputs.sample().map_err(Error::Input)?;
        let now = self.rtc.now().map_err(Error::HardwareFault)?;

        let outputs = self.context.step(&TickInputs {
            levels,
            now_ms,
            now,
        });

        let buzzer = self.drive_buzzer(outputs.buzzer);

        let mut frame = outputs.frame;
        let mut fault = None;
        if let Some(datetime) = outputs.time_update {
            match self.rtc.set(&datetime) {
                Ok(()) => info!(
                    "time set to {}:{}:{}",
                    datetime.hour(),
                    datetime.minute(),
                    datetime.second()
                ),
                Err(e) => {
                    warn!("time write failed, change dropped");
                    frame = self.context.frame(&now);
                    fault = Some(e);
                }
            }
        }

        let redraw = self.renderer.render(&frame).map_err(Error::Display);

        if let Some(e) = fault {
            return Err(Error::HardwareFault(e));
        }
        buzzer?;
        Ok(TickReport {
            events: outputs.events,
            time_written: outputs.time_update,
            buzzer: outputs.buzzer,
            redraw: redraw?,
        })
    }

    /// Ticks forever, `tick_ms` apart. Tick errors are logged and the loop
    /// carries on.
    pub fn run<M: MonotonicClock, DL: DelayNs>(&mut self, clock: &mut M, delay: &mut DL) -> ! {
        loop {
            if let Err(e) = self.tick(clock.now_millis()) {
                match e {
                    Error::HardwareFault(_) => warn!("tick: time source fault"),
                    Error::Input(_) => warn!("tick: button read failed"),
                    Error::Buzzer(_) => warn!("tick: buzzer write failed"),
                    Error::Display(_) => warn!("tick: display write failed"),
                    _ => warn!("tick failed"),
                }
            }
            delay.delay_ms(self.config.tick_ms);
        }
    }
}

/// Parks forever after a fatal boot error.
pub fn halt<DL: DelayNs>(delay: &mut DL) -> ! {
    loop {
        delay.delay_ms(1000);
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;
    use super::*;
    use crate::alarm::AlarmSetting;
    use crate::debounce::RELEASED;
    use crate::render::tests::RecordingDisplay;
    use crate::render::{Color, FAULT_TEXT};
    use crate::TriggerPolicy;
    use alloc::rc::Rc;
    use alloc::vec::Vec as StdVec;
    use chrono::{NaiveDate, TimeDelta};
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use embedded_hal::digital::{ErrorKind as DigitalErrorKind, ErrorType};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn armed_config() -> Config {
        Config {
            initial_alarm: AlarmSetting::new(7, 0, true),
            ..Config::default()
        }
    }

    fn pressed(buttons: &[ButtonId]) -> RawLevels {
        let mut levels = RELEASED;
        for button in buttons {
            levels[*button as usize] = PinState::Low;
        }
        levels
    }

    /// Holds `buttons` down until the debouncer reports them, then releases.
    /// Returns the outputs of the tick that saw the press.
    fn press(
        ctx: &mut ClockContext,
        buttons: &[ButtonId],
        now_ms: &mut u64,
        now: NaiveDateTime,
    ) -> TickOutputs {
        let mut seen = None;
        for _ in 0..10 {
            let out = ctx.step(&TickInputs {
                levels: pressed(buttons),
                now_ms: *now_ms,
                now,
            });
            *now_ms += 50;
            if !out.events.is_empty() {
                seen = Some(out);
                break;
            }
        }
        for _ in 0..6 {
            let out = ctx.step(&TickInputs {
                levels: RELEASED,
                now_ms: *now_ms,
                now,
            });
            assert!(out.events.is_empty());
            *now_ms += 50;
        }
        seen.expect("press was not recognised")
    }

    #[test]
    fn test_alarm_scenario() {
        let mut ctx = ClockContext::new(&armed_config());
        let mut now_ms = 0;

        let out = ctx.step(&TickInputs {
            levels: RELEASED,
            now_ms,
            now: at(6, 59, 59),
        });
        assert_eq!(out.buzzer, None);
        assert!(!ctx.alarm().is_triggered());

        now_ms = 1000;
        let out = ctx.step(&TickInputs {
            levels: RELEASED,
            now_ms,
            now: at(7, 0, 0),
        });
        assert_eq!(out.buzzer, Some(true));
        assert!(ctx.alarm().is_triggered());

        // The buzzer keeps toggling while nobody reacts.
        let mut edges = StdVec::new();
        for _ in 0..20 {
            now_ms += 50;
            let out = ctx.step(&TickInputs {
                levels: RELEASED,
                now_ms,
                now: at(7, 0, 1),
            });
            if let Some(level) = out.buzzer {
                edges.push(level);
            }
        }
        assert_eq!(edges, [false, true]);
        assert!(ctx.alarm().is_triggered());

        now_ms += 50;
        let out = press(&mut ctx, &[ButtonId::Alarm], &mut now_ms, at(7, 0, 2));
        assert_eq!(out.buzzer, Some(false));
        assert!(!ctx.alarm().is_triggered());
        assert!(ctx.alarm().setting().enabled);
        assert_eq!(ctx.mode(), ClockMode::Normal);
    }

    #[test]
    fn test_set_clock_hour_wraps() {
        let mut ctx = ClockContext::new(&Config::default());
        let mut now_ms = 0;
        let now = at(23, 15, 42);

        let out = press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        assert_eq!(out.time_update, None);
        assert_eq!(ctx.mode(), ClockMode::SetHour);
        assert_eq!(out.frame.status.as_str(), "Set Hour");

        let out = press(&mut ctx, &[ButtonId::Hour], &mut now_ms, now);
        assert_eq!(out.time_update, Some(at(0, 15, 42)));
        // The frame already shows the requested time.
        assert_eq!(out.frame.time.as_str(), "00:15:42");
        assert_eq!(out.frame.time_color, Color::Highlight);
    }

    #[test]
    fn test_set_clock_minute_wraps() {
        let mut ctx = ClockContext::new(&Config::default());
        let mut now_ms = 0;
        let now = at(10, 59, 30);
        press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        assert_eq!(ctx.mode(), ClockMode::SetMinute);

        // Hour is a no-op in SetMinute.
        let out = press(&mut ctx, &[ButtonId::Hour], &mut now_ms, now);
        assert_eq!(out.time_update, None);

        let out = press(&mut ctx, &[ButtonId::Minute], &mut now_ms, now);
        assert_eq!(out.time_update, Some(at(10, 0, 30)));
    }

    #[test]
    fn test_set_alarm_fields() {
        let config = Config {
            initial_alarm: AlarmSetting::new(23, 59, false),
            ..Config::default()
        };
        let mut ctx = ClockContext::new(&config);
        let mut now_ms = 0;
        let now = at(12, 0, 0);
        for _ in 0..3 {
            press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        }
        assert_eq!(ctx.mode(), ClockMode::SetAlarmHour);

        let out = press(&mut ctx, &[ButtonId::Hour], &mut now_ms, now);
        assert_eq!(out.time_update, None);
        assert_eq!(out.frame.time.as_str(), "00:59");
        assert_eq!(out.frame.status.as_str(), "Set Alarm Hour");
        assert_eq!(out.frame.time_color, Color::AlarmHighlight);

        press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        let out = press(&mut ctx, &[ButtonId::Minute], &mut now_ms, now);
        assert_eq!(out.frame.time.as_str(), "00:00");
        assert_eq!(ctx.alarm().setting(), &AlarmSetting::new(0, 0, false));

        // Back to Normal, the summary shows the new setting.
        let out = press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        assert_eq!(ctx.mode(), ClockMode::Normal);
        assert_eq!(out.frame.status.as_str(), "Alarm: 00:00 OFF");

        let out = press(&mut ctx, &[ButtonId::Alarm], &mut now_ms, now);
        assert_eq!(out.buzzer, None);
        assert_eq!(out.frame.status.as_str(), "Alarm: 00:00 ON");
    }

    #[test]
    fn test_simultaneous_presses_apply_in_button_order() {
        let mut ctx = ClockContext::new(&Config::default());
        let mut now_ms = 0;
        let now = at(8, 30, 0);
        press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        assert_eq!(ctx.mode(), ClockMode::SetHour);

        // Hour is applied before Mode moves on to SetMinute.
        let out = press(
            &mut ctx,
            &[ButtonId::Mode, ButtonId::Hour],
            &mut now_ms,
            now,
        );
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.time_update, Some(at(9, 30, 0)));
        assert_eq!(ctx.mode(), ClockMode::SetMinute);
    }

    #[test]
    fn test_catch_up_policy_through_context() {
        let config = Config {
            trigger_policy: TriggerPolicy::CatchUp,
            ..armed_config()
        };
        let mut ctx = ClockContext::new(&config);
        ctx.step(&TickInputs {
            levels: RELEASED,
            now_ms: 0,
            now: at(6, 59, 59),
        });
        // Stalled tick skipped 07:00:00.
        let out = ctx.step(&TickInputs {
            levels: RELEASED,
            now_ms: 2000,
            now: at(7, 0, 1),
        });
        assert_eq!(out.buzzer, Some(true));
    }

    // Hardware fakes for the driver.

    #[derive(Debug, PartialEq)]
    struct SimFault;

    #[derive(Debug)]
    struct SimState {
        now: NaiveDateTime,
        fail_init: bool,
        fail_set: bool,
        writes: StdVec<NaiveDateTime>,
    }

    #[derive(Clone)]
    struct SimRtc(Rc<RefCell<SimState>>);

    impl SimRtc {
        fn new(now: NaiveDateTime) -> Self {
            SimRtc(Rc::new(RefCell::new(SimState {
                now,
                fail_init: false,
                fail_set: false,
                writes: StdVec::new(),
            })))
        }

        fn advance(&self, seconds: i64) {
            self.0.borrow_mut().now += TimeDelta::seconds(seconds);
        }
    }

    impl TimeSource for SimRtc {
        type Error = SimFault;

        fn init(&mut self) -> Result<(), SimFault> {
            if self.0.borrow().fail_init {
                Err(SimFault)
            } else {
                Ok(())
            }
        }

        fn now(&mut self) -> Result<NaiveDateTime, SimFault> {
            Ok(self.0.borrow().now)
        }

        fn set(&mut self, datetime: &NaiveDateTime) -> Result<(), SimFault> {
            let mut state = self.0.borrow_mut();
            if state.fail_set {
                return Err(SimFault);
            }
            state.now = *datetime;
            state.writes.push(*datetime);
            Ok(())
        }
    }

    #[derive(Clone)]
    struct FakePin(Rc<Cell<bool>>);

    impl FakePin {
        fn new(high: bool) -> Self {
            FakePin(Rc::new(Cell::new(high)))
        }
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    /// Output pin whose writes fail while `fail` is set.
    #[derive(Clone)]
    struct FlakyPin {
        high: Rc<Cell<bool>>,
        fail: Rc<Cell<bool>>,
    }

    impl FlakyPin {
        fn new() -> Self {
            FlakyPin {
                high: Rc::new(Cell::new(true)),
                fail: Rc::new(Cell::new(false)),
            }
        }

        fn write(&mut self, high: bool) -> Result<(), DigitalErrorKind> {
            if self.fail.get() {
                return Err(DigitalErrorKind::Other);
            }
            self.high.set(high);
            Ok(())
        }
    }

    impl ErrorType for FlakyPin {
        type Error = DigitalErrorKind;
    }

    impl OutputPin for FlakyPin {
        fn set_low(&mut self) -> Result<(), DigitalErrorKind> {
            self.write(false)
        }

        fn set_high(&mut self) -> Result<(), DigitalErrorKind> {
            self.write(true)
        }
    }

    struct Rig {
        rtc: SimRtc,
        buttons: [FakePin; 4],
        buzzer: FakePin,
    }

    impl Rig {
        fn new(now: NaiveDateTime) -> Self {
            Rig {
                rtc: SimRtc::new(now),
                buttons: [
                    FakePin::new(true),
                    FakePin::new(true),
                    FakePin::new(true),
                    FakePin::new(true),
                ],
                buzzer: FakePin::new(true),
            }
        }

        fn inputs(&self) -> ButtonInputs<FakePin> {
            let [hour, minute, mode, alarm] = self.buttons.clone();
            ButtonInputs::new(hour, minute, mode, alarm)
        }

        fn hold(&self, button: ButtonId, down: bool) {
            self.buttons[button as usize].0.set(!down);
        }
    }

    type TestClock = AlarmClock<SimRtc, FakePin, FakePin, RecordingDisplay>;

    fn boot(rig: &Rig, config: Config) -> TestClock {
        AlarmClock::boot(
            rig.rtc.clone(),
            rig.inputs(),
            rig.buzzer.clone(),
            RecordingDisplay::default(),
            config,
        )
        .unwrap()
    }

    /// Presses `button` through the real tick, starting at `*now_ms`.
    fn click(clock: &mut TestClock, rig: &Rig, button: ButtonId, now_ms: &mut u64) -> TickReport {
        rig.hold(button, true);
        let mut seen = None;
        for _ in 0..10 {
            let report = clock.tick(*now_ms).unwrap();
            *now_ms += 50;
            if !report.events.is_empty() {
                seen = Some(report);
                break;
            }
        }
        rig.hold(button, false);
        seen.expect("press was not recognised")
    }

    #[test]
    fn test_boot_switches_buzzer_off_and_clears() {
        let rig = Rig::new(at(12, 0, 0));
        let clock = boot(&rig, Config::default());
        assert!(!rig.buzzer.0.get());
        assert_eq!(
            clock.display().fills[0],
            (0, 0, 240, 135, Color::Background)
        );
    }

    #[test]
    fn test_boot_failure_shows_indicator() {
        let rig = Rig::new(at(12, 0, 0));
        rig.rtc.0.borrow_mut().fail_init = true;
        let mut display = RecordingDisplay::default();

        let result = AlarmClock::boot(
            rig.rtc.clone(),
            rig.inputs(),
            rig.buzzer.clone(),
            &mut display,
            Config::default(),
        );
        assert!(matches!(result, Err(Error::TimeSourceInit(SimFault))));
        drop(result);
        assert_eq!(display.texts.len(), 1);
        assert_eq!(display.texts[0].0, FAULT_TEXT);
        assert_eq!(display.texts[0].4, Color::Error);
    }

    #[test]
    fn test_boot_rejects_bad_config() {
        let rig = Rig::new(at(12, 0, 0));
        let config = Config {
            tick_ms: 250,
            ..Config::default()
        };
        let result = AlarmClock::boot(
            rig.rtc.clone(),
            rig.inputs(),
            rig.buzzer.clone(),
            RecordingDisplay::default(),
            config,
        );
        assert!(matches!(
            result,
            Err(Error::Config(crate::ConfigError::TickPeriod(250)))
        ));
    }

    #[test]
    fn test_tick_renders_live_clock() {
        let rig = Rig::new(at(9, 41, 0));
        let mut clock = boot(&rig, armed_config());

        let report = clock.tick(0).unwrap();
        assert!(report.redraw.time && report.redraw.status);
        let texts = &clock.display().texts;
        assert_eq!(texts[0].0, "09:41:00");
        assert_eq!(texts[1].0, "Alarm: 07:00 ON");

        // Same second: nothing to redraw.
        assert!(!clock.tick(50).unwrap().redraw.any());

        rig.rtc.advance(1);
        let report = clock.tick(100).unwrap();
        assert!(report.redraw.time);
        assert!(!report.redraw.status);
        assert_eq!(clock.display().texts.last().unwrap().0, "09:41:01");
    }

    #[test]
    fn test_time_write_is_persisted() {
        let rig = Rig::new(at(23, 5, 9));
        let mut clock = boot(&rig, Config::default());
        let mut now_ms = 0;

        click(&mut clock, &rig, ButtonId::Mode, &mut now_ms);
        for _ in 0..5 {
            clock.tick(now_ms).unwrap();
            now_ms += 50;
        }
        let report = click(&mut clock, &rig, ButtonId::Hour, &mut now_ms);
        assert_eq!(report.time_written, Some(at(0, 5, 9)));
        assert_eq!(rig.rtc.0.borrow().writes, [at(0, 5, 9)]);
        assert_eq!(clock.display().texts.last().unwrap().0, "00:05:09");
    }

    #[test]
    fn test_time_write_failure_keeps_state() {
        let rig = Rig::new(at(23, 5, 9));
        let mut clock = boot(&rig, Config::default());
        let mut now_ms = 0;

        click(&mut clock, &rig, ButtonId::Mode, &mut now_ms);
        for _ in 0..5 {
            clock.tick(now_ms).unwrap();
            now_ms += 50;
        }
        assert_eq!(clock.context().mode(), ClockMode::SetHour);

        rig.rtc.0.borrow_mut().fail_set = true;
        rig.hold(ButtonId::Hour, true);
        let mut fault = false;
        for _ in 0..10 {
            if let Err(e) = clock.tick(now_ms) {
                assert!(matches!(e, Error::HardwareFault(SimFault)));
                fault = true;
                break;
            }
            now_ms += 50;
        }
        rig.hold(ButtonId::Hour, false);
        assert!(fault);

        assert_eq!(clock.context().mode(), ClockMode::SetHour);
        assert_eq!(rig.rtc.0.borrow().now, at(23, 5, 9));
        assert!(rig.rtc.0.borrow().writes.is_empty());
        // The live time is still on screen.
        assert!(clock
            .display()
            .texts
            .iter()
            .all(|(text, ..)| text != "00:05:09"));
    }

    #[test]
    fn test_buzzer_write_failure_is_retried() {
        let rig = Rig::new(at(6, 59, 59));
        let buzzer = FlakyPin::new();
        let mut clock = AlarmClock::boot(
            rig.rtc.clone(),
            rig.inputs(),
            buzzer.clone(),
            RecordingDisplay::default(),
            armed_config(),
        )
        .unwrap();

        clock.tick(0).unwrap();
        rig.rtc.advance(1);
        assert_eq!(clock.tick(1000).unwrap().buzzer, Some(true));
        assert!(buzzer.high.get());

        // Enter SetHour while the alarm sounds.
        rig.rtc.advance(1);
        let mut now_ms = 1050;
        rig.hold(ButtonId::Mode, true);
        loop {
            let report = clock.tick(now_ms).unwrap();
            now_ms += 50;
            if !report.events.is_empty() {
                break;
            }
        }
        rig.hold(ButtonId::Mode, false);
        for _ in 0..5 {
            clock.tick(now_ms).unwrap();
            now_ms += 50;
        }
        assert_eq!(clock.context().mode(), ClockMode::SetHour);
        while !buzzer.high.get() {
            clock.tick(now_ms).unwrap();
            now_ms += 50;
        }

        // Silence and bump the hour in one tick while the pin is failing.
        buzzer.fail.set(true);
        rig.hold(ButtonId::Hour, true);
        rig.hold(ButtonId::Alarm, true);
        let mut buzzer_errors = 0;
        for _ in 0..10 {
            match clock.tick(now_ms) {
                Ok(_) => {}
                Err(Error::Buzzer(DigitalErrorKind::Other)) => buzzer_errors += 1,
                Err(e) => panic!("unexpected error {:?}", e),
            }
            now_ms += 50;
            if !clock.context().alarm().is_triggered() {
                break;
            }
        }
        rig.hold(ButtonId::Hour, false);
        rig.hold(ButtonId::Alarm, false);
        assert!(buzzer_errors > 0);
        assert!(!clock.context().alarm().is_triggered());
        assert!(buzzer.high.get());
        // The rest of the tick still ran.
        assert_eq!(rig.rtc.0.borrow().writes, [at(8, 0, 1)]);
        assert_eq!(clock.display().texts.last().unwrap().0, "08:00:01");

        // Still failing: every tick retries and reports it.
        assert!(matches!(clock.tick(now_ms), Err(Error::Buzzer(_))));
        now_ms += 50;

        buzzer.fail.set(false);
        clock.tick(now_ms).unwrap();
        assert!(!buzzer.high.get());
        for _ in 0..20 {
            now_ms += 50;
            clock.tick(now_ms).unwrap();
            assert!(!buzzer.high.get());
        }
    }

    #[test]
    fn test_display_failure_is_reported_and_repainted() {
        let rig = Rig::new(at(9, 41, 0));
        let mut clock = boot(&rig, Config::default());
        clock.renderer.display_mut().fail_draws = 1;

        assert!(matches!(
            clock.tick(0),
            Err(Error::Display(crate::render::tests::DisplayFailed))
        ));
        let report = clock.tick(50).unwrap();
        assert!(report.redraw.time && report.redraw.status);
        assert_eq!(clock.display().texts[0].0, "09:41:00");
    }

    #[test]
    fn test_out_of_range_alarm_setting_wraps() {
        let config = Config {
            initial_alarm: AlarmSetting::new(255, 0, false),
            ..Config::default()
        };
        let mut ctx = ClockContext::new(&config);
        let mut now_ms = 0;
        let now = at(12, 0, 0);
        for _ in 0..3 {
            press(&mut ctx, &[ButtonId::Mode], &mut now_ms, now);
        }
        press(&mut ctx, &[ButtonId::Hour], &mut now_ms, now);
        assert_eq!(ctx.alarm().setting().hour, 16);
    }

    #[test]
    fn test_buzzer_follows_alarm() {
        let rig = Rig::new(at(6, 59, 59));
        let mut clock = boot(&rig, armed_config());

        clock.tick(0).unwrap();
        assert!(!rig.buzzer.0.get());

        rig.rtc.advance(1);
        let report = clock.tick(1000).unwrap();
        assert_eq!(report.buzzer, Some(true));
        assert!(rig.buzzer.0.get());

        clock.tick(1500).unwrap();
        assert!(!rig.buzzer.0.get());
        clock.tick(2000).unwrap();
        assert!(rig.buzzer.0.get());

        rig.rtc.advance(2);
        let mut now_ms = 2050;
        let report = click(&mut clock, &rig, ButtonId::Alarm, &mut now_ms);
        assert_eq!(report.buzzer, Some(false));
        assert!(!rig.buzzer.0.get());
        assert!(!clock.context().alarm().is_triggered());
        assert!(clock.context().alarm().setting().enabled);
    }
}
