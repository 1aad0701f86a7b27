//! Display contents and redraw dispatch.
//!
//! [`compute_display`] turns the mode, the clock and the alarm setting into a
//! [`DisplayFrame`]. The [`Renderer`] remembers what it drew last and only
//! redraws a region whose content changed, which keeps small SPI displays from
//! flickering.

use core::fmt::Write;

use chrono::{NaiveDateTime, Timelike};
use heapless::String;

use crate::alarm::AlarmSetting;
use crate::mode::{ClockMode, RenderProfile};

/// Longest time string, `HH:MM:SS`.
pub const TIME_CAPACITY: usize = 8;
/// Longest status string, `Set Alarm Minute` or `Alarm: HH:MM OFF`.
pub const STATUS_CAPACITY: usize = 20;

pub type TimeText = String<TIME_CAPACITY>;
pub type StatusText = String<STATUS_CAPACITY>;

/// Semantic colors; the display adapter maps them to pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Color {
    Background,
    /// Time in normal mode
    Normal,
    /// Time while setting the clock
    Highlight,
    /// Time while setting the alarm
    AlarmHighlight,
    /// The status line
    Status,
    /// The fatal error indicator
    Error,
}

/// Output surface of the clock.
pub trait DisplayOutput {
    type Error;

    fn draw_text(
        &mut self,
        text: &str,
        x: i32,
        y: i32,
        size: u8,
        color: Color,
    ) -> Result<(), Self::Error>;

    fn fill_region(
        &mut self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: Color,
    ) -> Result<(), Self::Error>;

    /// Width and height of `text` drawn at `size`.
    fn measure_text(&self, text: &str, size: u8) -> (u32, u32);
}

impl<D: DisplayOutput + ?Sized> DisplayOutput for &mut D {
    type Error = D::Error;

    fn draw_text(
        &mut self,
        text: &str,
        x: i32,
        y: i32,
        size: u8,
        color: Color,
    ) -> Result<(), Self::Error> {
        D::draw_text(self, text, x, y, size, color)
    }

    fn fill_region(
        &mut self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: Color,
    ) -> Result<(), Self::Error> {
        D::fill_region(self, x, y, w, h, color)
    }

    fn measure_text(&self, text: &str, size: u8) -> (u32, u32) {
        D::measure_text(self, text, size)
    }
}

/// One rendered screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayFrame {
    pub time: TimeText,
    pub status: StatusText,
    pub time_color: Color,
}

#[cfg(feature = "defmt")]
impl defmt::Format for DisplayFrame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "DisplayFrame {{ ");
        defmt::write!(f, "time: {}, ", self.time.as_str());
        defmt::write!(f, "status: {}, ", self.status.as_str());
        defmt::write!(f, "time_color: {} ", self.time_color);
        defmt::write!(f, "}}");
    }
}

fn hms(datetime: &NaiveDateTime) -> TimeText {
    let mut text = TimeText::new();
    // Capacity fits the fixed-width format.
    let _ = write!(
        text,
        "{:02}:{:02}:{:02}",
        datetime.hour(),
        datetime.minute(),
        datetime.second()
    );
    text
}

fn hm(hour: u8, minute: u8) -> TimeText {
    let mut text = TimeText::new();
    let _ = write!(text, "{:02}:{:02}", hour, minute);
    text
}

fn status(text: &str) -> StatusText {
    let mut status = StatusText::new();
    let _ = status.push_str(text);
    status
}

/// Computes what the screen shows for `mode`.
pub fn compute_display(
    mode: ClockMode,
    now: &NaiveDateTime,
    alarm: &AlarmSetting,
) -> DisplayFrame {
    match mode.render_profile() {
        RenderProfile::LiveClock => {
            let mut summary = StatusText::new();
            let _ = write!(
                summary,
                "Alarm: {:02}:{:02} {}",
                alarm.hour,
                alarm.minute,
                if alarm.enabled { "ON" } else { "OFF" }
            );
            DisplayFrame {
                time: hms(now),
                status: summary,
                time_color: Color::Normal,
            }
        }
        RenderProfile::EditClock(label) => DisplayFrame {
            time: hms(now),
            status: status(label),
            time_color: Color::Highlight,
        },
        RenderProfile::EditAlarm(label) => DisplayFrame {
            time: hm(alarm.hour, alarm.minute),
            status: status(label),
            time_color: Color::AlarmHighlight,
        },
    }
}

/// Regions that need drawing for a frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Redraw {
    pub time: bool,
    pub status: bool,
}

impl Redraw {
    pub fn any(&self) -> bool {
        self.time || self.status
    }
}

/// The last frame drawn.
#[derive(Clone, Debug, Default)]
pub struct DisplaySnapshot {
    last: Option<DisplayFrame>,
}

impl DisplaySnapshot {
    /// Regions of `frame` that differ from the last recorded frame.
    pub fn diff(&self, frame: &DisplayFrame) -> Redraw {
        match &self.last {
            None => Redraw {
                time: true,
                status: true,
            },
            Some(last) => Redraw {
                time: last.time != frame.time || last.time_color != frame.time_color,
                status: last.status != frame.status,
            },
        }
    }

    /// Records `frame` as being on screen.
    pub fn commit(&mut self, frame: &DisplayFrame) {
        self.last = Some(frame.clone());
    }

    /// Compares `frame` with the last one and records it.
    pub fn update(&mut self, frame: &DisplayFrame) -> Redraw {
        let redraw = self.diff(frame);
        if redraw.any() {
            self.commit(frame);
        }
        redraw
    }

    /// Forgets the last frame so the next one is drawn in full.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<&DisplayFrame> {
        self.last.as_ref()
    }
}

/// Screen geometry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    /// Top of the time row
    pub time_y: i32,
    pub time_size: u8,
    /// Top of the status row
    pub status_y: i32,
    pub status_size: u8,
}

impl Default for Layout {
    // 240x135 TFT in landscape.
    fn default() -> Self {
        Self {
            width: 240,
            height: 135,
            time_y: 40,
            time_size: 2,
            status_y: 90,
            status_size: 1,
        }
    }
}

/// Text of the fatal error indicator.
pub const FAULT_TEXT: &str = "RTC Error";

/// Draws frames onto a [`DisplayOutput`], skipping unchanged regions.
pub struct Renderer<D: DisplayOutput> {
    display: D,
    layout: Layout,
    snapshot: DisplaySnapshot,
}

impl<D: DisplayOutput> Renderer<D> {
    pub fn new(display: D, layout: Layout) -> Self {
        Self {
            display,
            layout,
            snapshot: DisplaySnapshot::default(),
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn snapshot(&self) -> &DisplaySnapshot {
        &self.snapshot
    }

    /// Blanks the screen and forces the next frame to be drawn in full.
    pub fn clear(&mut self) -> Result<(), D::Error> {
        self.snapshot.invalidate();
        self.display.fill_region(
            0,
            0,
            self.layout.width,
            self.layout.height,
            Color::Background,
        )
    }

    fn draw_row(&mut self, text: &str, y: i32, size: u8, color: Color) -> Result<(), D::Error> {
        let (text_w, text_h) = self.display.measure_text(text, size);
        let line_h = self.display.measure_text("0", size).1.max(text_h);
        self.display
            .fill_region(0, y, self.layout.width, line_h, Color::Background)?;
        let x = (self.layout.width.saturating_sub(text_w) / 2) as i32;
        self.display.draw_text(text, x, y, size, color)
    }

    /// Draws the regions of `frame` that changed since the last call.
    ///
    /// A frame is only recorded once it is fully drawn. After a failed draw the
    /// next call repaints everything.
    pub fn render(&mut self, frame: &DisplayFrame) -> Result<Redraw, D::Error> {
        let redraw = self.snapshot.diff(frame);
        if let Err(e) = self.draw_regions(frame, redraw) {
            self.snapshot.invalidate();
            return Err(e);
        }
        if redraw.any() {
            self.snapshot.commit(frame);
            debug!("redraw time={} status={}", redraw.time, redraw.status);
        }
        Ok(redraw)
    }

    fn draw_regions(&mut self, frame: &DisplayFrame, redraw: Redraw) -> Result<(), D::Error> {
        if redraw.time {
            let Layout {
                time_y, time_size, ..
            } = self.layout;
            self.draw_row(&frame.time, time_y, time_size, frame.time_color)?;
        }
        if redraw.status {
            let Layout {
                status_y,
                status_size,
                ..
            } = self.layout;
            self.draw_row(&frame.status, status_y, status_size, Color::Status)?;
        }
        Ok(())
    }

    /// Shows the fatal error indicator over a blank screen.
    pub fn render_fault(&mut self) -> Result<(), D::Error> {
        self.clear()?;
        let y = (self.layout.height / 2) as i32;
        self.draw_row(FAULT_TEXT, y, self.layout.time_size, Color::Error)
    }

    pub fn release(self) -> D {
        self.display
    }
}
