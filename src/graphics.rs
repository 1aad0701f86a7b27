//! [`DisplayOutput`] for `embedded-graphics` targets.
//!
//! Works with any `DrawTarget<Color = Rgb565>`, e.g. an ST7789 or ILI9341
//! driver. Text sizes map to the built-in mono fonts: size 1 is 6x10, size 2
//! and above is 10x20.

use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10},
        MonoFont, MonoTextStyle,
    },
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{renderer::TextRenderer, Baseline, Text},
};

use crate::render::{Color, DisplayOutput};

/// Pixel colors for each [`Color`] role.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb565,
    pub normal: Rgb565,
    pub highlight: Rgb565,
    pub alarm_highlight: Rgb565,
    pub status: Rgb565,
    pub error: Rgb565,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Rgb565::BLACK,
            normal: Rgb565::WHITE,
            highlight: Rgb565::YELLOW,
            alarm_highlight: Rgb565::CYAN,
            status: Rgb565::GREEN,
            error: Rgb565::RED,
        }
    }
}

impl Palette {
    pub fn pixel(&self, color: Color) -> Rgb565 {
        match color {
            Color::Background => self.background,
            Color::Normal => self.normal,
            Color::Highlight => self.highlight,
            Color::AlarmHighlight => self.alarm_highlight,
            Color::Status => self.status,
            Color::Error => self.error,
        }
    }
}

fn font(size: u8) -> &'static MonoFont<'static> {
    match size {
        0 | 1 => &FONT_6X10,
        _ => &FONT_10X20,
    }
}

/// An `embedded-graphics` draw target used as the clock display.
pub struct GraphicsDisplay<DT> {
    target: DT,
    palette: Palette,
}

impl<DT> GraphicsDisplay<DT>
where
    DT: DrawTarget<Color = Rgb565>,
{
    pub fn new(target: DT) -> Self {
        Self::with_palette(target, Palette::default())
    }

    pub fn with_palette(target: DT, palette: Palette) -> Self {
        Self { target, palette }
    }

    pub fn target(&self) -> &DT {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut DT {
        &mut self.target
    }

    pub fn release(self) -> DT {
        self.target
    }
}

impl<DT> DisplayOutput for GraphicsDisplay<DT>
where
    DT: DrawTarget<Color = Rgb565>,
{
    type Error = DT::Error;

    fn draw_text(
        &mut self,
        text: &str,
        x: i32,
        y: i32,
        size: u8,
        color: Color,
    ) -> Result<(), Self::Error> {
        let style = MonoTextStyle::new(font(size), self.palette.pixel(color));
        Text::with_baseline(text, Point::new(x, y), style, Baseline::Top)
            .draw(&mut self.target)?;
        Ok(())
    }

    fn fill_region(
        &mut self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: Color,
    ) -> Result<(), Self::Error> {
        Rectangle::new(Point::new(x, y), Size::new(w, h))
            .into_styled(PrimitiveStyle::with_fill(self.palette.pixel(color)))
            .draw(&mut self.target)
    }

    fn measure_text(&self, text: &str, size: u8) -> (u32, u32) {
        let style = MonoTextStyle::new(font(size), self.palette.normal);
        let metrics = style.measure_string(text, Point::zero(), Baseline::Top);
        let size = metrics.bounding_box.size;
        (size.width, size.height)
    }
}
