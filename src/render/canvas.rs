//! Circular column buffer holding the spectrogram image.
//!
//! The pipeline paints into a private working image and, after each
//! complete column, copies it into a triple buffer. Readers on another
//! thread only ever see whole frames and never block the painter.

use image::{Rgb, RgbImage};
use triple_buffer::TripleBuffer;

use crate::error::{check_len, Error, Result};

pub const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
/// The "now" cursor drawn just ahead of the newest column.
pub const MARKER: Rgb<u8> = Rgb([255, 0, 0]);

/// A published, self-consistent copy of the canvas.
#[derive(Debug, Clone)]
pub struct CanvasSnapshot {
    pub image: RgbImage,
    /// Column the next frame will be painted into.
    pub cursor: usize,
    /// Columns painted since the canvas was created.
    pub frames: u64,
}

pub struct SpectrogramCanvas {
    image: RgbImage,
    cursor: usize,
    frames: u64,
    publisher: triple_buffer::Input<CanvasSnapshot>,
}

impl SpectrogramCanvas {
    pub fn new(width: usize, height: usize) -> Result<(Self, CanvasReader)> {
        if width == 0 || height == 0 {
            return Err(Error::Configuration(format!(
                "canvas must be non-empty, got {}x{}",
                width, height
            )));
        }
        let (w, h) = (dimension(width, "width")?, dimension(height, "height")?);
        let bytes = width
            .checked_mul(height)
            .and_then(|px| px.checked_mul(3))
            .ok_or_else(|| Error::Configuration(format!("canvas {}x{} too large", width, height)))?;
        let pixels = crate::error::try_filled(bytes, 0u8, "canvas pixels")?;
        let image = RgbImage::from_raw(w, h, pixels)
            .ok_or_else(|| Error::ResourceExhaustion("canvas buffer size mismatch".into()))?;

        let initial = CanvasSnapshot {
            image: image.clone(),
            cursor: 0,
            frames: 0,
        };
        let (publisher, output) = TripleBuffer::new(&initial).split();

        let canvas = Self {
            image,
            cursor: 0,
            frames: 0,
            publisher,
        };
        Ok((canvas, CanvasReader { output }))
    }

    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Paints one column of intensities (one per row, `0..=255`) at the
    /// cursor, draws the marker in the following column, advances the
    /// cursor and publishes the result.
    pub fn paint_column(&mut self, rows: &[f32]) -> Result<()> {
        check_len("column", rows.len(), self.height())?;

        let col = self.cursor as u32;
        let next = ((self.cursor + 1) % self.width()) as u32;
        for row in 0..self.image.height() {
            self.image.put_pixel(col, row, BACKGROUND);
            self.image.put_pixel(next, row, MARKER);
        }
        for (row, &value) in rows.iter().enumerate() {
            let level = value.round().clamp(0.0, 255.0) as u8;
            self.image.put_pixel(col, row as u32, Rgb([level, level, level]));
        }

        self.cursor = (self.cursor + 1) % self.width();
        self.frames += 1;
        self.publish();
        Ok(())
    }

    fn publish(&mut self) {
        let back = self.publisher.input_buffer();
        back.image.copy_from_slice(self.image.as_raw());
        back.cursor = self.cursor;
        back.frames = self.frames;
        self.publisher.publish();
    }
}

fn dimension(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Configuration(format!("canvas {} {} out of range", what, value)))
}

/// Consumer side of a canvas, for presentation or export.
pub struct CanvasReader {
    output: triple_buffer::Output<CanvasSnapshot>,
}

impl CanvasReader {
    /// Latest complete canvas published by the painter.
    pub fn snapshot(&mut self) -> &CanvasSnapshot {
        self.output.read()
    }

    /// Owned copy of the latest image.
    pub fn spectrogram(&mut self) -> RgbImage {
        self.snapshot().image.clone()
    }
}
