//! Input sources and the glue that turns arbitrary callback buffers into
//! fixed-size mono frames.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait};

use super::decode::AudioClip;
use crate::error::{try_filled, Error, Result};

/// Averages each interleaved group of `channels` samples into one mono
/// sample. A trailing incomplete group is ignored.
pub fn downmix<'a, T>(interleaved: &'a [T], channels: usize) -> impl Iterator<Item = f32> + 'a
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    let scale = 1.0 / channels as f32;
    interleaved.chunks_exact(channels).map(move |group| {
        group
            .iter()
            .map(|&s| <f32 as cpal::Sample>::from_sample(s))
            .sum::<f32>()
            * scale
    })
}

/// Collects mono samples into frames of exactly `N`, handing each full
/// frame to a callback. Leftover samples carry over to the next push.
pub struct FrameAssembler {
    frame: Vec<f32>,
    filled: usize,
}

impl FrameAssembler {
    pub fn new(frame_length: usize) -> Result<Self> {
        Ok(Self {
            frame: try_filled(frame_length, 0.0, "frame assembler")?,
            filled: 0,
        })
    }

    /// Samples buffered toward the next frame.
    pub fn pending(&self) -> usize {
        self.filled
    }

    pub fn push<I, F>(&mut self, samples: I, mut on_frame: F)
    where
        I: IntoIterator<Item = f32>,
        F: FnMut(&[f32]),
    {
        for sample in samples {
            self.frame[self.filled] = sample;
            self.filled += 1;
            if self.filled == self.frame.len() {
                on_frame(&self.frame);
                self.filled = 0;
            }
        }
    }
}

/// A decoded file, read from a shared cursor so a restarted stream can
/// rewind it.
#[derive(Debug, Clone)]
pub struct FileSource {
    clip: Arc<AudioClip>,
    cursor: Arc<AtomicUsize>,
    playback: bool,
}

impl FileSource {
    /// `playback` selects audible output; without it the file is only
    /// visualised and loops forever.
    pub fn new(clip: AudioClip, playback: bool) -> Self {
        Self {
            clip: Arc::new(clip),
            cursor: Arc::new(AtomicUsize::new(0)),
            playback,
        }
    }

    pub fn clip(&self) -> &AudioClip {
        &self.clip
    }

    pub fn playback(&self) -> bool {
        self.playback
    }

    /// Current position in sample frames.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn rewind(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    /// Reads the next `out.len()` mono samples and advances. Returns the
    /// number read; fewer than requested means end of stream and the
    /// cursor is left at the end.
    pub fn read_mono(&self, out: &mut [f32]) -> usize {
        let start = self.position();
        let read = self.clip.mono_into(start, out);
        self.cursor.store(start + read, Ordering::Release);
        read
    }

    /// Takes up to `frames` interleaved sample frames for playback and
    /// advances past them.
    pub fn take_interleaved(&self, frames: usize) -> &[f32] {
        let start = self.position();
        let chunk = self.clip.interleaved(start, start.saturating_add(frames));
        self.cursor
            .store(start + chunk.len() / self.clip.channels(), Ordering::Release);
        chunk
    }
}

/// The system default capture device and the format it delivers.
pub struct DeviceSource {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
}

impl DeviceSource {
    /// Opens the default input device, at `preferred_rate` when the device
    /// supports it and at its default rate otherwise.
    pub fn open(preferred_rate: Option<u32>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Source("no default audio input device".into()))?;
        let default = device
            .default_input_config()
            .map_err(|e| Error::Source(format!("cannot query input device config: {}", e)))?;

        let config = match preferred_rate {
            Some(rate) if rate != default.sample_rate().0 => {
                match supported_at(&device, rate, default.sample_format()) {
                    Some(config) => config,
                    None => {
                        log::warn!(
                            "Input device does not support {}Hz, using {}Hz",
                            rate,
                            default.sample_rate().0
                        );
                        default
                    }
                }
            }
            _ => default,
        };

        log::info!(
            "Input device: {} @ {}Hz, {} channel(s), {:?}",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        Ok(Self { device, config })
    }

    pub fn device(&self) -> &cpal::Device {
        &self.device
    }

    pub fn config(&self) -> &cpal::SupportedStreamConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> usize {
        self.config.channels() as usize
    }
}

fn supported_at(
    device: &cpal::Device,
    rate: u32,
    format: cpal::SampleFormat,
) -> Option<cpal::SupportedStreamConfig> {
    let rate = cpal::SampleRate(rate);
    device
        .supported_input_configs()
        .ok()?
        .filter(|range| range.sample_format() == format)
        .find(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .map(|range| range.with_sample_rate(rate))
}

/// Where frames come from, fixed when the capture engine is built.
pub enum FrameSource {
    File(FileSource),
    Device(DeviceSource),
}

impl FrameSource {
    pub fn sample_rate(&self) -> u32 {
        match self {
            FrameSource::File(file) => file.clip().sample_rate(),
            FrameSource::Device(device) => device.sample_rate(),
        }
    }

    pub fn is_playback(&self) -> bool {
        matches!(self, FrameSource::File(file) if file.playback())
    }

    pub fn is_record(&self) -> bool {
        matches!(self, FrameSource::Device(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0f32, 0.0, 0.25, 0.75];
        let mono: Vec<f32> = downmix(&stereo, 2).collect();
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn downmix_converts_integer_samples() {
        let samples = [i16::MAX, 0i16];
        let mono: Vec<f32> = downmix(&samples, 1).collect();
        assert!((mono[0] - 1.0).abs() < 1e-3);
        assert_eq!(mono[1], 0.0);
    }

    #[test]
    fn assembler_emits_full_frames_only() {
        let mut assembler = FrameAssembler::new(4).unwrap();
        let mut frames: Vec<Vec<f32>> = Vec::new();
        assembler.push((0..6).map(|i| i as f32), |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![0.0, 1.0, 2.0, 3.0]]);
        assert_eq!(assembler.pending(), 2);

        assembler.push((6..10).map(|i| i as f32), |f| frames.push(f.to_vec()));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(assembler.pending(), 2);
    }

    #[test]
    fn file_source_reads_then_reports_end() {
        let clip = AudioClip::from_mono((0..10).map(|i| i as f32).collect(), 8000).unwrap();
        let source = FileSource::new(clip, false);
        let mut frame = [0.0f32; 4];
        assert_eq!(source.read_mono(&mut frame), 4);
        assert_eq!(source.read_mono(&mut frame), 4);
        assert_eq!(frame, [4.0, 5.0, 6.0, 7.0]);
        assert_eq!(source.read_mono(&mut frame), 2);
        source.rewind();
        assert_eq!(source.read_mono(&mut frame), 4);
        assert_eq!(frame, [0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn take_interleaved_advances_by_frames() {
        let clip = AudioClip::new(vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1], 2, 8000).unwrap();
        let source = FileSource::new(clip, true);
        assert_eq!(source.take_interleaved(2), &[0.0, 0.1, 1.0, 1.1]);
        assert_eq!(source.position(), 2);
        assert_eq!(source.take_interleaved(2), &[2.0, 2.1]);
        assert!(source.take_interleaved(2).is_empty());
    }

    #[test]
    fn file_source_kind_flags() {
        let clip = AudioClip::from_mono(vec![0.0; 8], 8000).unwrap();
        let source = FrameSource::File(FileSource::new(clip, true));
        assert!(source.is_playback());
        assert!(!source.is_record());
        assert_eq!(source.sample_rate(), 8000);
    }
}
