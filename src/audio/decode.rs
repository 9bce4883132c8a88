use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::source::downmix;
use crate::error::{Error, Result};

/// Fully decoded PCM, interleaved, kept in memory so the audio callback
/// never touches the file.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(Error::Source("audio has no channels".into()));
        }
        if sample_rate == 0 {
            return Err(Error::Source("audio has a zero sample rate".into()));
        }
        let mut samples = samples;
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, 1, sample_rate)
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Interleaved samples of sample frames `start..end`, clamped to the clip.
    pub fn interleaved(&self, start: usize, end: usize) -> &[f32] {
        let end = end.min(self.frames());
        let start = start.min(end);
        &self.samples[start * self.channels..end * self.channels]
    }

    /// Averages channels into `out`, starting at sample frame `start`.
    /// Returns how many samples were written; the rest of `out` is left
    /// untouched.
    pub fn mono_into(&self, start: usize, out: &mut [f32]) -> usize {
        let src = self.interleaved(start, start.saturating_add(out.len()));
        let mut written = 0;
        for (dst, sample) in out.iter_mut().zip(downmix(src, self.channels)) {
            *dst = sample;
            written += 1;
        }
        written
    }

    pub fn to_mono(&self) -> Vec<f32> {
        downmix(&self.samples, self.channels).collect()
    }
}

pub fn decode_audio(path: &Path) -> Result<AudioClip> {
    let file = std::fs::File::open(path).map_err(|e| {
        Error::Source(format!("failed to open audio file {}: {}", path.display(), e))
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Source(format!("no audio tracks in {}", path.display())))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Source(format!("unknown sample rate in {}", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                log::warn!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let clip = AudioClip::new(samples, channels, sample_rate)?;
    log::info!(
        "Decoded {}: {} frames, {} channel(s), {}Hz, {:.1}s",
        path.display(),
        clip.frames(),
        clip.channels(),
        clip.sample_rate(),
        clip.duration_secs()
    );
    Ok(clip)
}
