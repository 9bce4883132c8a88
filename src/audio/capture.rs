//! Capture engine: drives a [`Pipeline`] from a live input device, from
//! file playback, or from a silent looping reader thread.
//!
//! The pipeline sits behind an `Arc<Mutex<_>>` shared with the stream
//! callback. Callbacks only ever `try_lock`; when the controller holds the
//! lock (to change levels) the frame is counted as skipped instead of
//! blocking the audio thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};

use super::source::{downmix, DeviceSource, FileSource, FrameAssembler, FrameSource};
use crate::analysis::{LevelSettings, Pipeline, PipelineParams};
use crate::error::{try_filled, Error, Result};
use crate::render::CanvasReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Counters shared with the real-time side.
#[derive(Debug, Default)]
struct StreamStats {
    frames: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    finished: AtomicBool,
}

impl StreamStats {
    fn reset(&self) {
        self.frames.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.finished.store(false, Ordering::Release);
    }
}

enum ActiveStream {
    Cpal(cpal::Stream),
    Reader {
        stop: Arc<AtomicBool>,
        handle: thread::JoinHandle<()>,
    },
}

pub struct CaptureEngine {
    source: FrameSource,
    pipeline: Arc<Mutex<Pipeline>>,
    stats: Arc<StreamStats>,
    active: Option<ActiveStream>,
    realtime: bool,
}

impl CaptureEngine {
    pub fn new(source: FrameSource, params: PipelineParams) -> Result<(Self, CanvasReader)> {
        if let FrameSource::File(file) = &source {
            if file.clip().frames() < params.frame_length {
                return Err(Error::Source(format!(
                    "audio is shorter than one {}-sample frame",
                    params.frame_length
                )));
            }
        }
        let (pipeline, reader) = Pipeline::new(params)?;
        let engine = Self {
            source,
            pipeline: Arc::new(Mutex::new(pipeline)),
            stats: Arc::new(StreamStats::default()),
            active: None,
            realtime: true,
        };
        Ok((engine, reader))
    }

    /// Pace the silent file reader at the audio frame rate (default) or
    /// let it run as fast as it can.
    pub fn set_realtime(&mut self, realtime: bool) {
        self.realtime = realtime;
    }

    /// `Idle` once a played-back file has run out, even before `stop()`
    /// releases the device.
    pub fn state(&self) -> StreamState {
        if self.active.is_some() && !self.stats.finished.load(Ordering::Acquire) {
            StreamState::Streaming
        } else {
            StreamState::Idle
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// Streaming and not yet at the end of a played-back file.
    pub fn is_active(&self) -> bool {
        self.is_streaming()
    }

    pub fn is_playback(&self) -> bool {
        self.source.is_playback()
    }

    pub fn is_record(&self) -> bool {
        self.source.is_record()
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    /// Frames painted since the last `start()`.
    pub fn frames_processed(&self) -> u64 {
        self.stats.frames.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.stats.skipped.load(Ordering::Relaxed)
    }

    pub fn levels(&self) -> Result<LevelSettings> {
        Ok(self.lock_pipeline()?.levels())
    }

    pub fn set_levels(&self, levels: LevelSettings) -> Result<()> {
        self.lock_pipeline()?.set_levels(levels);
        log::info!(
            "Levels: volume={} floor={}dB ceiling={}dB",
            levels.volume(),
            levels.floor_db(),
            levels.ceiling_db()
        );
        Ok(())
    }

    fn lock_pipeline(&self) -> Result<std::sync::MutexGuard<'_, Pipeline>> {
        self.pipeline
            .lock()
            .map_err(|_| Error::StreamState("pipeline lock poisoned by a panicked callback".into()))
    }

    /// Opens the stream for this source. Calling `start()` while the
    /// stream is still running is a no-op; after a played-back file has
    /// finished it restarts from the beginning.
    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            if self.is_streaming() {
                log::warn!("start() called on an active stream, ignoring");
                return Ok(());
            }
            self.stop()?;
        }

        self.stats.reset();
        if let FrameSource::File(file) = &self.source {
            file.rewind();
        }

        let active = match &self.source {
            FrameSource::Device(device) => {
                let stream = open_input(device, &self.pipeline, &self.stats)?;
                log::info!("Recording from microphone");
                ActiveStream::Cpal(stream)
            }
            FrameSource::File(file) if file.playback() => {
                let stream = open_playback(file, &self.pipeline, &self.stats)?;
                log::info!("Playing file ({:.1}s)", file.clip().duration_secs());
                ActiveStream::Cpal(stream)
            }
            FrameSource::File(file) => {
                let active = spawn_reader(file, &self.pipeline, &self.stats, self.realtime)?;
                log::info!("Visualising file without playback, looping");
                active
            }
        };
        self.active = Some(active);
        Ok(())
    }

    /// Closes the stream. Safe to call while a callback is running and
    /// safe to call on an idle engine.
    pub fn stop(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            log::warn!("stop() called on an idle stream, ignoring");
            return Ok(());
        };

        match active {
            ActiveStream::Cpal(stream) => {
                if let Err(e) = stream.pause() {
                    log::debug!("Pausing stream before close failed: {}", e);
                }
                drop(stream);
            }
            ActiveStream::Reader { stop, handle } => {
                stop.store(true, Ordering::Release);
                handle
                    .join()
                    .map_err(|_| Error::StreamState("file reader thread panicked".into()))?;
            }
        }

        let skipped = self.frames_skipped();
        let failed = self.stats.failed.load(Ordering::Relaxed);
        if skipped > 0 || failed > 0 {
            log::warn!("Stream closed: {} frame(s) skipped, {} failed", skipped, failed);
        }
        log::info!("Stream closed after {} frame(s)", self.frames_processed());
        Ok(())
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop() {
                log::error!("Failed to close stream on drop: {}", e);
            }
        }
    }
}

/// Runs one assembled frame through the pipeline if it is free.
fn deliver(pipeline: &mut Option<std::sync::MutexGuard<'_, Pipeline>>, stats: &StreamStats, frame: &[f32]) {
    match pipeline {
        Some(p) => match p.process_frame(frame) {
            Ok(()) => {
                stats.frames.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        },
        None => {
            stats.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn stream_error(err: cpal::StreamError) {
    log::error!("Audio stream error: {}", err);
}

fn open_input(
    source: &DeviceSource,
    pipeline: &Arc<Mutex<Pipeline>>,
    stats: &Arc<StreamStats>,
) -> Result<cpal::Stream> {
    let config = source.config().config();
    let stream = match source.config().sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(source, &config, pipeline, stats)?,
        cpal::SampleFormat::I16 => build_input::<i16>(source, &config, pipeline, stats)?,
        cpal::SampleFormat::U16 => build_input::<u16>(source, &config, pipeline, stats)?,
        cpal::SampleFormat::I32 => build_input::<i32>(source, &config, pipeline, stats)?,
        other => {
            return Err(Error::Device(format!("unsupported input sample format {:?}", other)));
        }
    };
    stream
        .play()
        .map_err(|e| Error::Device(format!("failed to start input stream: {}", e)))?;
    Ok(stream)
}

fn build_input<T>(
    source: &DeviceSource,
    config: &cpal::StreamConfig,
    pipeline: &Arc<Mutex<Pipeline>>,
    stats: &Arc<StreamStats>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let frame_length = lock_params(pipeline)?.frame_length;
    let mut assembler = FrameAssembler::new(frame_length)?;
    let channels = source.channels();
    let pipeline = Arc::clone(pipeline);
    let stats = Arc::clone(stats);

    source
        .device()
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut guard = pipeline.try_lock().ok();
                assembler.push(downmix(data, channels), |frame| {
                    deliver(&mut guard, &stats, frame)
                });
            },
            stream_error,
            None,
        )
        .map_err(|e| Error::Device(format!("failed to open input stream: {}", e)))
}

fn open_playback(
    file: &FileSource,
    pipeline: &Arc<Mutex<Pipeline>>,
    stats: &Arc<StreamStats>,
) -> Result<cpal::Stream> {
    use cpal::traits::HostTrait;

    let clip = file.clip();
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Source("no default audio output device".into()))?;
    log::info!(
        "Output device: {} @ {}Hz, {} channel(s)",
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        clip.sample_rate(),
        clip.channels()
    );

    let channels = u16::try_from(clip.channels())
        .map_err(|_| Error::Source(format!("{} channels cannot be played", clip.channels())))?;
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(clip.sample_rate()),
        buffer_size: cpal::BufferSize::Default,
    };

    let (frame_length, mut volume) = {
        let p = lock_params(pipeline)?;
        (p.frame_length, p.levels.volume())
    };
    let mut assembler = FrameAssembler::new(frame_length)?;
    let channels = clip.channels();
    let file = file.clone();
    let pipeline = Arc::clone(pipeline);
    let stats_cb = Arc::clone(stats);

    let stream = device
        .build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut guard = pipeline.try_lock().ok();
                feed_playback(&file, &mut assembler, &mut guard, &stats_cb, &mut volume, out);
            },
            stream_error,
            None,
        )
        .map_err(|e| {
            Error::Device(format!(
                "output device rejected {} ch @ {}Hz f32 (no resampling): {}",
                channels,
                clip.sample_rate(),
                e
            ))
        })?;

    stream
        .play()
        .map_err(|e| Error::Device(format!("failed to start playback stream: {}", e)))?;
    Ok(stream)
}

/// Fills one output buffer from the file, scaled by the current volume,
/// and analyses the same samples. `volume` keeps the last value seen so a
/// busy pipeline does not change the gain. A short read zero-fills the
/// tail and marks the stream finished.
fn feed_playback(
    file: &FileSource,
    assembler: &mut FrameAssembler,
    pipeline: &mut Option<std::sync::MutexGuard<'_, Pipeline>>,
    stats: &StreamStats,
    volume: &mut f32,
    out: &mut [f32],
) {
    if let Some(p) = pipeline.as_ref() {
        *volume = p.levels().volume();
    }

    let channels = file.clip().channels();
    let wanted = out.len() / channels;
    let chunk = file.take_interleaved(wanted);
    for (dst, &src) in out.iter_mut().zip(chunk) {
        *dst = src * *volume;
    }
    out[chunk.len()..].fill(0.0);

    assembler.push(downmix(chunk, channels), |frame| deliver(pipeline, stats, frame));

    if chunk.len() / channels < wanted {
        stats.finished.store(true, Ordering::Release);
    }
}

/// Next wake-up for a reader paced at `period`. A reader that has fallen
/// more than a period behind resyncs to `now` instead of bursting.
fn next_deadline(deadline: Instant, period: Duration, now: Instant) -> Instant {
    let next = deadline + period;
    if now > next + period {
        now
    } else {
        next
    }
}

/// Silent visualisation of a file: a worker thread feeds frames at the
/// audio frame rate and wraps to the start when less than a full frame
/// remains.
fn spawn_reader(
    file: &FileSource,
    pipeline: &Arc<Mutex<Pipeline>>,
    stats: &Arc<StreamStats>,
    realtime: bool,
) -> Result<ActiveStream> {
    let frame_length = lock_params(pipeline)?.frame_length;
    let mut frame = try_filled(frame_length, 0.0f32, "reader frame")?;
    let period = Duration::from_secs_f64(frame_length as f64 / file.clip().sample_rate() as f64);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let file = file.clone();
    let pipeline = Arc::clone(pipeline);
    let stats = Arc::clone(stats);

    let handle = thread::Builder::new()
        .name("sonoscore-reader".into())
        .spawn(move || {
            let mut deadline = Instant::now();
            while !stop_flag.load(Ordering::Acquire) {
                if file.read_mono(&mut frame) < frame_length {
                    file.rewind();
                    continue;
                }

                let mut guard = pipeline.try_lock().ok();
                deliver(&mut guard, &stats, &frame);
                drop(guard);

                if realtime {
                    let now = Instant::now();
                    deadline = next_deadline(deadline, period, now);
                    thread::sleep(deadline.saturating_duration_since(now));
                }
            }
        })
        .map_err(|e| Error::ResourceExhaustion(format!("cannot spawn reader thread: {}", e)))?;

    Ok(ActiveStream::Reader { stop, handle })
}

fn lock_params(pipeline: &Arc<Mutex<Pipeline>>) -> Result<PipelineParams> {
    pipeline
        .lock()
        .map(|p| p.params().clone())
        .map_err(|_| Error::StreamState("pipeline lock poisoned".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioClip;

    fn params() -> PipelineParams {
        PipelineParams {
            frame_length: 64,
            canvas_width: 16,
            canvas_height: 8,
            top_bin: 32,
            levels: LevelSettings::default(),
        }
    }

    fn looping_engine(samples: usize) -> (CaptureEngine, CanvasReader) {
        let clip = AudioClip::from_mono(vec![0.25; samples], 8000).unwrap();
        let (mut engine, reader) =
            CaptureEngine::new(FrameSource::File(FileSource::new(clip, false)), params()).unwrap();
        engine.set_realtime(false);
        (engine, reader)
    }

    fn wait_for_frames(engine: &CaptureEngine, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while engine.frames_processed() < count {
            assert!(Instant::now() < deadline, "reader stalled");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn starts_idle() {
        let (engine, _) = looping_engine(256);
        assert_eq!(engine.state(), StreamState::Idle);
        assert!(!engine.is_active());
        assert!(!engine.is_playback());
        assert!(!engine.is_record());
    }

    #[test]
    fn stop_twice_is_harmless() {
        let (mut engine, _) = looping_engine(256);
        engine.start().unwrap();
        engine.stop().unwrap();
        engine.stop().unwrap();
        assert_eq!(engine.state(), StreamState::Idle);
    }

    #[test]
    fn start_twice_keeps_one_stream() {
        let (mut engine, _) = looping_engine(256);
        engine.start().unwrap();
        engine.start().unwrap();
        assert!(engine.is_active());
        engine.stop().unwrap();
        assert!(!engine.is_streaming());
    }

    #[test]
    fn read_only_file_loops_past_its_end() {
        // 4 frames of audio plus a partial tail.
        let (mut engine, mut reader) = looping_engine(64 * 4 + 10);
        engine.start().unwrap();
        wait_for_frames(&engine, 40);
        assert!(engine.is_active());
        engine.stop().unwrap();
        assert!(reader.snapshot().frames >= 40);
    }

    #[test]
    fn rejects_clip_shorter_than_a_frame() {
        let clip = AudioClip::from_mono(vec![0.0; 10], 8000).unwrap();
        let result = CaptureEngine::new(FrameSource::File(FileSource::new(clip, false)), params());
        assert!(matches!(result, Err(Error::Source(_))));
    }

    #[test]
    fn set_levels_reaches_the_pipeline() {
        let (engine, _) = looping_engine(256);
        let levels = LevelSettings::new(0.5, -120.0, 0.0).unwrap();
        engine.set_levels(levels).unwrap();
        assert_eq!(engine.levels().unwrap(), levels);
    }

    #[test]
    fn finished_playback_reports_idle_and_restarts() {
        let (mut engine, _) = looping_engine(256);
        engine.start().unwrap();
        assert_eq!(engine.state(), StreamState::Streaming);

        engine.stats.finished.store(true, Ordering::Release);
        assert_eq!(engine.state(), StreamState::Idle);
        assert!(!engine.is_streaming());
        assert!(!engine.is_active());

        engine.start().unwrap();
        assert_eq!(engine.state(), StreamState::Streaming);
        wait_for_frames(&engine, 1);
        engine.stop().unwrap();
        assert_eq!(engine.state(), StreamState::Idle);
    }

    fn playback_parts(clip: AudioClip) -> (FileSource, Mutex<Pipeline>, StreamStats, FrameAssembler) {
        let (pipeline, _) = Pipeline::new(params()).unwrap();
        (
            FileSource::new(clip, true),
            Mutex::new(pipeline),
            StreamStats::default(),
            FrameAssembler::new(64).unwrap(),
        )
    }

    #[test]
    fn playback_scales_output_and_zeroes_the_tail() {
        let clip = AudioClip::from_mono(vec![0.5; 100], 8000).unwrap();
        let (file, pipeline, stats, mut assembler) = playback_parts(clip);
        pipeline
            .lock()
            .unwrap()
            .set_levels(LevelSettings::new(2.0, -180.0, 80.0).unwrap());
        let mut guard = pipeline.try_lock().ok();
        let mut volume = 1.0;
        let mut out = [9.0f32; 64];

        feed_playback(&file, &mut assembler, &mut guard, &stats, &mut volume, &mut out);
        assert_eq!(volume, 2.0);
        assert!(out.iter().all(|&s| s == 1.0));
        assert!(!stats.finished.load(Ordering::Acquire));

        feed_playback(&file, &mut assembler, &mut guard, &stats, &mut volume, &mut out);
        assert!(out[..36].iter().all(|&s| s == 1.0));
        assert!(out[36..].iter().all(|&s| s == 0.0));
        assert!(stats.finished.load(Ordering::Acquire));
        assert_eq!(stats.frames.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn playback_finishes_only_on_a_short_read() {
        let clip = AudioClip::from_mono(vec![0.1; 128], 8000).unwrap();
        let (file, pipeline, stats, mut assembler) = playback_parts(clip);
        let mut guard = pipeline.try_lock().ok();
        let mut volume = 1.0;
        let mut out = [0.0f32; 64];

        for _ in 0..2 {
            feed_playback(&file, &mut assembler, &mut guard, &stats, &mut volume, &mut out);
            assert!(!stats.finished.load(Ordering::Acquire));
        }
        feed_playback(&file, &mut assembler, &mut guard, &stats, &mut volume, &mut out);
        assert!(stats.finished.load(Ordering::Acquire));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stereo_playback_paints_one_column_per_frame() {
        let interleaved: Vec<f32> = (0..64 * 3).flat_map(|_| [0.2f32, 0.4]).collect();
        let clip = AudioClip::new(interleaved, 2, 8000).unwrap();
        let (file, pipeline, stats, mut assembler) = playback_parts(clip);
        let mut guard = pipeline.try_lock().ok();
        let mut volume = 1.0;
        // 50 stereo frames per callback.
        let mut out = [0.0f32; 100];

        for _ in 0..3 {
            feed_playback(&file, &mut assembler, &mut guard, &stats, &mut volume, &mut out);
        }
        assert_eq!(stats.frames.load(Ordering::Relaxed), 2);
        assert_eq!(assembler.pending(), 150 - 128);
        assert_eq!(guard.as_ref().unwrap().canvas().frames(), 2);
        assert!(!stats.finished.load(Ordering::Acquire));
    }

    #[test]
    fn busy_pipeline_keeps_last_volume_and_counts_skips() {
        let clip = AudioClip::from_mono(vec![0.5; 128], 8000).unwrap();
        let (file, _pipeline, stats, mut assembler) = playback_parts(clip);
        let mut guard = None;
        let mut volume = 3.0;
        let mut out = [0.0f32; 64];

        feed_playback(&file, &mut assembler, &mut guard, &stats, &mut volume, &mut out);
        assert!(out.iter().all(|&s| s == 1.5));
        assert_eq!(stats.skipped.load(Ordering::Relaxed), 1);
        assert_eq!(stats.frames.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn pacing_resyncs_after_a_stall() {
        let start = Instant::now();
        let period = Duration::from_millis(10);
        assert_eq!(next_deadline(start, period, start), start + period);
        // Slightly late: keep the schedule.
        assert_eq!(next_deadline(start, period, start + period * 3 / 2), start + period);
        // Far behind: restart from now rather than bursting.
        let late = start + period * 5;
        assert_eq!(next_deadline(start, period, late), late);
    }
}
