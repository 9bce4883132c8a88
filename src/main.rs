mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbImage;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cli::Cli;
use sonoscore::analysis::params::{
    DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_CEILING_DB, DEFAULT_FLOOR_DB,
    DEFAULT_FRAME_LENGTH, DEFAULT_SAMPLE_RATE, DEFAULT_TOP_BIN, DEFAULT_VOLUME,
};
use sonoscore::audio::{decode_audio, AudioClip, CaptureEngine, DeviceSource, FileSource, FrameSource};
use sonoscore::{config, encode, score, LevelSettings, Pipeline, PipelineParams};

/// How a live session is watched by the presentation loop.
struct SessionOptions {
    refresh: Duration,
    duration: Option<Duration>,
    stop_requested: Arc<AtomicBool>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut refresh_ms = 20;
    let mut capture_rate = DEFAULT_SAMPLE_RATE;
    if let Some(path) = config::discover_config(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                // Merge: config values apply only when CLI is at its default
                if cli.width == DEFAULT_CANVAS_WIDTH { cli.width = cfg.canvas.width; }
                if cli.height == DEFAULT_CANVAS_HEIGHT { cli.height = cfg.canvas.height; }
                if cli.frame_length == DEFAULT_FRAME_LENGTH { cli.frame_length = cfg.analysis.frame_length; }
                if cli.top_bin == DEFAULT_TOP_BIN { cli.top_bin = cfg.analysis.top_bin; }
                if cli.volume == DEFAULT_VOLUME { cli.volume = cfg.levels.volume; }
                if cli.floor_db == DEFAULT_FLOOR_DB { cli.floor_db = cfg.levels.floor_db; }
                if cli.max_db == DEFAULT_CEILING_DB { cli.max_db = cfg.levels.ceiling_db; }
                refresh_ms = cfg.display.refresh_ms;
                capture_rate = cfg.analysis.sample_rate;
            }
            Err(e) if cli.config.is_some() => {
                return Err(e).context("Failed to load the config given with --config");
            }
            Err(e) => log::warn!("Ignoring config {}: {}", path.display(), e),
        }
    }

    let levels = LevelSettings::new(cli.volume, cli.floor_db, cli.max_db)
        .context("Invalid volume or dB levels")?;
    let params = PipelineParams {
        frame_length: cli.frame_length,
        canvas_width: cli.width,
        canvas_height: cli.height,
        top_bin: cli.top_bin,
        levels,
    };
    params.validate().context("Invalid canvas or analysis settings")?;

    let duration = match cli.duration {
        Some(secs) if !(secs.is_finite() && secs > 0.0) => {
            anyhow::bail!("--duration must be a positive number of seconds, got {}", secs);
        }
        Some(secs) => Some(Duration::from_secs_f64(secs)),
        None => None,
    };

    if cli.record {
        if let Some(input) = &cli.input {
            log::warn!("Recording from microphone, ignoring input file {}", input.display());
        }
        if cli.plays_base_aloud() {
            log::info!("Playing the score base first, then recording");
        }
        if cli.looping {
            log::warn!("--loop has no effect while recording");
        }
    } else if cli.playback && cli.looping {
        log::warn!("--loop has no effect with --playback, the file plays once");
    }

    let input = if cli.record {
        None
    } else {
        let input = cli
            .input
            .as_ref()
            .context("Input audio file is required unless --record is given")?;
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        Some(input.clone())
    };
    if let Some(base) = &cli.score_base {
        if !base.exists() {
            anyhow::bail!("Score base file not found: {}", base.display());
        }
    }

    log::info!("sonoscore - audio spectrogram viewer");
    match &input {
        Some(path) => log::info!("Input: {}", path.display()),
        None => log::info!("Input: microphone"),
    }
    log::info!(
        "Canvas: {}x{}, frame {} samples, top bin {}",
        params.canvas_width,
        params.canvas_height,
        params.frame_length,
        params.top_bin
    );
    log::info!(
        "Levels: volume {} floor {}dB max {}dB",
        levels.volume(),
        levels.floor_db(),
        levels.ceiling_db()
    );

    let input_clip = match &input {
        Some(path) => Some(load_clip(path)?),
        None => None,
    };
    let base_clip = match &cli.score_base {
        Some(path) => {
            log::info!("Score with: {}", path.display());
            Some(load_clip(path)?)
        }
        None => None,
    };

    let offline = cli.is_offline();
    let (base_image, input_image) = match input_clip {
        Some(clip) if offline => {
            let multi = MultiProgress::new();
            match &base_clip {
                Some(base) => {
                    let (base_image, input_image) = rayon::join(
                        || render_offline("base", base, &params, multi.add(render_bar()?)),
                        || render_offline("input", &clip, &params, multi.add(render_bar()?)),
                    );
                    (Some(base_image?), input_image?)
                }
                None => (None, render_offline("input", &clip, &params, render_bar()?)?),
            }
        }
        input_clip => {
            let session = SessionOptions {
                refresh: Duration::from_millis(refresh_ms.max(1)),
                duration,
                stop_requested: spawn_enter_listener(),
            };

            let base_image = match base_clip {
                Some(base) if cli.plays_base_aloud() => {
                    let source = FrameSource::File(FileSource::new(base, true));
                    Some(run_session("base", source, &params, &session)?)
                }
                Some(base) => Some(render_offline("base", &base, &params, render_bar()?)?),
                None => None,
            };

            let source = match input_clip {
                Some(clip) => FrameSource::File(FileSource::new(clip, cli.playback)),
                None => FrameSource::Device(
                    DeviceSource::open(Some(capture_rate)).context("Failed to open microphone")?,
                ),
            };
            let image = run_session("input", source, &params, &session)?;
            (base_image, image)
        }
    };

    if let Some(path) = &cli.output {
        encode::save_spectrogram(&input_image, path)
            .with_context(|| format!("Failed saving file: {}", path.display()))?;
    }

    if let Some(base_image) = &base_image {
        let similarity = score::compare(base_image, &input_image);
        log::info!(
            "Histogram correlation: {:.8} (baseline {:.8})",
            similarity.correlation,
            similarity.baseline
        );
        println!("[Score] {:.0}", similarity.score);
    }

    Ok(())
}

fn load_clip(path: &Path) -> Result<AudioClip> {
    log::info!("Decoding {}...", path.display());
    decode_audio(path).with_context(|| format!("Failed to decode {}", path.display()))
}

fn render_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {msg:>6} {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

/// Renders every complete frame of `clip` once and returns the canvas.
fn render_offline(
    label: &str,
    clip: &AudioClip,
    params: &PipelineParams,
    pb: ProgressBar,
) -> Result<RgbImage> {
    let mono = clip.to_mono();
    let total = mono.len() / params.frame_length;
    if total == 0 {
        log::warn!("{} audio is shorter than one frame, canvas stays blank", label);
    }
    pb.set_length(total as u64);
    pb.set_message(label.to_string());

    let (mut pipeline, mut reader) = Pipeline::new(params.clone())?;
    let painted = pipeline.render(&mono, |n| {
        if n % 64 == 0 {
            pb.set_position(n as u64);
        }
    })?;
    pb.set_position(painted as u64);
    pb.finish_with_message(label.to_string());

    log::info!(
        "Rendered {}: {} frame(s), {:.1}s visible",
        label,
        painted,
        params.visible_seconds(clip.sample_rate())
    );
    Ok(reader.spectrogram())
}

/// Runs one live session until Enter, `--duration`, or the end of a
/// played-back file, then returns the final canvas.
fn run_session(
    label: &str,
    source: FrameSource,
    params: &PipelineParams,
    opts: &SessionOptions,
) -> Result<RgbImage> {
    let (mut engine, mut reader) = CaptureEngine::new(source, params.clone())
        .with_context(|| format!("Failed to set up {} stream", label))?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid spinner template")?,
    );

    opts.stop_requested.store(false, Ordering::Release);
    engine
        .start()
        .with_context(|| format!("Failed to start {} stream", label))?;
    log::info!(
        "{} at {}Hz, {:.1}s of history visible. Press Enter to stop.",
        if engine.is_record() { "Recording" } else { "Streaming" },
        engine.sample_rate(),
        params.visible_seconds(engine.sample_rate())
    );

    let started = Instant::now();
    let reason = loop {
        thread::sleep(opts.refresh);

        let snapshot = reader.snapshot();
        spinner.set_message(format!(
            "{}: {} frames, column {}",
            label, snapshot.frames, snapshot.cursor
        ));
        spinner.tick();

        if engine.is_playback() && !engine.is_active() {
            break "playback finished";
        }
        if opts.stop_requested.load(Ordering::Acquire) {
            break "stopped";
        }
        if opts.duration.is_some_and(|d| started.elapsed() >= d) {
            break "duration reached";
        }
    };

    engine
        .stop()
        .with_context(|| format!("Failed to stop {} stream", label))?;
    spinner.finish_with_message(format!("{}: {}", label, reason));
    log::info!("{} session ended ({}) after {:.1}s", label, reason, started.elapsed().as_secs_f32());

    Ok(reader.spectrogram())
}

/// Sets the returned flag every time a line arrives on stdin.
fn spawn_enter_listener() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let pressed = Arc::clone(&flag);
    let spawned = thread::Builder::new()
        .name("sonoscore-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() {
                    break;
                }
                pressed.store(true, Ordering::Release);
            }
        });
    if let Err(e) = spawned {
        log::warn!("Cannot watch stdin, sessions end only on --duration: {}", e);
    }
    flag
}
