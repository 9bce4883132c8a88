use clap::Parser;
use std::path::PathBuf;

use sonoscore::analysis::params::{
    DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_CEILING_DB, DEFAULT_FLOOR_DB,
    DEFAULT_FRAME_LENGTH, DEFAULT_TOP_BIN, DEFAULT_VOLUME,
};

#[derive(Parser, Debug)]
#[command(name = "sonoscore", about = "Real-time audio spectrogram viewer and scorer")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG). Not needed with --record.
    pub input: Option<PathBuf>,

    /// Capture from the default microphone instead of a file
    #[arg(short, long)]
    pub record: bool,

    /// Play the input file through the default output device
    #[arg(short, long)]
    pub playback: bool,

    /// Gain applied before analysis (and to playback)
    #[arg(short, long, default_value_t = DEFAULT_VOLUME)]
    pub volume: f32,

    /// Decibel level drawn at full brightness
    #[arg(short = 't', long, default_value_t = DEFAULT_CEILING_DB, allow_negative_numbers = true)]
    pub max_db: f32,

    /// Decibel level drawn black
    #[arg(short, long, default_value_t = DEFAULT_FLOOR_DB, allow_negative_numbers = true)]
    pub floor_db: f32,

    /// Save the final spectrogram image (format from extension, e.g. .png)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Base audio file to score the input against
    #[arg(short = 's', long)]
    pub score_base: Option<PathBuf>,

    /// Config file (default: ./sonoscore.toml or ~/.config/sonoscore/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop live or looping sessions after this many seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Visualise the file silently in a loop instead of rendering it once
    #[arg(long = "loop")]
    pub looping: bool,

    /// Canvas width in columns (one column per frame)
    #[arg(long, default_value_t = DEFAULT_CANVAS_WIDTH)]
    pub width: usize,

    /// Canvas height in rows
    #[arg(long, default_value_t = DEFAULT_CANVAS_HEIGHT)]
    pub height: usize,

    /// Samples per frame
    #[arg(long, default_value_t = DEFAULT_FRAME_LENGTH)]
    pub frame_length: usize,

    /// Highest frequency bin stretched over the canvas height
    #[arg(long, default_value_t = DEFAULT_TOP_BIN)]
    pub top_bin: usize,
}

impl Cli {
    /// The base is heard before the take: `-p -s base` plays it aloud, and
    /// with `-r` the microphone records afterwards.
    pub fn plays_base_aloud(&self) -> bool {
        self.playback && self.score_base.is_some()
    }

    /// Nothing is streamed: the input is rendered once and the session ends.
    pub fn is_offline(&self) -> bool {
        !self.record && !self.playback && !self.looping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_with_playback_plays_the_base_first() {
        let cli = Cli::try_parse_from(["sonoscore", "-r", "-p", "-s", "base.wav"]).unwrap();
        assert!(cli.record);
        assert!(cli.plays_base_aloud());
        assert!(!cli.is_offline());
    }

    #[test]
    fn base_is_rendered_silently_without_playback() {
        let cli = Cli::try_parse_from(["sonoscore", "-r", "-s", "base.wav"]).unwrap();
        assert!(!cli.plays_base_aloud());

        let cli = Cli::try_parse_from(["sonoscore", "take.wav", "-s", "base.wav"]).unwrap();
        assert!(!cli.plays_base_aloud());
        assert!(cli.is_offline());
    }

    #[test]
    fn playback_alone_does_not_need_a_base() {
        let cli = Cli::try_parse_from(["sonoscore", "take.wav", "-p"]).unwrap();
        assert!(!cli.plays_base_aloud());
        assert!(!cli.is_offline());
    }
}
