//! Command-line interface for voxlog
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "voxlog", version, about = "Offline voice transcription logger")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List audio input devices
    Devices,

    /// Verify model assets without loading the engine
    Verify {
        /// Model name or path (overrides config)
        #[arg(long)]
        model: Option<String>,
    },

    /// Capture audio and stream transcribed segments to stdout
    Run {
        /// Input device name (overrides config)
        #[arg(long)]
        device: Option<String>,

        /// Model name or path (overrides config)
        #[arg(long)]
        model: Option<String>,

        /// Transcription language, e.g. "ja" or "en" (overrides config)
        #[arg(long)]
        language: Option<String>,

        /// Transcribe a WAV file instead of capturing live audio
        #[arg(long)]
        input: Option<PathBuf>,

        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration: Option<u64>,

        /// Print per-segment confidence values
        #[arg(long)]
        show_confidence: bool,
    },
}

/// Default configuration file path under the user config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("voxlog").join("config.toml"))
}

/// Default directory for downloaded/placed model files.
pub fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxlog")
        .join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_devices_subcommand() {
        let cli = Cli::try_parse_from(["voxlog", "devices"]).unwrap();
        assert!(matches!(cli.command, Command::Devices));
    }

    #[test]
    fn parses_run_with_options() {
        let cli = Cli::try_parse_from([
            "voxlog",
            "run",
            "--device",
            "Stereo Mix",
            "--language",
            "en",
            "--duration",
            "30",
        ])
        .unwrap();

        match cli.command {
            Command::Run {
                device,
                language,
                duration,
                input,
                ..
            } => {
                assert_eq!(device.as_deref(), Some("Stereo Mix"));
                assert_eq!(language.as_deref(), Some("en"));
                assert_eq!(duration, Some(30));
                assert!(input.is_none());
            }
            other => panic!("Expected Run, got {:?}", other),
        }
    }

    #[test]
    fn parses_verify_with_model() {
        let cli = Cli::try_parse_from(["voxlog", "verify", "--model", "base"]).unwrap();
        match cli.command {
            Command::Verify { model } => assert_eq!(model.as_deref(), Some("base")),
            other => panic!("Expected Verify, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["voxlog", "frobnicate"]).is_err());
    }

    #[test]
    fn models_dir_ends_with_models() {
        assert!(default_models_dir().ends_with("voxlog/models"));
    }
}
