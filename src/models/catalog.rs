//! Whisper model metadata catalog.
//!
//! Known ggml model files with their expected sizes, plus path resolution
//! from a model name to the on-disk asset.

use std::path::{Path, PathBuf};

/// Metadata for a known model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Model identifier (e.g., "tiny", "base", "large")
    pub name: &'static str,
    /// Approximate model size in megabytes
    pub size_mb: u32,
    /// Whether this model supports English only
    pub english_only: bool,
}

/// Catalog of known models, smallest to largest.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "tiny",
        size_mb: 75,
        english_only: false,
    },
    ModelInfo {
        name: "tiny.en",
        size_mb: 75,
        english_only: true,
    },
    ModelInfo {
        name: "base",
        size_mb: 142,
        english_only: false,
    },
    ModelInfo {
        name: "base.en",
        size_mb: 142,
        english_only: true,
    },
    ModelInfo {
        name: "small",
        size_mb: 466,
        english_only: false,
    },
    ModelInfo {
        name: "medium",
        size_mb: 1533,
        english_only: false,
    },
    ModelInfo {
        name: "large-v3",
        size_mb: 3094,
        english_only: false,
    },
];

/// Find a model by name.
pub fn get_model(name: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.name == name)
}

/// Get all known models.
pub fn list_models() -> &'static [ModelInfo] {
    MODELS
}

/// The default model: multilingual "base", a reasonable speed/accuracy
/// balance for ja/en transcription on CPU.
pub fn default_model() -> &'static ModelInfo {
    &MODELS[2]
}

/// On-disk filename for a model name.
pub fn model_filename(name: &str) -> String {
    format!("ggml-{}.bin", name)
}

/// Resolve a model reference to a path.
///
/// A reference containing a path separator (or ending in `.bin`) is used
/// as-is; otherwise it is treated as a model name under `models_dir`.
pub fn resolve_model_path(models_dir: &Path, reference: &str) -> PathBuf {
    if reference.contains(std::path::MAIN_SEPARATOR) || reference.ends_with(".bin") {
        PathBuf::from(reference)
    } else {
        models_dir.join(model_filename(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_model_finds_known_names() {
        let model = get_model("base").unwrap();
        assert_eq!(model.size_mb, 142);
        assert!(!model.english_only);

        assert!(get_model("nonexistent").is_none());
    }

    #[test]
    fn default_model_is_multilingual_base() {
        let model = default_model();
        assert_eq!(model.name, "base");
        assert!(!model.english_only);
    }

    #[test]
    fn model_names_are_unique() {
        let mut names: Vec<_> = MODELS.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), MODELS.len());
    }

    #[test]
    fn english_models_have_en_suffix() {
        for model in list_models() {
            if model.english_only {
                assert!(model.name.ends_with(".en"));
            }
        }
    }

    #[test]
    fn resolve_plain_name_joins_models_dir() {
        let path = resolve_model_path(Path::new("/data/models"), "base");
        assert_eq!(path, PathBuf::from("/data/models/ggml-base.bin"));
    }

    #[test]
    fn resolve_explicit_path_passes_through() {
        let path = resolve_model_path(Path::new("/data/models"), "/opt/ggml-custom.bin");
        assert_eq!(path, PathBuf::from("/opt/ggml-custom.bin"));
    }

    #[test]
    fn resolve_bin_filename_passes_through() {
        let path = resolve_model_path(Path::new("/data/models"), "ggml-tiny.bin");
        assert_eq!(path, PathBuf::from("ggml-tiny.bin"));
    }
}
