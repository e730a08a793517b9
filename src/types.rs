use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, StemError};

/// Interleaved PCM as it comes out of the decoder.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A stem-count choice offered to the user: which model to run and how many
/// stems to hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StemConfig {
    pub label: &'static str,
    pub model: &'static str,
    pub stems: usize,
}

pub const STEM_CONFIGS: [StemConfig; 3] = [
    StemConfig {
        label: "6 stems (vocals, drums, bass, guitar, piano, other)",
        model: "htdemucs_6s",
        stems: 6,
    },
    StemConfig {
        label: "4 stems (vocals, drums, bass, other)",
        model: "htdemucs",
        stems: 4,
    },
    StemConfig {
        label: "2 stems (vocals, instrumental)",
        model: "htdemucs",
        stems: 2,
    },
];

impl StemConfig {
    pub fn all() -> &'static [StemConfig] {
        &STEM_CONFIGS
    }

    pub fn default_choice() -> &'static StemConfig {
        &STEM_CONFIGS[0]
    }

    pub fn from_label(label: &str) -> Result<&'static StemConfig> {
        STEM_CONFIGS
            .iter()
            .find(|c| c.label == label)
            .ok_or_else(|| StemError::UnknownConfig(label.to_string()))
    }

    pub fn from_count(stems: usize) -> Result<&'static StemConfig> {
        STEM_CONFIGS
            .iter()
            .find(|c| c.stems == stems)
            .ok_or_else(|| StemError::UnknownConfig(format!("{stems} stems")))
    }
}

/// One written stem file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stem {
    pub name: String,
    pub path: PathBuf,
}

/// Fixed inference parameters handed to the separation capability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApplyParams {
    pub shifts: usize,
    pub split: bool,
    pub overlap: f32,
}

impl Default for ApplyParams {
    fn default() -> Self {
        Self {
            shifts: 1,
            split: true,
            overlap: 0.25,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SplitProgress {
    Stage(&'static str),
    Chunks {
        done: usize,
        total: usize,
        percent: f32,
    },
    Writing {
        stem: String,
        done: usize,
        total: usize,
    },
    Finished,
}

impl SplitProgress {
    pub fn chunks(done: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            done as f32 / total as f32 * 100.0
        };
        SplitProgress::Chunks {
            done,
            total,
            percent,
        }
    }
}

/// Manifest describing one exported model and where its weights live.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub version: String,
    pub backend: String,
    pub sample_rate: u32,
    pub window: usize,
    pub hop: usize,
    pub stems: Vec<String>,
    pub input_layout: String,
    pub output_layout: String,
    #[serde(default = "default_output_name")]
    pub output: String,
    #[serde(default)]
    pub artifacts: Vec<ModelArtifact>,
}

fn default_output_name() -> String {
    "add_67".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub file: String,
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub size_bytes: u64,
}

impl ModelManifest {
    /// The artifact the runtime should load: the first `.onnx` file, or the
    /// first artifact listed.
    pub fn resolve_primary_artifact(&self) -> std::result::Result<&ModelArtifact, String> {
        self.artifacts
            .iter()
            .find(|a| a.file.ends_with(".onnx"))
            .or_else(|| self.artifacts.first())
            .ok_or_else(|| format!("manifest `{}` lists no artifacts", self.name))
    }
}
