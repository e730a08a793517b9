use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{info, warn};

use crate::io::paths::default_upload_dir;

/// Runtime settings, read from an optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    /// Where remote media is downloaded to.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Where uploaded files are stored before separation.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default)]
    pub device: Device,
    /// Program used to fetch remote media.
    #[serde(default = "default_ytdlp")]
    pub ytdlp: String,
    /// Model name -> manifest URL, overriding the built-in registry.
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("input")
}

fn default_ytdlp() -> String {
    "yt-dlp".into()
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    7860
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            download_dir: default_download_dir(),
            upload_dir: default_upload_dir(),
            device: Device::default(),
            ytdlp: default_ytdlp(),
            models: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing or unreadable file falls back to
    /// defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(settings) => {
                    info!(path = %path.display(), "loaded settings");
                    settings
                }
                Err(e) => {
                    warn!(path = %path.display(), "invalid settings file, using defaults: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no settings file, using defaults");
                Self::default()
            }
        }
    }
}

/// Where inference runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CUDA when the runtime reports it usable, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    #[serde(alias = "gpu")]
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device `{other}` (expected auto, cpu or cuda)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let s: Settings = toml::from_str(
            r#"
            device = "cuda"

            [server]
            port = 9000

            [models]
            htdemucs_6s = "http://localhost/6s.json"
            "#,
        )
        .unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.device, Device::Cuda);
        assert_eq!(s.download_dir, PathBuf::from("input"));
        assert_eq!(s.ytdlp, "yt-dlp");
        assert_eq!(s.models["htdemucs_6s"], "http://localhost/6s.json");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let s = Settings::load_or_default("/nonexistent/stem-splitter.toml");
        assert_eq!(s.server.port, 7860);
        assert_eq!(s.device, Device::Auto);
    }

    #[test]
    fn gpu_alias_in_file_keeps_model_overrides() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut f,
            b"device = \"gpu\"\n\n[models]\nhtdemucs_6s = \"http://localhost/6s.json\"\n",
        )
        .unwrap();

        let s = Settings::load_or_default(f.path());
        assert_eq!(s.device, Device::Cuda);
        assert_eq!(s.models["htdemucs_6s"], "http://localhost/6s.json");
    }

    #[test]
    fn device_parses_loosely() {
        assert_eq!("GPU".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!("Auto".parse::<Device>().unwrap(), Device::Auto);
        assert!("tpu".parse::<Device>().is_err());
    }
}
