#![allow(dead_code)]

use ndarray::{Array3, ArrayView2};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use stem_splitter_ui::{
    write_audio, AudioData, MediaDownloader, ModelHandle, Result, SeparationBackend,
    SeparationModel, StemError,
};

pub const SAMPLE_RATE: u32 = 8_000;

/// Splits audio into fixed fractions of the input, so every source is a
/// known linear function of what went in.
pub struct FakeModel {
    sources: Vec<String>,
    segment: Option<usize>,
}

impl FakeModel {
    pub fn new(sources: &[&str]) -> Self {
        Self {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            segment: Some(4_000),
        }
    }

    /// Weight of source `i`; the weights sum to one.
    pub fn weight(&self, i: usize) -> f32 {
        let n = self.sources.len() as f32;
        let total = n * (n + 1.0) / 2.0;
        (i as f32 + 1.0) / total
    }
}

impl SeparationModel for FakeModel {
    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn samplerate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn audio_channels(&self) -> usize {
        2
    }

    fn segment(&self) -> Option<usize> {
        self.segment
    }

    fn forward(&self, segment: ArrayView2<f32>) -> Result<Array3<f32>> {
        let n = self.sources.len();
        let mut out = Array3::zeros((n, segment.nrows(), segment.ncols()));
        for (i, mut src) in out.outer_iter_mut().enumerate() {
            src.assign(&(&segment * self.weight(i)));
        }
        Ok(out)
    }
}

const KNOWN_MODELS: [&str; 3] = ["htdemucs", "htdemucs_6s", "no_vocals"];

/// Knows `htdemucs` (4 sources) and `htdemucs_6s` (6 sources); counts loads.
#[derive(Default)]
pub struct FakeBackend {
    pub loads: AtomicUsize,
    pub load_delay: Option<Duration>,
    /// Known names treated as having no weights configured.
    pub missing: Vec<&'static str>,
}

impl FakeBackend {
    pub fn slow(delay: Duration) -> Self {
        Self {
            load_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn without(missing: &[&'static str]) -> Self {
        Self {
            missing: missing.to_vec(),
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SeparationBackend for FakeBackend {
    fn load(&self, name: &str) -> Result<ModelHandle> {
        if let Some(delay) = self.load_delay {
            thread::sleep(delay);
        }
        if !self.provides(name) {
            return Err(StemError::Registry(format!("Model `{name}` not found in registry")));
        }
        let model = match name {
            "htdemucs" => FakeModel::new(&["drums", "bass", "other", "vocals"]),
            "htdemucs_6s" => FakeModel::new(&["drums", "bass", "other", "vocals", "guitar", "piano"]),
            "no_vocals" => FakeModel::new(&["drums", "bass"]),
            other => return Err(StemError::Registry(format!("Model `{other}` not found in registry"))),
        };
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(model))
    }

    fn provides(&self, name: &str) -> bool {
        KNOWN_MODELS.contains(&name) && !self.missing.contains(&name)
    }
}

/// Writes the file a real downloader would have written.
pub struct FakeDownloader {
    pub title: String,
    /// File names to create, in order, with increasing modification times.
    pub files: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn new(title: &str, files: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl MediaDownloader for FakeDownloader {
    fn download(&self, url: &str, outdir: &Path) -> Result<String> {
        self.calls.lock().unwrap().push(url.to_string());
        let base = std::time::SystemTime::now();
        for (i, name) in self.files.iter().enumerate() {
            let path = outdir.join(name);
            write_stereo_wav(&path, SAMPLE_RATE, &sine(SAMPLE_RATE as usize / 4));
            let f = std::fs::File::options().write(true).open(&path)?;
            f.set_modified(base + Duration::from_secs(i as u64 + 1))?;
        }
        Ok(self.title.clone())
    }
}

pub fn sine(frames: usize) -> Vec<[f32; 2]> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            [
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3,
                (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.2,
            ]
        })
        .collect()
}

pub fn write_stereo_wav(path: &Path, sample_rate: u32, frames: &[[f32; 2]]) {
    let samples = frames.iter().flat_map(|f| f.iter().copied()).collect();
    write_audio(
        path,
        &AudioData {
            samples,
            sample_rate,
            channels: 2,
        },
    )
    .unwrap();
}
