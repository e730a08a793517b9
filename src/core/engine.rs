use crate::{
    config::Device,
    core::{
        dsp::stft_cac_stereo_centered,
        separation::{ModelHandle, SeparationBackend, SeparationModel},
    },
    error::{Result, StemError},
    model::{model_manager::ensure_model, registry::resolve_manifest_url},
    types::ModelManifest,
};

use anyhow::anyhow;
use ndarray::{Array3, ArrayView2};
use once_cell::sync::OnceCell;
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::{Tensor, Value},
};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

static ORT_INIT: OnceCell<()> = OnceCell::new();

const DEMUCS_NFFT: usize = 4096;
const DEMUCS_HOP: usize = 1024;

/// Loads HTDemucs ONNX exports, fetching weights on first use.
pub struct OnnxBackend {
    manifest_overrides: HashMap<String, String>,
    device: Device,
}

impl OnnxBackend {
    pub fn new(manifest_overrides: HashMap<String, String>, device: Device) -> Self {
        let device = match device {
            Device::Auto => detect_device(),
            other => other,
        };
        Self {
            manifest_overrides,
            device,
        }
    }
}

fn detect_device() -> Device {
    match CUDAExecutionProvider::default().is_available() {
        Ok(true) => {
            info!("CUDA execution provider available");
            Device::Cuda
        }
        Ok(false) => Device::Cpu,
        Err(e) => {
            info!("CUDA availability check failed, using cpu: {e}");
            Device::Cpu
        }
    }
}

impl SeparationBackend for OnnxBackend {
    fn load(&self, name: &str) -> Result<ModelHandle> {
        let files = ensure_model(name, self.manifest_overrides.get(name).map(String::as_str))?;
        let model = OnnxModel::open(&files.local_path, files.manifest, self.device)?;
        Ok(Arc::new(model))
    }

    fn device(&self) -> &str {
        self.device.as_str()
    }

    fn provides(&self, name: &str) -> bool {
        self.manifest_overrides.contains_key(name) || resolve_manifest_url(name).is_ok()
    }
}

pub struct OnnxModel {
    session: Mutex<Session>,
    manifest: ModelManifest,
}

impl OnnxModel {
    pub fn open(path: &Path, manifest: ModelManifest, device: Device) -> Result<Self> {
        // Pin error type so `?` is unambiguous.
        ORT_INIT.get_or_try_init::<_, StemError>(|| {
            ort::init().commit().map_err(StemError::from)?;
            Ok(())
        })?;

        if manifest.stems.is_empty() {
            return Err(StemError::Manifest(format!("manifest `{}` lists no stems", manifest.name)));
        }

        let builder = SessionBuilder::new()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        let builder = match device {
            Device::Cuda | Device::Auto => builder.with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])?,
            Device::Cpu => builder.with_execution_providers([CPUExecutionProvider::default().build()])?,
        };
        let session = builder.commit_from_file(path)?;

        info!(
            model = %manifest.name,
            version = %manifest.version,
            device = device.as_str(),
            window = manifest.window,
            "onnx session ready"
        );
        Ok(Self {
            session: Mutex::new(session),
            manifest,
        })
    }
}

impl SeparationModel for OnnxModel {
    fn sources(&self) -> &[String] {
        &self.manifest.stems
    }

    fn samplerate(&self) -> u32 {
        self.manifest.sample_rate
    }

    fn audio_channels(&self) -> usize {
        2
    }

    fn segment(&self) -> Option<usize> {
        Some(self.manifest.window)
    }

    fn forward(&self, segment: ArrayView2<f32>) -> Result<Array3<f32>> {
        let (channels, t) = segment.dim();
        if channels != 2 {
            return Err(anyhow!("expected stereo segment, got {channels} channels").into());
        }
        if t != self.manifest.window {
            return Err(anyhow!("Bad window length {} (expected {})", t, self.manifest.window).into());
        }
        let left = segment.row(0).to_vec();
        let right = segment.row(1).to_vec();

        // Time branch [1,2,T], planar
        let mut planar = Vec::with_capacity(2 * t);
        planar.extend_from_slice(&left);
        planar.extend_from_slice(&right);
        let time_value: Value = Tensor::from_array((vec![1, 2, t], planar))?.into_dyn();

        // Spec branch [1,4,F,Frames] with center padding, Hann, 4096/1024
        let (spec_cac, f_bins, frames) = stft_cac_stereo_centered(&left, &right, DEMUCS_NFFT, DEMUCS_HOP);
        let spec_value: Value = Tensor::from_array((vec![1, 4, f_bins, frames], spec_cac))?.into_dyn();

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("onnx session poisoned"))?;

        let in_time = input_name(&session, "input")?;
        let in_spec = input_name(&session, "x")?;

        let outputs = session.run(vec![(in_time, time_value), (in_spec, spec_value)])?;

        let wanted = self.manifest.output.as_str();
        let out_td: Value = outputs
            .into_iter()
            .find_map(|(name, v)| if name == wanted { Some(v) } else { None })
            .ok_or_else(|| anyhow!("Model did not return '{wanted}' output"))?;

        // [1,S,2,T] squeezed to [S,2,T]
        let s = self.manifest.stems.len();
        let (_shape, data) = out_td.try_extract_tensor::<f32>()?;
        if data.len() != s * 2 * t {
            return Err(anyhow!(
                "Unexpected '{wanted}' length {} (expected {})",
                data.len(),
                s * 2 * t
            )
            .into());
        }
        Ok(Array3::from_shape_vec((s, 2, t), data.to_vec())?)
    }
}

fn input_name(session: &Session, name: &str) -> Result<String> {
    session
        .inputs
        .iter()
        .find(|i| i.name == name)
        .map(|i| i.name.clone())
        .ok_or_else(|| anyhow!("Model missing input '{name}'").into())
}
