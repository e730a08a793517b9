//! The separation capability as the pipeline sees it.
//!
//! A [`SeparationModel`] only knows how to run one segment of audio through
//! the network. [`apply_model`] drives it over a whole track: random-free
//! shift averaging, overlapping chunks with a triangular crossfade, progress.

use std::sync::Arc;

use anyhow::anyhow;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use tracing::debug;

use crate::{
    error::Result,
    types::{ApplyParams, SplitProgress},
};

pub trait SeparationModel: Send + Sync {
    /// Native stem names, in the order `forward` returns them.
    fn sources(&self) -> &[String];

    fn samplerate(&self) -> u32;

    fn audio_channels(&self) -> usize;

    /// Fixed input length the network was exported with, if any.
    fn segment(&self) -> Option<usize>;

    /// Separate one `[channels, samples]` segment into `[sources, channels, samples]`.
    fn forward(&self, segment: ArrayView2<f32>) -> Result<Array3<f32>>;
}

pub type ModelHandle = Arc<dyn SeparationModel>;

/// Constructs model handles by name. Construction may be slow (weights are
/// fetched and verified) and fails for unknown names.
pub trait SeparationBackend: Send + Sync {
    fn load(&self, name: &str) -> Result<ModelHandle>;

    /// Short device name for display (e.g. "cpu").
    fn device(&self) -> &str {
        "cpu"
    }

    /// Whether `load(name)` has weights to go on, without loading them.
    fn provides(&self, _name: &str) -> bool {
        true
    }
}

/// Run `model` over a full `[channels, samples]` waveform.
pub fn apply_model(
    model: &dyn SeparationModel,
    wav: ArrayView2<f32>,
    params: ApplyParams,
    progress: &dyn Fn(SplitProgress),
) -> Result<Array3<f32>> {
    if params.shifts == 0 {
        return Err(anyhow!("shifts must be at least 1").into());
    }
    if !(0.0..1.0).contains(&params.overlap) {
        return Err(anyhow!("overlap must be in [0, 1), got {}", params.overlap).into());
    }
    if params.shifts == 1 {
        return run_pass(model, wav, params, progress);
    }

    let (channels, length) = wav.dim();
    let max_shift = (model.samplerate() / 2) as usize;
    let mut padded = Array2::<f32>::zeros((channels, length + 2 * max_shift));
    padded.slice_mut(s![.., max_shift..max_shift + length]).assign(&wav);

    let mut out: Option<Array3<f32>> = None;
    for k in 0..params.shifts {
        let offset = k * max_shift / params.shifts;
        debug!(pass = k + 1, offset, "shifted pass");
        let shifted = padded.slice(s![.., offset..offset + length + max_shift]);
        let est = run_pass(model, shifted, params, progress)?;
        let start = max_shift - offset;
        let est = est.slice(s![.., .., start..start + length]).to_owned();
        match out.as_mut() {
            Some(acc) => *acc += &est,
            None => out = Some(est),
        }
    }

    let mut out = out.ok_or_else(|| anyhow!("no shifted pass produced output"))?;
    out /= params.shifts as f32;
    Ok(out)
}

fn run_pass(
    model: &dyn SeparationModel,
    wav: ArrayView2<f32>,
    params: ApplyParams,
    progress: &dyn Fn(SplitProgress),
) -> Result<Array3<f32>> {
    let length = wav.ncols();
    let segment = model.segment().unwrap_or(length).max(1);

    if !params.split || length <= segment {
        if length > segment {
            return Err(anyhow!(
                "input of {length} samples exceeds model segment {segment} and split is disabled"
            )
            .into());
        }
        progress(SplitProgress::chunks(0, 1));
        let out = forward_padded(model, wav, segment)?;
        progress(SplitProgress::chunks(1, 1));
        return Ok(out);
    }

    let stride = (((1.0 - params.overlap) * segment as f32) as usize).max(1);
    let offsets: Vec<usize> = (0..length).step_by(stride).collect();
    let total = offsets.len();
    let weight = transition_weight(segment);

    let sources = model.sources().len();
    let channels = wav.nrows();
    let mut out = Array3::<f32>::zeros((sources, channels, length));
    let mut sum_weight = Array1::<f32>::zeros(length);

    progress(SplitProgress::chunks(0, total));
    for (i, &offset) in offsets.iter().enumerate() {
        let end = (offset + segment).min(length);
        let chunk_len = end - offset;
        let chunk_out = forward_padded(model, wav.slice(s![.., offset..end]), segment)?;

        let w = weight.slice(s![..chunk_len]);
        let mut dst = out.slice_mut(s![.., .., offset..end]);
        dst += &(&chunk_out * &w);
        let mut sw = sum_weight.slice_mut(s![offset..end]);
        sw += &w;

        debug!(chunk = i + 1, total, offset, "separated chunk");
        progress(SplitProgress::chunks(i + 1, total));
    }

    out /= &sum_weight.insert_axis(Axis(0)).insert_axis(Axis(0));
    Ok(out)
}

/// Zero-pad `chunk` to `segment` samples, forward it and trim back.
fn forward_padded(
    model: &dyn SeparationModel,
    chunk: ArrayView2<f32>,
    segment: usize,
) -> Result<Array3<f32>> {
    let (channels, len) = chunk.dim();
    let out = if len == segment {
        model.forward(chunk)?
    } else {
        let mut padded = Array2::<f32>::zeros((channels, segment));
        padded.slice_mut(s![.., ..len]).assign(&chunk);
        model.forward(padded.view())?
    };

    let (sources, out_channels, out_len) = out.dim();
    if sources != model.sources().len() || out_channels != channels || out_len < len {
        return Err(anyhow!(
            "model returned shape [{sources}, {out_channels}, {out_len}], expected [{}, {channels}, >= {len}]",
            model.sources().len()
        )
        .into());
    }
    Ok(out.slice_move(s![.., .., ..len]))
}

/// Triangle rising `1..=L/2` then falling `L-L/2..=1`, scaled to peak 1.
fn transition_weight(segment: usize) -> Array1<f32> {
    let half = segment / 2;
    let rising = (1..=half).map(|v| v as f32);
    let falling = (1..=segment - half).rev().map(|v| v as f32);
    let w: Array1<f32> = rising.chain(falling).collect();
    let max = w.fold(0.0f32, |m, &x| m.max(x));
    w / max
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every source is the input scaled by (index + 1).
    struct Scale {
        sources: Vec<String>,
        segment: Option<usize>,
        calls: AtomicUsize,
    }

    impl Scale {
        fn new(n: usize, segment: Option<usize>) -> Self {
            Self {
                sources: (0..n).map(|i| format!("s{i}")).collect(),
                segment,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SeparationModel for Scale {
        fn sources(&self) -> &[String] {
            &self.sources
        }
        fn samplerate(&self) -> u32 {
            100
        }
        fn audio_channels(&self) -> usize {
            2
        }
        fn segment(&self) -> Option<usize> {
            self.segment
        }
        fn forward(&self, segment: ArrayView2<f32>) -> Result<Array3<f32>> {
            if let Some(l) = self.segment {
                assert_eq!(segment.ncols(), l);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = self.sources.len();
            let mut out = Array3::zeros((n, segment.nrows(), segment.ncols()));
            for (i, mut src) in out.outer_iter_mut().enumerate() {
                src.assign(&(&segment * (i + 1) as f32));
            }
            Ok(out)
        }
    }

    fn ramp(len: usize) -> Array2<f32> {
        Array2::from_shape_fn((2, len), |(c, i)| (i as f32 * 0.01).sin() + c as f32 * 0.1)
    }

    #[test]
    fn chunked_pass_reconstructs_linear_model() {
        let model = Scale::new(3, Some(64));
        let wav = ramp(1000);
        let out = apply_model(&model, wav.view(), ApplyParams::default(), &|_| {}).unwrap();

        assert_eq!(out.dim(), (3, 2, 1000));
        for (i, src) in out.outer_iter().enumerate() {
            for (a, b) in src.iter().zip(wav.iter()) {
                assert_abs_diff_eq!(*a, b * (i + 1) as f32, epsilon = 1e-4);
            }
        }
        // stride 48 over 1000 samples
        assert_eq!(model.calls.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn any_overlap_reconstructs_input() {
        let wav = ramp(777);
        for overlap in [0.0, 0.1, 0.25, 0.5, 0.9] {
            let model = Scale::new(1, Some(100));
            let params = ApplyParams {
                overlap,
                ..ApplyParams::default()
            };
            let out = apply_model(&model, wav.view(), params, &|_| {}).unwrap();
            for (a, b) in out.iter().zip(wav.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn reports_one_progress_event_per_chunk() {
        let model = Scale::new(1, Some(100));
        let wav = ramp(300);
        let seen = std::sync::Mutex::new(Vec::new());
        apply_model(&model, wav.view(), ApplyParams::default(), &|p| {
            if let SplitProgress::Chunks { done, total, .. } = p {
                seen.lock().unwrap().push((done, total));
            }
        })
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first(), Some(&(0, 4)));
        assert_eq!(seen.last(), Some(&(4, 4)));
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn short_input_is_padded_to_segment() {
        let model = Scale::new(2, Some(512));
        let wav = ramp(100);
        let out = apply_model(&model, wav.view(), ApplyParams::default(), &|_| {}).unwrap();
        assert_eq!(out.dim(), (2, 2, 100));
        assert_abs_diff_eq!(out[(1, 0, 50)], wav[(0, 50)] * 2.0, epsilon = 1e-6);
    }

    #[test]
    fn unsplit_long_input_is_rejected() {
        let model = Scale::new(1, Some(10));
        let params = ApplyParams {
            split: false,
            ..ApplyParams::default()
        };
        assert!(apply_model(&model, ramp(11).view(), params, &|_| {}).is_err());
    }

    #[test]
    fn shifted_passes_average_back_to_input() {
        let model = Scale::new(2, None);
        let wav = ramp(200);
        let params = ApplyParams {
            shifts: 3,
            ..ApplyParams::default()
        };
        let out = apply_model(&model, wav.view(), params, &|_| {}).unwrap();
        assert_eq!(out.dim(), (2, 2, 200));
        for (a, b) in out.index_axis(Axis(0), 0).iter().zip(wav.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    fn rejects_bad_overlap() {
        let model = Scale::new(1, None);
        let params = ApplyParams {
            overlap: 1.0,
            ..ApplyParams::default()
        };
        assert!(apply_model(&model, ramp(10).view(), params, &|_| {}).is_err());
    }
}
