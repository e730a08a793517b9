use anyhow::anyhow;
use ndarray::{Array2, ArrayView2, Axis};
use num_complex::Complex32;
use once_cell::sync::Lazy;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;

struct FftCache {
    fft_forward: Arc<dyn Fft<f32>>,
    hann_window: Vec<f32>,
}

impl FftCache {
    fn new(n_fft: usize) -> Self {
        let mut planner = FftPlanner::new();
        FftCache {
            fft_forward: planner.plan_fft_forward(n_fft),
            hann_window: compute_hann(n_fft),
        }
    }
}

static FFT_CACHE_4096: Lazy<FftCache> = Lazy::new(|| FftCache::new(4096));

fn compute_hann(n_fft: usize) -> Vec<f32> {
    if n_fft <= 1 {
        return vec![1.0];
    }
    let denom = (n_fft - 1) as f32;
    (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

/// Interleaved frames to `[channels, samples]`. A trailing partial frame is dropped.
pub fn deinterleave(interleaved: &[f32], channels: usize) -> Result<Array2<f32>> {
    if channels == 0 {
        return Err(anyhow!("cannot deinterleave zero channels").into());
    }
    let frames = interleaved.len() / channels;
    let frame_major = Array2::from_shape_vec((frames, channels), interleaved[..frames * channels].to_vec())?;
    Ok(frame_major.reversed_axes().as_standard_layout().to_owned())
}

pub fn interleave(planar: &Array2<f32>) -> Vec<f32> {
    planar.t().iter().copied().collect()
}

/// Bring a planar waveform to `target` channels.
///
/// Same count passes through; mono targets take the channel mean; a mono
/// source is replicated; otherwise the first `target` channels are kept.
pub fn convert_channels(wav: Array2<f32>, target: usize) -> Result<Array2<f32>> {
    let src = wav.nrows();
    if src == target {
        Ok(wav)
    } else if target == 1 {
        Ok(wav.mean_axis(Axis(0)).ok_or_else(|| anyhow!("empty waveform"))?.insert_axis(Axis(0)))
    } else if src == 1 {
        Ok(wav.broadcast((target, wav.ncols())).ok_or_else(|| anyhow!("broadcast failed"))?.to_owned())
    } else if src >= target {
        Ok(wav.slice(ndarray::s![..target, ..]).to_owned())
    } else {
        Err(anyhow!("cannot convert {src} channels to {target}").into())
    }
}

/// Sinc resampling of every channel from `from_sr` to `to_sr`.
pub fn resample(wav: &Array2<f32>, from_sr: u32, to_sr: u32) -> Result<Array2<f32>> {
    if from_sr == to_sr {
        return Ok(wav.clone());
    }
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let (channels, frames) = wav.dim();
    if frames == 0 {
        return Ok(Array2::zeros((channels, 0)));
    }
    let ratio = to_sr as f64 / from_sr as f64;
    let expected = (frames as f64 * ratio).round() as usize;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, channels)
        .map_err(|e| anyhow!("resampler init: {e}"))?;

    let input: Vec<Vec<f32>> = wav.outer_iter().map(|ch| ch.to_vec()).collect();
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| anyhow!("resample: {e}"))?;

    // The filter holds back the tail; push silence through until it is out.
    let mut flushes = 0;
    while output.first().map_or(0, Vec::len) < expected {
        if flushes == 4 {
            return Err(anyhow!("resampler produced too few frames").into());
        }
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| anyhow!("resample flush: {e}"))?;
        for (out, more) in output.iter_mut().zip(tail) {
            out.extend(more);
        }
        flushes += 1;
    }

    let flat: Vec<f32> = output
        .into_iter()
        .flat_map(|mut ch| {
            ch.truncate(expected);
            ch
        })
        .collect();
    debug!(from_sr, to_sr, frames, out = expected, flushes, "resampled");
    Ok(Array2::from_shape_vec((channels, expected), flat)?)
}

/// Mean and standard deviation of the channel-averaged input, used to bring
/// audio into the model's range and back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormRef {
    pub mean: f32,
    pub std: f32,
}

impl NormRef {
    pub fn identity() -> Self {
        NormRef { mean: 0.0, std: 1.0 }
    }

    /// Silent or degenerate input has no usable deviation; scaling is then
    /// skipped (std = 1) and only the mean is removed.
    pub fn from_waveform(wav: ArrayView2<f32>) -> Self {
        let mono = match wav.mean_axis(Axis(0)) {
            Some(m) => m,
            None => return NormRef::identity(),
        };
        let n = mono.len();
        if n == 0 {
            return NormRef::identity();
        }
        let mean = mono.sum() / n as f32;
        let var = if n > 1 {
            mono.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / (n - 1) as f32
        } else {
            0.0
        };
        let std = var.sqrt();

        if std > 0.0 && std.is_finite() {
            NormRef { mean, std }
        } else {
            warn!(std, "input has no variance, skipping normalization scale");
            NormRef { mean, std: 1.0 }
        }
    }

    pub fn normalize(&self, wav: &mut Array2<f32>) {
        let (mean, std) = (self.mean, self.std);
        wav.mapv_inplace(|x| (x - mean) / std);
    }

    pub fn denormalize<D: ndarray::Dimension>(&self, wav: &mut ndarray::Array<f32, D>) {
        let (mean, std) = (self.mean, self.std);
        wav.mapv_inplace(|x| x * std + mean);
    }
}

/// Compute complex-as-channels spectrogram for stereo with center padding.
/// Returns (buffer, F=2048, Frames=336) for T=343_980, n_fft=4096, hop=1024.
/// Layout is [1, 4, F, Frames] flattened => channels order: L.re, L.im, R.re, R.im.
pub fn stft_cac_stereo_centered(
    left: &[f32],
    right: &[f32],
    n_fft: usize,
    hop: usize,
) -> (Vec<f32>, usize, usize) {
    assert_eq!(left.len(), right.len());

    let local;
    let cache: &FftCache = if n_fft == 4096 {
        &FFT_CACHE_4096
    } else {
        local = FftCache::new(n_fft);
        &local
    };

    let t = left.len();
    let pad = n_fft / 2;

    let padded_len = pad + t + pad;
    let mut l_sig = vec![0.0f32; padded_len];
    let mut r_sig = vec![0.0f32; padded_len];

    l_sig[pad..pad + t].copy_from_slice(left);
    r_sig[pad..pad + t].copy_from_slice(right);

    let frames = 1 + (t / hop);
    let f_bins = n_fft / 2;

    let fft = &cache.fft_forward;
    let window = &cache.hann_window;

    let mut out = vec![0.0f32; 4 * f_bins * frames];

    let mut buf_l = vec![Complex32::zero(); n_fft];
    let mut buf_r = vec![Complex32::zero(); n_fft];

    for fr in 0..frames {
        let start = fr * hop;
        let li = &l_sig[start..start + n_fft];
        let ri = &r_sig[start..start + n_fft];

        for i in 0..n_fft {
            let w = window[i];
            buf_l[i] = Complex32::new(li[i] * w, 0.0);
            buf_r[i] = Complex32::new(ri[i] * w, 0.0);
        }

        fft.process(&mut buf_l);
        fft.process(&mut buf_r);

        for fi in 0..f_bins {
            let base_fr = fi * frames + fr;
            out[base_fr] = buf_l[fi].re;
            out[f_bins * frames + base_fr] = buf_l[fi].im;
            out[2 * f_bins * frames + base_fr] = buf_r[fi].re;
            out[3 * f_bins * frames + base_fr] = buf_r[fi].im;
        }
    }

    (out, f_bins, frames)
}
