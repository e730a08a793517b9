use std::{fs::File, path::Path};

use anyhow::{anyhow, Context};
use hound::WavWriter;
use ndarray::Array2;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use crate::{
    core::dsp::{convert_channels, deinterleave, interleave, resample},
    error::Result,
    types::AudioData,
};

pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path: &Path = path.as_ref();

    let file: File =
        File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;

    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No supported audio track found")?;
    let track_id = track.id;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: u16 = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!(ts = packet.ts(), "skipping undecodable packet: {msg}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        samples.extend_from_slice(buffer.samples());
    }

    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        samples = samples.len(),
        "read audio"
    );

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode `path` and bring it to `channels` x `sample_rate`, planar.
pub fn load_track<P: AsRef<Path>>(path: P, channels: usize, sample_rate: u32) -> Result<Array2<f32>> {
    let audio = read_audio(path.as_ref())?;
    if audio.channels == 0 || audio.samples.is_empty() {
        return Err(anyhow!("Empty audio: {}", path.as_ref().display()).into());
    }

    let planar = deinterleave(&audio.samples, audio.channels as usize)?;
    let planar = convert_channels(planar, channels)?;
    if audio.sample_rate == sample_rate {
        return Ok(planar);
    }

    debug!(from = audio.sample_rate, to = sample_rate, "resampling input");
    resample(&planar, audio.sample_rate, sample_rate)
}

pub fn write_audio(path: &Path, audio: &AudioData) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for sample in &audio.samples {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Write a planar waveform as 16-bit WAV. Loud stems are scaled down as a
/// whole instead of being clipped.
pub fn save_audio(wav: &Array2<f32>, path: &Path, sample_rate: u32) -> Result<()> {
    let peak = wav.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
    let scale = 1.0 / (1.01 * peak).max(1.0);
    if scale < 1.0 {
        debug!(path = %path.display(), peak, "rescaling stem to avoid clipping");
    }

    let samples = interleave(wav).into_iter().map(|s| s * scale).collect();
    write_audio(
        path,
        &AudioData {
            samples,
            sample_rate,
            channels: wav.nrows() as u16,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn save_audio_rescales_loud_input() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("loud.wav");
        let wav = array![[2.0f32, -1.0], [0.5, 0.0]];
        save_audio(&wav, &p, 8000).unwrap();

        let r = hound::WavReader::open(&p).unwrap();
        assert_eq!(r.spec().channels, 2);
        assert_eq!(r.spec().sample_rate, 8000);
        let s: Vec<i16> = r.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(s.len(), 4);
        // 2.0 / 2.02 of full scale, not clipped to i16::MAX
        assert!(s[0] < i16::MAX && s[0] > 32_000);
        assert!(s[2] < 0);
    }
}
