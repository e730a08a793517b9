use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use stem_splitter_ui::{load_track, read_audio, write_audio, AudioData};

fn tone(sample_rate: u32, channels: u16, frames: usize) -> AudioData {
    let samples = (0..frames)
        .flat_map(|i| {
            let v = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin() * 0.5;
            std::iter::repeat(v).take(channels as usize)
        })
        .collect();
    AudioData {
        samples,
        sample_rate,
        channels,
    }
}

#[test]
fn reads_back_written_wav() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let written = tone(22_050, 2, 2_205);
    write_audio(&path, &written).unwrap();

    let read = read_audio(&path).expect("Failed to read audio");
    assert_eq!(read.sample_rate, 22_050);
    assert_eq!(read.channels, 2);
    assert_eq!(read.samples.len(), written.samples.len());
    for (a, b) in read.samples.iter().zip(&written.samples) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
    }
}

#[test]
fn load_track_upmixes_mono() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mono.wav");
    write_audio(&path, &tone(8_000, 1, 800)).unwrap();

    let wav = load_track(&path, 2, 8_000).unwrap();
    assert_eq!(wav.dim(), (2, 800));
    assert_eq!(wav.row(0), wav.row(1));
}

#[test]
fn load_track_resamples() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fast.wav");
    write_audio(&path, &tone(16_000, 2, 16_000)).unwrap();

    let wav = load_track(&path, 2, 8_000).unwrap();
    assert_eq!(wav.dim(), (2, 8_000));
}

#[test]
fn empty_audio_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.wav");
    write_audio(
        &path,
        &AudioData {
            samples: Vec::new(),
            sample_rate: 8_000,
            channels: 2,
        },
    )
    .unwrap();

    assert!(load_track(&path, 2, 8_000).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let err = read_audio("/definitely/not/here.wav").unwrap_err();
    assert!(err.to_string().contains("Failed to open audio file"));
}
