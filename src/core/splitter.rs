use crate::{
    core::{
        audio::{load_track, save_audio},
        dsp::NormRef,
        separation::{apply_model, ModelHandle},
    },
    error::{Result, StemError},
    model::cache::ModelCache,
    types::{ApplyParams, SplitProgress, Stem, StemConfig},
};

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

const VOCALS: &str = "vocals";
const INSTRUMENTAL: &str = "instrumental";

/// Runs one track through a cached model and writes the resulting stems.
pub struct Separator {
    cache: ModelCache,
    params: ApplyParams,
}

impl Separator {
    pub fn new(cache: ModelCache) -> Self {
        Self {
            cache,
            params: ApplyParams::default(),
        }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn separate(
        &self,
        audio_path: Option<&Path>,
        config: &StemConfig,
        progress: &dyn Fn(SplitProgress),
    ) -> Result<Vec<Stem>> {
        let audio_path = audio_path.ok_or(StemError::NoAudio)?;
        let _span = info_span!("separate", model = config.model, stems = config.stems).entered();

        progress(SplitProgress::Stage("resolve_model"));
        let model = self.cache.get(config.model)?;
        check_config(&model, config)?;

        progress(SplitProgress::Stage("read_audio"));
        let mut wav = load_track(audio_path, model.audio_channels(), model.samplerate())?;
        info!(
            path = %audio_path.display(),
            channels = wav.nrows(),
            samples = wav.ncols(),
            "loaded track"
        );

        let norm = NormRef::from_waveform(wav.view());
        norm.normalize(&mut wav);

        progress(SplitProgress::Stage("infer"));
        let mut sources = apply_model(model.as_ref(), wav.view(), self.params, progress)?;
        norm.denormalize(&mut sources);

        let stems = if config.stems == 2 {
            merge_two_stems(&sources, model.sources(), config.model)?
        } else {
            model
                .sources()
                .iter()
                .cloned()
                .zip(sources.outer_iter().map(|s| s.to_owned()))
                .collect()
        };

        progress(SplitProgress::Stage("write_stems"));
        let outdir = tempfile::Builder::new().prefix("demucs_").tempdir()?.keep();
        let written = write_stems(&stems, &outdir, model.samplerate(), progress)?;

        info!(outdir = %outdir.display(), stems = written.len(), "separation finished");
        progress(SplitProgress::Finished);
        Ok(written)
    }
}

/// The requested stem count must be producible from the model's sources.
pub fn check_config(model: &ModelHandle, config: &StemConfig) -> Result<()> {
    let native = model.sources().len();
    if config.stems == 2 {
        if !model.sources().iter().any(|s| s == VOCALS) {
            return Err(StemError::MissingStem {
                model: config.model.to_string(),
                stem: VOCALS.to_string(),
            });
        }
    } else if config.stems != native {
        return Err(StemError::StemCountMismatch {
            model: config.model.to_string(),
            native,
            requested: config.stems,
        });
    }
    Ok(())
}

/// Collapse every non-vocal source into one equally weighted instrumental.
pub fn merge_two_stems(
    sources: &Array3<f32>,
    names: &[String],
    model: &str,
) -> Result<Vec<(String, Array2<f32>)>> {
    let vocals_idx = names
        .iter()
        .position(|n| n == VOCALS)
        .ok_or_else(|| StemError::MissingStem {
            model: model.to_string(),
            stem: VOCALS.to_string(),
        })?;

    let (_, channels, samples) = sources.dim();
    let mut instrumental = Array2::<f32>::zeros((channels, samples));
    for (i, src) in sources.axis_iter(Axis(0)).enumerate() {
        if i != vocals_idx {
            instrumental += &src;
        }
    }

    Ok(vec![
        (VOCALS.to_string(), sources.index_axis(Axis(0), vocals_idx).to_owned()),
        (INSTRUMENTAL.to_string(), instrumental),
    ])
}

fn write_stems(
    stems: &[(String, Array2<f32>)],
    outdir: &Path,
    sample_rate: u32,
    progress: &dyn Fn(SplitProgress),
) -> Result<Vec<Stem>> {
    let paths: Vec<PathBuf> = stems
        .par_iter()
        .map(|(name, wav)| {
            let path = outdir.join(format!("{name}.wav"));
            save_audio(wav, &path, sample_rate).map(|_| path)
        })
        .collect::<Result<_>>()?;

    let total = stems.len();
    Ok(stems
        .iter()
        .zip(paths)
        .enumerate()
        .map(|(i, ((name, _), path))| {
            progress(SplitProgress::Writing {
                stem: name.clone(),
                done: i + 1,
                total,
            });
            Stem {
                name: name.clone(),
                path,
            }
        })
        .collect())
}
