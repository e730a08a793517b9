//! # stem-splitter-ui
//!
//! A small local front-end for AI stem separation: fetch or upload a track,
//! run it through a pretrained separation model and hand back one WAV per
//! stem, either to the bundled web page or to the command line.

pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod model;
pub mod types;
pub mod ui;

#[cfg(feature = "onnx")]
pub use crate::core::engine::{OnnxBackend, OnnxModel};
pub use crate::{
    config::{Device, Settings},
    core::{
        audio::{load_track, read_audio, save_audio, write_audio},
        separation::{apply_model, ModelHandle, SeparationBackend, SeparationModel},
        splitter::Separator,
    },
    error::{Result, StemError},
    io::{
        download::{fetch_audio, AudioSource, MediaDownloader, YtDlp},
        progress::set_download_progress_callback,
    },
    model::{cache::ModelCache, model_manager::ensure_model},
    types::{ApplyParams, AudioData, SplitProgress, Stem, StemConfig},
    ui::{
        server::{build_router, serve, AppState},
        slots::{render, visibility, SlotUpdate},
    },
};
