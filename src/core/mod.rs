pub mod audio;
pub mod dsp;
#[cfg(feature = "onnx")]
pub mod engine;
pub mod separation;
pub mod splitter;
