pub mod crypto;
pub mod download;
pub mod net;
pub mod paths;
pub mod progress;
