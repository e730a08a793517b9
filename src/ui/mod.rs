pub mod server;
pub mod slots;
