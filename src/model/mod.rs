pub mod cache;
pub mod model_manager;
pub mod registry;
