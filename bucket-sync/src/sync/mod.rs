pub mod content_type;
pub mod engine;
pub mod paths;
pub mod scheduler;
pub mod walker;
