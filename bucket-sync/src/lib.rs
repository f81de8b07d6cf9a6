pub mod config;
pub mod outputs;
pub mod sync;
