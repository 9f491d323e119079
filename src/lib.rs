pub mod config;
pub mod digest;
pub mod store;
pub mod when;
