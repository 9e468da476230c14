pub mod bindings;
pub mod clear;
pub mod config;
pub mod types;
