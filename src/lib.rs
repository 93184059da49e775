pub mod ai;
pub mod analyzer;
pub mod config;
pub mod facts;
pub mod model;
pub mod provider;
pub mod utils;
