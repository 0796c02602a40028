pub mod config;
pub mod generator;
pub mod name_finder;
pub mod prompt_builder;
pub mod replicate_client;
pub mod texture_store;

pub use prompt_builder::render;
