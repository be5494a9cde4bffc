//! Dispatcher schema and handler implementations

pub mod commands;
pub mod schema;
pub mod text;
pub mod voice;
