pub mod aliases;
pub mod config;
pub mod log;
pub mod path;
pub mod theme;
