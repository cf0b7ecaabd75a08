pub mod config;
pub mod events;
pub mod jobs;
pub mod media;
pub mod presets;
pub mod results;
