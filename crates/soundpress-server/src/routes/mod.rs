pub mod health;
pub mod jobs;
pub mod presets;
pub mod root;
