pub mod assets;
pub mod events;
pub mod history;
pub mod models;
pub mod prompts;
