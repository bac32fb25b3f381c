pub mod agent;
pub mod conversation;
pub mod cycle;
pub mod errors;
pub mod models;
pub mod output;
pub mod prompt_template;
pub mod providers;
pub mod systems;
pub mod tools;
