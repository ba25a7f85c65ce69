pub mod agent;
pub mod app;
pub mod examples;
pub mod export;
pub mod history;
pub mod protocol;
