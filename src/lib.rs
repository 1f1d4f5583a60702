pub mod config;
pub mod database;
pub mod document;
pub mod errors;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod web;
