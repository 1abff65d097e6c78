//! SmartCampus activity recommender.
//!
//! Turns a user's category preferences, a list of candidate campus activities
//! and a participation history into a prompt for a locally hosted language
//! model, then validates the model's answer into ranked recommendations.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod settings;

pub use error::{AppError, AppResult};
pub use routes::{create_router, AppState};
