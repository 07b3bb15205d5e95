pub mod announcements;
pub mod api;
pub mod auth;
pub mod db;
pub mod env;
pub mod error;
pub mod grading;
pub mod models;
pub mod roster;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod test;

pub use api::Scholar;
pub use error::AppError;
