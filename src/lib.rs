pub mod alignment;
pub mod bridge;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod image;
pub mod relocalization;
pub mod sim;
pub mod system;
