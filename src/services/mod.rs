pub mod analytics;
pub mod audit;
pub mod auth;
pub mod availability;
pub mod booking;
