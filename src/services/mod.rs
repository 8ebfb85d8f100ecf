pub mod applications;
pub mod audit;
pub mod auth;
pub mod documents;
pub mod email;
pub mod encryption;
pub mod metrics;
