pub mod auth;
pub mod ops;
pub mod rate_limit;
