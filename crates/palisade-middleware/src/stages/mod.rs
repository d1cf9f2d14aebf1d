//! The concrete pipeline stages, in their fixed order: metering, CORS,
//! rate limiting.

mod cors;
mod metering;
mod rate_limit;

pub use cors::{AllowedOrigins, CorsConfig, CorsStage};
pub use metering::MeteringStage;
pub use rate_limit::RateLimitStage;
