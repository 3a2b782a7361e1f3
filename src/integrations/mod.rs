//! 第三方框架与服务的集成

#[cfg(feature = "axum")]
pub mod axum;

#[cfg(feature = "sentry")]
pub mod sentry;
