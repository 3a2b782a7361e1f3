//! 请求ID（X-Request-ID）传播模块
//!
//! 一个请求的请求ID从请求头中提取（缺失时生成），保存在请求作用域的上下文中，
//! 调用链上的任何位置都可以读取，最终回显到响应头。设置请求ID时会同步给错误上报端，
//! 也可以通过日志格式化器注入到每一行日志中。
//! 核心功能与Web框架无关，并为Axum提供了开箱即用的中间件支持。
//!
//! ## Usage
//!
//! ### 基础用法：在请求作用域中读写请求ID
//! ```
//! use x_request_id::{get_request_id, with_request_id, RequestId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let request_id = RequestId::new();
//! with_request_id(request_id.clone(), async {
//!     // 调用链上的任何位置都能取到同一个ID
//!     assert_eq!(get_request_id(), Some(request_id.clone()));
//! })
//! .await;
//! # }
//! ```
//!
//! ### 日志注入
//! ```no_run
//! // 根 logger 的每一行日志末尾都会带上 `[<request_id>]`
//! x_request_id::logging::init(None).expect("failed to install logging");
//! ```
//!
//! ### Axum 集成（需要启用 axum feature）
//! ```ignore
//! use axum::{routing::get, Router};
//! use x_request_id::{RequestId, RequestIdLayer};
//!
//! async fn handler(request_id: RequestId) -> String {
//!     // 直接在函数签名中获取 RequestId
//!     format!("Hello! Your request ID is: {}", request_id)
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/", get(handler))
//!         .layer(RequestIdLayer::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod context;
mod integrations;
pub mod logging;
mod request_id;
mod sink;

pub use context::{
    generate_request_id, get_request_id, set_request_id, spawn, sync_scope, with_request_id,
    with_request_scope,
};
pub use request_id::RequestId;
pub use sink::{install_sink, uninstall_sink, Dispatch, TagSink, REQUEST_ID_TAG};

/// HTTP 头部中的请求ID字段名
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// -- axum feature --
#[cfg(feature = "axum")]
pub use integrations::axum::{RequestIdConfig, RequestIdLayer, RequestIdService};

// -- sentry feature --
#[cfg(feature = "sentry")]
pub use integrations::sentry::SentrySink;
