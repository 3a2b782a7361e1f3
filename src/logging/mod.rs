//! 日志行中的请求ID注入
//!
//! 日志管道由三部分组成：
//! - [`stamp_request_id`]：过滤阶段，把当前上下文中的请求ID写入日志记录
//! - [`RequestIdFormatter`]：按记录是否带有请求ID，在两种模板之间选择
//! - [`LogSetup`]：把以上两者装配成 `tracing-subscriber` 的层

mod config;
mod format;
mod template;

pub use config::{init, LogSetup, LogSetupError, Stream, StreamHandler, ROOT_LOGGER};
pub use format::{RequestIdFormatter, TemplatePair, DEFAULT_TEMPLATE, DEFAULT_TEMPLATE_WITHOUT_ID};
pub use template::{Field, Segment, Template};

use crate::context;
use tracing::Level;

/// 上下文中没有请求ID时写入日志的占位值
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

/// 一条日志记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// 已格式化的时间戳
    pub timestamp: String,
    pub level: Level,
    /// 日志来源（tracing 的 target，相当于 logger 名称）
    pub target: String,
    /// 事件消息，其他结构化字段以 ` key=value` 追加在后面
    pub message: String,
    /// 只由过滤阶段填充
    pub request_id: Option<String>,
}

impl LogRecord {
    /// 创建不带请求ID的记录
    pub fn new(
        timestamp: impl Into<String>,
        level: Level,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            level,
            target: target.into(),
            message: message.into(),
            request_id: None,
        }
    }
}

/// 请求ID过滤阶段
///
/// 把当前作用域的请求ID写入记录，没有时写入 `"unknown"`。
/// 每条记录单独求值。
pub fn stamp_request_id(mut record: LogRecord) -> LogRecord {
    record.request_id = Some(
        context::get_request_id()
            .map(|id| id.into_string())
            .unwrap_or_else(|| UNKNOWN_REQUEST_ID.to_string()),
    );
    record
}
