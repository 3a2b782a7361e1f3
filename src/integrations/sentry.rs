//! Sentry 错误上报集成
//!
//! 安装后，每次设置请求ID都会写入当前 Sentry scope 的 `request_id` 标签。

use crate::sink::{Dispatch, TagSink};
use sentry_core::Hub;

/// 把请求ID写入 Sentry scope 的上报端
///
/// scope 写入是纯内存操作，并且必须发生在请求所在线程的 Hub 上，因此使用同步投递。
///
/// # 示例
/// ```no_run
/// use x_request_id::{install_sink, SentrySink};
///
/// install_sink(SentrySink);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SentrySink;

impl TagSink for SentrySink {
    fn is_active(&self) -> bool {
        Hub::current().client().is_some()
    }

    fn record_tag(&self, key: &str, value: &str) {
        sentry_core::configure_scope(|scope| scope.set_tag(key, value));
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Inline
    }
}
