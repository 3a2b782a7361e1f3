//! 可选请求ID的日志格式化器

use super::template::Template;
use super::{stamp_request_id, LogRecord};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field as EventField, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// 未提供模板时，带请求ID的默认模板
pub const DEFAULT_TEMPLATE: &str = "{timestamp} {level} {target} - {message} [{request_id}]";

/// 未提供模板时，不带请求ID的默认模板
pub const DEFAULT_TEMPLATE_WITHOUT_ID: &str = "{timestamp} {level} {target} - {message}";

/// 从同一个基础模板派生出的两种模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePair {
    with_id: Template,
    without_id: Template,
}

impl TemplatePair {
    /// 从基础模板派生模板对
    ///
    /// # 参数
    /// * `base` - 基础模板，None或空字符串时使用默认模板
    pub fn new(base: Option<&str>) -> Self {
        match base.filter(|base| !base.is_empty()) {
            Some(base) => {
                let template = Template::parse(base);
                Self {
                    with_id: template.with_request_id(),
                    without_id: template.without_slots(),
                }
            }
            None => Self {
                with_id: Template::parse(DEFAULT_TEMPLATE),
                without_id: Template::parse(DEFAULT_TEMPLATE_WITHOUT_ID),
            },
        }
    }

    pub fn with_id(&self) -> &Template {
        &self.with_id
    }

    pub fn without_id(&self) -> &Template {
        &self.without_id
    }

    /// 按记录是否带有请求ID选择模板
    #[inline]
    pub fn select(&self, record: &LogRecord) -> &Template {
        if record.request_id.is_some() {
            &self.with_id
        } else {
            &self.without_id
        }
    }
}

impl Default for TemplatePair {
    fn default() -> Self {
        Self::new(None)
    }
}

/// 请求ID日志格式化器
///
/// 模板对在构造时派生一次，之后只读，可以在多个层和线程之间共享。
/// 每条记录独立选择模板，记录之间不共享任何可变状态。
///
/// 作为 `tracing-subscriber` 的事件格式化器使用：
/// ```no_run
/// use x_request_id::logging::RequestIdFormatter;
///
/// tracing_subscriber::fmt()
///     .event_format(RequestIdFormatter::new(Some("{level} {message}")))
///     .init();
/// ```
#[derive(Debug, Clone)]
pub struct RequestIdFormatter {
    templates: Arc<TemplatePair>,
    timer: SystemTime,
    stamp: bool,
}

impl RequestIdFormatter {
    /// 创建格式化器，默认启用请求ID过滤阶段
    pub fn new(base: Option<&str>) -> Self {
        Self {
            templates: Arc::new(TemplatePair::new(base)),
            timer: SystemTime,
            stamp: true,
        }
    }

    /// 设置是否在格式化前运行请求ID过滤阶段
    ///
    /// 关闭后记录不会带有请求ID，始终使用不带请求ID的模板。
    pub fn with_stamp(mut self, stamp: bool) -> Self {
        self.stamp = stamp;
        self
    }

    pub fn stamps_request_id(&self) -> bool {
        self.stamp
    }

    pub fn templates(&self) -> &TemplatePair {
        &self.templates
    }

    /// 两个格式化器是否共享同一个模板对
    pub fn shares_templates_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.templates, &other.templates)
    }

    /// 格式化一条记录（不含换行）
    pub fn format(&self, record: &LogRecord) -> String {
        self.templates.select(record).render(record)
    }
}

impl Default for RequestIdFormatter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<S, N> FormatEvent<S, N> for RequestIdFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut timestamp = String::new();
        self.timer.format_time(&mut Writer::new(&mut timestamp))?;

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let mut record = LogRecord::new(
            timestamp,
            *metadata.level(),
            metadata.target(),
            visitor.finish(),
        );
        if self.stamp {
            record = stamp_request_id(record);
        }

        writeln!(writer, "{}", self.format(&record))
    }
}

/// 收集事件的消息和其他字段
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &EventField, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &EventField, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
