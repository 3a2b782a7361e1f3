//! 日志管道的装配
//!
//! [`LogSetup`] 记录一组 logger（即 tracing 的 target，空字符串为根 logger），
//! 以及每个 logger 上是否启用了请求ID过滤阶段、挂了哪些输出流。
//! 配置完成后通过 [`LogSetup::layers`] 或 [`LogSetup::install`] 生成 `tracing-subscriber` 的层。

use super::format::RequestIdFormatter;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{Layer, Registry};

/// 根 logger 的名称
pub const ROOT_LOGGER: &str = "";

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// 安装日志管道时的错误
#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    /// 其他代码已经设置了全局 subscriber
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] TryInitError),
}

/// 日志输出流
#[derive(Clone, Default)]
pub enum Stream {
    Stdout,
    #[default]
    Stderr,
    /// 自定义输出，每条日志调用一次工厂函数
    Custom(Arc<dyn Fn() -> Box<dyn io::Write + Send> + Send + Sync>),
}

impl Stream {
    /// 从工厂函数创建自定义输出流
    pub fn custom<F, W>(make: F) -> Self
    where
        F: Fn() -> W + Send + Sync + 'static,
        W: io::Write + Send + 'static,
    {
        Stream::Custom(Arc::new(move || Box::new(make())))
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("Stdout"),
            Stream::Stderr => f.write_str("Stderr"),
            Stream::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl<'a> MakeWriter<'a> for Stream {
    type Writer = Box<dyn io::Write + Send + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match self {
            Stream::Stdout => Box::new(io::stdout()),
            Stream::Stderr => Box::new(io::stderr()),
            Stream::Custom(make) => make(),
        }
    }
}

/// 挂在某个 logger 上的输出流处理器
#[derive(Debug, Clone)]
pub struct StreamHandler {
    stream: Stream,
    formatter: RequestIdFormatter,
}

impl StreamHandler {
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn formatter(&self) -> &RequestIdFormatter {
        &self.formatter
    }
}

#[derive(Debug, Clone, Default)]
struct LoggerEntry {
    filtered: bool,
    handlers: Vec<StreamHandler>,
}

/// 日志配置入口
///
/// 支持两种形式，重复调用都是幂等的：
/// - [`configure_root`](Self::configure_root)：只配置根 logger
/// - [`configure_registered`](Self::configure_registered)：配置调用时已注册的所有 logger，
///   之后注册的 logger 不受影响
///
/// 一条事件只交给与其 target 最接近的、挂有处理器的 logger 处理，不会向上重复输出。
///
/// # 示例
/// ```no_run
/// use x_request_id::logging::LogSetup;
///
/// let mut setup = LogSetup::new(Some("{timestamp} {level} {message}"));
/// setup.register("my_app").register("my_app::db");
/// setup.configure_registered();
/// setup.install().expect("failed to install logging");
/// ```
#[derive(Debug)]
pub struct LogSetup {
    formatter: RequestIdFormatter,
    level: LevelFilter,
    stream: Stream,
    loggers: BTreeMap<String, LoggerEntry>,
}

impl LogSetup {
    /// 创建配置，所有处理器共享同一个格式化器
    ///
    /// # 参数
    /// * `template` - 基础模板，None时使用默认模板
    pub fn new(template: Option<&str>) -> Self {
        let mut loggers = BTreeMap::new();
        loggers.insert(ROOT_LOGGER.to_string(), LoggerEntry::default());
        Self {
            formatter: RequestIdFormatter::new(template),
            level: LevelFilter::INFO,
            stream: Stream::default(),
            loggers,
        }
    }

    /// 设置输出级别（默认INFO）
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// 设置新处理器使用的输出流（默认stderr）
    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.stream = stream;
        self
    }

    pub fn formatter(&self) -> &RequestIdFormatter {
        &self.formatter
    }

    /// 注册一个 logger
    pub fn register(&mut self, name: impl Into<String>) -> &mut Self {
        self.loggers.entry(name.into()).or_default();
        self
    }

    /// 已注册的 logger 名称（包含根 logger）
    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.loggers.keys().map(String::as_str)
    }

    /// 简单形式：根 logger 启用过滤阶段并挂一个输出流
    pub fn configure_root(&mut self) -> &mut Self {
        self.configure_logger(ROOT_LOGGER)
    }

    /// 完整形式：当前已注册的每个 logger 都启用过滤阶段，并至多挂一个输出流
    pub fn configure_registered(&mut self) -> &mut Self {
        let names: Vec<String> = self.loggers.keys().cloned().collect();
        for name in &names {
            self.configure_logger(name);
        }
        self
    }

    /// 为 logger 启用过滤阶段并挂上输出流
    pub fn configure_logger(&mut self, name: &str) -> &mut Self {
        self.loggers.entry(name.to_string()).or_default().filtered = true;
        self.add_stream_handler(name)
    }

    /// 只挂输出流、不启用过滤阶段
    ///
    /// 这样的 logger 输出的日志不带请求ID，使用不带请求ID的模板。
    /// 已有输出流时不会重复添加。
    pub fn add_stream_handler(&mut self, name: &str) -> &mut Self {
        let entry = self.loggers.entry(name.to_string()).or_default();
        if entry.handlers.is_empty() {
            entry.handlers.push(StreamHandler {
                stream: self.stream.clone(),
                formatter: self.formatter.clone(),
            });
        }
        self
    }

    pub fn stream_handler_count(&self, name: &str) -> usize {
        self.loggers.get(name).map_or(0, |entry| entry.handlers.len())
    }

    pub fn stream_handlers(&self, name: &str) -> &[StreamHandler] {
        self.loggers
            .get(name)
            .map_or(&[][..], |entry| entry.handlers.as_slice())
    }

    /// logger 是否启用了请求ID过滤阶段
    pub fn is_filtered(&self, name: &str) -> bool {
        self.loggers.get(name).is_some_and(|entry| entry.filtered)
    }

    /// 生成 `tracing-subscriber` 层，每个输出流处理器一个层
    pub fn layers<S>(&self) -> Vec<Box<dyn Layer<S> + Send + Sync + 'static>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let mut layers = Vec::new();
        for (name, entry) in &self.loggers {
            if entry.handlers.is_empty() {
                continue;
            }
            let targets = self.targets_for(name);
            for handler in &entry.handlers {
                let layer = tracing_subscriber::fmt::layer::<S>()
                    .event_format(handler.formatter.clone().with_stamp(entry.filtered))
                    .with_writer(handler.stream.clone())
                    .with_filter(targets.clone())
                    .boxed();
                layers.push(layer);
            }
        }
        layers
    }

    /// 把日志管道设置为全局 subscriber
    ///
    /// `RUST_LOG` 存在时作为全局过滤，否则使用配置的级别。
    ///
    /// # 返回
    /// 本次调用是否完成了安装；已经安装过时返回 `Ok(false)`
    ///
    /// # Errors
    /// 其他代码已经设置了全局 subscriber 时返回 [`LogSetupError::AlreadyInstalled`]
    pub fn install(&self) -> Result<bool, LogSetupError> {
        if INSTALLED.load(Ordering::Acquire) {
            tracing::debug!("Request ID logging is already installed, skipping");
            return Ok(false);
        }

        let filter = EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy();
        tracing_subscriber::registry()
            .with(filter)
            .with(self.layers::<Layered<EnvFilter, Registry>>())
            .try_init()?;

        INSTALLED.store(true, Ordering::Release);
        Ok(true)
    }

    // logger 自己的级别，更具体的、挂有处理器的子 logger 关闭
    fn targets_for(&self, name: &str) -> Targets {
        let mut targets = if name.is_empty() {
            Targets::new().with_default(self.level)
        } else {
            Targets::new().with_target(name, self.level)
        };
        for (other, entry) in &self.loggers {
            if other != name && other.starts_with(name) && !entry.handlers.is_empty() {
                targets = targets.with_target(other.clone(), LevelFilter::OFF);
            }
        }
        targets
    }
}

impl Default for LogSetup {
    fn default() -> Self {
        Self::new(None)
    }
}

/// 用根 logger 配置并安装日志管道
///
/// # 参数
/// * `template` - 基础模板，None时使用默认模板
///
/// # Errors
/// 见 [`LogSetup::install`]
pub fn init(template: Option<&str>) -> Result<bool, LogSetupError> {
    let mut setup = LogSetup::new(template);
    setup.configure_root();
    setup.install()
}
