//! Axum框架的请求ID中间件

use crate::{context, request_id::RequestId, REQUEST_ID_HEADER};
use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap, HeaderValue},
    response::Response,
};
use std::convert::Infallible;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::Instrument;

/// 用于生成请求ID的函数签名
type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// 请求ID中间件配置选项
#[derive(Clone, Debug)]
pub struct RequestIdConfig {
    /// 是否启用 tracing span（默认启用）
    pub enable_span: bool,
    /// 是否启用响应头（默认启用）
    pub enable_response_header: bool,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self {
            enable_span: true,
            enable_response_header: true,
        }
    }
}

/// 请求ID中间件层
///
/// 负责请求ID的提取、生成、上下文绑定和响应头回显
#[derive(Clone)]
pub struct RequestIdLayer {
    generator: Option<Generator>,
    config: RequestIdConfig,
}

impl RequestIdLayer {
    /// 创建新的请求ID层，使用默认配置和UUID生成器
    pub fn new() -> Self {
        Self {
            generator: None,
            config: RequestIdConfig::default(),
        }
    }

    /// 创建高性能模式的请求ID层
    ///
    /// 禁用 tracing span 以获得最佳性能
    pub fn new_high_performance() -> Self {
        Self {
            generator: None,
            config: RequestIdConfig {
                enable_span: false,
                enable_response_header: true,
            },
        }
    }

    /// 使用自定义配置创建请求ID层
    pub fn with_config(config: RequestIdConfig) -> Self {
        Self {
            generator: None,
            config,
        }
    }

    /// 使用自定义的生成器创建请求ID层
    ///
    /// 生成器返回空字符串或无法作为头部值的字符串时，回退到UUID生成器。
    ///
    /// # 示例
    /// ```
    /// use x_request_id::RequestIdLayer;
    ///
    /// let layer = RequestIdLayer::new().with_generator(|| format!("req-{}", 42));
    /// # let _ = layer;
    /// ```
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }
}

impl Default for RequestIdLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService {
            inner,
            generator: self.generator.clone(),
            config: self.config.clone(),
        }
    }
}

/// 请求ID服务
#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
    generator: Option<Generator>,
    config: RequestIdConfig,
}

impl<S> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // 从请求头中获取或生成请求ID
        let request_id = extract_or_generate_request_id(req.headers(), self.generator.as_deref());

        // 将请求ID添加到请求扩展中
        req.extensions_mut().insert(request_id.clone());

        // 根据配置决定是否创建 span（在req被移动之前）
        let span = self.config.enable_span.then(|| {
            tracing::info_span!(
                "request",
                request_id = %request_id.as_str(),
                method = %req.method(),
                uri = %req.uri()
            )
        });

        let future = self.inner.call(req);
        let enable_response_header = self.config.enable_response_header;

        // 在task_local上下文中执行请求处理
        let scoped = context::with_request_id(request_id.clone(), async move {
            let mut response = future.await?;

            // 处理器可能重新设置了请求ID，以上下文中的值为准
            if enable_response_header {
                let resolved = context::get_request_id().unwrap_or(request_id);
                attach_request_id(response.headers_mut(), &resolved);
            }

            Ok(response)
        });

        match span {
            Some(span) => Box::pin(scoped.instrument(span)),
            // 高性能模式：跳过 span 创建
            None => Box::pin(scoped),
        }
    }
}

/// 从请求头中提取或生成新的请求ID
///
/// 头部缺失、为空或不是合法UTF-8时生成新ID，否则原样使用上游的值。
fn extract_or_generate_request_id(
    headers: &HeaderMap,
    generator: Option<&(dyn Fn() -> String + Send + Sync)>,
) -> RequestId {
    if let Some(request_id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(RequestId::from_header_value)
    {
        return request_id;
    }

    // 自定义生成器的结果必须能作为响应头回显
    if let Some(generator_fn) = generator {
        let generated = generator_fn();
        if HeaderValue::from_str(&generated).is_ok() {
            if let Some(request_id) = RequestId::from_header_value(&generated) {
                return request_id;
            }
        }
    }

    context::generate_request_id()
}

/// 把请求ID写入响应头
fn attach_request_id(headers: &mut HeaderMap, request_id: &RequestId) {
    match HeaderValue::from_str(request_id.as_str()) {
        Ok(value) => {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        Err(_) => {
            tracing::warn!(request_id = %request_id, "Request ID is not a valid header value; response header skipped");
        }
    }
}

// -- RequestId Extractor --

/// Axum 提取器，用于在 handler 函数签名中直接获取 RequestId
///
/// # 示例
/// ```no_run
/// use axum::{routing::get, Router};
/// use x_request_id::{RequestId, RequestIdLayer};
///
/// async fn my_handler(request_id: RequestId) -> String {
///     tracing::info!("Handler started");
///     format!("Hello! Your request ID is: {}", request_id)
/// }
///
/// let app: Router = Router::new()
///     .route("/", get(my_handler))
///     .layer(RequestIdLayer::new());
/// ```
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    /// 从请求中提取 RequestId
    ///
    /// 依次读取上下文、请求扩展；都没有时（未挂载中间件）记录警告并生成新ID。
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(request_id) = context::get_request_id() {
            return Ok(request_id);
        }
        if let Some(request_id) = parts.extensions.get::<RequestId>() {
            return Ok(request_id.clone());
        }

        tracing::warn!("RequestId not found in request context. Generating a new one. Is RequestIdLayer installed?");
        Ok(context::generate_request_id())
    }
}
