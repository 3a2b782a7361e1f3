//! 错误处理和边界情况测试
//!
//! 验证请求ID模块在各种异常输入下不会失败，并且总能给出请求ID

use x_request_id::logging::{RequestIdFormatter, TemplatePair};
use x_request_id::{get_request_id, RequestId};

#[cfg(feature = "axum")]
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    routing::get,
    Router,
};
#[cfg(feature = "axum")]
use tower::ServiceExt;
#[cfg(feature = "axum")]
use x_request_id::{RequestIdLayer, REQUEST_ID_HEADER};

/// 测试处理器
#[cfg(feature = "axum")]
async fn test_handler() -> &'static str {
    "OK"
}

/// 测试RequestId的边界情况
#[test]
fn test_request_id_edge_cases() {
    // 只有空字符串被拒绝
    assert!(RequestId::from_header_value("").is_none());

    for value in [" ", "a", "0AF7651916CD43DD8448EB211C80319C", "中文", "with space"] {
        let request_id = RequestId::from_header_value(value).unwrap();
        assert_eq!(request_id.as_str(), value, "值应原样保留");
    }

    let long_value = "a".repeat(10000);
    assert_eq!(RequestId::from_header_value(&long_value).unwrap().as_str(), long_value);
}

/// 测试在没有上下文的情况下调用 get_request_id
#[test]
fn test_get_request_id_outside_context() {
    let observed = std::thread::spawn(|| {
        let first = get_request_id();
        let second = get_request_id();
        (first, second)
    })
    .join()
    .unwrap();

    assert_eq!(observed, (None, None), "没有上下文时应返回None，而不是报错或生成ID");
}

/// 测试格式错误的模板
///
/// 模板不做校验，无法识别的语法按字面输出
#[test]
fn test_malformed_templates() {
    let record = |request_id: Option<&str>| x_request_id::logging::LogRecord {
        timestamp: "T".to_string(),
        level: tracing::Level::INFO,
        target: "app".to_string(),
        message: "msg".to_string(),
        request_id: request_id.map(str::to_string),
    };

    let cases = [
        // (基础模板, 带ID输出, 不带ID输出)
        ("plain text", "plain text [r]", "plain text"),
        ("{message", "{message [r]", "{message"),
        ("[{message}", "[msg [r]", "[msg"),
        ("{unknown} {message}", "{unknown} msg [r]", "{unknown} msg"),
        ("[ ] {message}", "[ ] msg [r]", "[ ] msg"),
        ("[{level}]  {message}   ", "[INFO]  msg    [r]", "msg"),
    ];

    for (base, with_id, without_id) in cases {
        let formatter = RequestIdFormatter::new(Some(base));
        assert_eq!(formatter.format(&record(Some("r"))), with_id, "with id: {base}");
        assert_eq!(formatter.format(&record(None)), without_id, "without id: {base}");
    }
}

/// 测试多个槽位的模板：插入只改写第一个槽位，剥离删除全部槽位
#[test]
fn test_multiple_slot_asymmetry() {
    let pair = TemplatePair::new(Some("{request_id} [{level}] [{target}] {message}"));
    assert_eq!(
        pair.with_id().to_string(),
        "{request_id} [{request_id}] [{target}] {message}"
    );
    assert_eq!(pair.without_id().to_string(), "{request_id} {message}");

    // 已有请求ID槽位但前面还有其他槽位：改写第一个槽位，保留后面的请求ID槽位
    let pair = TemplatePair::new(Some("{timestamp} [{level}] {message} [{request_id}]"));
    assert_eq!(
        pair.with_id().to_string(),
        "{timestamp} [{request_id}] {message} [{request_id}]"
    );
    assert_eq!(pair.without_id().to_string(), "{timestamp} {message}");

    let formatter = RequestIdFormatter::new(Some("[{level}] {message} [{request_id}]"));
    let mut record = x_request_id::logging::LogRecord::new("T", tracing::Level::INFO, "app", "msg");
    assert_eq!(formatter.format(&record), "msg");
    record.request_id = Some("r".to_string());
    assert_eq!(formatter.format(&record), "[r] msg [r]");
}

// 以下测试需要axum feature
#[cfg(feature = "axum")]
mod axum_tests {
    use super::*;

    /// 测试无效头部值的处理
    #[tokio::test]
    async fn test_invalid_header_values() {
        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(RequestIdLayer::new());

        // 包含无效UTF-8字节的头部
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_bytes(&[0xFF, 0xFE, 0xFD]).unwrap());

        let mut request = Request::builder()
            .method(Method::GET)
            .uri("/test")
            .body(Body::empty())
            .unwrap();
        *request.headers_mut() = headers;

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 应该生成新的request_id而不是使用无效的头部值
        let header = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert!(uuid::Uuid::parse_str(header.to_str().unwrap()).is_ok());
    }

    /// 测试空头部值
    #[tokio::test]
    async fn test_empty_header_value() {
        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(RequestIdLayer::new());

        let request = Request::builder()
            .uri("/test")
            .header(REQUEST_ID_HEADER, "")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let header = response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert!(!header.is_empty());
        assert!(uuid::Uuid::parse_str(header).is_ok());
    }

    /// 测试自定义生成器的错误处理
    #[tokio::test]
    async fn test_custom_generator_error_handling() {
        // 生成包含控制字符的字符串，这在HTTP头部中是无效的
        let layer = RequestIdLayer::new().with_generator(|| "\x00\x01\x02".to_string());
        let app = Router::new().route("/test", get(test_handler)).layer(layer);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 应该回退到默认生成器
        let header = response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(header).is_ok());
    }

    /// 测试极长的头部值原样回显
    #[tokio::test]
    async fn test_extremely_long_header_value() {
        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(RequestIdLayer::new());

        let long_value = "a".repeat(10000);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/test")
            .header(REQUEST_ID_HEADER, &long_value)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), long_value.as_str());
    }

    /// 测试并发情况下的各种头部值
    #[tokio::test]
    async fn test_concurrent_header_values() {
        const CONCURRENT_REQUESTS: usize = 50;

        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(RequestIdLayer::new());

        let mut handles = vec![];
        for i in 0..CONCURRENT_REQUESTS {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                let inbound = match i % 4 {
                    0 => None,
                    1 => Some(String::new()),
                    2 => Some("UPPER-case-ID".to_string()),
                    _ => Some(format!("req-{i}")),
                };

                let mut builder = Request::builder().method(Method::GET).uri("/test");
                if let Some(value) = &inbound {
                    builder = builder.header(REQUEST_ID_HEADER, value.as_str());
                }
                let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
                assert_eq!(response.status(), StatusCode::OK);

                let header = response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
                match inbound.filter(|value| !value.is_empty()) {
                    Some(value) => assert_eq!(header, value),
                    None => assert!(uuid::Uuid::parse_str(header).is_ok()),
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
