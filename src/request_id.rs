//! RequestId 核心结构体定义

use std::fmt;
use uuid::Uuid;

/// 请求ID结构体
///
/// 对上游传入的ID不做格式约束（`X-Request-ID` 没有正式规范），
/// 只保证非空；本地生成的ID使用 UUID v4 文本形式。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// 生成新的请求ID
    ///
    /// 使用 128 位随机的 UUID v4，格式为小写连字符形式（36字符）
    ///
    /// # 返回
    /// 新生成的请求ID
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// 从HTTP头部的值创建请求ID
    ///
    /// 上游的值原样保留（不裁剪、不改写大小写），保证响应头能原样回显。
    ///
    /// # 参数
    /// * `value` - 头部值
    ///
    /// # 返回
    /// 值为空时返回None，否则返回Some(RequestId)
    #[inline]
    pub fn from_header_value(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// 从字符串创建请求ID（不进行校验）
    ///
    /// 调用者需要自行保证输入非空
    #[inline]
    pub fn from_string_unchecked(id: &str) -> Self {
        Self(id.to_string())
    }

    /// 获取请求ID字符串
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 取出内部字符串
    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
