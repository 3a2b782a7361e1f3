//! 日志模板的词法模型
//!
//! 模板由三种片段组成：
//! - 字面文本（`{{` 和 `}}` 表示字面的花括号）
//! - 裸字段 `{name}`
//! - 方括号槽位 `[{name}]`，方括号内允许空白，例如 `[ {level} ]`
//!
//! 请求ID的插入和剥离都在片段列表上完成，而不是在字符串上做模式替换。

use super::LogRecord;
use std::fmt;

/// 模板中的字段
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Timestamp,
    Level,
    Target,
    Message,
    RequestId,
    /// 未知字段，按原文 `{name}` 输出
    Other(String),
}

impl Field {
    fn from_name(name: &str) -> Self {
        match name {
            "timestamp" => Field::Timestamp,
            "level" => Field::Level,
            "target" => Field::Target,
            "message" => Field::Message,
            "request_id" => Field::RequestId,
            other => Field::Other(other.to_string()),
        }
    }

    /// 字段在模板中的名称
    pub fn name(&self) -> &str {
        match self {
            Field::Timestamp => "timestamp",
            Field::Level => "level",
            Field::Target => "target",
            Field::Message => "message",
            Field::RequestId => "request_id",
            Field::Other(name) => name,
        }
    }

    fn render_into(&self, out: &mut String, record: &LogRecord) {
        match self {
            Field::Timestamp => out.push_str(&record.timestamp),
            Field::Level => out.push_str(record.level.as_str()),
            Field::Target => out.push_str(&record.target),
            Field::Message => out.push_str(&record.message),
            Field::RequestId => out.push_str(record.request_id.as_deref().unwrap_or("")),
            Field::Other(name) => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
    }
}

/// 模板片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Field(Field),
    Slot {
        field: Field,
        pad_left: String,
        pad_right: String,
    },
}

/// 已解析的日志模板
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// 解析模板字符串
    ///
    /// 不做校验：无法识别的语法一律按字面文本处理。
    pub fn parse(src: &str) -> Self {
        let mut template = Template::default();
        let mut literal = String::new();
        let mut rest = src;

        while let Some(c) = rest.chars().next() {
            if c == '[' {
                if let Some((slot, len)) = parse_slot(rest) {
                    template.push_literal(std::mem::take(&mut literal));
                    template.segments.push(slot);
                    rest = &rest[len..];
                    continue;
                }
            }
            if rest.starts_with("{{") {
                literal.push('{');
                rest = &rest[2..];
                continue;
            }
            if rest.starts_with("}}") {
                literal.push('}');
                rest = &rest[2..];
                continue;
            }
            if c == '{' {
                if let Some((field, len)) = parse_field(rest) {
                    template.push_literal(std::mem::take(&mut literal));
                    template.segments.push(Segment::Field(field));
                    rest = &rest[len..];
                    continue;
                }
            }
            literal.push(c);
            rest = &rest[c.len_utf8()..];
        }

        template.push_literal(literal);
        template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 模板是否引用了某个字段（裸字段或槽位）
    pub fn contains(&self, field: &Field) -> bool {
        self.segments.iter().any(|segment| match segment {
            Segment::Field(f) | Segment::Slot { field: f, .. } => f == field,
            Segment::Literal(_) => false,
        })
    }

    /// 派生带请求ID的模板
    ///
    /// - 已引用请求ID（槽位或裸字段）：把第一个槽位改写为 `[{request_id}]`，其余不变
    /// - 完全没有请求ID：在末尾追加 ` [{request_id}]`
    ///
    /// 改写后第一个槽位就是请求ID槽位，再次派生结果不变。
    pub fn with_request_id(&self) -> Template {
        let mut derived = self.clone();
        if self.contains(&Field::RequestId) {
            let first_slot = derived
                .segments
                .iter_mut()
                .find(|segment| matches!(segment, Segment::Slot { .. }));
            if let Some(Segment::Slot {
                field,
                pad_left,
                pad_right,
            }) = first_slot
            {
                *field = Field::RequestId;
                pad_left.clear();
                pad_right.clear();
            }
            return derived;
        }

        derived.push_literal(" ".to_string());
        derived.segments.push(Segment::Slot {
            field: Field::RequestId,
            pad_left: String::new(),
            pad_right: String::new(),
        });
        derived
    }

    /// 派生去掉所有槽位的模板
    ///
    /// 删除所有方括号槽位（无论字段是什么），把字面文本中的连续空白折叠成一个空格，
    /// 并去掉首尾空白。
    pub fn without_slots(&self) -> Template {
        let mut derived = Template::default();
        for segment in &self.segments {
            match segment {
                Segment::Slot { .. } => {}
                Segment::Literal(text) => derived.push_literal(text.clone()),
                Segment::Field(field) => derived.segments.push(Segment::Field(field.clone())),
            }
        }

        for segment in &mut derived.segments {
            if let Segment::Literal(text) = segment {
                *text = collapse_whitespace(text);
            }
        }
        if let Some(Segment::Literal(text)) = derived.segments.first_mut() {
            *text = text.trim_start().to_string();
        }
        if let Some(Segment::Literal(text)) = derived.segments.last_mut() {
            *text = text.trim_end().to_string();
        }
        derived
            .segments
            .retain(|segment| !matches!(segment, Segment::Literal(text) if text.is_empty()));
        derived
    }

    /// 用记录的字段渲染模板
    pub fn render(&self, record: &LogRecord) -> String {
        let mut out = String::with_capacity(128);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => field.render_into(&mut out, record),
                Segment::Slot {
                    field,
                    pad_left,
                    pad_right,
                } => {
                    out.push('[');
                    out.push_str(pad_left);
                    field.render_into(&mut out, record);
                    out.push_str(pad_right);
                    out.push(']');
                }
            }
        }
        out
    }

    // 相邻的字面文本合并成一个片段
    fn push_literal(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Literal(last)) = self.segments.last_mut() {
            last.push_str(&text);
        } else {
            self.segments.push(Segment::Literal(text));
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    for c in text.chars() {
                        match c {
                            '{' => f.write_str("{{")?,
                            '}' => f.write_str("}}")?,
                            c => write!(f, "{c}")?,
                        }
                    }
                }
                Segment::Field(field) => write!(f, "{{{}}}", field.name())?,
                Segment::Slot {
                    field,
                    pad_left,
                    pad_right,
                } => write!(f, "[{pad_left}{{{}}}{pad_right}]", field.name())?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Template {
    fn from(src: &str) -> Self {
        Template::parse(src)
    }
}

/// 解析 `{name}`，name 只允许字母、数字和下划线
fn parse_field(s: &str) -> Option<(Field, usize)> {
    let inner = s.strip_prefix('{')?;
    let name_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(inner.len());
    if name_len == 0 || !inner[name_len..].starts_with('}') {
        return None;
    }
    Some((Field::from_name(&inner[..name_len]), name_len + 2))
}

/// 解析 `[ {name} ]`
fn parse_slot(s: &str) -> Option<(Segment, usize)> {
    let inner = s.strip_prefix('[')?;
    let pad_left_len = leading_whitespace(inner);
    let after_pad = &inner[pad_left_len..];
    let (field, field_len) = parse_field(after_pad)?;
    let after_field = &after_pad[field_len..];
    let pad_right_len = leading_whitespace(after_field);
    if !after_field[pad_right_len..].starts_with(']') {
        return None;
    }

    let slot = Segment::Slot {
        field,
        pad_left: inner[..pad_left_len].to_string(),
        pad_right: after_field[..pad_right_len].to_string(),
    };
    Some((slot, 1 + pad_left_len + field_len + pad_right_len + 1))
}

fn leading_whitespace(s: &str) -> usize {
    s.find(|c: char| !c.is_whitespace()).unwrap_or(s.len())
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}
