//! 入口事件与队列消息的数据形态。
//!
//! - [`Event`] 对齐 CloudEvents 1.0 的上下文属性，扩展属性以字符串形式保存；
//! - [`QueueMessage`] 是写入解耦队列的线上消息：属性表加不透明负载。

use std::collections::BTreeMap;

use bytes::Bytes;

/// CloudEvents 规范版本的默认值。
pub const SPEC_VERSION: &str = "1.0";

/// CloudEvents 上下文属性名。未设置的可选属性在过滤时视为空字符串，而不是“不存在”。
pub const CONTEXT_ATTRIBUTES: [&str; 8] = [
    "id",
    "source",
    "type",
    "specversion",
    "subject",
    "time",
    "dataschema",
    "datacontenttype",
];

/// 入口收到的单个事件。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Event {
    pub id: String,
    pub source: String,
    pub ty: String,
    pub spec_version: String,
    pub subject: Option<String>,
    pub time: Option<String>,
    pub data_schema: Option<String>,
    pub data_content_type: Option<String>,
    pub extensions: BTreeMap<String, String>,
    pub data: Bytes,
}

impl Event {
    /// 以必填属性构造事件，规范版本默认为 [`SPEC_VERSION`]。
    pub fn new(id: impl Into<String>, source: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            ty: ty.into(),
            spec_version: SPEC_VERSION.to_owned(),
            ..Self::default()
        }
    }

    /// 设置 `subject`。
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// 设置负载与内容类型。
    pub fn with_data(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.data_content_type = Some(content_type.into());
        self.data = data.into();
        self
    }

    /// 追加扩展属性。
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    /// 按 CloudEvents 属性名读取属性值，上下文属性优先于扩展属性。
    ///
    /// 可选属性未设置时返回 `None`，与“属性不存在”同义。
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(self.id.as_str()),
            "source" => Some(self.source.as_str()),
            "type" => Some(self.ty.as_str()),
            "specversion" => Some(self.spec_version.as_str()),
            "subject" => self.subject.as_deref(),
            "time" => self.time.as_deref(),
            "dataschema" => self.data_schema.as_deref(),
            "datacontenttype" => self.data_content_type.as_deref(),
            other => self.extensions.get(other).map(String::as_str),
        }
    }
}

/// 写入解耦队列的消息。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QueueMessage {
    pub attributes: BTreeMap<String, String>,
    pub data: Bytes,
}

impl QueueMessage {
    /// 读取消息属性。
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_lookup_covers_context_and_extensions() {
        let event = Event::new("e-1", "//orders", "order.created")
            .with_subject("42")
            .with_extension("tenant", "acme");
        assert_eq!(event.attribute("type"), Some("order.created"));
        assert_eq!(event.attribute("specversion"), Some(SPEC_VERSION));
        assert_eq!(event.attribute("subject"), Some("42"));
        assert_eq!(event.attribute("tenant"), Some("acme"));
        assert_eq!(event.attribute("time"), None);
        assert_eq!(event.attribute("unknown"), None);
    }
}
