//! # encoder 模块说明
//!
//! ## 角色定位（Why）
//! - 解耦队列只认识“属性表 + 负载”，事件必须先以二进制模式编码：上下文属性写入 `ce-*` 属性，
//!   负载原样保留；
//! - 追踪上下文同样写入属性表，使扇出组件能够继续同一条链路。
//!
//! ## 契约摘要（What）
//! - 必填属性 `id`/`source`/`type`/`specversion` 为空时返回 [`EncodeError::MissingAttribute`]；
//! - 扩展属性名只允许小写 ASCII 字母与数字，且不得与上下文属性同名；
//! - `datacontenttype` 写入 `content-type`，而非 `ce-datacontenttype`。

use std::collections::BTreeMap;

use crate::context::TraceContext;
use crate::error::EncodeError;
use crate::event::{CONTEXT_ATTRIBUTES, Event, QueueMessage};

const ATTRIBUTE_PREFIX: &str = "ce-";
const CONTENT_TYPE: &str = "content-type";
const TRACEPARENT: &str = "ce-traceparent";
const TRACESTATE: &str = "ce-tracestate";

/// 把事件编码为队列消息。
pub trait EventEncoder: Send + Sync {
    fn encode(&self, event: &Event, trace: Option<&TraceContext>)
    -> Result<QueueMessage, EncodeError>;
}

/// CloudEvents 二进制模式编码器。
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryEventEncoder;

impl EventEncoder for BinaryEventEncoder {
    fn encode(
        &self,
        event: &Event,
        trace: Option<&TraceContext>,
    ) -> Result<QueueMessage, EncodeError> {
        let mut attributes = BTreeMap::new();

        for (name, value) in [
            ("id", &event.id),
            ("source", &event.source),
            ("type", &event.ty),
            ("specversion", &event.spec_version),
        ] {
            if value.is_empty() {
                return Err(EncodeError::MissingAttribute(name));
            }
            attributes.insert(format!("{ATTRIBUTE_PREFIX}{name}"), value.clone());
        }

        for (name, value) in [
            ("subject", &event.subject),
            ("time", &event.time),
            ("dataschema", &event.data_schema),
        ] {
            if let Some(value) = value {
                attributes.insert(format!("{ATTRIBUTE_PREFIX}{name}"), value.clone());
            }
        }
        if let Some(content_type) = &event.data_content_type {
            attributes.insert(CONTENT_TYPE.to_owned(), content_type.clone());
        }

        for (name, value) in &event.extensions {
            if !is_valid_extension_name(name) {
                return Err(EncodeError::InvalidExtensionName(name.clone()));
            }
            attributes.insert(format!("{ATTRIBUTE_PREFIX}{name}"), value.clone());
        }

        // 追踪属性覆盖同名扩展，保证链路信息以上下文为准。
        if let Some(trace) = trace {
            attributes.insert(TRACEPARENT.to_owned(), trace.traceparent());
            if let Some(state) = trace.trace_state.as_ref().filter(|state| !state.is_empty()) {
                attributes.insert(TRACESTATE.to_owned(), state.clone());
            }
        }

        Ok(QueueMessage {
            attributes,
            data: event.data.clone(),
        })
    }
}

fn is_valid_extension_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit())
        && !CONTEXT_ATTRIBUTES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_attributes_become_prefixed_metadata() {
        let event = Event::new("e-1", "//orders", "order.created")
            .with_subject("42")
            .with_data("application/json", &b"{\"id\":42}"[..])
            .with_extension("tenant", "acme");
        let message = BinaryEventEncoder.encode(&event, None).unwrap();

        assert_eq!(message.attribute("ce-id"), Some("e-1"));
        assert_eq!(message.attribute("ce-source"), Some("//orders"));
        assert_eq!(message.attribute("ce-type"), Some("order.created"));
        assert_eq!(message.attribute("ce-specversion"), Some("1.0"));
        assert_eq!(message.attribute("ce-subject"), Some("42"));
        assert_eq!(message.attribute("ce-tenant"), Some("acme"));
        assert_eq!(message.attribute("content-type"), Some("application/json"));
        assert_eq!(message.attribute("ce-time"), None);
        assert_eq!(message.data.as_ref(), b"{\"id\":42}");
    }

    #[test]
    fn trace_context_is_propagated() {
        let trace =
            TraceContext::new([0xab; 16], [0xcd; 8], TraceContext::SAMPLED).with_state("vendor=1");
        let event = Event::new("e-1", "//orders", "order.created");
        let message = BinaryEventEncoder.encode(&event, Some(&trace)).unwrap();

        assert_eq!(
            message.attribute("ce-traceparent"),
            Some(trace.traceparent().as_str())
        );
        assert_eq!(message.attribute("ce-tracestate"), Some("vendor=1"));
    }

    #[test]
    fn missing_required_attribute_is_rejected() {
        let event = Event::new("", "//orders", "order.created");
        assert_eq!(
            BinaryEventEncoder.encode(&event, None),
            Err(EncodeError::MissingAttribute("id"))
        );
    }

    #[test]
    fn invalid_extension_names_are_rejected() {
        for name in ["Tenant", "tenant-id", "", "subject"] {
            let event = Event::new("e-1", "//orders", "order.created").with_extension(name, "x");
            assert_eq!(
                BinaryEventEncoder.encode(&event, None),
                Err(EncodeError::InvalidExtensionName(name.to_owned())),
                "扩展名 `{name}` 应被拒绝"
            );
        }
    }
}
