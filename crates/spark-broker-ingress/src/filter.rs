//! # filter 模块说明
//!
//! ## 角色定位（Why）
//! - 入口层可以在发布前丢弃“没有任何 Target 感兴趣”的事件，节省解耦队列与扇出的开销；
//! - 具体匹配算法属于外部协作者，路由器只需要一个布尔答案，因此以 [`InterestEvaluator`]
//!   作为注入点，[`AttributeFilter`] 为默认实现。
//!
//! ## 语义说明（What）
//! - `AttributeFilter`：对每个 `(属性, 期望值)`，事件必须拥有该属性，且期望值为空串（任意值）
//!   或与事件值完全相等；空过滤器匹配所有事件；
//! - CloudEvents 上下文属性总是“存在”的，未设置的可选属性按空串参与比较；
//!   扩展属性只有在事件携带时才存在。

use std::collections::BTreeMap;

use crate::context::SendContext;
use crate::event::{CONTEXT_ATTRIBUTES, Event};

/// 判断某个 Target 的过滤属性是否接受事件。
pub trait InterestEvaluator: Send + Sync {
    /// `filter` 为 Target 的过滤属性；返回 `true` 表示该 Target 对事件感兴趣。
    fn matches(&self, ctx: &SendContext, filter: &BTreeMap<String, String>, event: &Event)
    -> bool;
}

/// 属性精确匹配过滤器，空串期望值表示通配。
#[derive(Clone, Copy, Debug, Default)]
pub struct AttributeFilter;

impl AttributeFilter {
    const ANY: &'static str = "";
}

impl InterestEvaluator for AttributeFilter {
    fn matches(
        &self,
        _ctx: &SendContext,
        filter: &BTreeMap<String, String>,
        event: &Event,
    ) -> bool {
        filter.iter().all(|(attribute, expected)| {
            let actual = match event.attribute(attribute) {
                Some(value) => value,
                None if CONTEXT_ATTRIBUTES.contains(&attribute.as_str()) => "",
                None => return false,
            };
            expected == Self::ANY || expected == actual
        })
    }
}

impl<F> InterestEvaluator for F
where
    F: Fn(&BTreeMap<String, String>, &Event) -> bool + Send + Sync,
{
    fn matches(
        &self,
        _ctx: &SendContext,
        filter: &BTreeMap<String, String>,
        event: &Event,
    ) -> bool {
        self(filter, event)
    }
}
