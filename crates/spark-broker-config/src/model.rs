//! # model 模块说明
//!
//! ## 角色定位（Why）
//! - 描述控制面下发给入口进程的完整路由表：Broker、其解耦队列以及挂载的 Target；
//! - 快照一经发布即不可变，读者只会看到“整张表”，不存在半更新状态。
//!
//! ## 设计要求（What）
//! - 所有映射使用 `BTreeMap`，保证序列化字节稳定，便于比对与传输；
//! - Broker 与 Target 以 `Arc` 存放，查询时只增加引用计数，不复制内容；
//! - 写入侧（控制面或测试）通过 `upsert_broker`/`with_*` 构造新快照，而不是原地修改已发布的快照。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::key::{BrokerKey, TargetKey};

/// 队列或 Target 的生命周期状态。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// 尚未由控制面确认。
    #[default]
    Unknown,
    /// 正在创建底层资源。
    Creating,
    /// 资源可用。
    Ready,
    /// 资源创建失败。
    Failed,
}

/// 持久化队列描述：Topic 标识、订阅以及状态。
///
/// - Broker 的 `decouple_queue` 是入口写入事件的目标；
/// - Target 的 `retry_queue` 由扇出/重试组件消费，入口层只做透传。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Queue {
    pub topic: String,
    pub subscription: String,
    pub state: State,
}

impl Queue {
    /// 以 Topic 与状态构造队列，订阅留空。
    pub fn new(topic: impl Into<String>, state: State) -> Self {
        Self {
            topic: topic.into(),
            subscription: String::new(),
            state,
        }
    }

    /// 构造处于 `READY` 状态的队列。
    pub fn ready(topic: impl Into<String>) -> Self {
        Self::new(topic, State::Ready)
    }

    /// 附加订阅名称。
    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = subscription.into();
        self
    }
}

/// Broker 下的一个 Target（Trigger）：过滤属性加上投递目的地。
///
/// # 教案式说明
/// - **意图 (Why)**：入口层仅关心 `filter_attributes`，用于判断“是否有人对事件感兴趣”；
/// - **契约 (What)**：`filter_attributes` 为不透明的键值匹配规则，具体语义由兴趣评估器解释；
///   `address` 与 `retry_queue` 属于投递侧，入口层不读取。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub broker: String,
    pub address: String,
    pub filter_attributes: BTreeMap<String, String>,
    pub retry_queue: Option<Queue>,
    pub state: State,
}

impl Target {
    /// 构造隶属于 `broker` 的 Target。
    pub fn new(broker: &BrokerKey, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: broker.namespace().to_owned(),
            broker: broker.name().to_owned(),
            ..Self::default()
        }
    }

    /// 追加一条过滤属性，空字符串值表示“任意值”。
    pub fn with_filter(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_attributes.insert(attribute.into(), value.into());
        self
    }

    /// 设置投递地址。
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// 设置重试队列。
    pub fn with_retry_queue(mut self, queue: Queue) -> Self {
        self.retry_queue = Some(queue);
        self
    }

    /// 由命名空间、Broker 名称与 Target 名称还原键。
    pub fn key(&self) -> TargetKey {
        TargetKey::new(
            BrokerKey::new(self.namespace.clone(), self.broker.clone()),
            self.name.clone(),
        )
    }
}

/// 逻辑 Broker：拥有一条解耦队列以及若干 Target。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Broker {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub address: String,
    pub decouple_queue: Option<Queue>,
    pub targets: BTreeMap<String, Arc<Target>>,
    pub state: State,
}

impl Broker {
    /// 以键构造空 Broker。
    pub fn new(key: &BrokerKey) -> Self {
        Self {
            name: key.name().to_owned(),
            namespace: key.namespace().to_owned(),
            ..Self::default()
        }
    }

    /// 设置解耦队列。
    pub fn with_decouple_queue(mut self, queue: Queue) -> Self {
        self.decouple_queue = Some(queue);
        self
    }

    /// 挂载 Target；同名 Target 会被覆盖。
    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.insert(target.name.clone(), Arc::new(target));
        self
    }

    /// 设置入口地址。
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// 由命名空间与名称还原键。
    pub fn key(&self) -> BrokerKey {
        BrokerKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// 完整路由表快照：Broker 持久化字符串 → Broker。
///
/// # 教案式说明
/// - **意图 (Why)**：快照仓储以整表为单位替换，读者拿到的永远是自洽的一整份配置；
/// - **契约 (What)**：`brokers` 的键必须等于对应 Broker 的 `persistence_string`，
///   [`TargetsConfig::upsert_broker`] 会自动维护这一点；
/// - **风险 (Trade-offs)**：整表替换意味着每次变更都需要重建映射，但 Broker/Target 以 `Arc`
///   共享，未变化的条目在新旧快照间只是引用计数的变化。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub brokers: BTreeMap<String, Arc<Broker>>,
}

impl TargetsConfig {
    /// 构造空快照。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 Broker 自身的键插入或替换，返回被替换的旧值。
    pub fn upsert_broker(&mut self, broker: Broker) -> Option<Arc<Broker>> {
        let key = broker.key().persistence_string();
        self.brokers.insert(key, Arc::new(broker))
    }

    /// 链式版本的 [`Self::upsert_broker`]。
    pub fn with_broker(mut self, broker: Broker) -> Self {
        self.upsert_broker(broker);
        self
    }

    /// 移除 Broker。
    pub fn remove_broker(&mut self, key: &BrokerKey) -> Option<Arc<Broker>> {
        self.brokers.remove(&key.persistence_string())
    }

    /// 按键查找 Broker。
    pub fn broker(&self, key: &BrokerKey) -> Option<&Arc<Broker>> {
        self.brokers.get(&key.persistence_string())
    }

    /// 遍历全部 Broker；顺序不属于契约的一部分。
    pub fn brokers(&self) -> impl Iterator<Item = &Arc<Broker>> + '_ {
        self.brokers.values()
    }

    /// 遍历全部 Target；顺序不属于契约的一部分。
    pub fn targets(&self) -> impl Iterator<Item = &Arc<Target>> + '_ {
        self.brokers
            .values()
            .flat_map(|broker| broker.targets.values())
    }

    /// 快照中是否没有任何 Broker。
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keys_brokers_by_persistence_string() {
        let key = BrokerKey::new("default", "orders");
        let mut config = TargetsConfig::new();
        assert!(config.upsert_broker(Broker::new(&key)).is_none());
        assert!(config.brokers.contains_key("default/orders"));

        let replaced = config
            .upsert_broker(Broker::new(&key).with_decouple_queue(Queue::ready("t1")))
            .expect("第二次写入应替换旧值");
        assert!(replaced.decouple_queue.is_none());
        assert_eq!(config.brokers.len(), 1);
    }

    #[test]
    fn target_key_is_rebuilt_from_fields() {
        let broker = BrokerKey::new("default", "orders");
        let target = Target::new(&broker, "audit").with_filter("type", "order.created");
        assert_eq!(target.key(), broker.target("audit"));
        assert_eq!(
            target.filter_attributes.get("type").map(String::as_str),
            Some("order.created")
        );
    }

    #[test]
    fn state_uses_upper_case_wire_names() {
        let encoded = serde_json::to_string(&State::Ready).unwrap();
        assert_eq!(encoded, "\"READY\"");
        assert_eq!(State::default(), State::Unknown);
    }
}
