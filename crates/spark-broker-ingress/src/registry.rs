//! # TopicRegistry：按 Broker 缓存的 Topic 句柄
//!
//! ## 核心意图（Why）
//! - Topic 句柄内含批量缓冲与后台资源，每个事件都重新创建代价过高，因此以 Broker 为键缓存；
//! - 控制面可能随时把 Broker 的解耦队列指向新的 Topic（句柄漂移），注册表必须在下一次使用时
//!   关闭旧句柄并换上新句柄。
//!
//! ## 并发模型（How）
//! - 先在快照上分类配置错误，再进入缓存：配置不可用时缓存不会被触碰；
//! - 快路径只取读锁：缓存命中且 Topic 标识与配置一致即返回；
//! - 慢路径取写锁后重新读取配置并复核缓存，避免竞争调用方重复创建或重复关闭；
//!   旧句柄在写锁内关闭，同一 Broker 永远不会并存两个“当前”句柄。
//!
//! ## 风险提示（Trade-offs）
//! - `close` 可能阻塞到缓冲刷新完成，期间其他 Broker 的慢路径也会等待写锁；
//!   漂移属于低频事件，换来的是简单且可证明的互斥。
//! - 已被快照移除的 Broker 对应的句柄不会被主动回收，直到 [`TopicRegistry::shutdown`]。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use spark_broker_config::{BrokerKey, ReadonlyTargets, State};
use tracing::{debug, error, info, warn};

use crate::error::DecoupleError;
use crate::queue::{QueueClient, TopicHandle};

/// Broker → Topic 句柄的并发缓存。
pub struct TopicRegistry {
    targets: Arc<dyn ReadonlyTargets>,
    client: Arc<dyn QueueClient>,
    handles: RwLock<HashMap<BrokerKey, Arc<dyn TopicHandle>>>,
}

impl TopicRegistry {
    /// 以路由表视图与队列客户端构造空注册表。
    pub fn new(targets: Arc<dyn ReadonlyTargets>, client: Arc<dyn QueueClient>) -> Self {
        Self {
            targets,
            client,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// 解析 Broker 当前应使用的句柄。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：Broker 缺失返回 `NotFound`，解耦队列缺失或 Topic 为空返回 `Incomplete`，
    ///   队列未就绪返回 `NotReady`；以上情况不会创建、关闭或替换任何句柄；
    /// - **后置条件**：返回的句柄 `topic_id` 等于解析时刻配置中的 Topic 标识。
    pub fn resolve(&self, broker: &BrokerKey) -> Result<Arc<dyn TopicHandle>, DecoupleError> {
        let topic = self.configured_topic(broker)?;

        if let Some(handle) = self.handles.read().get(broker) {
            if handle.topic_id() == topic {
                return Ok(Arc::clone(handle));
            }
        }

        self.refresh(broker)
    }

    /// 当前缓存句柄绑定的 Topic 标识，仅用于诊断。
    pub fn cached_topic(&self, broker: &BrokerKey) -> Option<String> {
        self.handles
            .read()
            .get(broker)
            .map(|handle| handle.topic_id().to_owned())
    }

    /// 缓存的句柄数量。
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// 是否没有任何缓存句柄。
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }

    /// 关闭并清空全部句柄，用于进程退出。
    pub fn shutdown(&self) {
        let mut handles = self.handles.write();
        for (broker, handle) in handles.drain() {
            debug!(broker = %broker, topic = handle.topic_id(), "closing topic handle on shutdown");
            handle.close();
        }
    }

    fn refresh(&self, broker: &BrokerKey) -> Result<Arc<dyn TopicHandle>, DecoupleError> {
        let mut handles = self.handles.write();

        // 持锁期间快照可能已经前进，以最新配置为准。
        let topic = self.configured_topic(broker)?;
        if let Some(handle) = handles.get(broker) {
            if handle.topic_id() == topic {
                return Ok(Arc::clone(handle));
            }
        }

        if let Some(stale) = handles.remove(broker) {
            info!(
                broker = %broker,
                stale_topic = stale.topic_id(),
                topic = %topic,
                "decouple topic drifted; closing stale handle"
            );
            stale.close();
        }

        let handle = self.client.open_topic(&topic);
        debug!(broker = %broker, topic = %topic, "created decouple topic handle");
        handles.insert(broker.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    fn configured_topic(&self, broker: &BrokerKey) -> Result<String, DecoupleError> {
        let Some(entry) = self.targets.get_broker_by_key(broker) else {
            // 控制面推送存在传播延迟，新建的 Broker 可能尚未到达。
            warn!(broker = %broker, "broker not found in routing table");
            return Err(DecoupleError::NotFound {
                broker: broker.clone(),
            });
        };

        let Some(queue) = entry
            .decouple_queue
            .as_ref()
            .filter(|queue| !queue.topic.is_empty())
        else {
            error!(
                broker = %broker,
                "broker has no decouple queue or an empty topic; this should not happen"
            );
            return Err(DecoupleError::Incomplete {
                broker: broker.clone(),
            });
        };

        if queue.state != State::Ready {
            debug!(broker = %broker, topic = %queue.topic, state = ?queue.state, "decouple queue is not ready");
            return Err(DecoupleError::NotReady {
                broker: broker.clone(),
                state: queue.state,
            });
        }

        Ok(queue.topic.clone())
    }
}

impl fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("handles", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use spark_broker_config::{Broker, CachedTargets, Queue, TargetsConfig};

    use super::*;
    use crate::memory::InMemoryQueue;

    fn key() -> BrokerKey {
        BrokerKey::new("default", "orders")
    }

    fn snapshot(queue: Option<Queue>) -> TargetsConfig {
        let mut broker = Broker::new(&key());
        broker.decouple_queue = queue;
        TargetsConfig::new().with_broker(broker)
    }

    fn registry(targets: &Arc<CachedTargets>, queue: &InMemoryQueue) -> TopicRegistry {
        TopicRegistry::new(targets.clone(), Arc::new(queue.clone()))
    }

    #[test]
    fn configuration_errors_leave_cache_untouched() {
        let targets = Arc::new(CachedTargets::new());
        let queue = InMemoryQueue::new();
        let registry = registry(&targets, &queue);

        assert!(matches!(
            registry.resolve(&key()),
            Err(DecoupleError::NotFound { .. })
        ));

        targets.store(snapshot(None));
        assert!(matches!(
            registry.resolve(&key()),
            Err(DecoupleError::Incomplete { .. })
        ));

        targets.store(snapshot(Some(Queue::ready(""))));
        assert!(matches!(
            registry.resolve(&key()),
            Err(DecoupleError::Incomplete { .. })
        ));

        targets.store(snapshot(Some(Queue::new("t1", State::Creating))));
        assert!(matches!(
            registry.resolve(&key()),
            Err(DecoupleError::NotReady {
                state: State::Creating,
                ..
            })
        ));

        assert!(registry.is_empty());
        assert_eq!(queue.total_opened(), 0);
    }

    #[test]
    fn unchanged_topic_reuses_cached_handle() {
        let targets = Arc::new(CachedTargets::with_snapshot(snapshot(Some(Queue::ready("t1")))));
        let queue = InMemoryQueue::new();
        let registry = registry(&targets, &queue);

        let first = registry.resolve(&key()).unwrap();
        let second = registry.resolve(&key()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(queue.opened("t1"), 1);
        assert_eq!(registry.cached_topic(&key()).as_deref(), Some("t1"));
    }

    #[test]
    fn drift_closes_stale_handle_once() {
        let targets = Arc::new(CachedTargets::with_snapshot(snapshot(Some(Queue::ready("t1")))));
        let queue = InMemoryQueue::new();
        let registry = registry(&targets, &queue);
        registry.resolve(&key()).unwrap();

        targets.store(snapshot(Some(Queue::ready("t2"))));
        let replaced = registry.resolve(&key()).unwrap();
        registry.resolve(&key()).unwrap();

        assert_eq!(replaced.topic_id(), "t2");
        assert_eq!(queue.closed("t1"), 1);
        assert_eq!(queue.opened("t2"), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn shutdown_closes_every_handle() {
        let other = BrokerKey::new("default", "payments");
        let config = snapshot(Some(Queue::ready("t1")))
            .with_broker(Broker::new(&other).with_decouple_queue(Queue::ready("t9")));
        let targets = Arc::new(CachedTargets::with_snapshot(config));
        let queue = InMemoryQueue::new();
        let registry = registry(&targets, &queue);
        registry.resolve(&key()).unwrap();
        registry.resolve(&other).unwrap();

        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(queue.closed("t1"), 1);
        assert_eq!(queue.closed("t9"), 1);
    }
}
