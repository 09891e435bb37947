//! # memory 模块说明
//!
//! ## 角色定位（Why）
//! - 为路由器与宿主的测试提供可观测、可编排的队列客户端，无需真实的云端队列；
//! - 记录每个 Topic 的打开/关闭次数与发布内容，使“句柄只创建一次”“漂移时关闭旧句柄”
//!   等性质可以被直接断言。
//!
//! ## 编排能力（What）
//! - [`PublishBehavior::Acknowledge`]：首次轮询即确认并返回回执，未被轮询就丢弃的发布不会留下记录；
//! - [`PublishBehavior::Fail`]：以给定错误失败；
//! - [`PublishBehavior::Hang`]：永不完成，用于验证取消与超时；在途计数会在 Future 被丢弃时归还。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::PublishError;
use crate::event::QueueMessage;
use crate::queue::{PublishFuture, PublishReceipt, QueueClient, TopicHandle};

/// 发布行为编排。
#[derive(Clone, Debug, Default)]
pub enum PublishBehavior {
    /// 立即确认。
    #[default]
    Acknowledge,
    /// 以给定错误失败。
    Fail(PublishError),
    /// 永不完成。
    Hang,
}

#[derive(Default)]
struct TopicStats {
    opened: usize,
    closed: usize,
    published: Vec<QueueMessage>,
}

#[derive(Default)]
struct Shared {
    behavior: Mutex<PublishBehavior>,
    topics: Mutex<HashMap<String, TopicStats>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    sequence: AtomicU64,
}

/// 内存队列客户端。
///
/// 克隆体共享同一份记录，测试可以把一个克隆交给路由器，另一个留作断言。
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    shared: Arc<Shared>,
}

impl InMemoryQueue {
    /// 构造默认立即确认的客户端。
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换后续发布的行为，已经在途的发布不受影响。
    pub fn set_behavior(&self, behavior: PublishBehavior) {
        *self.shared.behavior.lock() = behavior;
    }

    /// `topic` 被打开的次数。
    pub fn opened(&self, topic: &str) -> usize {
        self.with_topic(topic, |stats| stats.opened)
    }

    /// `topic` 被关闭的次数。
    pub fn closed(&self, topic: &str) -> usize {
        self.with_topic(topic, |stats| stats.closed)
    }

    /// 发往 `topic` 且被确认的消息。
    pub fn published(&self, topic: &str) -> Vec<QueueMessage> {
        self.with_topic(topic, |stats| stats.published.clone())
    }

    /// 所有 Topic 的累计打开次数。
    pub fn total_opened(&self) -> usize {
        self.shared
            .topics
            .lock()
            .values()
            .map(|stats| stats.opened)
            .sum()
    }

    /// 调用 `publish` 的累计次数，不论结果。
    pub fn publish_attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::Acquire)
    }

    /// 尚未完成、也未被丢弃的发布数量。
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    fn with_topic<T: Default>(&self, topic: &str, read: impl FnOnce(&TopicStats) -> T) -> T {
        self.shared
            .topics
            .lock()
            .get(topic)
            .map(read)
            .unwrap_or_default()
    }
}

impl QueueClient for InMemoryQueue {
    fn open_topic(&self, topic_id: &str) -> Arc<dyn TopicHandle> {
        self.shared
            .topics
            .lock()
            .entry(topic_id.to_owned())
            .or_default()
            .opened += 1;
        Arc::new(InMemoryTopic {
            topic_id: topic_id.to_owned(),
            closed: AtomicBool::new(false),
            shared: Arc::clone(&self.shared),
        })
    }
}

/// [`InMemoryQueue`] 打开的句柄。
pub struct InMemoryTopic {
    topic_id: String,
    closed: AtomicBool,
    shared: Arc<Shared>,
}

impl TopicHandle for InMemoryTopic {
    fn topic_id(&self) -> &str {
        &self.topic_id
    }

    fn publish(&self, message: QueueMessage) -> PublishFuture {
        self.shared.attempts.fetch_add(1, Ordering::AcqRel);
        if self.closed.load(Ordering::Acquire) {
            let err = PublishError::Closed {
                topic: self.topic_id.clone(),
            };
            return Box::pin(futures::future::ready(Err(err)));
        }

        let behavior = self.shared.behavior.lock().clone();
        match behavior {
            PublishBehavior::Acknowledge => {
                // 与真实客户端一致：只有被轮询到完成的发布才算送达。
                let shared = Arc::clone(&self.shared);
                let topic = self.topic_id.clone();
                Box::pin(async move {
                    let sequence = shared.sequence.fetch_add(1, Ordering::AcqRel);
                    shared
                        .topics
                        .lock()
                        .entry(topic.clone())
                        .or_default()
                        .published
                        .push(message);
                    let message_id = format!("{topic}-{sequence}");
                    Ok(PublishReceipt { topic, message_id })
                })
            }
            PublishBehavior::Fail(err) => Box::pin(futures::future::ready(Err(err))),
            PublishBehavior::Hang => {
                let guard = InFlightGuard::enter(Arc::clone(&self.shared));
                Box::pin(async move {
                    let _guard = guard;
                    futures::future::pending::<Result<PublishReceipt, PublishError>>().await
                })
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared
            .topics
            .lock()
            .entry(self.topic_id.clone())
            .or_default()
            .closed += 1;
    }
}

struct InFlightGuard {
    shared: Arc<Shared>,
}

impl InFlightGuard {
    fn enter(shared: Arc<Shared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        Self { shared }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
