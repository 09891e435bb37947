//! # queue 模块说明
//!
//! ## 角色定位（Why）
//! - 路由器只依赖“打开 Topic 句柄 → 发布 → 关闭”这一最小契约，不绑定任何具体队列服务；
//! - 生产实现（云端消息队列客户端）与测试实现（[`crate::memory`]）共用同一组 trait。
//!
//! ## 契约摘要（What）
//! - [`QueueClient::open_topic`] 只构造本地引用，不做网络往返，因此不会失败；
//! - [`TopicHandle::publish`] 返回 `'static` Future，调用方可在释放注册表读锁后再等待；
//!   Future 被丢弃即放弃等待，实现方必须在 `Drop` 中回收为该次发布占用的资源；
//! - [`TopicHandle::close`] 刷新缓冲并释放资源，之后的发布应返回
//!   [`PublishError::Closed`](crate::error::PublishError::Closed)。

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::PublishError;
use crate::event::QueueMessage;

/// 队列服务确认发布后返回的回执。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishReceipt {
    pub topic: String,
    pub message_id: String,
}

/// 发布结果的 Future。
pub type PublishFuture = BoxFuture<'static, Result<PublishReceipt, PublishError>>;

/// 绑定到某个 Topic 标识的句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：句柄通常内含批量发送缓冲与后台任务，创建与销毁都有成本，因此由注册表按 Broker 缓存；
/// - **契约 (What)**：`topic_id` 在句柄生命周期内不变；`close` 可能阻塞直到缓冲刷新完成，
///   且必须幂等；
/// - **风险 (Trade-offs)**：已捕获句柄的调用方在漂移替换后仍可能完成在途发布，实现方需允许
///   `close` 与在途 Future 并存。
pub trait TopicHandle: Send + Sync {
    /// 句柄绑定的 Topic 标识。
    fn topic_id(&self) -> &str;

    /// 发布一条消息。
    fn publish(&self, message: QueueMessage) -> PublishFuture;

    /// 刷新并释放句柄资源。
    fn close(&self);
}

/// 队列服务客户端。
pub trait QueueClient: Send + Sync {
    /// 打开绑定到 `topic_id` 的句柄。
    fn open_topic(&self, topic_id: &str) -> Arc<dyn TopicHandle>;
}
