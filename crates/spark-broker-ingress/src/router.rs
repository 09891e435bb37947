//! # DecoupleRouter：入口事件的解耦路由
//!
//! ## 核心意图（Why）
//! - 入口进程把收到的事件写入所属 Broker 的解耦队列，扇出与重试由下游异步完成；
//! - 路由器只负责“解析句柄 → 可选的兴趣过滤 → 编码 → 发布并等待确认”，
//!   所有失败都分类后交还调用方，内部不做任何重试（至少一次语义由调用方的重试保证）。
//!
//! ## 行为契约（What）
//! - 配置类失败（`NotFound`/`Incomplete`/`NotReady`）发生在任何副作用之前；
//! - 开启过滤且没有任何 Target 感兴趣时返回 [`SendOutcome::Filtered`]，不发布也不报错；
//! - 发布等待是唯一的挂起点，受调用方取消与截止时间约束；调用方未设截止时间时采用
//!   [`IngressSettings::publish_timeout`]。
//!
//! ## 风险提示（Trade-offs）
//! - 兴趣探测扫描的是整份快照中的全部 Target，而非仅限被寻址 Broker 的 Target。
//!   这沿用了现有部署的可观测行为：某个 Broker 的事件可能因为其他 Broker 的 Target
//!   感兴趣而被放行。收窄为按 Broker 探测会改变线上语义，需单独评估。

use std::fmt;
use std::sync::Arc;

use spark_broker_config::{BrokerKey, ReadonlyTargets, Target};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::context::{Interrupted, SendContext, interruption, run_with_context};
use crate::encoder::{BinaryEventEncoder, EventEncoder};
use crate::error::DecoupleError;
use crate::event::Event;
use crate::filter::{AttributeFilter, InterestEvaluator};
use crate::queue::{PublishReceipt, QueueClient};
use crate::registry::TopicRegistry;
use crate::settings::IngressSettings;

/// 单次 `send` 的成功结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    /// 事件已写入解耦队列。
    Published(PublishReceipt),
    /// 没有任何 Target 感兴趣，事件在入口被丢弃。
    Filtered,
}

/// 入口解耦路由器。
///
/// # 教案式说明
/// - **意图 (Why)**：把路由表、句柄缓存与队列客户端组合为唯一的入口写路径；
/// - **契约 (What)**：`&self` 上的 `send` 可被任意多个任务并发调用，跨 Broker 无全局串行化；
/// - **执行 (How)**：过滤器与编码器以构造期注入的策略对象提供，运行期不读取全局状态。
pub struct DecoupleRouter {
    targets: Arc<dyn ReadonlyTargets>,
    registry: TopicRegistry,
    settings: IngressSettings,
    evaluator: Arc<dyn InterestEvaluator>,
    encoder: Arc<dyn EventEncoder>,
}

impl DecoupleRouter {
    /// 以默认的 [`AttributeFilter`] 与 [`BinaryEventEncoder`] 构造路由器。
    pub fn new(
        targets: Arc<dyn ReadonlyTargets>,
        queue_client: Arc<dyn QueueClient>,
        settings: IngressSettings,
    ) -> Self {
        Self {
            registry: TopicRegistry::new(Arc::clone(&targets), queue_client),
            targets,
            settings,
            evaluator: Arc::new(AttributeFilter),
            encoder: Arc::new(BinaryEventEncoder),
        }
    }

    /// 替换兴趣判定策略。
    pub fn with_interest_evaluator(mut self, evaluator: Arc<dyn InterestEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// 替换事件编码策略。
    pub fn with_encoder(mut self, encoder: Arc<dyn EventEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// 构造期注入的设置。
    pub fn settings(&self) -> &IngressSettings {
        &self.settings
    }

    /// 句柄注册表，主要用于诊断。
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// 把事件写入 `broker` 的解耦队列并等待确认。
    ///
    /// # 教案式说明
    /// - **执行 (How)**：
    ///   1. 通过注册表解析句柄，配置类失败直接返回；
    ///   2. 过滤开启时探测兴趣，无人感兴趣则返回 [`SendOutcome::Filtered`]；
    ///   3. 编码事件并附带追踪上下文，编码失败归为 `Internal`；
    ///   4. 发布并在取消/截止约束下等待结果，原样返回发布结果。
    /// - **契约 (What)**：返回 `Cancelled`/`DeadlineExceeded` 时在途发布的 Future 已被丢弃；
    ///   上下文在发布前已取消或过期时不会发起发布。
    pub async fn send(
        &self,
        ctx: &SendContext,
        broker: &BrokerKey,
        event: &Event,
    ) -> Result<SendOutcome, DecoupleError> {
        let handle = self.registry.resolve(broker)?;

        if self.settings.enable_event_filtering && !self.has_interested_target(ctx, event) {
            debug!(broker = %broker, event_id = %event.id, "no target is interested; event dropped at ingress");
            return Ok(SendOutcome::Filtered);
        }

        let message = self
            .encoder
            .encode(event, ctx.trace())
            .map_err(|err| DecoupleError::Internal {
                broker: broker.clone(),
                detail: err.to_string(),
            })?;

        let deadline = ctx.deadline().or_else(|| {
            self.settings
                .publish_timeout
                .map(|timeout| Instant::now() + timeout)
        });
        if let Some(reason) = interruption(ctx.cancellation(), deadline) {
            return Err(self.interrupted(broker, event, handle.topic_id(), reason));
        }

        let publish = handle.publish(message);
        match run_with_context(ctx.cancellation(), deadline, publish).await {
            Ok(Ok(receipt)) => Ok(SendOutcome::Published(receipt)),
            Ok(Err(source)) => {
                warn!(
                    broker = %broker,
                    topic = handle.topic_id(),
                    event_id = %event.id,
                    error = %source,
                    "failed to publish event to decouple topic"
                );
                Err(DecoupleError::Publish {
                    broker: broker.clone(),
                    source,
                })
            }
            Err(reason) => Err(self.interrupted(broker, event, handle.topic_id(), reason)),
        }
    }

    /// 快照中是否存在任何对事件感兴趣的 Target。
    ///
    /// 扫描范围是整份快照，命中第一个即停止。
    pub fn has_interested_target(&self, ctx: &SendContext, event: &Event) -> bool {
        let mut interested = false;
        self.targets.range_all_targets(&mut |target: &Target| {
            interested = self
                .evaluator
                .matches(ctx, &target.filter_attributes, event);
            !interested
        });
        interested
    }

    /// 关闭全部缓存句柄。
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    fn interrupted(
        &self,
        broker: &BrokerKey,
        event: &Event,
        topic: &str,
        reason: Interrupted,
    ) -> DecoupleError {
        match reason {
            Interrupted::Cancelled => {
                warn!(broker = %broker, topic, event_id = %event.id, "publish wait cancelled by caller");
                DecoupleError::Cancelled {
                    broker: broker.clone(),
                }
            }
            Interrupted::DeadlineExceeded => {
                warn!(broker = %broker, topic, event_id = %event.id, "publish wait exceeded deadline");
                DecoupleError::DeadlineExceeded {
                    broker: broker.clone(),
                }
            }
        }
    }
}

impl fmt::Debug for DecoupleRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoupleRouter")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
