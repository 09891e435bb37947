//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 入口路由器的所有失败都要交还给直接调用方（例如 HTTP 前端），由其映射为状态码并决定是否重试；
//! - 因此每个错误都必须携带 Broker 键、稳定错误码与 [`ErrorCategory`]，调用方无需解析文案。
//!
//! ## 分类约定（What）
//! - `NotFound`：路由表中没有该 Broker，多半是控制面传播延迟，可重试；
//! - `Incomplete`：Broker 存在但解耦队列缺失或 Topic 为空，配置修复前永久失败；
//! - `NotReady`：队列仍在创建，稍后重试即可；
//! - `Publish`：队列服务返回的错误，分类继承自 [`PublishError`]；
//! - `Cancelled`/`DeadlineExceeded`：调用方取消或超时，等待被中止；
//! - `Internal`：编码等意外失败，不可重试，也绝不导致进程崩溃。

use std::time::Duration;

use spark_broker_config::{BrokerKey, State};
use thiserror::Error;

const NOT_FOUND_CODE: &str = "spark.broker.ingress.not_found";
const INCOMPLETE_CODE: &str = "spark.broker.ingress.incomplete";
const NOT_READY_CODE: &str = "spark.broker.ingress.not_ready";
const PUBLISH_CODE: &str = "spark.broker.ingress.publish_failed";
const CANCEL_CODE: &str = "spark.broker.ingress.cancelled";
const TIMEOUT_CODE: &str = "spark.broker.ingress.timeout";
const INTERNAL_CODE: &str = "spark.broker.ingress.internal";

/// 建议的重试退避。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryAdvice {
    wait: Duration,
}

impl RetryAdvice {
    /// 建议在 `wait` 之后重试。
    pub const fn after(wait: Duration) -> Self {
        Self { wait }
    }

    /// 建议的等待时长。
    pub const fn wait(&self) -> Duration {
        self.wait
    }
}

/// 错误分类，指导调用方的重试决策。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// 暂时性失败，可按建议退避后重试。
    Retryable(RetryAdvice),
    /// 在外部修复前重试无意义。
    NonRetryable,
    /// 调用方主动取消。
    Cancelled,
    /// 调用方截止时间已到。
    Timeout,
}

impl ErrorCategory {
    /// 是否值得重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Retryable(_))
    }
}

/// 队列服务在发布阶段返回的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：路由器不认识具体队列实现，只需区分“可重试”与“被拒绝”；
/// - **契约 (What)**：`topic` 为发布目标；实现方应把底层错误压缩进 `detail`；
/// - **风险 (Trade-offs)**：`Closed` 表示调用方拿到的句柄已被漂移替换并关闭，重试时会解析到新句柄。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PublishError {
    /// 队列服务暂时不可用。
    #[error("topic `{topic}` is unavailable: {detail}")]
    Unavailable { topic: String, detail: String },
    /// 队列服务拒绝了该消息（例如超出大小限制或无权限）。
    #[error("topic `{topic}` rejected the message: {detail}")]
    Rejected { topic: String, detail: String },
    /// 句柄已关闭，不再接受发布。
    #[error("topic `{topic}` handle is closed")]
    Closed { topic: String },
}

impl PublishError {
    /// 发布错误对应的分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            PublishError::Unavailable { .. } => {
                ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(50)))
            }
            PublishError::Closed { .. } => {
                ErrorCategory::Retryable(RetryAdvice::after(Duration::ZERO))
            }
            PublishError::Rejected { .. } => ErrorCategory::NonRetryable,
        }
    }
}

/// 事件编码为队列消息时的失败。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum EncodeError {
    /// 缺少必填的上下文属性。
    #[error("event is missing required attribute `{0}`")]
    MissingAttribute(&'static str),
    /// 扩展属性名不合法（只允许小写字母与数字）。
    #[error("extension attribute name `{0}` is invalid")]
    InvalidExtensionName(String),
}

/// 入口路由器的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分暂时性与永久性的配置问题，避免调用方对永久错误无限重试；
/// - **契约 (What)**：所有变体携带 `broker`；[`DecoupleError::code`] 返回稳定错误码，
///   [`DecoupleError::category`] 返回分类；
/// - **风险 (Trade-offs)**：`NotFound` 被归为可重试，若 Broker 确实不存在，调用方需自行限制重试次数。
#[derive(Debug, Error)]
pub enum DecoupleError {
    /// 路由表中没有该 Broker。
    #[error("broker `{broker}` is not present in the routing table")]
    NotFound { broker: BrokerKey },
    /// Broker 的解耦队列缺失或 Topic 为空。
    #[error("decouple queue of broker `{broker}` is missing or has an empty topic")]
    Incomplete { broker: BrokerKey },
    /// 解耦队列尚未就绪。
    #[error("decouple queue of broker `{broker}` is not ready (state {state:?})")]
    NotReady { broker: BrokerKey, state: State },
    /// 队列服务发布失败。
    #[error("publish to the decouple topic of broker `{broker}` failed: {source}")]
    Publish {
        broker: BrokerKey,
        #[source]
        source: PublishError,
    },
    /// 调用方取消了发布等待。
    #[error("publish for broker `{broker}` was cancelled")]
    Cancelled { broker: BrokerKey },
    /// 发布等待超过截止时间。
    #[error("publish for broker `{broker}` exceeded its deadline")]
    DeadlineExceeded { broker: BrokerKey },
    /// 编码等意外失败。
    #[error("internal failure while routing an event for broker `{broker}`: {detail}")]
    Internal { broker: BrokerKey, detail: String },
}

impl DecoupleError {
    /// 错误所涉及的 Broker。
    pub fn broker(&self) -> &BrokerKey {
        match self {
            DecoupleError::NotFound { broker }
            | DecoupleError::Incomplete { broker }
            | DecoupleError::NotReady { broker, .. }
            | DecoupleError::Publish { broker, .. }
            | DecoupleError::Cancelled { broker }
            | DecoupleError::DeadlineExceeded { broker }
            | DecoupleError::Internal { broker, .. } => broker,
        }
    }

    /// 稳定错误码，适合作为日志字段与指标标签。
    pub fn code(&self) -> &'static str {
        match self {
            DecoupleError::NotFound { .. } => NOT_FOUND_CODE,
            DecoupleError::Incomplete { .. } => INCOMPLETE_CODE,
            DecoupleError::NotReady { .. } => NOT_READY_CODE,
            DecoupleError::Publish { .. } => PUBLISH_CODE,
            DecoupleError::Cancelled { .. } => CANCEL_CODE,
            DecoupleError::DeadlineExceeded { .. } => TIMEOUT_CODE,
            DecoupleError::Internal { .. } => INTERNAL_CODE,
        }
    }

    /// 错误分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            DecoupleError::NotFound { .. } => {
                ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(100)))
            }
            DecoupleError::NotReady { .. } => {
                ErrorCategory::Retryable(RetryAdvice::after(Duration::from_secs(1)))
            }
            DecoupleError::Publish { source, .. } => source.category(),
            DecoupleError::Cancelled { .. } => ErrorCategory::Cancelled,
            DecoupleError::DeadlineExceeded { .. } => ErrorCategory::Timeout,
            DecoupleError::Incomplete { .. } | DecoupleError::Internal { .. } => {
                ErrorCategory::NonRetryable
            }
        }
    }

    /// 是否由调用方取消或超时引起。
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            DecoupleError::Cancelled { .. } | DecoupleError::DeadlineExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BrokerKey {
        BrokerKey::new("default", "orders")
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(DecoupleError::NotFound { broker: key() }.category().is_retryable());
        assert!(
            DecoupleError::NotReady {
                broker: key(),
                state: State::Creating,
            }
            .category()
            .is_retryable()
        );
        assert_eq!(
            DecoupleError::Incomplete { broker: key() }.category(),
            ErrorCategory::NonRetryable
        );
    }

    #[test]
    fn publish_errors_inherit_transport_category() {
        let rejected = DecoupleError::Publish {
            broker: key(),
            source: PublishError::Rejected {
                topic: "t1".into(),
                detail: "too large".into(),
            },
        };
        assert_eq!(rejected.category(), ErrorCategory::NonRetryable);
        assert_eq!(rejected.code(), "spark.broker.ingress.publish_failed");
        assert!(rejected.to_string().contains("default/orders"));

        let unavailable = PublishError::Unavailable {
            topic: "t1".into(),
            detail: "connection reset".into(),
        };
        assert!(unavailable.category().is_retryable());
    }

    #[test]
    fn cancellation_variants_are_flagged() {
        let cancelled = DecoupleError::Cancelled { broker: key() };
        let timeout = DecoupleError::DeadlineExceeded { broker: key() };
        assert!(cancelled.is_cancellation());
        assert!(timeout.is_cancellation());
        assert_eq!(cancelled.category(), ErrorCategory::Cancelled);
        assert_eq!(timeout.category(), ErrorCategory::Timeout);
        assert_eq!(timeout.broker(), &key());
    }
}
