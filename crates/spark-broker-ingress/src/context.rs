//! # context 模块说明
//!
//! ## 角色定位（Why）
//! - 每次 `send` 都在调用方的执行上下文中运行：调用方可能随时取消、可能设置截止时间，
//!   也可能携带上游的分布式追踪上下文；
//! - 本模块把这三者收拢为 [`SendContext`]，并提供把任意 Future 包裹在“取消 + 截止”语义下的工具。
//!
//! ## 契约摘要（What）
//! - [`Cancellation`] 为共享原子位，`child` 与原令牌共享同一状态；
//! - [`TraceContext`] 遵循 W3C Trace Context，`traceparent` 渲染为 `00-<trace>-<span>-<flags>`；
//! - 被中止的 Future 会被直接丢弃，其持有的资源随之释放。
//!
//! ## 风险提示（Trade-offs）
//! - 取消位通过固定间隔轮询检测，取消生效存在毫秒级延迟；换来的是无需注册回调的极简原语。

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 取消原语。
///
/// # 教案式说明
/// - **意图 (Why)**：入口请求可能因客户端断开而被放弃，发布等待必须能被外部打断；
/// - **契约 (What)**：`cancel` 首次成功置位时返回 `true`，重复调用返回 `false`；
///   置位后所有共享该状态的令牌都会观测到取消；
/// - **风险 (Trade-offs)**：令牌本身不会终止任何 Future，需配合 [`run_with_context`] 使用。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前是否已被取消。
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 标记取消，返回本次调用是否首次触发。
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一状态的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

/// `traceparent` 解析失败。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TraceContextError {
    #[error("traceparent `{0}` is malformed")]
    Malformed(String),
    #[error("traceparent version `{0}` is not supported")]
    UnsupportedVersion(String),
    #[error("trace id or span id must not be all zeros")]
    ZeroIdentifier,
}

/// 分布式追踪上下文，随事件写入解耦队列的消息元数据。
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TraceContext {
    pub trace_id: [u8; Self::TRACE_ID_LENGTH],
    pub span_id: [u8; Self::SPAN_ID_LENGTH],
    pub flags: u8,
    pub trace_state: Option<String>,
}

impl TraceContext {
    /// Trace ID 的长度（字节）。
    pub const TRACE_ID_LENGTH: usize = 16;
    /// Span ID 的长度（字节）。
    pub const SPAN_ID_LENGTH: usize = 8;
    /// `sampled` 标志位。
    pub const SAMPLED: u8 = 0x01;

    /// 以标识与标志位构造，`trace_state` 为空。
    pub fn new(
        trace_id: [u8; Self::TRACE_ID_LENGTH],
        span_id: [u8; Self::SPAN_ID_LENGTH],
        flags: u8,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            flags,
            trace_state: None,
        }
    }

    /// 附加 `tracestate`。
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.trace_state = Some(state.into());
        self
    }

    /// 是否被采样。
    pub fn is_sampled(&self) -> bool {
        self.flags & Self::SAMPLED == Self::SAMPLED
    }

    /// 渲染 W3C `traceparent` 头。
    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            hex::encode(self.trace_id),
            hex::encode(self.span_id),
            self.flags
        )
    }

    /// 解析 W3C `traceparent` 头（仅支持版本 `00`）。
    pub fn from_traceparent(header: &str) -> Result<Self, TraceContextError> {
        let malformed = || TraceContextError::Malformed(header.to_owned());
        let mut parts = header.trim().split('-');
        let (Some(version), Some(trace), Some(span), Some(flags), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(malformed());
        };
        if version != "00" {
            return Err(TraceContextError::UnsupportedVersion(version.to_owned()));
        }

        let mut trace_id = [0u8; Self::TRACE_ID_LENGTH];
        let mut span_id = [0u8; Self::SPAN_ID_LENGTH];
        let mut flag_bytes = [0u8; 1];
        hex::decode_to_slice(trace, &mut trace_id).map_err(|_| malformed())?;
        hex::decode_to_slice(span, &mut span_id).map_err(|_| malformed())?;
        hex::decode_to_slice(flags, &mut flag_bytes).map_err(|_| malformed())?;

        if trace_id.iter().all(|byte| *byte == 0) || span_id.iter().all(|byte| *byte == 0) {
            return Err(TraceContextError::ZeroIdentifier);
        }
        Ok(Self::new(trace_id, span_id, flag_bytes[0]))
    }
}

/// 单次 `send` 的调用上下文：取消、截止与追踪。
#[derive(Clone, Default)]
pub struct SendContext {
    cancellation: Cancellation,
    deadline: Option<Instant>,
    trace: Option<TraceContext>,
}

impl SendContext {
    /// 无截止、未取消、无追踪的上下文。
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定外部取消令牌。
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// 设置绝对截止时间。
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// 以“当前时间 + 时长”设置截止时间。
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// 携带上游追踪上下文。
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }
}

impl fmt::Debug for SendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendContext")
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("deadline", &self.deadline)
            .field("traceparent", &self.trace.as_ref().map(TraceContext::traceparent))
            .finish()
    }
}

/// Future 被上下文中止的原因。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

/// 不挂起地检查上下文是否已被取消或已过期，取消优先。
pub(crate) fn interruption(
    cancellation: &Cancellation,
    deadline: Option<Instant>,
) -> Option<Interrupted> {
    if cancellation.is_cancelled() {
        Some(Interrupted::Cancelled)
    } else if deadline.is_some_and(|deadline| deadline <= Instant::now()) {
        Some(Interrupted::DeadlineExceeded)
    } else {
        None
    }
}

async fn wait_for_cancellation(cancellation: &Cancellation) {
    while !cancellation.is_cancelled() {
        tokio::time::sleep(CANCELLATION_POLL_INTERVAL).await;
    }
}

/// 在取消/截止语义下驱动 `future`。
///
/// # 教案式说明
/// - **意图 (Why)**：发布等待是 `send` 唯一的挂起点，必须能被调用方打断；
/// - **执行 (How)**：先以 [`interruption`] 检查已取消/已过期，再用 `tokio::select!` 让 Future 与取消轮询、
///   截止定时器竞争；`biased` 保证取消优先于截止、截止优先于结果；
/// - **契约 (What)**：返回 `Err` 时 `future` 已被丢弃，持有的资源随之释放。
pub(crate) async fn run_with_context<F, T>(
    cancellation: &Cancellation,
    deadline: Option<Instant>,
    future: F,
) -> Result<T, Interrupted>
where
    F: Future<Output = T>,
{
    if let Some(reason) = interruption(cancellation, deadline) {
        return Err(reason);
    }

    let cancel = wait_for_cancellation(cancellation);
    tokio::pin!(cancel);
    tokio::pin!(future);

    if let Some(deadline) = deadline {
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        tokio::select! {
            biased;
            _ = &mut cancel => Err(Interrupted::Cancelled),
            _ = &mut sleep => Err(Interrupted::DeadlineExceeded),
            output = &mut future => Ok(output),
        }
    } else {
        tokio::select! {
            biased;
            _ = &mut cancel => Err(Interrupted::Cancelled),
            output = &mut future => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reports_first_trigger_only() {
        let root = Cancellation::new();
        let child = root.child();
        assert!(!child.is_cancelled());
        assert!(root.cancel());
        assert!(!child.cancel());
        assert!(child.is_cancelled());
    }

    #[test]
    fn traceparent_round_trips() {
        let trace = TraceContext::new([0x11; 16], [0x22; 8], TraceContext::SAMPLED);
        let header = trace.traceparent();
        assert_eq!(
            header,
            "00-11111111111111111111111111111111-2222222222222222-01"
        );
        assert_eq!(TraceContext::from_traceparent(&header).unwrap(), trace);
        assert!(trace.is_sampled());
    }

    #[test]
    fn malformed_traceparent_is_rejected() {
        assert!(matches!(
            TraceContext::from_traceparent("00-abc"),
            Err(TraceContextError::Malformed(_))
        ));
        assert!(matches!(
            TraceContext::from_traceparent(
                "01-11111111111111111111111111111111-2222222222222222-01"
            ),
            Err(TraceContextError::UnsupportedVersion(_))
        ));
        assert_eq!(
            TraceContext::from_traceparent(
                "00-00000000000000000000000000000000-2222222222222222-01"
            ),
            Err(TraceContextError::ZeroIdentifier)
        );
    }

    #[tokio::test]
    async fn completed_future_wins_without_interruption() {
        let cancellation = Cancellation::new();
        let output = run_with_context(&cancellation, None, async { 7 }).await;
        assert_eq!(output, Ok(7));
    }

    #[tokio::test]
    async fn pre_cancelled_context_short_circuits() {
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let output = run_with_context(&cancellation, None, async { 7 }).await;
        assert_eq!(output, Err(Interrupted::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pending_future() {
        let cancellation = Cancellation::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        let output =
            run_with_context(&cancellation, Some(deadline), std::future::pending::<()>()).await;
        assert_eq!(output, Err(Interrupted::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_future() {
        let cancellation = Cancellation::new();
        let trigger = cancellation.child();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let output = run_with_context(&cancellation, None, std::future::pending::<()>()).await;
        assert_eq!(output, Err(Interrupted::Cancelled));
    }
}
