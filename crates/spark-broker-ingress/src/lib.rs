#![doc = r#"
# spark-broker-ingress

## 设计动机（Why）
- **定位**：Broker 入口进程的写路径核心，把收到的事件路由到所属 Broker 的解耦队列；
- **架构角色**：向上服务 HTTP 等前端（由其把错误映射为状态码），向下只依赖
  [`QueueClient`] 契约与 `spark-broker-config` 提供的只读路由表；
- **设计理念**：配置读取零锁、句柄缓存读写分离、错误全部分类后交还调用方。

## 核心契约（What）
- [`DecoupleRouter::send`]：解析句柄 → 可选兴趣过滤 → 编码 → 发布并等待确认；
- [`TopicRegistry`]：每个 Broker 至多一个“当前”句柄，Topic 漂移时关闭旧句柄再创建新句柄；
- [`DecoupleError`]：携带 Broker 键、稳定错误码与 [`ErrorCategory`]。

## 实现策略（How）
- 路由表快照来自 `arc-swap` 驱动的 [`CachedTargets`](spark_broker_config::CachedTargets)；
- 句柄缓存以 `parking_lot::RwLock` 保护，慢路径在写锁内复核配置；
- 发布等待通过 `tokio::select!` 与取消轮询、截止定时器竞争。

## 风险与考量（Trade-offs）
- 兴趣探测覆盖整份快照而非单个 Broker，详见 [`router`] 模块说明；
- [`memory`] 模块提供内存队列实现，面向测试与本地演示，不具备持久化能力。
"#]

pub mod context;
pub mod encoder;
pub mod error;
pub mod event;
pub mod filter;
pub mod memory;
pub mod queue;
pub mod registry;
pub mod router;
pub mod settings;
pub mod telemetry;

pub use context::{Cancellation, SendContext, TraceContext, TraceContextError};
pub use encoder::{BinaryEventEncoder, EventEncoder};
pub use error::{DecoupleError, EncodeError, ErrorCategory, PublishError, RetryAdvice};
pub use event::{Event, QueueMessage};
pub use filter::{AttributeFilter, InterestEvaluator};
pub use queue::{PublishFuture, PublishReceipt, QueueClient, TopicHandle};
pub use registry::TopicRegistry;
pub use router::{DecoupleRouter, SendOutcome};
pub use settings::{IngressSettings, SettingsError};
pub use telemetry::{TelemetryError, install_subscriber};
