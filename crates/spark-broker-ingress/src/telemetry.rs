//! # telemetry 模块说明
//!
//! ## 角色定位（Why）
//! - 路由器只通过 `tracing` 宏输出结构化日志，不关心日志去向；
//! - 宿主进程在启动时调用 [`install_subscriber`] 一次，即可获得 `fmt` 输出与 `RUST_LOG` 过滤。
//!
//! ## 契约摘要（What）
//! - `RUST_LOG` 存在且可解析时优先生效，否则采用 `default_directive`；
//! - 第二次调用、或外部已设置全局 Subscriber 时返回 [`TelemetryError::AlreadyInstalled`]。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Subscriber 安装失败。
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// 全局 Subscriber 已存在。
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
    /// 默认过滤指令无法解析。
    #[error("default log directive `{directive}` is invalid: {reason}")]
    InvalidDirective { directive: String, reason: String },
}

/// 安装全局 `fmt + EnvFilter` Subscriber。
///
/// # 教案式说明
/// - **执行 (How)**：先检查本模块与 `tracing` 全局分发器的安装状态，再组装
///   `registry + EnvFilter + fmt` 并设置为全局默认；
/// - **风险 (Trade-offs)**：全局 Subscriber 一经设置无法撤销，测试中应改用 `tracing-test`。
pub fn install_subscriber(default_directive: &str) -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() || dispatcher::has_been_set() {
        return Err(TelemetryError::AlreadyInstalled);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|err| {
            TelemetryError::InvalidDirective {
                directive: default_directive.to_owned(),
                reason: err.to_string(),
            }
        })?,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| TelemetryError::AlreadyInstalled)?;
    INSTALLED
        .set(())
        .map_err(|_| TelemetryError::AlreadyInstalled)
}
