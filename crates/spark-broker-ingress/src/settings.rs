//! # settings 模块说明
//!
//! ## 角色定位（Why）
//! - 入口过滤开关与默认发布超时属于部署期配置，由宿主在构造路由器时注入；
//! - 路由器在 `send` 热路径上不读取任何全局状态或环境变量，测试因此可以并行运行且互不干扰。
//!
//! ## 配置来源（What）
//! - TOML：`enable_event_filtering`、`publish_timeout_ms`，缺省字段取默认值；
//! - 环境变量：`ENABLE_INGRESS_EVENT_FILTERING`（仅字面量 `"true"` 视为开启）与
//!   `INGRESS_PUBLISH_TIMEOUT_MS`（毫秒整数）。

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// 开启入口过滤的环境变量。
pub const ENABLE_FILTERING_ENV: &str = "ENABLE_INGRESS_EVENT_FILTERING";
/// 默认发布超时（毫秒）的环境变量。
pub const PUBLISH_TIMEOUT_ENV: &str = "INGRESS_PUBLISH_TIMEOUT_MS";

/// 配置解析失败。
#[derive(Debug, Error)]
pub enum SettingsError {
    /// TOML 文本无法解析为设置。
    #[error("ingress settings are not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    /// 环境变量的值不合法。
    #[error("environment variable `{name}` has invalid value `{value}`")]
    InvalidEnv { name: &'static str, value: String },
}

/// 入口路由器的部署期设置。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IngressSettings {
    /// 为 `true` 时，没有任何 Target 感兴趣的事件在入口即被丢弃。
    pub enable_event_filtering: bool,
    /// 调用方未设置截止时间时采用的发布超时；`None` 表示无限等待。
    #[serde(rename = "publish_timeout_ms", deserialize_with = "millis::deserialize")]
    pub publish_timeout: Option<Duration>,
}

impl IngressSettings {
    /// 切换入口过滤。
    pub fn with_event_filtering(mut self, enabled: bool) -> Self {
        self.enable_event_filtering = enabled;
        self
    }

    /// 设置默认发布超时。
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }

    /// 从 TOML 文本解析。
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(raw)?)
    }

    /// 从进程环境变量读取。
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// 以注入的查找函数读取环境变量。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：测试无需修改进程环境即可覆盖所有分支；
    /// - **契约 (What)**：过滤开关只认 `"true"`，其余值（含未设置）一律视为关闭；
    ///   超时必须是非负整数毫秒，否则返回 [`SettingsError::InvalidEnv`]。
    pub fn from_env_with<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enable_event_filtering = lookup(ENABLE_FILTERING_ENV).as_deref() == Some("true");
        let publish_timeout = match lookup(PUBLISH_TIMEOUT_ENV) {
            None => None,
            Some(value) => {
                let millis = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| SettingsError::InvalidEnv {
                        name: PUBLISH_TIMEOUT_ENV,
                        value: value.clone(),
                    })?;
                Some(Duration::from_millis(millis))
            }
        };
        Ok(Self {
            enable_event_filtering,
            publish_timeout,
        })
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
