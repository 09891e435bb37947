//! 快照编解码错误。

use thiserror::Error;

/// 快照仓储的编解码错误。
///
/// - **契约 (What)**：编码失败、解码失败与内容不自洽（含名称内出现分隔符）分开表达；后两者出现时仓储保持原快照不变；
/// - **风险 (Trade-offs)**：底层 `serde_json` 错误以 `#[source]` 保留，便于排障时追溯到具体字段。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 快照序列化失败。
    #[error("failed to encode targets snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    /// 传入字节不是合法的快照编码。
    #[error("failed to decode targets snapshot: {0}")]
    Decode(#[source] serde_json::Error),
    /// 解码成功但映射键与条目自身标识不一致。
    #[error("inconsistent targets snapshot entry `{entry}`: expected key `{expected}`")]
    Inconsistent { entry: String, expected: String },
    /// 某个名称段内含 `/`，持久化字符串无法唯一还原。
    #[error("targets snapshot entry `{entry}` has a `/` inside a name segment")]
    SeparatorInName { entry: String },
}
