//! 安全事件分类枚举，统一表达安全违规的主语义，便于在错误契约与断开策略中复用。
//!
//! # 设计背景（Why）
//! - 传输层在证书校验或握手失败时需要输出结构化分类，驱动上层的告警与断开策略；
//! - 借鉴零信任架构常见的分层（认证、保密、完整性），覆盖 TLS 链路中的主要风险点。
//!
//! # 契约说明（What）
//! - 枚举为 `#[non_exhaustive]`，允许未来扩展新的安全事件；
//! - `Unknown` 分支用于承接临时或尚未细分的安全事件。

/// 安全事件分类枚举。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SecurityClass {
    /// 认证失败，例如证书链校验不通过、对端身份不可信。
    Authentication,
    /// 保密性威胁，例如协商出的保护级别低于要求。
    Confidentiality,
    /// 完整性校验失败，例如记录被篡改或告警指示解密失败。
    Integrity,
    /// 未归类的安全事件。
    Unknown,
}

impl SecurityClass {
    /// 返回分类对应的稳定代码，供日志与指标使用。
    pub const fn code(self) -> &'static str {
        match self {
            SecurityClass::Authentication => "security.authentication",
            SecurityClass::Confidentiality => "security.confidentiality",
            SecurityClass::Integrity => "security.integrity",
            SecurityClass::Unknown => "security.unknown",
        }
    }
}
