use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::error::Error;
use core::fmt;
use core::time::Duration;

use crate::security::SecurityClass;

/// `CoreError` 表示传输通道族跨层共享的稳定错误域，是所有可观察错误的最终形态。
///
/// # 设计背景（Why）
/// - 建连、握手与读写在不同层次产生的故障需要合流为统一的错误码，以便日志与
///   上层协议栈能够执行精确的自动化治理（重试、断开、告警）；
/// - 契约层兼容 `no_std + alloc` 场景，因此基于 `core::error::Error` 而非
///   `std` 专属抽象。
///
/// # 逻辑解析（How）
/// - 结构体以 Builder 风格方法叠加上下文信息（底层原因、错误分类），并通过
///   `source()` 暴露完整链路；
/// - 错误码 `code` 始终为 `'static` 字符串，承载稳定语义；`message` 面向排障
///   人员。
///
/// # 契约说明（What）
/// - **前置条件**：调用方必须使用遵循 `<域>.<语义>` 约定的稳定码值；
/// - **返回值**：构造函数返回拥有所有权的 `CoreError`，可安全跨线程移动
///   （`Send + Sync + 'static`）；
/// - **后置条件**：除非显式调用 `with_*` 方法，错误不会包含额外上下文。
///
/// # 设计取舍与风险（Trade-offs）
/// - 采用 `Cow` 保存消息，常量文案零分配、动态文案一次堆分配；
/// - 分类信息为可选项，未标注时回退为 [`ErrorCategory::NonRetryable`]，
///   提醒调用方默认不要触发自动重试。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
    category: Option<ErrorCategory>,
}

impl CoreError {
    /// 构造核心错误。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            category: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 为错误标记结构化分类信息，驱动自动化容错策略。
    ///
    /// # 契约说明
    /// - 分类应与错误码语义保持一致，避免将不可重试错误标记为 `Retryable`；
    /// - 返回新的 `CoreError`，内部分类信息被覆盖。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// 获取结构化错误分类。
    ///
    /// # 返回契约
    /// - 若未显式设置，默认返回 [`ErrorCategory::NonRetryable`]；
    /// - 调用方可据此驱动重试、断开或告警策略。
    pub fn category(&self) -> ErrorCategory {
        self.category.clone().unwrap_or(ErrorCategory::NonRetryable)
    }

    /// 判断该错误是否由取消触发。
    pub fn is_cancelled(&self) -> bool {
        matches!(self.category(), ErrorCategory::Cancelled)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 错误分类枚举，驱动自动化容错策略。
///
/// # 设计背景（Why）
/// - 统一表达“可重试”“安全违规”“取消/超时”等关键信号，避免上层解析字符串；
/// - 上层协议栈依赖该分类将传输失败翻译为断开或重连决策。
///
/// # 契约说明（What）
/// - `Retryable`：携带退避建议 [`RetryAdvice`]；
/// - `Security`：标记安全分类 [`SecurityClass`]，通常对应证书或握手违规；
/// - `Cancelled`/`Timeout`：分别由取消令牌与截止时间触发，属预期结果而非故障。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Retryable(RetryAdvice),
    NonRetryable,
    Security(SecurityClass),
    Cancelled,
    Timeout,
}

/// 软退避建议：告知调用方在多长时间后重试更有意义。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryAdvice {
    /// 推荐的等待时长。
    pub wait: Duration,
    /// 可选的原因描述，帮助调用方生成观测日志。
    pub reason: Option<Cow<'static, str>>,
}

impl RetryAdvice {
    /// 构造一个仅包含等待时间的建议。
    ///
    /// # 契约说明
    /// - `wait` 必须大于零；若无法提供准确时长，建议使用短暂的默认值
    ///   （如几十毫秒）。
    pub const fn after(wait: Duration) -> Self {
        Self { wait, reason: None }
    }

    /// 为建议附加原因描述。
    pub fn with_reason(mut self, reason: impl Into<Cow<'static, str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 未标注分类的错误默认不可重试。
    #[test]
    fn category_defaults_to_non_retryable() {
        let err = CoreError::new("flare.test.failed", "boom");
        assert_eq!(err.category(), ErrorCategory::NonRetryable);
        assert!(!err.is_cancelled());
    }

    /// 显式分类覆盖默认值，并在 Display 中保留错误码。
    #[test]
    fn explicit_category_and_display() {
        let err = CoreError::new("flare.test.cancelled", "stop")
            .with_category(ErrorCategory::Cancelled);
        assert!(err.is_cancelled());
        assert_eq!(alloc::format!("{err}"), "[flare.test.cancelled] stop");
    }
}
