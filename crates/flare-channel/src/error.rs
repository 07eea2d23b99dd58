use flare_core::error::{CoreError, ErrorCategory};
use std::borrow::Cow;

/// 通道层错误构造模块。
///
/// 传输错误（解析/建连/握手/读写）原样来自下层实现，通道层不二次包装；
/// 这里只定义通道自身的配置与生命周期错误。

/// 入口校验失败的配置错误。
pub(crate) fn invalid_options_error(detail: &'static str) -> CoreError {
    CoreError::new(
        "flare.channel.invalid_options",
        Cow::Borrowed(detail),
    )
    .with_category(ErrorCategory::NonRetryable)
}

/// 在未建连（或已释放）的通道上发起读写时的错误。
pub(crate) fn not_connected_error(operation: &'static str) -> CoreError {
    CoreError::new(
        "flare.channel.not_connected",
        Cow::Owned(format!("channel is not connected: {operation}")),
    )
    .with_category(ErrorCategory::NonRetryable)
}

/// 建连完成前通道已被释放时的错误。
pub(crate) fn disposed_error() -> CoreError {
    CoreError::new(
        "flare.channel.disposed",
        "channel was disposed while connecting",
    )
    .with_category(ErrorCategory::NonRetryable)
}
