use alloc::format;
use alloc::string::ToString;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use core::{fmt, time::Duration};

use crate::time::MonotonicTimePoint;

/// 取消原语，统一表达跨模块的可中断性契约。
///
/// # 设计背景（Why）
/// - 所有可能长时间悬挂的传输操作（建连、握手、读写）都必须能被外部主动打断，
///   以避免雪崩扩散或无意义的资源占用。
/// - 传统 Future/任务取消机制在 `no_std` 环境下缺乏统一接口，因此通过轻量的
///   原子位提供最小可行解。
///
/// # 逻辑解析（How）
/// - 内部使用 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 支持多方共享；
/// - `cancel` 在首次成功设置取消位时返回 `true`，后续重复调用返回 `false`，
///   提示调用方避免重复执行业务兜底；
/// - `child` 生成共享同一原子位的派生实例，便于在不同子系统传播取消信号。
///
/// # 契约说明（What）
/// - **前置条件**：构造时无需额外参数，默认处于“未取消”状态；
/// - **后置条件**：一旦 `cancel` 成功，`is_cancelled` 必须全局可见，由该令牌
///   派生出的上下文所驱动的操作应尽快终止。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未提供回调注册接口，调用者需在关键热路径自行检查 `is_cancelled`；
///   框架不会强制终止正在执行的 Future。
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                flag: AtomicBool::new(false),
            }),
        }
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 将当前令牌标记为取消。
    ///
    /// 返回值为 `true` 表示本次调用首次触发取消；返回 `false` 表示之前已被取消。
    pub fn cancel(&self) -> bool {
        self.inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌，用于跨模块传播取消语义。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// 截止原语，统一描述操作的最迟完成时间。
///
/// # 设计背景（Why）
/// - 通道内部不实施任何超时策略；超时语义完全由调用方通过 `Deadline` 注入，
///   实现“无内置定时器、调用方全权决定”的约定。
///
/// # 契约说明（What）
/// - `Deadline` 可以为空（未设置），此时代表调用方未施加硬超时限制；
/// - `with_timeout` 以当前时间点和持续时间生成新的截止点，调用方需确保 `now`
///   来自同一计时源；
/// - `is_expired` 基于调用时提供的当前时间判断是否超时，避免依赖壁钟。
///
/// # 风险提示（Trade-offs）
/// - 截止时间不会自动驱动取消，传输实现需在悬挂点显式比较并返回超时错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    instant: Option<MonotonicTimePoint>,
}

impl Deadline {
    /// 创建未设置截止时间的实例。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 根据绝对时间点构造截止时间。
    pub fn at(instant: MonotonicTimePoint) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 基于当前时间点加持续时间生成截止时间。
    pub fn with_timeout(now: MonotonicTimePoint, timeout: Duration) -> Self {
        Self::at(now.saturating_add(timeout))
    }

    /// 返回内部时间点，便于与自定义调度器协作。
    pub fn instant(&self) -> Option<MonotonicTimePoint> {
        self.instant
    }

    /// 判断是否已经超时。
    pub fn is_expired(&self, now: MonotonicTimePoint) -> bool {
        match self.instant {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::none()
    }
}

#[derive(Debug)]
struct CallContextInner {
    cancellation: Cancellation,
    deadline: Deadline,
}

/// 调用上下文，在通道 API 之间传递“取消 + 截止”二元组。
///
/// # 设计背景（Why）
/// - 建连、握手、读、写与刷新都是悬挂点，必须统一感知外部中断与最迟完成时间；
///   将二者收敛进一个按 [`Arc`] 共享的上下文，避免每个接口各自约定参数。
///
/// # 契约说明（What）
/// - `cancellation`：通过 [`CallContext::cancellation`] 获取，传输实现在悬挂点
///   需及时响应取消标记；
/// - `deadline`：使用 [`CallContext::deadline`] 查询绝对超时点，可结合
///   [`MonotonicTimePoint`] 判断是否过期。
///
/// # 风险提示（Trade-offs）
/// - `CallContext` 通过 [`Arc`] 共享，克隆成本为常数，但仍需避免在热路径上
///   不必要的 clone；
/// - 未内置自动取消逻辑，调用方需在超时后主动触发取消以避免资源泄漏。
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<CallContextInner>,
}

impl CallContext {
    /// 创建上下文构建器。
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    /// 获取取消原语。
    pub fn cancellation(&self) -> &Cancellation {
        &self.inner.cancellation
    }

    /// 查询截止时间。
    pub fn deadline(&self) -> Deadline {
        self.inner.deadline
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deadline = match self.deadline().instant() {
            Some(instant) => format!("{:?}", instant.as_duration()),
            None => "none".to_string(),
        };
        write!(
            f,
            "CallContext{{cancelled={}, deadline={}}}",
            self.cancellation().is_cancelled(),
            deadline
        )
    }
}

/// `CallContext` 构建器，确保在创建时完成参数组装。
pub struct CallContextBuilder {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl Default for CallContextBuilder {
    fn default() -> Self {
        Self {
            cancellation: Cancellation::new(),
            deadline: Deadline::none(),
        }
    }
}

impl CallContextBuilder {
    /// 设置取消原语。
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// 设置截止时间。
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// 构建上下文。
    pub fn build(self) -> CallContext {
        CallContext {
            inner: Arc::new(CallContextInner {
                cancellation: self.cancellation,
                deadline: self.deadline,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `cancel` 仅在首次调用时返回 `true`，派生令牌共享同一原子位。
    #[test]
    fn cancellation_fires_once_and_propagates_to_children() {
        let token = Cancellation::new();
        let child = token.child();
        assert!(!child.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(child.is_cancelled());
    }

    /// 未设置截止时间的上下文永不过期；设置后按单调时间判定。
    #[test]
    fn deadline_expiry_follows_monotonic_clock() {
        let now = MonotonicTimePoint::from_offset(Duration::from_secs(1));
        assert!(!Deadline::none().is_expired(now));

        let deadline = Deadline::with_timeout(now, Duration::from_secs(2));
        assert!(!deadline.is_expired(now.saturating_add(Duration::from_secs(1))));
        assert!(deadline.is_expired(now.saturating_add(Duration::from_secs(2))));
    }

    /// 默认构建的上下文应当“未取消、无截止”。
    #[test]
    fn default_context_is_open_ended() {
        let ctx = CallContext::builder().build();
        assert!(!ctx.cancellation().is_cancelled());
        assert_eq!(ctx.deadline(), Deadline::none());
    }
}
