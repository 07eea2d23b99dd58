use core::time::Duration;

/// `MonotonicTimePoint` 以相对时间刻度表达单调时钟读数。
///
/// # 设计背景（Why）
/// - `std::time::Instant` 在 `no_std` 场景不可用。该结构提供与其等价的基本能力，
///   以满足跨平台传输实现的超时判断需求。
///
/// # 逻辑解析（How）
/// - 内部以自某一基准时刻以来的偏移量（`Duration`）表示，避免依赖壁钟时间；
/// - 提供饱和加法与饱和差值，确保在不同硬件计时分辨率下行为一致。
///
/// # 契约说明（What）
/// - **前置条件**：调用方需确保所有时间点都来自同一计时来源，避免跨源比较导致
///   语义错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicTimePoint(Duration);

impl MonotonicTimePoint {
    /// 根据基准时刻以来的偏移量构造时间点。
    pub fn from_offset(offset: Duration) -> Self {
        MonotonicTimePoint(offset)
    }

    /// 返回自基准时刻以来的时间偏移。
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// 计算两个时间点的饱和差值。
    pub fn saturating_duration_since(&self, earlier: MonotonicTimePoint) -> Duration {
        self.0
            .checked_sub(earlier.0)
            .unwrap_or_else(|| Duration::from_secs(0))
    }

    /// 基于当前时间点叠加偏移量，溢出时饱和。
    pub fn saturating_add(&self, delta: Duration) -> MonotonicTimePoint {
        MonotonicTimePoint(self.0.saturating_add(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_duration_since_never_underflows() {
        let earlier = MonotonicTimePoint::from_offset(Duration::from_secs(5));
        let later = MonotonicTimePoint::from_offset(Duration::from_secs(9));
        assert_eq!(
            later.saturating_duration_since(earlier),
            Duration::from_secs(4)
        );
        assert_eq!(
            earlier.saturating_duration_since(later),
            Duration::from_secs(0)
        );
    }
}
