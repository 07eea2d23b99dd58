#![doc = r#"
# flare-core

## 设计动机（Why）
- **定位**：该 crate 是 flare 传输通道族的契约层，集中定义取消/截止上下文、
  结构化错误域、地址表示与字节通道能力接口，供 TCP/TLS 实现层与上层通道复用。
- **架构角色**：所有传输实现（`flare-transport-tcp`、`flare-transport-tls`）
  与统一通道（`flare-channel`）都以本 crate 的契约为唯一事实来源，避免各实现
  自行约定语义导致漂移。
- **设计理念**：强调“上下文传递”与“错误分类”——所有可能悬挂的操作都显式
  接收 [`CallContext`](contract::CallContext)，失败时映射为携带稳定错误码的
  [`CoreError`](error::CoreError)。

## 核心契约（What）
- [`Cancellation`](contract::Cancellation)/[`Deadline`](contract::Deadline)：
  可中断性与最迟完成时间的最小原语；
- [`CoreError`](error::CoreError) 与 [`ErrorCategory`](error::ErrorCategory)：
  稳定错误码加结构化分类，驱动调用方的自动化容错决策；
- [`TransportSocketAddr`](transport::TransportSocketAddr)：`no_std` 友好的
  套接字地址表达；
- [`ByteChannel`](transport::ByteChannel)：明文与加密端点共享的读写/刷新/
  半关闭能力面。

## 实现策略（How）
- 契约层保持 `no_std + alloc`，默认启用 `std` Feature；时间原语以单调偏移
  （[`MonotonicTimePoint`](time::MonotonicTimePoint)）表达，不依赖壁钟；
- 能力接口采用 GAT Future，避免在契约层绑定具体运行时。

## 风险与考量（Trade-offs）
- 取消原语不内置回调通知，调用方需在悬挂点轮询或借助运行时组合；
- 错误分类为 `#[non_exhaustive]`，未来扩展分支时调用方的 `match` 需保留
  兜底分支。
"#]
#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod contract;
pub mod error;
pub mod prelude;
pub mod security;
pub mod time;
pub mod transport;

pub use contract::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use error::{CoreError, ErrorCategory, RetryAdvice};
pub use security::SecurityClass;
pub use time::MonotonicTimePoint;
pub use transport::{ByteChannel, ShutdownDirection, TransportSocketAddr};

/// 框架统一的结果别名，错误默认收敛到 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;
