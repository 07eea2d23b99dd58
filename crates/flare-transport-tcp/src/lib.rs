#![doc = r#"
# flare-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供 flare 在 Tokio 运行时上的明文 TCP 端点实现，
  封装地址解析、建连、套接字选项、读写与半关闭等底层细节。
- **架构角色**：作为传输实现层的基础积木，对接 `flare-core` 的上下文与
  错误契约，并为 `flare-transport-tls` 的握手阶段提供可拆解的原始连接。
- **设计理念**：强调“显式阶段”与“错误分类”——地址解析
  （[`resolve`]）与端点创建（[`TcpEndpoint::dial`]）是两个各自可观察的
  阶段，测试可以绕过真实解析直接注入已建连的端点
  （[`TcpEndpoint::from_parts`]）；所有网络操作均感知
  [`CallContext`](flare_core::contract::CallContext) 的取消与截止约束，
  并在失败时映射为结构化的 [`CoreError`](flare_core::error::CoreError)。

## 核心契约（What）
- **输入条件**：调用方必须在 Tokio 运行时中使用本实现，并显式传递
  `CallContext`；
- **输出保障**：解析、建连、读写、半关闭与释放均返回语义化结果，出错时
  附带稳定错误码及 [`ErrorCategory`](flare_core::error::ErrorCategory)；
- **套接字选项**：建连后无条件开启 keep-alive，并按
  [`TcpSocketOptions::no_delay`] 决定是否关闭 Nagle 合并。

## 实现策略（How）
- **执行框架**：完全依赖 Tokio 的 `TcpListener` 与 `TcpStream`，并通过
  `tokio::select!` 将取消/超时与 IO Future 组合；
- **上下文映射**：内部工具函数将 `Deadline` 转换为 Tokio 时间点，并周期性
  轮询 `Cancellation` 以响应取消；
- **释放治理**：[`TcpEndpoint::dispose`] 以同步方式尽力关闭套接字，
  “对端已关闭/句柄已失效”类错误被吞掉，其余错误照常上抛。

## 风险与考量（Trade-offs）
- **时间基准**：`Deadline` 被映射到本 crate 初始化时刻的单调时钟；若调用方
  使用不同计时源构造 `MonotonicTimePoint`，可能产生轻微漂移。
- **并发度**：当前实现通过 `tokio::sync::Mutex` 序列化读写；本层假定每个
  方向同一时刻至多一个在途操作，由上层通道保证。
"#]

mod endpoint;
mod error;
mod listener;
mod util;

pub use endpoint::{TcpEndpoint, TcpEndpointParts, TcpSocketOptions, resolve};
pub use listener::TcpListener;
