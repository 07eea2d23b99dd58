#![doc = r#"
# flare-transport-tls

## 设计动机（Why）
- **安全入口**：为 `flare-transport-tcp` 的明文端点提供 TLS 加密包装，
  客户端（主动握手）与服务端（被动握手）共用同一个加密端点类型；
- **策略先行**：客户端证书选择、容忍的证书错误类别与最低协议版本全部在
  建连准备阶段裁决完毕——配置错误在任何网络 IO 之前同步暴露；
- **可运维性**：显式的错误分类（Security / Retryable）与稳定错误码，
  加上 `ArcSwap` 驱动的服务端配置热更新。

## 核心契约（What）
- [`TlsConnector`]：由 [`TlsClientOptions`] 组装，`prepare` 零网络 IO，
  `handshake` 在独占的 `TcpEndpoint` 上完成客户端握手；
- [`TlsAcceptor`]：接受端握手入口，配置可热替换；
- [`TlsEndpoint`]：封装加密后的读写接口，暴露协商出的协议版本与对端证书；
- 证书策略：[`select_client_identity`]（0/1 候选放行、2+ 候选拒绝）、
  [`default_tolerated_errors`]（由三个布尔开关推导容忍集合，
  “已明确吊销”永不可容忍）、[`ToleratedErrorResolver`]（按实例注入的
  整体替换策略）。

## 实现策略（How）
- 使用 `rustls` + `tokio-rustls` 完成异步握手与数据加解密；
- `run_with_context` 复用 `flare-core` 的取消/截止契约，确保 TLS 层尊重
  [`CallContext`](flare_core::contract::CallContext)；
- 通过 `TcpEndpoint::try_into_parts` 拆解原始 `TcpStream`，避免重复建立
  TCP 连接。

## 风险与考量（Trade-offs）
- 握手时若 `TcpEndpoint` 被多处持有，将拒绝进入 TLS 阶段；
- 轮询式取消存在毫秒级延迟，但能在 Tokio 上保持实现简单；
- 容忍 `UntrustedRoot` 且无信任根时对端身份完全未被验证，仅保留传输加密，
  该模式只应出现在测试或封闭网络。
"#]

mod acceptor;
mod connector;
mod endpoint;
mod error;
mod policy;
mod util;
mod verifier;

pub use acceptor::TlsAcceptor;
pub use connector::TlsConnector;
pub use endpoint::TlsEndpoint;
pub use policy::{
    ClientCertificateSource, ClientIdentity, IgnorableCertError, MinProtocolVersion,
    TlsClientOptions, ToleratedErrorResolver, default_tolerated_errors, resolve_tolerated_errors,
    select_client_identity,
};
