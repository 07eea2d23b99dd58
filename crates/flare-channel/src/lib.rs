#![doc = r#"
# flare-channel

## 设计动机（Why）
- **定位**：消息协议栈与网络套接字之间的双工字节流通道。协议层只关心
  “连上、读字节、写字节、断开”，本 crate 把非对称构造、TLS 策略与安全
  幂等释放三件难事收敛在一个类型背后；
- **对称表面**：主动建连（客户端）与包装已接受连接（服务端）得到同一个
  [`Channel`]，上层代码不区分角色；
- **策略先行**：TLS 的证书选择与容忍策略在任何网络 IO 之前裁决完毕，
  配置错误同步失败，绝不产生半途而废的连接。

## 核心契约（What）
- [`Channel::connect_to`] + [`Channel::connect`]：惰性建连的客户端路径；
- [`Channel::accepted`]：接受端路径，包装已建立的 [`Endpoint`]；
- [`Channel::read`] / [`Channel::write`]：读直通（不压小调用方窗口）、
  写经缓冲并在同一调用内刷出；
- [`Channel::disconnect`] / [`Channel::dispose`]：幂等释放，容忍对端先行
  拆除；
- 只读属性：远端地址、安全连接标志、对端证书。

## 实现策略（How）
- 端点层复用 `flare-transport-tcp` 与 `flare-transport-tls`；
- 角色差异收敛为 `ChannelIntent` 和类型，而非空字段推断；
- 释放由 Live → Disposing → Disposed 原子状态机守护。

## 风险与考量（Trade-offs）
- 每个方向假定同一时刻至多一个在途操作，由上层协议栈串行化自己的读写；
- `dispose` 是同步路径，不发送 TLS `close_notify`。
"#]

mod channel;
mod error;
mod options;

pub use channel::{Channel, Endpoint};
pub use options::{AcceptedChannelOptions, ChannelOptions, DEFAULT_BUFFER_SIZE};

// 通道选项直接内嵌 TLS 子选项，这里一并重导出以减少下游的依赖面。
pub use flare_transport_tls::{
    ClientCertificateSource, ClientIdentity, IgnorableCertError, MinProtocolVersion,
    TlsClientOptions, ToleratedErrorResolver,
};
