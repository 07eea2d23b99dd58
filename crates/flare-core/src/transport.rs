use alloc::borrow::Cow;
use alloc::{format, string::String, vec::Vec};
use core::fmt;
use core::future::Future;
#[cfg(feature = "std")]
use core::net::Ipv6Addr;

use crate::contract::CallContext;

/// `TransportSocketAddr` 在 `no_std` 场景下提供统一的 Socket 地址表达。
///
/// # 设计初衷（Why）
/// - 避免契约层绑定到 `std::net::SocketAddr`，以便运行在受限环境；
/// - 预留未来扩展空间，通过 `#[non_exhaustive]` 枚举让实验性变体按需添加。
///
/// # 契约定义（What）
/// - `V4`/`V6` 分别存储 IPv4 与 IPv6 原始字节；端口号使用 `u16`；
/// - `Display` 输出 `ip:port` 形式的人类可读格式，可直接用作通道的
///   “远端地址”属性；
/// - **后置条件**：格式化输出稳定，可用于日志聚合或指标标签。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未对 IPv6 进行零压缩优化，优先保证直观可读；
/// - 暂未内建 Unix Domain Socket 支持，避免在 `no_std` 环境引入额外依赖。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum TransportSocketAddr {
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 { addr: [u16; 8], port: u16 },
}

impl TransportSocketAddr {
    /// 返回端口号。
    pub fn port(&self) -> u16 {
        match self {
            Self::V4 { port, .. } | Self::V6 { port, .. } => *port,
        }
    }

    /// 将 IPv6 地址从 8 段转换为 `Ipv6Addr`，便于上层需要时与标准库交互。
    #[cfg(feature = "std")]
    pub fn as_ipv6_addr(&self) -> Option<Ipv6Addr> {
        match self {
            Self::V6 { addr, .. } => Some(Ipv6Addr::from(*addr)),
            _ => None,
        }
    }
}

impl fmt::Display for TransportSocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSocketAddr::V4 { addr, port } => {
                write!(
                    f,
                    "{}.{}.{}.{}:{}",
                    addr[0], addr[1], addr[2], addr[3], port
                )
            }
            TransportSocketAddr::V6 { addr, port } => {
                let segments: Vec<String> = addr
                    .iter()
                    .map(|segment| format!("{:x}", segment))
                    .collect();
                write!(f, "[{}]:{}", segments.join(":"), port)
            }
        }
    }
}

#[cfg(feature = "std")]
impl From<std::net::SocketAddr> for TransportSocketAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        match addr {
            std::net::SocketAddr::V4(v4) => Self::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            std::net::SocketAddr::V6(v6) => Self::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
            },
        }
    }
}

/// 表示半关闭的方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownDirection {
    /// 关闭写半部。
    Write,
    /// 关闭读半部。
    Read,
    /// 同时关闭读写半部。
    Both,
}

/// 字节通道能力接口：明文与加密端点共享的读写/刷新/半关闭契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 上层通道需要在不感知“明文 TCP 还是 TLS”这一实现细节的情况下驱动读写，
///   因此将两类端点的公共能力面收敛为一个 Trait；
/// - 采用 GAT Future 而非装箱 `async_trait`，把是否装箱的决定权留给实现层，
///   契约层不绑定具体运行时。
///
/// ## 契约（What）
/// - `read`：单次读取，返回实际读取的字节数；`0` 表示对端有序关闭；
///   实现不得施加小于调用方缓冲区长度的内部窗口上限；
/// - `write`：单次写入，返回实际写入的字节数；
/// - `flush`：确保已缓冲数据全部写出；
/// - `shutdown`：按方向执行半关闭；
/// - `peer_addr`/`local_addr`：结构化地址元数据；`id`：人类可读的通道标识。
///
/// ## 风险与注意（Trade-offs）
/// - 所有方法接收 `&self`，实现层需自行保证互斥；本契约假定每个方向同一时刻
///   至多一个在途操作；
/// - 取消与截止通过 [`CallContext`] 注入，实现必须在悬挂点尊重二者。
pub trait ByteChannel: Send + Sync {
    /// 错误类型。
    type Error;

    /// `read` 返回的 Future。
    type ReadFuture<'ctx>: Future<Output = crate::Result<usize, Self::Error>> + Send + 'ctx
    where
        Self: 'ctx;

    /// `write` 返回的 Future。
    type WriteFuture<'ctx>: Future<Output = crate::Result<usize, Self::Error>> + Send + 'ctx
    where
        Self: 'ctx;

    /// `flush` 返回的 Future。
    type FlushFuture<'ctx>: Future<Output = crate::Result<(), Self::Error>> + Send + 'ctx
    where
        Self: 'ctx;

    /// `shutdown` 返回的 Future。
    type ShutdownFuture<'ctx>: Future<Output = crate::Result<(), Self::Error>> + Send + 'ctx
    where
        Self: 'ctx;

    /// 人类可读的通道标识，用于日志关联。
    fn id(&self) -> Cow<'_, str>;

    /// 获取对端地址（若可用）。
    fn peer_addr(&self) -> Option<TransportSocketAddr>;

    /// 获取本地地址（若可用）。
    fn local_addr(&self) -> Option<TransportSocketAddr>;

    /// 读取数据到缓冲区。
    fn read<'ctx>(
        &'ctx self,
        ctx: &'ctx CallContext,
        buf: &'ctx mut [u8],
    ) -> Self::ReadFuture<'ctx>;

    /// 写入缓冲区数据。
    fn write<'ctx>(&'ctx self, ctx: &'ctx CallContext, buf: &'ctx [u8]) -> Self::WriteFuture<'ctx>;

    /// 刷新底层缓冲。
    fn flush<'ctx>(&'ctx self, ctx: &'ctx CallContext) -> Self::FlushFuture<'ctx>;

    /// 按方向执行半关闭。
    fn shutdown<'ctx>(
        &'ctx self,
        ctx: &'ctx CallContext,
        direction: ShutdownDirection,
    ) -> Self::ShutdownFuture<'ctx>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn socket_addr_display_is_stable() {
        let v4 = TransportSocketAddr::V4 {
            addr: [127, 0, 0, 1],
            port: 5060,
        };
        assert_eq!(v4.to_string(), "127.0.0.1:5060");
        assert_eq!(v4.port(), 5060);

        let v6 = TransportSocketAddr::V6 {
            addr: [0, 0, 0, 0, 0, 0, 0, 1],
            port: 443,
        };
        assert_eq!(v6.to_string(), "[0:0:0:0:0:0:0:1]:443");
    }
}
