use std::sync::Arc;

use arc_swap::ArcSwap;
use rustls::ServerConfig;
use tokio_rustls::{TlsAcceptor as TokioTlsAcceptor, TlsStream};

use crate::{endpoint::TlsEndpoint, error, util::run_with_context};
use flare_core::contract::CallContext;
use flare_transport_tcp::TcpEndpoint;

/// TLS 服务端握手入口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 在 TCP 层接受连接后执行 TLS 握手并生成 [`TlsEndpoint`]，供接受端构造
///   通道；
/// - 通过 [`ArcSwap`] 支持热更新 [`ServerConfig`]，满足证书轮换与策略切换
///   需求，更新期间监听循环无需暂停。
///
/// ## 逻辑（How）
/// 1. 调用 [`TcpEndpoint::try_into_parts`] 获取原始 `TcpStream` 与地址信息；
/// 2. 读取当前配置快照并构造 `tokio_rustls::TlsAcceptor`；
/// 3. 借助 `run_with_context` 注入取消/截止语义，执行异步握手；
/// 4. 将握手结果包装为 [`TlsEndpoint`]，对端出示的客户端证书随之缓存。
///
/// ## 契约（What）
/// - `accept`：成功时返回可用的 [`TlsEndpoint`]；若上下文取消或握手失败，
///   返回结构化 `CoreError`；
/// - `replace_config`：原子替换 TLS 配置，仅影响后续握手；
/// - `config_snapshot`：获取当前配置的 `Arc` 副本，方便上层调试。
///
/// ## 风险与权衡（Trade-offs）
/// - 当调用方持有 `TcpEndpoint` 的多个克隆时无法拆解原始套接字，返回
///   `endpoint_not_exclusive` 错误；
/// - 调用方需保证新配置中的证书链/密钥有效，否则后续握手将以安全类错误
///   失败。
#[derive(Clone, Debug)]
pub struct TlsAcceptor {
    config: Arc<ArcSwap<ServerConfig>>,
}

impl TlsAcceptor {
    /// 使用初始配置创建握手器。
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config: Arc::new(ArcSwap::new(config)),
        }
    }

    /// 替换当前 TLS 配置，通常用于证书热更新。
    pub fn replace_config(&self, config: Arc<ServerConfig>) {
        self.config.store(config);
    }

    /// 获取当前配置的快照。
    pub fn config_snapshot(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    /// 对单个已接受的 TCP 连接执行 TLS 握手。
    pub async fn accept(
        &self,
        ctx: &CallContext,
        endpoint: TcpEndpoint,
    ) -> flare_core::Result<TlsEndpoint> {
        let parts = endpoint
            .try_into_parts()
            .map_err(|_| error::exclusive_endpoint_error())?;
        let acceptor = TokioTlsAcceptor::from(self.config.load_full());
        let stream = run_with_context(
            ctx,
            error::HANDSHAKE,
            acceptor.accept(parts.stream),
            error::map_handshake_error,
        )
        .await?;
        tracing::debug!(peer = %parts.peer_addr, "tls accept handshake complete");
        TlsEndpoint::new(TlsStream::from(stream), parts.local_addr, parts.peer_addr)
    }
}
