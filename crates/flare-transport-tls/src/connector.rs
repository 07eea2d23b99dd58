use std::sync::Arc;

use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio_rustls::{TlsConnector as TokioTlsConnector, TlsStream};

use crate::{
    endpoint::TlsEndpoint,
    error,
    policy::{
        MinProtocolVersion, TlsClientOptions, resolve_tolerated_errors, select_client_identity,
    },
    util::run_with_context,
    verifier::LenientServerCertVerifier,
};
use flare_core::contract::CallContext;
use flare_transport_tcp::TcpEndpoint;

/// TLS 客户端握手入口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“策略裁决”（证书选择、容忍集合、版本映射）与“网络握手”拆成两个
///   阶段：[`prepare`](TlsConnector::prepare) 纯同步、零网络 IO，
///   [`handshake`](TlsConnector::handshake) 只做网络动作；
/// - 这样一来，歧义证书等配置错误必然发生在拨号之前——配置错误永远不会
///   产生半途而废的连接。
///
/// ## 逻辑（How）
/// 1. `prepare` 依次完成：客户端身份裁决（见
///    [`select_client_identity`]）、容忍集合解析（默认策略或自定义解析器）、
///    宽容校验器构造、协议版本映射，最终组装 `rustls::ClientConfig`；
/// 2. `handshake` 以 [`TcpEndpoint::try_into_parts`] 取得原始 `TcpStream`，
///    借助 `run_with_context` 注入取消/截止语义执行异步握手；
/// 3. 将握手结果包装为 [`TlsEndpoint`]，同时缓存协商出的协议版本与对端证书。
///
/// ## 契约（What）
/// - `prepare` 失败即配置错误（`NonRetryable`），成功后的连接器可重复用于
///   多次握手；
/// - `handshake` 要求独占的 [`TcpEndpoint`]，存在其他克隆时返回
///   `flare.transport.tls.endpoint_not_exclusive`；
/// - **前置条件**：端点已完成 TCP 建连；
/// - **后置条件**：返回的 [`TlsEndpoint`] 携带原端点的地址元数据。
///
/// ## 风险与权衡（Trade-offs）
/// - 握手流程依赖轮询式取消，取消响应存在毫秒级延迟，换取实现简单性；
/// - 连接器持有组装完毕的 `Arc<ClientConfig>`，选项在 `prepare` 之后的改动
///   不会影响既有连接器。
#[derive(Clone, Debug)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    min_protocol_version: MinProtocolVersion,
}

impl TlsConnector {
    /// 由客户端选项组装连接器。纯同步，不做任何网络 IO。
    pub fn prepare(options: &TlsClientOptions, default_host: &str) -> flare_core::Result<Self> {
        let identity = select_client_identity(options.certificate_source.as_deref())?;
        let tolerated = resolve_tolerated_errors(options);
        let verifier = LenientServerCertVerifier::new(&options.trust_roots, tolerated)?;

        let builder =
            ClientConfig::builder_with_protocol_versions(
                options.min_protocol_version.protocol_versions(),
            )
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier));
        let config = match identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.cert_chain, identity.key)
                .map_err(error::config_rejected_error)?,
            None => builder.with_no_client_auth(),
        };

        let host = options.server_name.as_deref().unwrap_or(default_host);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| error::invalid_server_name_error(host))?;

        Ok(Self {
            config: Arc::new(config),
            server_name,
            min_protocol_version: options.min_protocol_version,
        })
    }

    /// 在已建连的端点上执行 TLS 握手。
    pub async fn handshake(
        &self,
        ctx: &CallContext,
        endpoint: TcpEndpoint,
    ) -> flare_core::Result<TlsEndpoint> {
        let parts = endpoint
            .try_into_parts()
            .map_err(|_| error::exclusive_endpoint_error())?;
        let connector = TokioTlsConnector::from(self.config.clone());
        let stream = run_with_context(
            ctx,
            error::HANDSHAKE,
            connector.connect(self.server_name.clone(), parts.stream),
            error::map_handshake_error,
        )
        .await?;
        tracing::debug!(peer = %parts.peer_addr, "tls handshake complete");
        TlsEndpoint::new(TlsStream::from(stream), parts.local_addr, parts.peer_addr)
    }

    /// 返回组装时配置的最低协议版本，用于上层推导“安全连接”属性。
    pub fn min_protocol_version(&self) -> MinProtocolVersion {
        self.min_protocol_version
    }
}
