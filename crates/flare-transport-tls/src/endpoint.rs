use std::{
    borrow::Cow,
    io,
    net::{Shutdown as StdShutdown, TcpStream as StdTcpStream},
    pin::Pin,
    sync::Arc,
};

use rustls::ProtocolVersion;
use rustls_pki_types::CertificateDer;
use socket2::SockRef;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream as TokioTcpStream,
    sync::Mutex as AsyncMutex,
};
use tokio_rustls::TlsStream;

use crate::{
    error::{self, map_io_dispose_error},
    util::run_with_context,
};
use flare_core::{
    contract::CallContext,
    error::CoreError,
    transport::{ByteChannel, ShutdownDirection, TransportSocketAddr},
};

#[derive(Debug)]
struct TlsEndpointInner {
    reader: AsyncMutex<ReadHalf<TlsStream<TokioTcpStream>>>,
    writer: AsyncMutex<WriteHalf<TlsStream<TokioTcpStream>>>,
    /// 底层套接字的复制句柄，供同步释放路径使用。
    teardown: StdTcpStream,
    local_addr: TransportSocketAddr,
    peer_addr: TransportSocketAddr,
    protocol_version: Option<ProtocolVersion>,
    peer_identity: Option<CertificateDer<'static>>,
}

/// 加密端点：封装握手完成后的 TLS 读写能力。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为上层通道提供与明文 [`TcpEndpoint`](flare_transport_tcp::TcpEndpoint)
///   同构的读写 API，内部通过 `rustls` 完成加解密；
/// - 暴露协商出的协议版本与对端证书，供“安全连接”属性推导与对端身份检查。
///
/// ## 逻辑（How）
/// - 以 `tokio::io::split` 将加密流拆为读/写半部，各自以 `tokio::sync::Mutex`
///   守护：读悬挂等待密文时写方向照常推进；
/// - 所有 I/O 方法调用 `run_with_context` 注入取消/截止语义，并使用
///   `error::map_stream_error` 将底层错误映射为结构化 `CoreError`；
/// - 构造时读取连接内部的协议版本与对端证书链首证书，并复制一份底层套接字
///   句柄用于同步释放，此后均不再变化。
///
/// ## 契约（What）
/// - `read`/`write`：单次加密读写操作，遵循 [`CallContext`] 的取消与截止
///   约束；`read` 返回 `0` 表示对端有序关闭；
/// - `flush`：确保待发送的密文全部写出；
/// - `shutdown`：发送 TLS `close_notify` 并刷新缓冲区；
/// - `protocol_version`/`peer_identity`：握手时固定的元数据；
/// - [`dispose`](TlsEndpoint::dispose)：同步关闭底层套接字，幂等。
///
/// ## 风险与权衡（Trade-offs）
/// - `write` 仅保证将全部明文写入 TLS 会话，如需确认落网请结合 `flush`；
/// - `dispose` 跳过 `close_notify`（同步路径无法驱动 TLS 状态机），对端会
///   观察到传输层关闭而非协议级告别。
#[derive(Clone, Debug)]
pub struct TlsEndpoint {
    inner: Arc<TlsEndpointInner>,
}

impl TlsEndpoint {
    pub(crate) fn new(
        stream: TlsStream<TokioTcpStream>,
        local_addr: TransportSocketAddr,
        peer_addr: TransportSocketAddr,
    ) -> flare_core::Result<Self> {
        let (tcp, connection) = stream.get_ref();
        let protocol_version = connection.protocol_version();
        let peer_identity = connection
            .peer_certificates()
            .and_then(|certs| certs.first().cloned());
        let teardown = SockRef::from(tcp)
            .try_clone()
            .map(StdTcpStream::from)
            .map_err(|err| error::map_stream_error(error::HANDSHAKE, err))?;

        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            inner: Arc::new(TlsEndpointInner {
                reader: AsyncMutex::new(reader),
                writer: AsyncMutex::new(writer),
                teardown,
                local_addr,
                peer_addr,
                protocol_version,
                peer_identity,
            }),
        })
    }

    /// 读取解密后的明文数据。
    pub async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> flare_core::Result<usize> {
        run_with_context(
            ctx,
            error::READ,
            async {
                let mut reader = self.inner.reader.lock().await;
                reader.read(buf).await
            },
            error::map_stream_error,
        )
        .await
    }

    /// 写入明文数据并由 TLS 层加密。
    pub async fn write(&self, ctx: &CallContext, buf: &[u8]) -> flare_core::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len();
        run_with_context(
            ctx,
            error::WRITE,
            async {
                let mut writer = self.inner.writer.lock().await;
                writer.write_all(buf).await.map(|_| len)
            },
            error::map_stream_error,
        )
        .await
    }

    /// 刷新 TLS 会话缓冲区，确保待发送的密文全部写出。
    pub async fn flush(&self, ctx: &CallContext) -> flare_core::Result<()> {
        run_with_context(
            ctx,
            error::FLUSH,
            async {
                let mut writer = self.inner.writer.lock().await;
                writer.flush().await
            },
            error::map_stream_error,
        )
        .await
    }

    /// 发送 TLS `close_notify` 并关闭写方向。
    pub async fn shutdown(&self, ctx: &CallContext) -> flare_core::Result<()> {
        run_with_context(
            ctx,
            error::SHUTDOWN,
            async {
                let mut writer = self.inner.writer.lock().await;
                AsyncWriteExt::shutdown(&mut *writer).await
            },
            error::map_stream_error,
        )
        .await
    }

    /// 同步关闭底层套接字，供释放路径使用。
    ///
    /// 幂等：对端先行关闭或重复关闭产生的平台错误被吞掉，其余错误照常上抛。
    pub fn dispose(&self) -> flare_core::Result<()> {
        match self.inner.teardown.shutdown(StdShutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if is_defunct_io_error(&err) => {
                tracing::trace!(error = %err, "tls endpoint already defunct on dispose");
                Ok(())
            }
            Err(err) => Err(map_io_dispose_error(err)),
        }
    }

    /// 获取对端地址。
    pub fn peer_addr(&self) -> TransportSocketAddr {
        self.inner.peer_addr
    }

    /// 获取本地地址。
    pub fn local_addr(&self) -> TransportSocketAddr {
        self.inner.local_addr
    }

    /// 返回协商出的 TLS 协议版本（握手完成后固定）。
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.inner.protocol_version
    }

    /// 返回对端在握手中出示的证书（链首证书，若有）。
    pub fn peer_identity(&self) -> Option<&CertificateDer<'static>> {
        self.inner.peer_identity.as_ref()
    }
}

impl ByteChannel for TlsEndpoint {
    type Error = CoreError;

    type ReadFuture<'ctx>
        = Pin<Box<dyn core::future::Future<Output = flare_core::Result<usize>> + Send + 'ctx>>
    where
        Self: 'ctx;

    type WriteFuture<'ctx>
        = Pin<Box<dyn core::future::Future<Output = flare_core::Result<usize>> + Send + 'ctx>>
    where
        Self: 'ctx;

    type FlushFuture<'ctx>
        = Pin<Box<dyn core::future::Future<Output = flare_core::Result<()>> + Send + 'ctx>>
    where
        Self: 'ctx;

    type ShutdownFuture<'ctx>
        = Pin<Box<dyn core::future::Future<Output = flare_core::Result<()>> + Send + 'ctx>>
    where
        Self: 'ctx;

    fn id(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "tls:{}->{}",
            self.inner.local_addr, self.inner.peer_addr
        ))
    }

    fn peer_addr(&self) -> Option<TransportSocketAddr> {
        Some(self.inner.peer_addr)
    }

    fn local_addr(&self) -> Option<TransportSocketAddr> {
        Some(self.inner.local_addr)
    }

    fn read<'ctx>(
        &'ctx self,
        ctx: &'ctx CallContext,
        buf: &'ctx mut [u8],
    ) -> Self::ReadFuture<'ctx> {
        Box::pin(async move { TlsEndpoint::read(self, ctx, buf).await })
    }

    fn write<'ctx>(&'ctx self, ctx: &'ctx CallContext, buf: &'ctx [u8]) -> Self::WriteFuture<'ctx> {
        Box::pin(async move { TlsEndpoint::write(self, ctx, buf).await })
    }

    fn flush<'ctx>(&'ctx self, ctx: &'ctx CallContext) -> Self::FlushFuture<'ctx> {
        Box::pin(async move { TlsEndpoint::flush(self, ctx).await })
    }

    fn shutdown<'ctx>(
        &'ctx self,
        ctx: &'ctx CallContext,
        direction: ShutdownDirection,
    ) -> Self::ShutdownFuture<'ctx> {
        Box::pin(async move {
            match direction {
                ShutdownDirection::Write | ShutdownDirection::Both => self.shutdown(ctx).await,
                ShutdownDirection::Read => Ok(()),
            }
        })
    }
}

fn is_defunct_io_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
