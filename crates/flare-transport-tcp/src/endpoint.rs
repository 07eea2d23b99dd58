use crate::{
    error::{self, map_io_error},
    util::{run_with_context, to_socket_addr},
};
use flare_core::{
    contract::CallContext,
    error::CoreError,
    transport::{ByteChannel, ShutdownDirection, TransportSocketAddr},
};
use socket2::SockRef;
use std::{
    borrow::Cow,
    io,
    net::{Shutdown as StdShutdown, TcpStream as StdTcpStream},
    pin::Pin,
    sync::Arc,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream as TokioTcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex as AsyncMutex,
};

/// 连接级套接字选项。
///
/// # 契约说明（What）
/// - `no_delay`：为 `true` 时关闭 Nagle 合并，降低小包延迟；
/// - keep-alive 不在此处暴露——建连后无条件开启，属固定策略而非可选项。
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpSocketOptions {
    /// 是否关闭 Nagle 合并。
    pub no_delay: bool,
}

/// 将主机名与端口解析为结构化地址，取首个解析结果。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 地址解析是建连前独立的可观察阶段：解析失败与建连失败携带不同的稳定
///   错误码，便于排障时区分 DNS 问题与网络可达性问题；
/// - 测试可完全绕过本函数，直接以 [`TcpEndpoint::from_parts`] 注入端点。
///
/// ## 契约（What）
/// - 成功返回首个解析出的套接字地址；
/// - 主机名无法解析或无结果时返回 `flare.transport.tcp.resolve_failed`；
/// - 遵循 `ctx` 的取消与截止约束。
pub async fn resolve(
    ctx: &CallContext,
    host: &str,
    port: u16,
) -> flare_core::Result<TransportSocketAddr> {
    let mut addrs =
        run_with_context(ctx, error::RESOLVE, tokio::net::lookup_host((host, port))).await?;
    match addrs.next() {
        Some(addr) => Ok(TransportSocketAddr::from(addr)),
        None => Err(error::unresolved_error(host, port)),
    }
}

#[derive(Debug)]
struct TcpEndpointInner {
    reader: AsyncMutex<OwnedReadHalf>,
    writer: AsyncMutex<OwnedWriteHalf>,
    /// 同一套接字的复制句柄，供同步半关闭与释放路径使用。
    teardown: StdTcpStream,
    peer_addr: TransportSocketAddr,
    local_addr: TransportSocketAddr,
}

/// 明文 TCP 端点：封装单个连接的读写、半关闭与释放。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为上层通道提供对单个 TCP 连接的直接控制，同时贯彻
///   [`CallContext`] 的取消/超时语义；
/// - 建连（主动拨号）与包装（被动接受）是两条显式路径，互不隐含。
///
/// ## 逻辑 (How)
/// - 内部将流拆分为独立的读/写半部，各自以 `tokio::sync::Mutex` 守护：
///   两个方向互不加锁，读可以悬挂等待数据的同时写照常推进；
/// - 读写操作通过内部工具函数 `run_with_context` 注入取消与截止时间；
/// - 构造时复制一份套接字句柄（`socket2` 的 `try_clone`），释放与读方向
///   半关闭经由该句柄同步完成，无须争抢半部锁。
///
/// ## 契约 (What)
/// - [`dial`](TcpEndpoint::dial)：建连并应用套接字选项（keep-alive 无条件
///   开启、Nagle 按选项）；
/// - [`from_parts`](TcpEndpoint::from_parts)：包装已建连的流（接受端与测试
///   注入路径），不做任何网络 IO；
/// - `read`/`write`：执行一次 IO 操作，返回实际读写字节数；`read` 不会施加
///   小于调用方缓冲区长度的内部上限，返回 `0` 表示对端有序关闭；
/// - `shutdown`：按方向执行半关闭；
/// - [`dispose`](TcpEndpoint::dispose)：同步关闭，幂等。
///
/// ## 注意事项 (Trade-offs)
/// - 每个方向假定同一时刻至多一个在途调用，由上层通道保证；
/// - 释放经由复制句柄关闭传输方向，原始文件描述符在所有克隆与半部
///   落下后才真正归还操作系统。
#[derive(Clone, Debug)]
pub struct TcpEndpoint {
    inner: Arc<TcpEndpointInner>,
}

/// 将端点拆解为裸 `TcpStream` 与地址元数据的结果结构。
///
/// # 契约（What）
/// - `stream`：原始 Tokio `TcpStream`；
/// - `local_addr`/`peer_addr`：保留的地址元数据，使握手完成后重建的加密
///   端点仍能复用原有信息；
/// - **前置条件**：调用方已经放弃对原 [`TcpEndpoint`] 的其他克隆；
/// - **后置条件**：所有权完全转移至该结构体，由上层决定后续处理方式。
#[derive(Debug)]
pub struct TcpEndpointParts {
    pub stream: TokioTcpStream,
    pub local_addr: TransportSocketAddr,
    pub peer_addr: TransportSocketAddr,
}

impl TcpEndpoint {
    /// 包装一条已建连的流（接受端路径与测试注入路径），不做任何网络 IO。
    pub fn from_parts(
        stream: TokioTcpStream,
        local_addr: TransportSocketAddr,
        peer_addr: TransportSocketAddr,
    ) -> flare_core::Result<Self> {
        let teardown = SockRef::from(&stream)
            .try_clone()
            .map(StdTcpStream::from)
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            inner: Arc::new(TcpEndpointInner {
                reader: AsyncMutex::new(reader),
                writer: AsyncMutex::new(writer),
                teardown,
                peer_addr,
                local_addr,
            }),
        })
    }

    /// 根据上下文建立到目标地址的连接，并应用连接级套接字选项。
    pub async fn dial(
        ctx: &CallContext,
        addr: TransportSocketAddr,
        options: &TcpSocketOptions,
    ) -> flare_core::Result<Self> {
        let socket_addr = to_socket_addr(addr);
        let stream =
            run_with_context(ctx, error::CONNECT, TokioTcpStream::connect(socket_addr)).await?;
        apply_socket_options(&stream, options).map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let local = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        let peer = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        tracing::debug!(peer = %peer, no_delay = options.no_delay, "tcp endpoint dialed");
        Self::from_parts(
            stream,
            TransportSocketAddr::from(local),
            TransportSocketAddr::from(peer),
        )
    }

    /// 读取数据到缓冲区。
    pub async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> flare_core::Result<usize> {
        run_with_context(ctx, error::READ, async {
            let mut reader = self.inner.reader.lock().await;
            reader.read(buf).await
        })
        .await
    }

    /// 将整个缓冲区写入套接字。
    pub async fn write(&self, ctx: &CallContext, buf: &[u8]) -> flare_core::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len();
        run_with_context(ctx, error::WRITE, async {
            let mut writer = self.inner.writer.lock().await;
            writer.write_all(buf).await.map(|_| len)
        })
        .await
    }

    /// 刷新底层流。TCP 无用户态写缓冲，此操作等价于立即返回成功。
    pub async fn flush(&self, ctx: &CallContext) -> flare_core::Result<()> {
        run_with_context(ctx, error::WRITE, async {
            let mut writer = self.inner.writer.lock().await;
            writer.flush().await
        })
        .await
    }

    /// 根据方向执行半关闭。
    pub async fn shutdown(
        &self,
        ctx: &CallContext,
        direction: ShutdownDirection,
    ) -> flare_core::Result<()> {
        run_with_context(ctx, error::SHUTDOWN, async {
            match direction {
                ShutdownDirection::Write => {
                    let mut writer = self.inner.writer.lock().await;
                    AsyncWriteExt::shutdown(&mut *writer).await
                }
                ShutdownDirection::Read => self.inner.teardown.shutdown(StdShutdown::Read),
                ShutdownDirection::Both => {
                    let mut writer = self.inner.writer.lock().await;
                    AsyncWriteExt::shutdown(&mut *writer).await?;
                    self.inner.teardown.shutdown(StdShutdown::Read)
                }
            }
        })
        .await
    }

    /// 同步关闭端点，供释放路径使用。
    ///
    /// # 契约（What）
    /// - 幂等：重复调用不会报错——“连接已不存在”类的平台错误
    ///   （参见 [`is_defunct_io_error`]）被吞掉；
    /// - 其余关闭错误照常以 `flare.transport.tcp.dispose_failed` 上抛；
    /// - 经由复制句柄完成，不与在途读写争抢半部锁。
    pub fn dispose(&self) -> flare_core::Result<()> {
        match self.inner.teardown.shutdown(StdShutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if is_defunct_io_error(&err) => {
                tracing::trace!(error = %err, "tcp endpoint already defunct on dispose");
                Ok(())
            }
            Err(err) => Err(map_io_error(error::DISPOSE, err)),
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

    /// 将端点尝试拆解为 [`TcpEndpointParts`]。
    ///
    /// # 教案级注释
    ///
    /// ## 意图（Why）
    /// - TLS 握手阶段需要直接操作底层 `TcpStream`，通过本方法可在保持连接
    ///   连续性的同时交由上层协议驱动；
    /// - 若拆解失败（例如端点已被克隆），返回原始端点，调用方可决定降级或
    ///   延后握手，避免出现“半拆解”导致的资源泄露。
    ///
    /// ## 契约（What）
    /// - 返回 `Ok(parts)` 表示拆解成功，原端点不再可用；
    /// - 返回 `Err(self)` 表示仍有其他持有者；
    /// - **前置条件**：调用方必须确保没有未完成的读写操作。
    pub fn try_into_parts(self) -> Result<TcpEndpointParts, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let reader = inner.reader.into_inner();
                let writer = inner.writer.into_inner();
                let stream = match reader.reunite(writer) {
                    Ok(stream) => stream,
                    // 两个半部来自同一次拆分，重组必然成功。
                    Err(_) => unreachable!("tcp halves originate from the same stream"),
                };
                Ok(TcpEndpointParts {
                    stream,
                    local_addr: inner.local_addr,
                    peer_addr: inner.peer_addr,
                })
            }
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl ByteChannel for TcpEndpoint {
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
            "tcp:{}->{}",
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
        Box::pin(async move { TcpEndpoint::read(self, ctx, buf).await })
    }

    fn write<'ctx>(&'ctx self, ctx: &'ctx CallContext, buf: &'ctx [u8]) -> Self::WriteFuture<'ctx> {
        Box::pin(async move { TcpEndpoint::write(self, ctx, buf).await })
    }

    fn flush<'ctx>(&'ctx self, ctx: &'ctx CallContext) -> Self::FlushFuture<'ctx> {
        Box::pin(async move { TcpEndpoint::flush(self, ctx).await })
    }

    fn shutdown<'ctx>(
        &'ctx self,
        ctx: &'ctx CallContext,
        direction: ShutdownDirection,
    ) -> Self::ShutdownFuture<'ctx> {
        Box::pin(async move { TcpEndpoint::shutdown(self, ctx, direction).await })
    }
}

fn apply_socket_options(stream: &TokioTcpStream, options: &TcpSocketOptions) -> io::Result<()> {
    stream.set_nodelay(options.no_delay)?;
    let sock = SockRef::from(stream);
    sock.set_keepalive(true)
}

/// 判断一个 IO 错误是否表示“资源已经不存在”。
///
/// 释放路径需要容忍对端先行关闭或重复关闭产生的平台错误，这类错误不代表
/// 真实故障，不应上抛。
fn is_defunct_io_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
