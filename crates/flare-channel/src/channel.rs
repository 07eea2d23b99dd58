use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::BytesMut;
use rustls_pki_types::CertificateDer;
use tokio::sync::Mutex as AsyncMutex;

use flare_core::contract::CallContext;
use flare_core::transport::TransportSocketAddr;
use flare_transport_tcp::{TcpEndpoint, TcpSocketOptions, resolve};
use flare_transport_tls::{TlsConnector, TlsEndpoint};

use crate::error;
use crate::options::{AcceptedChannelOptions, ChannelOptions};

/// 通道底下的连接资源：明文或加密端点二选一。
///
/// # 契约说明（What）
/// - 两个变体共享同构的读写/刷新/释放能力面，上层通过本枚举统一驱动；
/// - [`Endpoint::Tls`] 额外携带协商元数据（协议版本、对端证书）。
#[derive(Clone, Debug)]
pub enum Endpoint {
    /// 明文 TCP 端点。
    Plain(TcpEndpoint),
    /// 完成握手的 TLS 端点。
    Tls(Box<TlsEndpoint>),
}

impl Endpoint {
    async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> flare_core::Result<usize> {
        match self {
            Endpoint::Plain(endpoint) => endpoint.read(ctx, buf).await,
            Endpoint::Tls(endpoint) => endpoint.read(ctx, buf).await,
        }
    }

    async fn write(&self, ctx: &CallContext, buf: &[u8]) -> flare_core::Result<usize> {
        match self {
            Endpoint::Plain(endpoint) => endpoint.write(ctx, buf).await,
            Endpoint::Tls(endpoint) => endpoint.write(ctx, buf).await,
        }
    }

    async fn flush(&self, ctx: &CallContext) -> flare_core::Result<()> {
        match self {
            Endpoint::Plain(endpoint) => endpoint.flush(ctx).await,
            Endpoint::Tls(endpoint) => endpoint.flush(ctx).await,
        }
    }

    fn dispose(&self) -> flare_core::Result<()> {
        match self {
            Endpoint::Plain(endpoint) => endpoint.dispose(),
            Endpoint::Tls(endpoint) => endpoint.dispose(),
        }
    }

    fn peer_addr(&self) -> TransportSocketAddr {
        match self {
            Endpoint::Plain(endpoint) => endpoint.peer_addr(),
            Endpoint::Tls(endpoint) => endpoint.peer_addr(),
        }
    }

    fn peer_identity(&self) -> Option<&CertificateDer<'static>> {
        match self {
            Endpoint::Plain(_) => None,
            Endpoint::Tls(endpoint) => endpoint.peer_identity(),
        }
    }
}

impl From<TcpEndpoint> for Endpoint {
    fn from(endpoint: TcpEndpoint) -> Self {
        Endpoint::Plain(endpoint)
    }
}

impl From<TlsEndpoint> for Endpoint {
    fn from(endpoint: TlsEndpoint) -> Self {
        Endpoint::Tls(Box::new(endpoint))
    }
}

/// 读视图：对端点读半部的裸委托。
///
/// 读取不经过任何中间缓冲，调用方给多大的缓冲区就允许单次读多少字节——
/// 人为压小读取窗口会让上层在“等待永远不会一次性到达的字节数”上无谓悬挂。
#[derive(Debug)]
struct ReadStream {
    endpoint: Endpoint,
}

impl ReadStream {
    async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> flare_core::Result<usize> {
        self.endpoint.read(ctx, buf).await
    }
}

/// 写视图：带容量预留的缓冲写，每次调用都刷出。
#[derive(Debug)]
struct WriteStream {
    endpoint: Endpoint,
    buffer: AsyncMutex<BytesMut>,
}

impl WriteStream {
    fn new(endpoint: Endpoint, capacity: usize) -> Self {
        Self {
            endpoint,
            buffer: AsyncMutex::new(BytesMut::with_capacity(capacity)),
        }
    }

    async fn write(
        &self,
        ctx: &CallContext,
        bytes: &[u8],
        _end_of_packet: bool,
    ) -> flare_core::Result<()> {
        let mut buffer = self.buffer.lock().await;
        buffer.extend_from_slice(bytes);
        let pending = buffer.split();
        self.endpoint.write(ctx, &pending).await?;
        self.endpoint.flush(ctx).await
    }
}

#[derive(Debug)]
enum ChannelIntent {
    /// 客户端意图：尚未建连，选项待 `connect` 消费。
    Pending { options: ChannelOptions },
    /// 已就绪：端点与流视图均已安装。
    Established,
}

const LIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

/// 双工字节流通道：消息协议栈与网络套接字之间的传输抽象。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 客户端（主动拨号）与接受端（包装已建立的连接）通过两条显式构造路径
///   获得完全一致的读写/释放表面——角色差异收敛在 `ChannelIntent` 这个
///   和类型里，而不是靠字段是否为空来推断；
/// - 三个独立关注点在此汇合：非对称构造、TLS 策略（版本/客户端证书/容忍
///   集合）、以及对已被底层栈部分拆除的资源做安全幂等的释放。
///
/// ## 逻辑（How）
/// - [`connect_to`](Channel::connect_to) 只校验并保存选项，不打开任何资源
///   （惰性建连）；[`connect`](Channel::connect) 按“TLS 策略裁决 → 地址
///   解析 → 拨号 → （可选）握手 → 安装视图”的顺序推进，策略类配置错误
///   因此必然先于任何网络 IO 暴露；
/// - [`accepted`](Channel::accepted) 包装已建立的端点：推导安全属性与远端
///   地址、创建流视图，全程不做网络 IO；
/// - 释放由 Live → Disposing → Disposed 的原子状态机守护：重复或并发的
///   释放尝试在状态机层面被结构化拒绝，而不是靠捕获平台特定的“已释放”
///   信号；读视图、写视图与端点各自独立释放，字段只在各自的释放尝试完成
///   之后置空。
///
/// ## 契约（What）
/// - 读写视图存在 ⇔ 端点已安装；`is_secure_connection` 只会在握手完成后
///   为真（协商版本不低于配置下限）；
/// - 本通道假定每个方向同一时刻至多一个在途操作；读与写两个方向彼此独立，
///   可以并发推进；
/// - 释放后的通道不可复用，后续读写返回 `flare.channel.not_connected`。
///
/// ## 风险与权衡（Trade-offs）
/// - `dispose` 是同步路径，TLS 的 `close_notify` 不会在此发出；需要协议级
///   告别的调用方应在 `dispose` 之前自行安排；
/// - 建连中途取消时端点可能处于部分建立状态，调用方随后必须 `dispose`。
#[derive(Debug)]
pub struct Channel {
    intent: StdMutex<ChannelIntent>,
    endpoint: StdMutex<Option<Endpoint>>,
    read_stream: StdMutex<Option<Arc<ReadStream>>>,
    write_stream: StdMutex<Option<Arc<WriteStream>>>,
    remote_address: StdMutex<Option<String>>,
    peer_identity: StdMutex<Option<CertificateDer<'static>>>,
    is_secure: AtomicBool,
    dispose_state: AtomicU8,
}

impl Channel {
    /// 客户端构造：校验并保存选项，不打开任何资源。
    pub fn connect_to(options: ChannelOptions) -> flare_core::Result<Self> {
        options.validate()?;
        Ok(Self {
            intent: StdMutex::new(ChannelIntent::Pending { options }),
            endpoint: StdMutex::new(None),
            read_stream: StdMutex::new(None),
            write_stream: StdMutex::new(None),
            remote_address: StdMutex::new(None),
            peer_identity: StdMutex::new(None),
            is_secure: AtomicBool::new(false),
            dispose_state: AtomicU8::new(LIVE),
        })
    }

    /// 接受端构造：包装一条已建立的连接，不做任何网络 IO。
    ///
    /// # 契约（What）
    /// - `endpoint`：接受循环已经完成建连（及可选的 TLS 握手）的端点；
    /// - `peer_identity`：接受循环在握手期间取得的对端证书；传 `None` 时
    ///   回退到端点自身缓存的握手元数据；
    /// - `options`：接受端默认选项（缓冲容量、安全属性推导的版本下限）；
    /// - **后置条件**：通道立即处于就绪态，`connect` 对其是安全的空操作。
    pub fn accepted(
        endpoint: impl Into<Endpoint>,
        peer_identity: Option<CertificateDer<'static>>,
        options: &AcceptedChannelOptions,
    ) -> flare_core::Result<Self> {
        options.validate()?;
        let endpoint = endpoint.into();
        let is_secure = match &endpoint {
            Endpoint::Tls(tls) => tls
                .protocol_version()
                .map(|version| options.min_protocol_version.is_met_by(version))
                .unwrap_or(false),
            Endpoint::Plain(_) => false,
        };
        let peer_identity = peer_identity.or_else(|| endpoint.peer_identity().cloned());
        let remote_address = endpoint.peer_addr().to_string();
        tracing::debug!(remote = %remote_address, secure = is_secure, "accepted channel established");

        Ok(Self {
            intent: StdMutex::new(ChannelIntent::Established),
            read_stream: StdMutex::new(Some(Arc::new(ReadStream {
                endpoint: endpoint.clone(),
            }))),
            write_stream: StdMutex::new(Some(Arc::new(WriteStream::new(
                endpoint.clone(),
                options.buffer_size,
            )))),
            remote_address: StdMutex::new(Some(remote_address)),
            peer_identity: StdMutex::new(peer_identity),
            is_secure: AtomicBool::new(is_secure),
            endpoint: StdMutex::new(Some(endpoint)),
            dispose_state: AtomicU8::new(LIVE),
        })
    }

    /// 建立连接。已就绪的通道上调用是安全的空操作。
    ///
    /// # 执行顺序（How）
    /// 1. TLS 策略裁决（客户端证书选择、容忍集合、版本映射）——配置错误在
    ///    任何网络 IO 之前同步返回；
    /// 2. 地址解析与拨号（keep-alive 无条件开启，Nagle 按选项）；
    /// 3. 配置了 TLS 时在拨好的端点上完成握手；
    /// 4. 重新推导远端地址并创建读写视图。
    ///
    /// # 失败语义
    /// - 解析/建连/握手的失败原样上抛，本通道不做任何重试；
    /// - 取消会尽快解除悬挂；取消发生时不会创建任何流视图，端点停留在底层
    ///   传输留下的部分状态，调用方随后必须 [`dispose`](Channel::dispose)。
    pub async fn connect(&self, ctx: &CallContext) -> flare_core::Result<()> {
        let options = {
            let guard = lock(&self.intent);
            match &*guard {
                ChannelIntent::Established => return Ok(()),
                ChannelIntent::Pending { options } => options.clone(),
            }
        };

        let connector = match &options.tls {
            Some(tls) => Some(TlsConnector::prepare(tls, &options.host)?),
            None => None,
        };

        let addr = resolve(ctx, &options.host, options.port).await?;
        let tcp = TcpEndpoint::dial(
            ctx,
            addr,
            &TcpSocketOptions {
                no_delay: options.no_delay,
            },
        )
        .await?;

        let (endpoint, is_secure) = match connector {
            Some(connector) => {
                let floor = connector.min_protocol_version();
                let tls = connector.handshake(ctx, tcp).await?;
                let is_secure = tls
                    .protocol_version()
                    .map(|version| floor.is_met_by(version))
                    .unwrap_or(false);
                (Endpoint::Tls(Box::new(tls)), is_secure)
            }
            None => (Endpoint::Plain(tcp), false),
        };

        self.install(endpoint, is_secure, options.buffer_size)
    }

    fn install(
        &self,
        endpoint: Endpoint,
        is_secure: bool,
        buffer_size: usize,
    ) -> flare_core::Result<()> {
        if self.dispose_state.load(Ordering::Acquire) != LIVE {
            // 建连期间通道已被释放：不安装任何视图，立刻归还端点资源。
            let _ = endpoint.dispose();
            return Err(error::disposed_error());
        }

        let remote_address = endpoint.peer_addr().to_string();
        tracing::debug!(remote = %remote_address, secure = is_secure, "channel connected");

        *lock(&self.read_stream) = Some(Arc::new(ReadStream {
            endpoint: endpoint.clone(),
        }));
        *lock(&self.write_stream) = Some(Arc::new(WriteStream::new(
            endpoint.clone(),
            buffer_size,
        )));
        *lock(&self.remote_address) = Some(remote_address);
        self.is_secure.store(is_secure, Ordering::Release);
        *lock(&self.endpoint) = Some(endpoint);
        *lock(&self.intent) = ChannelIntent::Established;
        Ok(())
    }

    /// 从通道读取数据。
    ///
    /// 委托给读视图：不施加小于 `buf.len()` 的内部窗口上限；返回 `0` 表示
    /// 对端有序关闭。可能悬挂等待数据，遵循 `ctx` 的取消与截止约束。
    pub async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> flare_core::Result<usize> {
        let stream = lock(&self.read_stream).clone();
        match stream {
            Some(stream) => stream.read(ctx, buf).await,
            None => Err(error::not_connected_error("read")),
        }
    }

    /// 向通道写入数据。
    ///
    /// 字节先进入容量为 `buffer_size` 的写缓冲，随后在同一次调用内物理刷出。
    /// `end_of_packet` 为前向兼容而保留：当前实现不以它批量聚合，每次调用
    /// 都会刷出。可能在刷出期间悬挂，遵循 `ctx` 的取消与截止约束。
    pub async fn write(
        &self,
        ctx: &CallContext,
        bytes: &[u8],
        end_of_packet: bool,
    ) -> flare_core::Result<()> {
        let stream = lock(&self.write_stream).clone();
        match stream {
            Some(stream) => stream.write(ctx, bytes, end_of_packet).await,
            None => Err(error::not_connected_error("write")),
        }
    }

    /// 断开连接：定义为 [`dispose`](Channel::dispose) 后立即回报成功，
    /// 不执行协议级的告别握手。
    pub async fn disconnect(&self, _ctx: &CallContext) -> flare_core::Result<()> {
        self.dispose()
    }

    /// 释放通道持有的全部资源。
    ///
    /// # 契约（What）
    /// - **幂等**：任意次调用都不会报错；重复与并发的释放尝试被
    ///   Live → Disposing → Disposed 状态机结构化拒绝；
    /// - **独立释放**：读视图、写视图、端点各自守护，互不牵连；
    /// - **容忍拆除竞态**：对端先行关闭等“资源已不存在”的平台错误被吞掉，
    ///   其余释放错误照常上抛；
    /// - 每个资源字段只在其释放尝试完成（成功或被吞掉）之后置空，并发的
    ///   字段读取只会看到“存活资源”或“空”，不会看到半拆除的句柄。
    pub fn dispose(&self) -> flare_core::Result<()> {
        if self
            .dispose_state
            .compare_exchange(LIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        // 视图只是端点之上的派生物，释放即丢弃引用。
        {
            let mut slot = lock(&self.read_stream);
            *slot = None;
        }
        {
            let mut slot = lock(&self.write_stream);
            *slot = None;
        }

        let result = {
            let mut slot = lock(&self.endpoint);
            let result = match slot.as_ref() {
                Some(endpoint) => endpoint.dispose(),
                None => Ok(()),
            };
            *slot = None;
            result
        };

        self.dispose_state.store(DISPOSED, Ordering::Release);
        tracing::debug!("channel disposed");
        result
    }

    /// 远端地址（"host:port"），建连成功后可用，并在每次成功建连后重新推导。
    pub fn remote_address(&self) -> Option<String> {
        lock(&self.remote_address).clone()
    }

    /// 本连接是否达到配置的最低 TLS 版本。握手完成前恒为 `false`。
    pub fn is_secure_connection(&self) -> bool {
        self.is_secure.load(Ordering::Acquire)
    }

    /// 对端在 TLS 握手中出示的证书（接受端路径可见）。
    pub fn peer_identity(&self) -> Option<CertificateDer<'static>> {
        lock(&self.peer_identity).clone()
    }
}

/// 锁中毒时继续使用内部数据：释放路径必须在任何情况下可推进。
fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
