//! 明文 TCP 端点的端到端契约测试：建连、字节保真、取消与释放。
//!
//! # 教案式说明
//! - **Why**：端点是所有上层通道的地基，任何读写或释放语义的回归都会放大为
//!   协议层故障，必须在本层直接拦截。
//! - **How**：在回环地址上真实建连，不使用任何模拟对象；取消与超时场景通过
//!   [`CallContext`] 注入。
//! - **What**：每个测试返回 `()`；断言失败即 panic 并附带上下文信息。

use std::time::Duration;

use flare_core::prelude::{CallContext, Cancellation, Deadline, ErrorCategory, MonotonicTimePoint};
use flare_core::transport::ShutdownDirection;
use flare_transport_tcp::{TcpEndpoint, TcpListener, TcpSocketOptions, resolve};

fn ctx() -> CallContext {
    CallContext::builder().build()
}

fn loopback() -> flare_core::transport::TransportSocketAddr {
    flare_core::transport::TransportSocketAddr::V4 {
        addr: [127, 0, 0, 1],
        port: 0,
    }
}

async fn connected_pair() -> (TcpEndpoint, TcpEndpoint) {
    let listener = TcpListener::bind(loopback()).await.expect("bind 失败");
    let target = listener.local_addr();
    let accept_ctx = ctx();
    let server = tokio::spawn(async move {
        listener
            .accept(&accept_ctx)
            .await
            .expect("accept 失败")
            .0
    });
    let client = TcpEndpoint::dial(&ctx(), target, &TcpSocketOptions { no_delay: true })
        .await
        .expect("dial 失败");
    let server = server.await.expect("accept 任务崩溃");
    (client, server)
}

/// 写入 N 字节后对端以读循环收取，必须不多不少恰好收到这 N 字节。
///
/// - **Why**：字节保真是可靠传输通道的最低承诺；
/// - **How**：客户端一次写入，服务端以小缓冲区多次读取并拼接；
/// - **What**：拼接结果与原始负载完全一致，随后的半关闭使读取返回 0。
#[tokio::test(flavor = "multi_thread")]
async fn write_then_read_preserves_bytes_exactly() {
    let (client, server) = connected_pair().await;
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();

    let written = client.write(&ctx(), &payload).await.expect("write 失败");
    assert_eq!(written, payload.len());
    client
        .shutdown(&ctx(), ShutdownDirection::Write)
        .await
        .expect("shutdown 失败");

    let mut received = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = server.read(&ctx(), &mut buf).await.expect("read 失败");
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, payload, "收到的字节必须与写入一致");
}

/// 读方向悬挂等待数据时，写方向必须照常推进：两个方向互不加锁。
///
/// - **Why**：协议层依赖“读等待入站、写并发出站”的全双工语义；
/// - **How**：先在无数据的连接上发起读取，再并发发起写入并限时等待；
/// - **What**：写入在读取仍然悬挂期间完成，随后对端回包解除读取悬挂。
#[tokio::test(flavor = "multi_thread")]
async fn write_proceeds_while_read_is_pending() {
    let (client, server) = connected_pair().await;

    let reader = client.clone();
    let read_task = tokio::spawn(async move {
        let mut buf = [0u8; 16];
        let n = reader.read(&ctx(), &mut buf).await.expect("read 失败");
        buf[..n].to_vec()
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(Duration::from_secs(1), client.write(&ctx(), b"request"))
        .await
        .expect("读取悬挂时写入不得被阻塞")
        .expect("write 失败");

    let mut buf = [0u8; 16];
    let n = server.read(&ctx(), &mut buf).await.expect("read 失败");
    assert_eq!(&buf[..n], b"request");
    server.write(&ctx(), b"reply").await.expect("write 失败");

    let echoed = read_task.await.expect("读取任务崩溃");
    assert_eq!(echoed, b"reply");
}

/// 取消令牌触发后，悬挂中的读取应当迅速返回取消错误，端点仍可释放。
///
/// - **Why**：取消必须及时解除悬挂，且不得泄露底层连接；
/// - **How**：读取一条永远不会有数据的连接，另一任务延迟触发取消；
/// - **What**：错误分类为 `Cancelled`，随后 `dispose` 成功。
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_inflight_read_unblocks_and_leaves_disposable() {
    let (client, _server) = connected_pair().await;

    let cancellation = Cancellation::new();
    let read_ctx = CallContext::builder()
        .with_cancellation(cancellation.child())
        .build();
    let trigger = cancellation.child();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut buf = [0u8; 16];
    let err = tokio::time::timeout(Duration::from_secs(2), client.read(&read_ctx, &mut buf))
        .await
        .expect("取消未在限期内解除悬挂")
        .expect_err("读取应返回取消错误");
    assert_eq!(err.category(), ErrorCategory::Cancelled);

    client.dispose().expect("取消后的端点必须仍可释放");
}

/// 截止时间到期的读取返回超时分类。
#[tokio::test(flavor = "multi_thread")]
async fn read_deadline_expires_as_timeout() {
    let (client, _server) = connected_pair().await;
    // 截止点取单调时钟原点，对任何已运行的进程都必然已过期。
    let deadline_ctx = CallContext::builder()
        .with_deadline(Deadline::at(MonotonicTimePoint::from_offset(Duration::ZERO)))
        .build();
    let mut buf = [0u8; 16];
    let err = client
        .read(&deadline_ctx, &mut buf)
        .await
        .expect_err("过期截止时间必须直接返回超时");
    assert_eq!(err.category(), ErrorCategory::Timeout);
}

/// 释放是幂等的，对端先行关闭也不会产生错误。
///
/// - **Why**：断开路径上资源可能已被协议栈部分拆除，重复或迟到的释放不能
///   向上抛出平台噪声；
/// - **How**：服务端整体关闭后，客户端连续两次 `dispose`；
/// - **What**：两次调用都成功。
#[tokio::test(flavor = "multi_thread")]
async fn dispose_is_idempotent_even_after_peer_close() {
    let (client, server) = connected_pair().await;
    server
        .shutdown(&ctx(), ShutdownDirection::Both)
        .await
        .expect("服务端关闭失败");
    drop(server);
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.dispose().expect("对端关闭后的释放不应报错");
    client.dispose().expect("重复释放必须保持幂等");
}

/// 数字地址的解析不依赖外部名字服务，且结果保留端口。
#[tokio::test(flavor = "multi_thread")]
async fn resolve_numeric_host_is_local() {
    let addr = resolve(&ctx(), "127.0.0.1", 5060).await.expect("解析失败");
    assert_eq!(addr.port(), 5060);
    assert_eq!(addr.to_string(), "127.0.0.1:5060");
}
