//! TLS 握手与加密读写的回环测试：信任链、容忍策略与客户端证书出示。
//!
//! # 教案式说明
//! - **Why**：握手策略（信任根、容忍集合、客户端身份）的每个分支都直接决定
//!   连接能否建立以及建立后的安全属性，必须以真实握手验证而非单元桩；
//! - **How**：用 `rcgen` 现场生成 CA/服务端/客户端证书，在回环地址上完成
//!   真实的 `rustls` 握手；
//! - **What**：断言协商版本、对端证书可见性与错误分类。

use std::sync::Arc;

use flare_core::prelude::{CallContext, ErrorCategory, SecurityClass};
use flare_transport_tcp::{TcpEndpoint, TcpListener, TcpSocketOptions};
use flare_transport_tls::{
    ClientCertificateSource, ClientIdentity, MinProtocolVersion, TlsAcceptor, TlsClientOptions,
    TlsConnector, TlsEndpoint,
};
use rcgen::{BasicConstraints, Certificate, CertificateParams, IsCa, KeyPair};
use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::server::WebPkiClientVerifier;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

fn ctx() -> CallContext {
    CallContext::builder().build()
}

struct TestPki {
    ca_cert: Certificate,
    server_cert: Certificate,
    server_key: KeyPair,
}

impl TestPki {
    fn generate() -> Self {
        let ca_key = KeyPair::generate().expect("生成 CA 私钥失败");
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("CA 参数非法");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).expect("CA 自签失败");

        let server_key = KeyPair::generate().expect("生成服务端私钥失败");
        let server_params =
            CertificateParams::new(vec!["localhost".to_string()]).expect("服务端参数非法");
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .expect("服务端证书签发失败");

        TestPki {
            ca_cert,
            server_cert,
            server_key,
        }
    }

    fn ca_der(&self) -> CertificateDer<'static> {
        self.ca_cert.der().clone()
    }

    fn server_config(&self) -> Arc<ServerConfig> {
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                vec![self.server_cert.der().clone()],
                PrivateKeyDer::Pkcs8(self.server_key.serialize_der().into()),
            )
            .expect("服务端配置组装失败");
        Arc::new(config)
    }
}

/// 产出固定候选列表的客户端证书来源。
struct StaticSource {
    chain: Vec<CertificateDer<'static>>,
    key_der: Vec<u8>,
    count: usize,
}

impl ClientCertificateSource for StaticSource {
    fn candidates(&self) -> flare_core::Result<Vec<ClientIdentity>> {
        Ok((0..self.count)
            .map(|_| ClientIdentity {
                cert_chain: self.chain.clone(),
                key: PrivateKeyDer::Pkcs8(self.key_der.clone().into()),
            })
            .collect())
    }
}

async fn handshake_pair(
    server_config: Arc<ServerConfig>,
    options: &TlsClientOptions,
) -> (flare_core::Result<TlsEndpoint>, flare_core::Result<TlsEndpoint>) {
    let listener = TcpListener::bind(flare_core::transport::TransportSocketAddr::V4 {
        addr: [127, 0, 0, 1],
        port: 0,
    })
    .await
    .expect("bind 失败");
    let target = listener.local_addr();

    let acceptor = TlsAcceptor::new(server_config);
    let server_task = tokio::spawn(async move {
        let (endpoint, _) = listener.accept(&ctx()).await.expect("accept 失败");
        acceptor.accept(&ctx(), endpoint).await
    });

    let connector = TlsConnector::prepare(options, "localhost").expect("connector 组装失败");
    let tcp = TcpEndpoint::dial(&ctx(), target, &TcpSocketOptions::default())
        .await
        .expect("dial 失败");
    let client_result = connector.handshake(&ctx(), tcp).await;
    let server_result = server_task.await.expect("accept 任务崩溃");
    (client_result, server_result)
}

/// 信任根内的服务端证书正常通过校验，协商版本满足配置下限。
#[tokio::test(flavor = "multi_thread")]
async fn handshake_with_trusted_root_succeeds() {
    let pki = TestPki::generate();
    let options = TlsClientOptions {
        server_name: Some("localhost".to_string()),
        trust_roots: vec![pki.ca_der()],
        ..TlsClientOptions::default()
    };

    let (client, server) = handshake_pair(pki.server_config(), &options).await;
    let client = client.expect("客户端握手失败");
    let server = server.expect("服务端握手失败");

    let negotiated = client.protocol_version().expect("缺少协商版本");
    assert!(
        MinProtocolVersion::default().is_met_by(negotiated),
        "协商版本必须满足配置下限"
    );
    // 客户端可见服务端证书；未出示客户端证书时服务端看不到对端身份。
    assert!(client.peer_identity().is_some());
    assert!(server.peer_identity().is_none());
}

/// 无信任根但容忍“根不可信”时握手仍可完成；不容忍时以认证类安全错误失败。
#[tokio::test(flavor = "multi_thread")]
async fn untrusted_root_requires_explicit_tolerance() {
    let pki = TestPki::generate();
    let tolerant = TlsClientOptions {
        server_name: Some("localhost".to_string()),
        allow_untrusted_certificates: true,
        ..TlsClientOptions::default()
    };
    let (client, server) = handshake_pair(pki.server_config(), &tolerant).await;
    client.expect("容忍不可信根时握手应当成功");
    server.expect("服务端握手失败");

    let strict = TlsClientOptions {
        server_name: Some("localhost".to_string()),
        ..TlsClientOptions::default()
    };
    let (client, _server) = handshake_pair(pki.server_config(), &strict).await;
    let err = client.expect_err("不容忍不可信根时握手必须失败");
    assert_eq!(
        err.category(),
        ErrorCategory::Security(SecurityClass::Authentication)
    );
}

/// 加密通道上的字节保真：写入方的负载原样到达读取方。
#[tokio::test(flavor = "multi_thread")]
async fn encrypted_roundtrip_preserves_bytes() {
    let pki = TestPki::generate();
    let options = TlsClientOptions {
        server_name: Some("localhost".to_string()),
        trust_roots: vec![pki.ca_der()],
        ..TlsClientOptions::default()
    };
    let (client, server) = handshake_pair(pki.server_config(), &options).await;
    let client = client.expect("客户端握手失败");
    let server = server.expect("服务端握手失败");

    let payload = b"flare over tls".repeat(64);
    client.write(&ctx(), &payload).await.expect("write 失败");
    client.flush(&ctx()).await.expect("flush 失败");

    let mut received = vec![0u8; payload.len()];
    let mut filled = 0;
    while filled < received.len() {
        let n = server
            .read(&ctx(), &mut received[filled..])
            .await
            .expect("read 失败");
        assert_ne!(n, 0, "对端不应提前关闭");
        filled += n;
    }
    assert_eq!(received, payload);
}

/// 客户端出示证书时服务端可见其身份；零候选时服务端看不到任何证书。
#[tokio::test(flavor = "multi_thread")]
async fn client_certificate_visibility_follows_candidate_count() {
    let pki = TestPki::generate();

    // 客户端证书由同一 CA 签发。
    let ca_key = KeyPair::generate().expect("生成 CA 私钥失败");
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("CA 参数非法");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let client_ca = ca_params.self_signed(&ca_key).expect("CA 自签失败");

    let client_key = KeyPair::generate().expect("生成客户端私钥失败");
    let client_params =
        CertificateParams::new(vec!["flare-client".to_string()]).expect("客户端参数非法");
    let client_cert = client_params
        .signed_by(&client_key, &client_ca, &ca_key)
        .expect("客户端证书签发失败");

    let mut client_roots = RootCertStore::empty();
    client_roots
        .add(client_ca.der().clone())
        .expect("装载客户端 CA 失败");
    let client_verifier = WebPkiClientVerifier::builder(Arc::new(client_roots))
        .allow_unauthenticated()
        .build()
        .expect("客户端校验器组装失败");
    let server_config = ServerConfig::builder()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(
            vec![pki.server_cert.der().clone()],
            PrivateKeyDer::Pkcs8(pki.server_key.serialize_der().into()),
        )
        .expect("服务端配置组装失败");
    let server_config = Arc::new(server_config);

    // 恰好一个候选：证书被出示，服务端可见。
    let one = TlsClientOptions {
        server_name: Some("localhost".to_string()),
        trust_roots: vec![pki.ca_der()],
        certificate_source: Some(Arc::new(StaticSource {
            chain: vec![client_cert.der().clone()],
            key_der: client_key.serialize_der(),
            count: 1,
        })),
        ..TlsClientOptions::default()
    };
    let (client, server) = handshake_pair(server_config.clone(), &one).await;
    client.expect("出示证书的握手失败");
    let server = server.expect("服务端握手失败");
    assert_eq!(
        server.peer_identity(),
        Some(client_cert.der()),
        "服务端必须看到客户端出示的证书"
    );

    // 零候选：握手成功且服务端看不到证书。
    let zero = TlsClientOptions {
        server_name: Some("localhost".to_string()),
        trust_roots: vec![pki.ca_der()],
        certificate_source: Some(Arc::new(StaticSource {
            chain: vec![client_cert.der().clone()],
            key_der: client_key.serialize_der(),
            count: 0,
        })),
        ..TlsClientOptions::default()
    };
    let (client, server) = handshake_pair(server_config, &zero).await;
    client.expect("零候选的握手不应失败");
    let server = server.expect("服务端握手失败");
    assert!(server.peer_identity().is_none());
}

/// 两个以上候选在任何网络动作之前就被拒绝。
#[tokio::test(flavor = "multi_thread")]
async fn ambiguous_candidates_fail_before_any_dial() {
    let pki = TestPki::generate();
    let key = KeyPair::generate().expect("生成私钥失败");
    let options = TlsClientOptions {
        server_name: Some("localhost".to_string()),
        trust_roots: vec![pki.ca_der()],
        certificate_source: Some(Arc::new(StaticSource {
            chain: vec![pki.ca_der()],
            key_der: key.serialize_der(),
            count: 2,
        })),
        ..TlsClientOptions::default()
    };

    // 只调用 prepare：配置错误必须在建连之前同步出现。
    let err = TlsConnector::prepare(&options, "localhost")
        .expect_err("歧义候选必须导致配置错误");
    assert_eq!(err.code(), "flare.transport.tls.client_certificate_ambiguous");
    assert_eq!(err.category(), ErrorCategory::NonRetryable);
}
