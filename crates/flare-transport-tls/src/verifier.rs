use std::collections::BTreeSet;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{
    CertificateError, DigitallySignedStruct, Error as RustlsError, RootCertStore, SignatureScheme,
};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use crate::error;
use crate::policy::{IgnorableCertError, is_tolerated};

/// 宽容模式的服务端证书校验器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 标准 webpki 校验器只有“通过/失败”两种结果，而本传输层的契约要求
///   按配置容忍特定类别的链校验失败（吊销状态缺失、链不完整、根不可信）；
/// - 通过包装而非重写校验逻辑，保证除被容忍类别之外的一切校验行为与
///   webpki 完全一致。
///
/// ## 逻辑（How）
/// - 内部持有可选的 [`WebPkiServerVerifier`]：信任根非空时委托其完成完整
///   校验，失败后仅当错误类别落在容忍集合内才放行；
/// - 信任根为空时无法构造 webpki 校验器，此时只有容忍
///   [`IgnorableCertError::UntrustedRoot`] 的配置才可能通过，否则直接报告
///   `UnknownIssuer`；
/// - TLS 1.2/1.3 的握手签名校验始终委托加密后端完成，容忍策略从不放宽
///   签名检查。
///
/// ## 契约（What）
/// - **前置条件**：容忍集合已由策略层（默认策略或自定义解析器）解析完毕；
/// - **后置条件**：被放行的链校验失败会以 `debug` 级别记录，便于审计。
///
/// ## 风险与权衡（Trade-offs）
/// - 容忍 `UntrustedRoot` 且未配置信任根时，服务端身份完全未被验证，仅保留
///   传输加密；该模式只应出现在测试或封闭网络中。
#[derive(Debug)]
pub(crate) struct LenientServerCertVerifier {
    inner: Option<Arc<WebPkiServerVerifier>>,
    tolerated: BTreeSet<IgnorableCertError>,
    provider: Arc<CryptoProvider>,
}

impl LenientServerCertVerifier {
    pub(crate) fn new(
        trust_roots: &[CertificateDer<'static>],
        tolerated: BTreeSet<IgnorableCertError>,
    ) -> flare_core::Result<Self> {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
        let inner = if trust_roots.is_empty() {
            None
        } else {
            let mut store = RootCertStore::empty();
            for root in trust_roots {
                store
                    .add(root.clone())
                    .map_err(error::config_rejected_error)?;
            }
            let verifier =
                WebPkiServerVerifier::builder_with_provider(Arc::new(store), provider.clone())
                    .build()
                    .map_err(error::verifier_build_error)?;
            Some(verifier)
        };
        Ok(Self {
            inner,
            tolerated,
            provider,
        })
    }
}

impl ServerCertVerifier for LenientServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        match &self.inner {
            Some(inner) => match inner.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                ocsp_response,
                now,
            ) {
                Ok(verified) => Ok(verified),
                Err(RustlsError::InvalidCertificate(cert_error))
                    if is_tolerated(&self.tolerated, &cert_error) =>
                {
                    tracing::debug!(error = ?cert_error, "tolerating server certificate error");
                    Ok(ServerCertVerified::assertion())
                }
                Err(err) => Err(err),
            },
            None => {
                if self
                    .tolerated
                    .contains(&IgnorableCertError::UntrustedRoot)
                {
                    tracing::debug!("no trust roots configured; accepting peer as untrusted");
                    Ok(ServerCertVerified::assertion())
                } else {
                    Err(RustlsError::InvalidCertificate(
                        CertificateError::UnknownIssuer,
                    ))
                }
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
