use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustls::{CertificateError, ProtocolVersion, SupportedProtocolVersion, version};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error;
use flare_core::error::CoreError;

static TLS12_AND_UP: &[&SupportedProtocolVersion] = &[&version::TLS13, &version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&version::TLS13];

/// 客户端可接受的最低 TLS 协议版本。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“配置的最低版本”与“握手允许的协议版本集合”之间的映射收敛到一处，
///   避免调用方直接操作 `rustls` 的版本常量；
/// - 对未来新增的更高版本保持前向兼容：无法识别的请求一律映射为当前最强
///   协议，而不是握手失败。
///
/// ## 契约（What）
/// - [`protocol_versions`](MinProtocolVersion::protocol_versions)：返回交给
///   `rustls` 的版本集合，最低 1.2 时同时允许 1.3；
/// - [`is_met_by`](MinProtocolVersion::is_met_by)：判断协商结果是否达到
///   配置的下限，用于推导“安全连接”属性；
/// - 默认值为最强协议（TLS 1.3）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum MinProtocolVersion {
    /// 允许 TLS 1.2 及以上。
    Tls12,
    /// 仅允许 TLS 1.3。
    #[default]
    Tls13,
}

impl MinProtocolVersion {
    /// 映射为 `rustls` 握手允许的协议版本集合。
    pub fn protocol_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            MinProtocolVersion::Tls12 => TLS12_AND_UP,
            // TLS 1.3 以及未来新增的更高版本一律使用当前最强协议。
            _ => TLS13_ONLY,
        }
    }

    /// 判断协商出的协议版本是否满足本下限。
    pub fn is_met_by(self, negotiated: ProtocolVersion) -> bool {
        match self {
            MinProtocolVersion::Tls12 => matches!(
                negotiated,
                ProtocolVersion::TLSv1_2 | ProtocolVersion::TLSv1_3
            ),
            _ => matches!(negotiated, ProtocolVersion::TLSv1_3),
        }
    }
}

/// 客户端身份：证书链与对应私钥。
#[derive(Debug)]
pub struct ClientIdentity {
    /// 叶证书在前的 DER 证书链。
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// 证书链对应的私钥。
    pub key: PrivateKeyDer<'static>,
}

/// 客户端证书来源：按需产出零个或多个候选身份。
///
/// # 契约说明（What）
/// - `candidates` 在每次建连准备阶段被调用一次；
/// - 返回零个候选不是错误——表示本次握手不出示客户端证书；
/// - 候选数量的裁决策略见 [`select_client_identity`]。
pub trait ClientCertificateSource: Send + Sync {
    /// 产出候选客户端身份。
    fn candidates(&self) -> flare_core::Result<Vec<ClientIdentity>>;
}

/// 从证书来源中裁决出最多一个客户端身份。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输层绝不在多个候选证书之间自动挑选：选择哪个身份是安全决策，必须由
///   配置方显式收敛到一个候选；
/// - 该裁决发生在任何网络 IO 之前，歧义配置因此永远不会产生半途而废的连接。
///
/// ## 契约（What）
/// - 无来源或零候选 ⇒ `Ok(None)`（不出示证书，不是错误）；
/// - 恰好一个候选 ⇒ `Ok(Some(identity))`；
/// - 两个及以上 ⇒ `flare.transport.tls.client_certificate_ambiguous`
///   配置错误，归类 `NonRetryable`。
pub fn select_client_identity(
    source: Option<&dyn ClientCertificateSource>,
) -> flare_core::Result<Option<ClientIdentity>> {
    let Some(source) = source else {
        return Ok(None);
    };
    let mut candidates = source.candidates()?;
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        count => Err(error::ambiguous_certificate_error(count)),
    }
}

/// 可以被容忍的服务端证书链校验失败类别。
///
/// # 契约说明（What）
/// - 每个分支对应一类链校验失败；[`covers`](IgnorableCertError::covers)
///   定义其与 `rustls` 证书错误的映射；
/// - `ExplicitlyRevoked` 虽然在枚举中存在（以便自定义解析器显式表达），
///   但默认策略在任何配置下都不会把它加入容忍集合——证书被吊销本身
///   永远不是可忽略的。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum IgnorableCertError {
    /// 吊销信息缺失（无法获得吊销状态）。
    RevocationStatusMissing,
    /// 吊销检查失败（例如 CRL 过期）。
    RevocationCheckFailed,
    /// 证书链不完整（缺少中间证书）。
    IncompleteChain,
    /// 根证书不在信任列表中。
    UntrustedRoot,
    /// 证书被明确吊销。默认策略永不容忍。
    ExplicitlyRevoked,
}

impl IgnorableCertError {
    /// 判断该类别是否覆盖给定的 `rustls` 证书错误。
    ///
    /// `rustls` 对“链不完整”与“根不可信”统一报告为 `UnknownIssuer`，
    /// 因此两个类别映射到同一底层错误。
    pub fn covers(self, error: &CertificateError) -> bool {
        match self {
            IgnorableCertError::RevocationStatusMissing => {
                matches!(error, CertificateError::UnknownRevocationStatus)
            }
            IgnorableCertError::RevocationCheckFailed => {
                matches!(error, CertificateError::ExpiredRevocationList)
            }
            IgnorableCertError::IncompleteChain | IgnorableCertError::UntrustedRoot => {
                matches!(error, CertificateError::UnknownIssuer)
            }
            IgnorableCertError::ExplicitlyRevoked => {
                matches!(error, CertificateError::Revoked)
            }
        }
    }
}

/// 容忍集合解析策略：决定哪些链校验失败不应中止握手。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以按实例注入的策略对象取代进程级全局钩子：行为随连接配置走，测试之间
///   不会互相泄漏状态；
/// - 注册的自定义解析器**整体取代**默认策略（接收完整的客户端 TLS 选项，
///   返回容忍集合），而不是在默认结果上追加。
///
/// ## 契约（What）
/// - `resolve` 必须是纯函数式的：不做网络 IO，不产生副作用；
/// - 返回空集合表示任何链校验失败都会中止握手。
pub trait ToleratedErrorResolver: Send + Sync {
    /// 根据当前客户端选项计算容忍集合。
    fn resolve(&self, options: &TlsClientOptions) -> BTreeSet<IgnorableCertError>;
}

/// 客户端 TLS 选项。
///
/// # 契约说明（What）
/// - `server_name`：握手使用的 SNI/校验名；缺省时取拨号主机名；
/// - `min_protocol_version`：最低协议版本，见 [`MinProtocolVersion`]；
/// - `trust_roots`：显式信任的 DER 根证书；为空时仅当容忍
///   [`IgnorableCertError::UntrustedRoot`] 才可能完成握手；
/// - `certificate_source`：客户端证书来源；
/// - 三个布尔开关驱动默认容忍策略（见 [`default_tolerated_errors`]）；
/// - `tolerated_error_resolver`：一旦设置，整体取代默认策略。
#[derive(Clone, Default)]
pub struct TlsClientOptions {
    /// 握手使用的服务器名；缺省取拨号主机名。
    pub server_name: Option<String>,
    /// 最低协议版本。
    pub min_protocol_version: MinProtocolVersion,
    /// 显式信任的 DER 根证书。
    pub trust_roots: Vec<CertificateDer<'static>>,
    /// 客户端证书来源。
    pub certificate_source: Option<Arc<dyn ClientCertificateSource>>,
    /// 容忍“吊销信息缺失/吊销检查失败”。
    pub ignore_revocation_errors: bool,
    /// 容忍“证书链不完整”。
    pub ignore_chain_errors: bool,
    /// 容忍“根证书不可信”。
    pub allow_untrusted_certificates: bool,
    /// 自定义容忍集合解析器；设置后整体取代默认策略。
    pub tolerated_error_resolver: Option<Arc<dyn ToleratedErrorResolver>>,
}

impl fmt::Debug for TlsClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsClientOptions")
            .field("server_name", &self.server_name)
            .field("min_protocol_version", &self.min_protocol_version)
            .field("trust_roots", &self.trust_roots.len())
            .field("has_certificate_source", &self.certificate_source.is_some())
            .field("ignore_revocation_errors", &self.ignore_revocation_errors)
            .field("ignore_chain_errors", &self.ignore_chain_errors)
            .field(
                "allow_untrusted_certificates",
                &self.allow_untrusted_certificates,
            )
            .field(
                "has_custom_resolver",
                &self.tolerated_error_resolver.is_some(),
            )
            .finish()
    }
}

/// 默认容忍策略：由三个布尔开关推导容忍集合。
///
/// # 契约（What）
/// - `ignore_revocation_errors` ⇒ 容忍 `RevocationStatusMissing` 与
///   `RevocationCheckFailed`；`ExplicitlyRevoked` 被刻意排除在外——即使
///   开启该开关，“证书已被吊销”也绝不可忽略；
/// - `ignore_chain_errors` ⇒ 容忍 `IncompleteChain`；
/// - `allow_untrusted_certificates` ⇒ 容忍 `UntrustedRoot`；
/// - 三个开关全关 ⇒ 空集合。
pub fn default_tolerated_errors(options: &TlsClientOptions) -> BTreeSet<IgnorableCertError> {
    let mut tolerated = BTreeSet::new();
    if options.ignore_revocation_errors {
        tolerated.insert(IgnorableCertError::RevocationStatusMissing);
        tolerated.insert(IgnorableCertError::RevocationCheckFailed);
    }
    if options.ignore_chain_errors {
        tolerated.insert(IgnorableCertError::IncompleteChain);
    }
    if options.allow_untrusted_certificates {
        tolerated.insert(IgnorableCertError::UntrustedRoot);
    }
    tolerated
}

/// 计算当前选项生效的容忍集合：自定义解析器优先且整体取代默认策略。
pub fn resolve_tolerated_errors(options: &TlsClientOptions) -> BTreeSet<IgnorableCertError> {
    match &options.tolerated_error_resolver {
        Some(resolver) => resolver.resolve(options),
        None => default_tolerated_errors(options),
    }
}

/// 在容忍集合下判断一个证书错误是否可以放行。
pub(crate) fn is_tolerated(
    tolerated: &BTreeSet<IgnorableCertError>,
    error: &CertificateError,
) -> bool {
    tolerated.iter().any(|kind| kind.covers(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(usize);

    impl ClientCertificateSource for FixedSource {
        fn candidates(&self) -> flare_core::Result<Vec<ClientIdentity>> {
            Ok((0..self.0)
                .map(|_| ClientIdentity {
                    cert_chain: vec![CertificateDer::from(vec![0u8; 8])],
                    key: PrivateKeyDer::Pkcs8(vec![0u8; 8].into()),
                })
                .collect())
        }
    }

    /// 零候选不是错误；单候选被采用；多候选是配置错误且立即失败。
    #[test]
    fn identity_selection_policy() {
        assert!(select_client_identity(None).unwrap().is_none());
        assert!(
            select_client_identity(Some(&FixedSource(0)))
                .unwrap()
                .is_none()
        );
        assert!(
            select_client_identity(Some(&FixedSource(1)))
                .unwrap()
                .is_some()
        );

        let err = select_client_identity(Some(&FixedSource(2))).unwrap_err();
        assert_eq!(err.code(), "flare.transport.tls.client_certificate_ambiguous");
    }

    /// 吊销开关引入两类吊销状态错误，但绝不引入“已明确吊销”。
    #[test]
    fn revocation_flag_never_tolerates_explicit_revocation() {
        let options = TlsClientOptions {
            ignore_revocation_errors: true,
            ..TlsClientOptions::default()
        };
        let tolerated = default_tolerated_errors(&options);
        assert!(tolerated.contains(&IgnorableCertError::RevocationStatusMissing));
        assert!(tolerated.contains(&IgnorableCertError::RevocationCheckFailed));
        assert!(!tolerated.contains(&IgnorableCertError::ExplicitlyRevoked));
        assert_eq!(tolerated.len(), 2);
    }

    /// 三个开关全关时容忍集合为空；链/根开关各自独立生效。
    #[test]
    fn default_policy_truth_table() {
        assert!(default_tolerated_errors(&TlsClientOptions::default()).is_empty());

        let chain_only = TlsClientOptions {
            ignore_chain_errors: true,
            ..TlsClientOptions::default()
        };
        assert_eq!(
            default_tolerated_errors(&chain_only)
                .into_iter()
                .collect::<Vec<_>>(),
            vec![IgnorableCertError::IncompleteChain]
        );

        let untrusted_only = TlsClientOptions {
            allow_untrusted_certificates: true,
            ..TlsClientOptions::default()
        };
        assert_eq!(
            default_tolerated_errors(&untrusted_only)
                .into_iter()
                .collect::<Vec<_>>(),
            vec![IgnorableCertError::UntrustedRoot]
        );
    }

    /// 自定义解析器整体取代默认策略，而不是在其上追加。
    #[test]
    fn custom_resolver_replaces_default_policy() {
        struct OnlyChain;
        impl ToleratedErrorResolver for OnlyChain {
            fn resolve(&self, _options: &TlsClientOptions) -> BTreeSet<IgnorableCertError> {
                BTreeSet::from([IgnorableCertError::IncompleteChain])
            }
        }

        // 开关本该引入吊销类容忍，但解析器的结果才是最终事实。
        let options = TlsClientOptions {
            ignore_revocation_errors: true,
            tolerated_error_resolver: Some(Arc::new(OnlyChain)),
            ..TlsClientOptions::default()
        };
        let tolerated = resolve_tolerated_errors(&options);
        assert_eq!(
            tolerated.into_iter().collect::<Vec<_>>(),
            vec![IgnorableCertError::IncompleteChain]
        );
    }

    /// 未识别的更高版本诉求退化为“使用当前最强协议”。
    #[test]
    fn min_version_maps_to_strongest_available() {
        assert_eq!(
            MinProtocolVersion::Tls12.protocol_versions().len(),
            2,
            "最低 1.2 时应同时允许 1.3"
        );
        assert_eq!(MinProtocolVersion::Tls13.protocol_versions().len(), 1);
        assert_eq!(MinProtocolVersion::default(), MinProtocolVersion::Tls13);

        assert!(MinProtocolVersion::Tls12.is_met_by(ProtocolVersion::TLSv1_3));
        assert!(MinProtocolVersion::Tls12.is_met_by(ProtocolVersion::TLSv1_2));
        assert!(!MinProtocolVersion::Tls13.is_met_by(ProtocolVersion::TLSv1_2));
    }
}
