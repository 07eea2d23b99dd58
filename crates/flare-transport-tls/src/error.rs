use std::{borrow::Cow, io, time::Duration};

use rustls::{AlertDescription, Error as RustlsError};
use flare_core::error::{CoreError, ErrorCategory, RetryAdvice};
use flare_core::security::SecurityClass;

/// TLS 传输错误映射模块。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将 `rustls`/IO 层的错误统一映射到框架的 [`ErrorCategory`]，便于上层协议栈
///   据此做断开或重连决策；
/// - 提供稳定错误码与文案，使测试与运维脚本能够根据错误定位问题，而无需解析
///   底层库细节。
///
/// ## 逻辑（How）
/// - `OperationKind` 描述一类操作（握手/读写/关闭）的错误码与默认文案；
/// - `map_handshake_error`/`map_stream_error` 根据 `io::Error`（可能嵌套
///   `rustls::Error`）推导 [`ErrorCategory`]，并生成 `CoreError`；
/// - `categorize_rustls_error`/`categorize_io_error` 将具体错误细分为
///   `Security` 或 `Retryable`；`alert_to_category` 针对 TLS Alert 做进一步
///   细化。
///
/// ## 契约（What）
/// - 所有映射函数均保证返回的 [`CoreError`] 携带稳定错误码；
/// - 取消/超时使用 `cancelled_error` 与 `timeout_error` 保持与 TCP 层一致；
/// - 配置类错误（证书歧义、非法服务器名、配置被拒绝）拥有独立错误码，且在
///   任何网络 IO 之前同步产生。
///
/// ## 风险与权衡（Trade-offs）
/// - `rustls::Error::General` 等泛型错误默认映射为重试类别，避免误判为安全
///   事件；
/// - 未穷举的 Alert 会被视作可重试错误，后续若需更精确分类可在此集中扩展。
#[derive(Clone, Copy)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const HANDSHAKE: OperationKind = OperationKind {
    code: "flare.transport.tls.handshake_failed",
    message: "tls handshake",
};

pub(crate) const READ: OperationKind = OperationKind {
    code: "flare.transport.tls.read_failed",
    message: "tls read",
};

pub(crate) const WRITE: OperationKind = OperationKind {
    code: "flare.transport.tls.write_failed",
    message: "tls write",
};

pub(crate) const FLUSH: OperationKind = OperationKind {
    code: "flare.transport.tls.flush_failed",
    message: "tls flush",
};

pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "flare.transport.tls.shutdown_failed",
    message: "tls shutdown",
};

pub(crate) const DISPOSE: OperationKind = OperationKind {
    code: "flare.transport.tls.dispose_failed",
    message: "tls dispose",
};

const CANCEL_CODE: &str = "flare.transport.tls.cancelled";
const TIMEOUT_CODE: &str = "flare.transport.tls.timeout";

/// 将释放阶段未被吞掉的 `io::Error` 映射为框架级 [`CoreError`]。
pub(crate) fn map_io_dispose_error(error: io::Error) -> CoreError {
    CoreError::new(
        DISPOSE.code,
        Cow::Owned(format!("{}: {}", DISPOSE.message, error)),
    )
    .with_cause(error)
    .with_category(ErrorCategory::NonRetryable)
}

/// 将握手阶段的 `io::Error` 映射为框架级 [`CoreError`]。
pub(crate) fn map_handshake_error(kind: OperationKind, error: io::Error) -> CoreError {
    let category = categorize_with_rustls(&error);
    CoreError::new(
        kind.code,
        Cow::Owned(format!("{}: {}", kind.message, error)),
    )
    .with_cause(error)
    .with_category(category)
}

/// 将读写阶段的 `io::Error` 映射为框架级 [`CoreError`]。
pub(crate) fn map_stream_error(kind: OperationKind, error: io::Error) -> CoreError {
    let category = categorize_with_rustls(&error);
    CoreError::new(
        kind.code,
        Cow::Owned(format!("{}: {}", kind.message, error)),
    )
    .with_cause(error)
    .with_category(category)
}

/// 构造取消错误，保持与 `flare-transport-tcp` 一致的语义。
pub(crate) fn cancelled_error(kind: OperationKind) -> CoreError {
    let message = format!("{} cancelled", kind.message);
    CoreError::new(CANCEL_CODE, message).with_category(ErrorCategory::Cancelled)
}

/// 构造超时错误。
pub(crate) fn timeout_error(kind: OperationKind) -> CoreError {
    let message = format!("{} timed out", kind.message);
    CoreError::new(TIMEOUT_CODE, message).with_category(ErrorCategory::Timeout)
}

/// 当 TLS 握手需要独占 `TcpEndpoint` 但被多处持有时返回的错误。
pub(crate) fn exclusive_endpoint_error() -> CoreError {
    CoreError::new(
        "flare.transport.tls.endpoint_not_exclusive",
        "tls handshake requires exclusive TcpEndpoint ownership",
    )
    .with_category(ErrorCategory::NonRetryable)
}

/// 客户端证书候选数量超过一个时的配置错误。
///
/// 传输层从不在多个候选之间自动挑选；该错误在任何网络 IO 之前同步产生。
pub(crate) fn ambiguous_certificate_error(count: usize) -> CoreError {
    CoreError::new(
        "flare.transport.tls.client_certificate_ambiguous",
        Cow::Owned(format!(
            "client certificate selection is not supported: {count} candidates available"
        )),
    )
    .with_category(ErrorCategory::NonRetryable)
}

/// 服务器名无法用于 TLS 校验时的配置错误。
pub(crate) fn invalid_server_name_error(host: &str) -> CoreError {
    CoreError::new(
        "flare.transport.tls.invalid_server_name",
        Cow::Owned(format!("invalid tls server name: {host}")),
    )
    .with_category(ErrorCategory::NonRetryable)
}

/// `rustls` 在配置组装阶段拒绝给定材料（证书链、私钥、信任根）时的错误。
pub(crate) fn config_rejected_error(error: RustlsError) -> CoreError {
    CoreError::new(
        "flare.transport.tls.config_rejected",
        Cow::Owned(format!("tls configuration rejected: {error}")),
    )
    .with_cause(error)
    .with_category(ErrorCategory::NonRetryable)
}

/// webpki 校验器构建失败（例如信任根格式非法）时的配置错误。
pub(crate) fn verifier_build_error(
    error: impl std::error::Error + Send + Sync + 'static,
) -> CoreError {
    CoreError::new(
        "flare.transport.tls.config_rejected",
        Cow::Owned(format!("tls verifier construction failed: {error}")),
    )
    .with_cause(error)
    .with_category(ErrorCategory::NonRetryable)
}

fn categorize_with_rustls(error: &io::Error) -> ErrorCategory {
    if let Some(source) = error.get_ref()
        && let Some(rustls_error) = source.downcast_ref::<RustlsError>()
    {
        return categorize_rustls_error(rustls_error);
    }
    categorize_io_error(error)
}

fn categorize_rustls_error(error: &RustlsError) -> ErrorCategory {
    use RustlsError::*;
    match error {
        InappropriateMessage { .. }
        | InappropriateHandshakeMessage { .. }
        | InvalidEncryptedClientHello(_)
        | InvalidMessage(_)
        | PeerMisbehaved(_)
        | DecryptError
        | EncryptError
        | PeerSentOversizedRecord => ErrorCategory::Security(SecurityClass::Integrity),
        NoCertificatesPresented
        | InvalidCertificate(_)
        | InvalidCertRevocationList(_)
        | UnsupportedNameType => ErrorCategory::Security(SecurityClass::Authentication),
        PeerIncompatible(_) | HandshakeNotComplete | General(_) | Other(_) => {
            retryable(Duration::from_millis(80))
        }
        FailedToGetCurrentTime
        | FailedToGetRandomBytes
        | BadMaxFragmentSize
        | InconsistentKeys(_) => ErrorCategory::NonRetryable,
        AlertReceived(alert) => alert_to_category(alert),
        NoApplicationProtocol => ErrorCategory::Security(SecurityClass::Unknown),
        _ => retryable(Duration::from_millis(60)),
    }
}

fn alert_to_category(alert: &AlertDescription) -> ErrorCategory {
    use AlertDescription::*;
    match alert {
        BadCertificate
        | UnsupportedCertificate
        | CertificateRevoked
        | CertificateExpired
        | CertificateUnknown
        | UnknownCA
        | NoCertificate
        | CertificateUnobtainable
        | CertificateRequired
        | AccessDenied => ErrorCategory::Security(SecurityClass::Authentication),
        InsufficientSecurity | ProtocolVersion => {
            ErrorCategory::Security(SecurityClass::Confidentiality)
        }
        CloseNotify | UserCanceled | NoRenegotiation => retryable(Duration::from_millis(30)),
        DecodeError
        | DecryptError
        | DecryptionFailed
        | HandshakeFailure
        | IllegalParameter
        | RecordOverflow
        | BadRecordMac
        | UnexpectedMessage
        | InternalError
        | InappropriateFallback
        | MissingExtension
        | UnsupportedExtension
        | BadCertificateStatusResponse
        | BadCertificateHashValue
        | UnknownPSKIdentity
        | UnrecognisedName
        | NoApplicationProtocol
        | EncryptedClientHelloRequired
        | ExportRestriction => ErrorCategory::Security(SecurityClass::Integrity),
        DecompressionFailure => ErrorCategory::NonRetryable,
        _ => retryable(Duration::from_millis(40)),
    }
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted => retryable(Duration::from_millis(5)),
        ErrorKind::TimedOut | ErrorKind::UnexpectedEof => retryable(Duration::from_millis(40)),
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionRefused
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe => retryable(Duration::from_millis(60)),
        _ => ErrorCategory::NonRetryable,
    }
}

fn retryable(wait: Duration) -> ErrorCategory {
    ErrorCategory::Retryable(RetryAdvice::after(wait))
}
