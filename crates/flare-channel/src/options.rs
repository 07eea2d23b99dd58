use flare_transport_tls::{MinProtocolVersion, TlsClientOptions};

use crate::error;

/// 默认写缓冲容量（64 KiB）。
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// 主动建连通道的连接选项。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“去哪儿连、用多大的写缓冲、是否关闭 Nagle、是否启用 TLS”集中为一个
///   强类型结构：选项的类别约束由类型系统保证，不存在“传错类别的选项”
///   这种运行期错误；
/// - TLS 的启用与否用 `Option<TlsClientOptions>` 表达——存在即启用，不设
///   单独的布尔开关，避免“开关与子选项不一致”的配置状态。
///
/// ## 契约（What）
/// - `host`/`port`：目标地址，`host` 不得为空；
/// - `buffer_size`：写缓冲容量，必须大于零，在通道整个生命周期内固定；
/// - `no_delay`：为 `true` 时关闭 Nagle 合并；keep-alive 始终开启，不可配置；
/// - `tls`：客户端 TLS 子选项，见
///   [`TlsClientOptions`](flare_transport_tls::TlsClientOptions)；
/// - [`validate`](ChannelOptions::validate) 在通道构造入口被调用，违规配置
///   立即同步失败，绝不推迟到建连时。
#[derive(Clone, Debug)]
pub struct ChannelOptions {
    /// 目标主机名或 IP 字面量。
    pub host: String,
    /// 目标端口。
    pub port: u16,
    /// 写缓冲容量（字节）。
    pub buffer_size: usize,
    /// 是否关闭 Nagle 合并。
    pub no_delay: bool,
    /// 客户端 TLS 子选项；`None` 表示明文连接。
    pub tls: Option<TlsClientOptions>,
}

impl ChannelOptions {
    /// 以默认缓冲与明文传输构造选项。
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            buffer_size: DEFAULT_BUFFER_SIZE,
            no_delay: false,
            tls: None,
        }
    }

    /// 设置写缓冲容量。
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// 设置是否关闭 Nagle 合并。
    pub fn with_no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// 启用 TLS 并注入客户端子选项。
    pub fn with_tls(mut self, tls: TlsClientOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// 入口校验：违规配置立即失败。
    pub(crate) fn validate(&self) -> flare_core::Result<()> {
        if self.host.is_empty() {
            return Err(error::invalid_options_error("host must not be empty"));
        }
        if self.buffer_size == 0 {
            return Err(error::invalid_options_error("buffer_size must be non-zero"));
        }
        Ok(())
    }
}

/// 接受端通道的默认选项。
///
/// # 契约（What）
/// - `buffer_size`：写缓冲容量，语义同 [`ChannelOptions::buffer_size`]；
/// - `min_protocol_version`：推导“安全连接”属性时使用的协议版本下限——
///   已接受端点协商出的版本不低于该下限时，通道才被视为安全连接。
#[derive(Clone, Debug)]
pub struct AcceptedChannelOptions {
    /// 写缓冲容量（字节）。
    pub buffer_size: usize,
    /// 推导安全属性的协议版本下限。
    pub min_protocol_version: MinProtocolVersion,
}

impl Default for AcceptedChannelOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            min_protocol_version: MinProtocolVersion::default(),
        }
    }
}

impl AcceptedChannelOptions {
    pub(crate) fn validate(&self) -> flare_core::Result<()> {
        if self.buffer_size == 0 {
            return Err(error::invalid_options_error("buffer_size must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 空主机名与零缓冲都是入口即拒的配置错误。
    #[test]
    fn entry_validation_rejects_degenerate_options() {
        assert!(ChannelOptions::new("", 5060).validate().is_err());
        assert!(
            ChannelOptions::new("localhost", 5060)
                .with_buffer_size(0)
                .validate()
                .is_err()
        );
        assert!(ChannelOptions::new("localhost", 5060).validate().is_ok());

        let accepted = AcceptedChannelOptions {
            buffer_size: 0,
            ..AcceptedChannelOptions::default()
        };
        assert!(accepted.validate().is_err());
    }
}
