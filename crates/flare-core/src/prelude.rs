//! 常用契约类型的聚合出口，便于传输实现层一次性导入。
//!
//! # 契约说明（What）
//! - 仅重导出稳定 API；实验性类型不进入 prelude，避免下游对未定型接口产生依赖。

pub use crate::Result;
pub use crate::contract::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use crate::error::{CoreError, ErrorCategory, RetryAdvice};
pub use crate::security::SecurityClass;
pub use crate::time::MonotonicTimePoint;
pub use crate::transport::{ByteChannel, ShutdownDirection, TransportSocketAddr};
