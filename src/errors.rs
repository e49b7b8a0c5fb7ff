// 错误类型定义
// 网关调用、支付编排与订单状态机的结构化错误

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::OrderStatus;
use crate::utils::ResolutionError;

/// 网关HTTP调用错误
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 请求超时
    #[error("gateway request timed out")]
    Timeout,
    /// 网络传输失败
    #[error("gateway transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// 非2xx响应，保留响应体供诊断
    #[error("gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// 网关URL无法解析
    #[error("invalid gateway url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// 网关响应验签失败
    #[error("gateway response signature verification failed: {0}")]
    SignatureVerification(String),
    /// 凭证不可用
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// 支付编排错误
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// 网关受理失败，原样保留响应体，不猜测错误码
    #[error("gateway rejected the request: {body}")]
    GatewayRejected { body: String },
    /// 退款金额超过原订单金额，本地直接拒绝
    #[error("refund amount {refund} exceeds order total {total}")]
    InvalidAmount { refund: Decimal, total: Decimal },
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 订单操作错误
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(i64),
    /// 网关通知携带的商户订单号在本地不存在
    #[error("order with number {0} not found")]
    NumberNotFound(String),
    /// 状态机不允许的迁移，订单保持原状态
    #[error("illegal order transition from {from:?} to {to:?}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    /// 状态已迁移但退款提交失败，订单带退款失败标记等待人工对账
    #[error("order moved to {status:?} but refund submission failed: {source}")]
    RefundFailed {
        status: OrderStatus,
        #[source]
        source: PaymentError,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
