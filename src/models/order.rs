// 订单数据模型
// 定义订单、订单状态机及管理端查询相关的数据结构

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 订单模型
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Order {
    /// 订单唯一标识符
    pub id: i64,
    /// 商户订单号 (对网关的幂等键 out_trade_no)
    pub number: String,
    /// 下单用户的openid
    pub payer_openid: String,
    /// 订单状态
    pub status: OrderStatus,
    /// 支付状态
    pub pay_status: PayStatus,
    /// 订单总金额 (元)
    pub amount: Decimal,
    /// 商品描述
    pub description: String,
    /// 下单时间
    pub create_time: DateTime<Utc>,
    /// 支付完成时间
    pub checkout_time: Option<DateTime<Utc>>,
    /// 接单时间
    pub confirm_time: Option<DateTime<Utc>>,
    /// 派送时间
    pub delivery_time: Option<DateTime<Utc>>,
    /// 完成时间
    pub complete_time: Option<DateTime<Utc>>,
    /// 拒单原因
    pub rejection_reason: Option<String>,
    /// 取消原因
    pub cancel_reason: Option<String>,
    /// 退款提交失败标记，等待人工对账
    pub refund_failed: bool,
}

/// 订单状态枚举
///
/// 主线: PendingPayment -> ToBeConfirmed -> Confirmed -> DeliveryInProgress -> Completed
/// 分支: ToBeConfirmed -> Rejected; {PendingPayment, ToBeConfirmed} -> Cancelled
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "varchar")]
pub enum OrderStatus {
    /// 待付款
    #[sqlx(rename = "pending_payment")]
    PendingPayment,
    /// 待接单
    #[sqlx(rename = "to_be_confirmed")]
    ToBeConfirmed,
    /// 已接单
    #[sqlx(rename = "confirmed")]
    Confirmed,
    /// 派送中
    #[sqlx(rename = "delivery_in_progress")]
    DeliveryInProgress,
    /// 已完成 (终态)
    #[sqlx(rename = "completed")]
    Completed,
    /// 已拒单 (终态)
    #[sqlx(rename = "rejected")]
    Rejected,
    /// 已取消 (终态)
    #[sqlx(rename = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// 是否为终态。终态订单不接受任何后续操作
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// 目标状态的合法前驱集合
    fn legal_predecessors(to: OrderStatus) -> &'static [OrderStatus] {
        match to {
            OrderStatus::PendingPayment => &[],
            OrderStatus::ToBeConfirmed => &[OrderStatus::PendingPayment],
            OrderStatus::Confirmed => &[OrderStatus::ToBeConfirmed],
            OrderStatus::DeliveryInProgress => &[OrderStatus::Confirmed],
            OrderStatus::Completed => &[OrderStatus::DeliveryInProgress],
            OrderStatus::Rejected => &[OrderStatus::ToBeConfirmed],
            OrderStatus::Cancelled => &[OrderStatus::PendingPayment, OrderStatus::ToBeConfirmed],
        }
    }

    /// 状态机合法性检查，不允许跨状态跳转
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        Self::legal_predecessors(to).contains(self)
    }
}

/// 支付状态枚举
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "varchar")]
pub enum PayStatus {
    /// 未支付
    #[sqlx(rename = "unpaid")]
    Unpaid,
    /// 已支付
    #[sqlx(rename = "paid")]
    Paid,
    /// 已退款
    #[sqlx(rename = "refunded")]
    Refunded,
}

impl Order {
    /// 订单是否已有实际支付，拒单/取消时需要退款
    pub fn requires_refund(&self) -> bool {
        self.pay_status == PayStatus::Paid
    }
}

/// 拒单请求
#[derive(Debug, Deserialize)]
pub struct OrderRejectionRequest {
    pub id: i64,
    pub rejection_reason: String,
}

/// 取消订单请求
#[derive(Debug, Deserialize)]
pub struct OrderCancelRequest {
    pub id: i64,
    pub cancel_reason: String,
}

/// 接单请求
#[derive(Debug, Deserialize)]
pub struct OrderConfirmRequest {
    pub id: i64,
}

/// 订单搜索查询参数
#[derive(Debug, Deserialize)]
pub struct OrderPageQuery {
    /// 页码 (从1开始)
    pub page: Option<u32>,
    /// 每页数量 (默认20，最大100)
    pub limit: Option<u32>,
    /// 商户订单号过滤
    pub number: Option<String>,
    /// 状态过滤
    pub status: Option<OrderStatus>,
    /// 下单开始时间
    pub begin_time: Option<DateTime<Utc>>,
    /// 下单结束时间
    pub end_time: Option<DateTime<Utc>>,
}

impl OrderPageQuery {
    /// 页码与每页数量来自查询串，宽整型相乘避免越界
    pub fn offset(&self) -> u64 {
        (u64::from(self.page.unwrap_or(1).max(1)) - 1) * u64::from(self.limit())
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

/// 订单搜索响应
#[derive(Debug, Serialize)]
pub struct OrderPageResponse {
    pub orders: Vec<Order>,
    pub pagination: PaginationInfo,
}

/// 分页信息
#[derive(Debug, Serialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl PaginationInfo {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = ((total as f64) / (limit as f64)).ceil() as u32;
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// 各状态订单数量统计
#[derive(Debug, Default, Serialize)]
pub struct OrderStatistics {
    pub pending_payment: i64,
    pub to_be_confirmed: i64,
    pub confirmed: i64,
    pub delivery_in_progress: i64,
    pub completed: i64,
    pub rejected: i64,
    pub cancelled: i64,
}

impl OrderStatistics {
    /// 由 GROUP BY status 的计数行聚合
    pub fn from_counts(counts: impl IntoIterator<Item = (OrderStatus, i64)>) -> Self {
        let mut stats = OrderStatistics::default();
        for (status, count) in counts {
            match status {
                OrderStatus::PendingPayment => stats.pending_payment = count,
                OrderStatus::ToBeConfirmed => stats.to_be_confirmed = count,
                OrderStatus::Confirmed => stats.confirmed = count,
                OrderStatus::DeliveryInProgress => stats.delivery_in_progress = count,
                OrderStatus::Completed => stats.completed = count,
                OrderStatus::Rejected => stats.rejected = count,
                OrderStatus::Cancelled => stats.cancelled = count,
            }
        }
        stats
    }
}
