// 订单服务
// 管理端订单操作的状态机检查、状态迁移与退款联动

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::OrderError;
use crate::models::{
    Order, OrderPageQuery, OrderPageResponse, OrderStatistics, OrderStatus, PaginationInfo,
    PayStatus,
};
use crate::services::PayService;

/// 订单服务
pub struct OrderService {
    pool: PgPool,
    pay: Arc<PayService>,
}

impl OrderService {
    pub fn new(pool: PgPool, pay: Arc<PayService>) -> Self {
        Self { pool, pay }
    }

    /// 根据ID加载订单
    pub async fn details(&self, id: i64) -> Result<Order, OrderError> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    /// 订单条件搜索
    pub async fn search(&self, query: OrderPageQuery) -> Result<OrderPageResponse, OrderError> {
        let mut count_builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        push_filters(&mut count_builder, &query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT * FROM orders WHERE 1=1");
        push_filters(&mut builder, &query);
        builder.push(" ORDER BY create_time DESC LIMIT ");
        builder.push_bind(query.limit() as i64);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset() as i64);

        let orders = builder
            .build_query_as::<Order>()
            .fetch_all(&self.pool)
            .await?;

        Ok(OrderPageResponse {
            orders,
            pagination: PaginationInfo::new(query.page.unwrap_or(1), query.limit(), total as u64),
        })
    }

    /// 各状态订单数量统计
    pub async fn statistics(&self) -> Result<OrderStatistics, OrderError> {
        let counts = sqlx::query_as::<_, (OrderStatus, i64)>(
            "SELECT status, COUNT(*) FROM orders GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(OrderStatistics::from_counts(counts))
    }

    /// 接单: 待接单 -> 已接单
    pub async fn confirm(&self, id: i64) -> Result<(), OrderError> {
        let order = self.details(id).await?;
        ensure_legal(&order, OrderStatus::Confirmed)?;

        let rows = sqlx::query(
            "UPDATE orders SET status = $1, confirm_time = $2 WHERE id = $3 AND status = $4",
        )
        .bind(OrderStatus::Confirmed)
        .bind(Utc::now())
        .bind(order.id)
        .bind(order.status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        check_applied(rows, &order, OrderStatus::Confirmed)?;
        log::info!("order {} confirmed", id);
        Ok(())
    }

    /// 拒单: 待接单 -> 已拒单，已支付订单联动全额退款
    pub async fn reject(&self, id: i64, reason: String) -> Result<(), OrderError> {
        let order = self.details(id).await?;
        ensure_legal(&order, OrderStatus::Rejected)?;

        let rows = sqlx::query(
            "UPDATE orders SET status = $1, rejection_reason = $2 WHERE id = $3 AND status = $4",
        )
        .bind(OrderStatus::Rejected)
        .bind(reason)
        .bind(order.id)
        .bind(order.status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        check_applied(rows, &order, OrderStatus::Rejected)?;
        log::info!("order {} rejected", id);
        self.settle_refund(&order, OrderStatus::Rejected).await
    }

    /// 取消订单: 待付款/待接单 -> 已取消，已支付订单联动全额退款
    pub async fn cancel(&self, id: i64, reason: String) -> Result<(), OrderError> {
        let order = self.details(id).await?;
        ensure_legal(&order, OrderStatus::Cancelled)?;

        let rows = sqlx::query(
            "UPDATE orders SET status = $1, cancel_reason = $2 WHERE id = $3 AND status = $4",
        )
        .bind(OrderStatus::Cancelled)
        .bind(reason)
        .bind(order.id)
        .bind(order.status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        check_applied(rows, &order, OrderStatus::Cancelled)?;
        log::info!("order {} cancelled", id);
        self.settle_refund(&order, OrderStatus::Cancelled).await
    }

    /// 派送订单: 已接单 -> 派送中
    pub async fn deliver(&self, id: i64) -> Result<(), OrderError> {
        let order = self.details(id).await?;
        ensure_legal(&order, OrderStatus::DeliveryInProgress)?;

        let rows = sqlx::query(
            "UPDATE orders SET status = $1, delivery_time = $2 WHERE id = $3 AND status = $4",
        )
        .bind(OrderStatus::DeliveryInProgress)
        .bind(Utc::now())
        .bind(order.id)
        .bind(order.status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        check_applied(rows, &order, OrderStatus::DeliveryInProgress)?;
        log::info!("order {} out for delivery", id);
        Ok(())
    }

    /// 完成订单: 派送中 -> 已完成
    pub async fn complete(&self, id: i64) -> Result<(), OrderError> {
        let order = self.details(id).await?;
        ensure_legal(&order, OrderStatus::Completed)?;

        let rows = sqlx::query(
            "UPDATE orders SET status = $1, complete_time = $2 WHERE id = $3 AND status = $4",
        )
        .bind(OrderStatus::Completed)
        .bind(Utc::now())
        .bind(order.id)
        .bind(order.status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        check_applied(rows, &order, OrderStatus::Completed)?;
        log::info!("order {} completed", id);
        Ok(())
    }

    /// 支付成功入口: 待付款 -> 待接单，记录支付时间
    pub async fn pay_success(&self, out_trade_no: &str) -> Result<(), OrderError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE number = $1")
            .bind(out_trade_no)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OrderError::NumberNotFound(out_trade_no.to_string()))?;
        ensure_legal(&order, OrderStatus::ToBeConfirmed)?;

        let rows = sqlx::query(
            "UPDATE orders SET status = $1, pay_status = $2, checkout_time = $3 \
             WHERE id = $4 AND status = $5",
        )
        .bind(OrderStatus::ToBeConfirmed)
        .bind(PayStatus::Paid)
        .bind(Utc::now())
        .bind(order.id)
        .bind(order.status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        check_applied(rows, &order, OrderStatus::ToBeConfirmed)?;
        log::info!("order {} paid, awaiting confirmation", order.number);
        Ok(())
    }

    /// 已支付订单的退款联动
    ///
    /// 状态迁移与资金流向是两套独立账目：退款失败只做标记并上报，
    /// 不回滚已完成的状态迁移，留待人工对账。
    async fn settle_refund(&self, order: &Order, status: OrderStatus) -> Result<(), OrderError> {
        let plan = match plan_refund(order) {
            Some(plan) => plan,
            None => return Ok(()),
        };

        match self
            .pay
            .refund(&order.number, &plan.out_refund_no, plan.refund, plan.total)
            .await
        {
            Ok(_) => {
                sqlx::query("UPDATE orders SET pay_status = $1 WHERE id = $2")
                    .bind(PayStatus::Refunded)
                    .bind(order.id)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "refund for order {} failed, flagged for manual reconciliation: {}",
                    order.id,
                    e
                );
                sqlx::query("UPDATE orders SET refund_failed = TRUE WHERE id = $1")
                    .bind(order.id)
                    .execute(&self.pool)
                    .await?;
                Err(OrderError::RefundFailed { status, source: e })
            }
        }
    }
}

/// 全额退款计划
#[derive(Debug)]
struct RefundPlan {
    out_refund_no: String,
    refund: Decimal,
    total: Decimal,
}

/// 只有已支付订单需要退款，退款金额与原订单金额一致；
/// 退款单号每次尝试重新生成，失败重试不会与上一次冲突
fn plan_refund(order: &Order) -> Option<RefundPlan> {
    if !order.requires_refund() {
        return None;
    }
    Some(RefundPlan {
        out_refund_no: format!("R{}", Uuid::new_v4().simple()),
        refund: order.amount,
        total: order.amount,
    })
}

/// 状态机合法性检查，非法迁移不触库
fn ensure_legal(order: &Order, to: OrderStatus) -> Result<(), OrderError> {
    if !order.status.can_transition_to(to) {
        return Err(OrderError::IllegalTransition {
            from: order.status,
            to,
        });
    }
    Ok(())
}

/// 条件更新未命中说明订单被并发迁移，同样按IllegalTransition上报
fn check_applied(rows: u64, order: &Order, to: OrderStatus) -> Result<(), OrderError> {
    if rows == 0 {
        return Err(OrderError::IllegalTransition {
            from: order.status,
            to,
        });
    }
    Ok(())
}

/// 搜索条件拼接，所有值走参数绑定
fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, query: &OrderPageQuery) {
    if let Some(number) = &query.number {
        builder.push(" AND number = ");
        builder.push_bind(number.clone());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(begin) = query.begin_time {
        builder.push(" AND create_time >= ");
        builder.push_bind(begin);
    }
    if let Some(end) = query.end_time {
        builder.push(" AND create_time <= ");
        builder.push_bind(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaymentError;
    use std::str::FromStr;

    fn paid_order(amount: &str) -> Order {
        Order {
            id: 7,
            number: "ORDER_007".to_string(),
            payer_openid: "oid".to_string(),
            status: OrderStatus::ToBeConfirmed,
            pay_status: PayStatus::Paid,
            amount: Decimal::from_str(amount).unwrap(),
            description: "外卖订单".to_string(),
            create_time: Utc::now(),
            checkout_time: Some(Utc::now()),
            confirm_time: None,
            delivery_time: None,
            complete_time: None,
            rejection_reason: None,
            cancel_reason: None,
            refund_failed: false,
        }
    }

    #[test]
    fn test_paid_order_refunds_full_amount() {
        let order = paid_order("50.00");
        let plan = plan_refund(&order).unwrap();
        assert_eq!(plan.refund, Decimal::from_str("50.00").unwrap());
        assert_eq!(plan.total, Decimal::from_str("50.00").unwrap());
        assert!(plan.out_refund_no.starts_with('R'));
    }

    #[test]
    fn test_each_refund_attempt_gets_fresh_refund_no() {
        let order = paid_order("50.00");
        let first = plan_refund(&order).unwrap();
        let second = plan_refund(&order).unwrap();
        assert_ne!(first.out_refund_no, second.out_refund_no);
    }

    #[test]
    fn test_unpaid_and_refunded_orders_need_no_refund() {
        let mut order = paid_order("50.00");
        order.pay_status = PayStatus::Unpaid;
        assert!(plan_refund(&order).is_none());
        order.pay_status = PayStatus::Refunded;
        assert!(plan_refund(&order).is_none());
    }

    #[test]
    fn test_refund_failure_keeps_reached_status() {
        // 拒单已生效，退款失败只在错误中携带已到达的状态
        let error = OrderError::RefundFailed {
            status: OrderStatus::Rejected,
            source: PaymentError::GatewayRejected {
                body: "{\"code\":\"SYSTEM_ERROR\"}".to_string(),
            },
        };
        let rendered = error.to_string();
        assert!(rendered.contains("Rejected"));
        assert!(rendered.contains("refund submission failed"));
    }

    #[test]
    fn test_missing_trade_number_reported_verbatim() {
        let error = OrderError::NumberNotFound("ORDER_MISSING".to_string());
        assert!(error.to_string().contains("ORDER_MISSING"));
    }
}
