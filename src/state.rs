// 应用状态管理
// 包含数据库连接池、配置信息与各业务服务的全局状态

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::services::{OrderService, PayService};
use crate::utils::CredentialStore;

/// 应用全局状态
pub struct AppState {
    /// 数据库连接池
    pub db_pool: PgPool,
    /// 应用配置
    pub config: Config,
    /// 支付凭证存取器
    pub credentials: Arc<CredentialStore>,
    /// 支付服务
    pub pay_service: Arc<PayService>,
    /// 订单服务
    pub order_service: Arc<OrderService>,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        config: Config,
        credentials: Arc<CredentialStore>,
        pay_service: Arc<PayService>,
        order_service: Arc<OrderService>,
    ) -> Self {
        Self {
            db_pool,
            config,
            credentials,
            pay_service,
            order_service,
        }
    }
}
