// 健康检查API处理器

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Serialize;

use crate::state::AppState;

/// 系统健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本信息
    pub version: String,
    /// 数据库连接状态
    pub database: String,
    /// 支付凭证状态
    pub credentials: String,
    /// 当前时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// 基础健康检查
///
/// GET /health
///
/// 无需认证
/// 响应: HealthResponse
pub async fn health_check(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let mut health = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: "connected".to_string(),
        credentials: "resolved".to_string(),
        timestamp: chrono::Utc::now(),
    };

    // 检查数据库连接
    if let Err(e) = sqlx::query("SELECT 1").fetch_one(&data.db_pool).await {
        log::error!("database health check failed: {}", e);
        health.database = "disconnected".to_string();
        health.status = "unhealthy".to_string();
    }

    // 检查凭证缓存可用性，不触发重新解析之外的IO
    if let Err(e) = data.credentials.current() {
        log::warn!("credential health check failed: {}", e);
        health.credentials = "unavailable".to_string();
        if health.status == "healthy" {
            health.status = "degraded".to_string();
        }
    }

    let response = match health.status.as_str() {
        "unhealthy" => HttpResponse::ServiceUnavailable().json(health),
        _ => HttpResponse::Ok().json(health),
    };
    Ok(response)
}
