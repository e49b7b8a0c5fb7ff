// API路由配置
// 定义所有HTTP接口的路由规则

use actix_web::{web, Scope};

use crate::handlers::*;

/// API v1路由配置
pub fn api_v1_routes() -> Scope {
    web::scope("/api/v1")
        // 管理端订单路由
        .service(admin_order_routes())
        // 管理端支付凭证路由
        .service(admin_pay_routes())
        // 用户端支付路由
        .service(user_order_routes())
        // 网关通知路由
        .service(notify_routes())
}

/// 管理端订单路由
fn admin_order_routes() -> Scope {
    web::scope("/admin/orders")
        .route("/conditionSearch", web::get().to(condition_search))
        .route("/statistics", web::get().to(statistics))
        .route("/details/{id}", web::get().to(details))
        .route("/confirm", web::put().to(confirm))
        .route("/rejection", web::put().to(rejection))
        .route("/cancel", web::put().to(cancel))
        .route("/delivery/{id}", web::put().to(delivery))
        .route("/complete/{id}", web::put().to(complete))
}

/// 管理端支付凭证路由
fn admin_pay_routes() -> Scope {
    web::scope("/admin/pay").route("/credentials", web::put().to(reload_credentials))
}

/// 用户端支付路由
fn user_order_routes() -> Scope {
    web::scope("/user/orders").route("/{id}/payment", web::post().to(order_payment))
}

/// 网关通知路由
fn notify_routes() -> Scope {
    web::scope("/notify").route("/pay", web::post().to(pay_notify))
}

/// 公共路由 (无需认证)
pub fn public_routes() -> Scope {
    web::scope("").route("/health", web::get().to(health_check))
}
