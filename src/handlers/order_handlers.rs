// 管理端订单API处理器
// 处理订单搜索、统计、详情及各状态操作的HTTP请求

use actix_web::{web, HttpResponse, Result as ActixResult};

use crate::errors::{OrderError, PaymentError};
use crate::models::{
    ApiResponse, OrderCancelRequest, OrderConfirmRequest, OrderPageQuery, OrderRejectionRequest,
};
use crate::state::AppState;

/// 订单条件搜索
///
/// GET /api/v1/admin/orders/conditionSearch
///
/// 查询参数: OrderPageQuery
/// 响应: OrderPageResponse
pub async fn condition_search(
    data: web::Data<AppState>,
    query: web::Query<OrderPageQuery>,
) -> ActixResult<HttpResponse> {
    match data.order_service.search(query.into_inner()).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 各状态订单数量统计
///
/// GET /api/v1/admin/orders/statistics
///
/// 响应: OrderStatistics
pub async fn statistics(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    match data.order_service.statistics().await {
        Ok(stats) => Ok(HttpResponse::Ok().json(ApiResponse::success(stats))),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 订单详情
///
/// GET /api/v1/admin/orders/details/{id}
///
/// 响应: Order
pub async fn details(
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    match data.order_service.details(path.into_inner()).await {
        Ok(order) => Ok(HttpResponse::Ok().json(ApiResponse::success(order))),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 接单
///
/// PUT /api/v1/admin/orders/confirm
///
/// 请求体: OrderConfirmRequest
pub async fn confirm(
    data: web::Data<AppState>,
    request: web::Json<OrderConfirmRequest>,
) -> ActixResult<HttpResponse> {
    match data.order_service.confirm(request.id).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data())),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 拒单，已支付订单联动全额退款
///
/// PUT /api/v1/admin/orders/rejection
///
/// 请求体: OrderRejectionRequest
pub async fn rejection(
    data: web::Data<AppState>,
    request: web::Json<OrderRejectionRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();
    match data
        .order_service
        .reject(request.id, request.rejection_reason)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data())),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 取消订单，已支付订单联动全额退款
///
/// PUT /api/v1/admin/orders/cancel
///
/// 请求体: OrderCancelRequest
pub async fn cancel(
    data: web::Data<AppState>,
    request: web::Json<OrderCancelRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();
    match data
        .order_service
        .cancel(request.id, request.cancel_reason)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data())),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 派送订单
///
/// PUT /api/v1/admin/orders/delivery/{id}
pub async fn delivery(
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    match data.order_service.deliver(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data())),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 完成订单
///
/// PUT /api/v1/admin/orders/complete/{id}
pub async fn complete(
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    match data.order_service.complete(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data())),
        Err(e) => Ok(order_error_response(e)),
    }
}

/// 订单错误到HTTP响应的统一映射
pub(crate) fn order_error_response(e: OrderError) -> HttpResponse {
    match &e {
        OrderError::NotFound(_) | OrderError::NumberNotFound(_) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error(404, e.to_string()))
        }
        // 状态已迁移但退款失败，订单侧操作算完成，资金侧留给人工对账
        OrderError::RefundFailed { .. } => {
            HttpResponse::BadGateway().json(ApiResponse::<()>::error(502, e.to_string()))
        }
        OrderError::IllegalTransition { .. } => {
            HttpResponse::Conflict().json(ApiResponse::<()>::error(409, e.to_string()))
        }
        OrderError::Database(db) => {
            log::error!("database error: {}", db);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(500, "Internal server error"))
        }
    }
}

/// 支付错误到HTTP响应的统一映射
pub(crate) fn payment_error_response(e: PaymentError) -> HttpResponse {
    match &e {
        PaymentError::InvalidAmount { .. } => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, e.to_string()))
        }
        PaymentError::Gateway(gateway) => {
            log::warn!("gateway error: {}", gateway);
            HttpResponse::BadGateway().json(ApiResponse::<()>::error(502, e.to_string()))
        }
        PaymentError::GatewayRejected { .. } => {
            HttpResponse::BadGateway().json(ApiResponse::<()>::error(502, e.to_string()))
        }
        PaymentError::Encode(encode) => {
            log::error!("request encoding failed: {}", encode);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(500, "Internal server error"))
        }
    }
}
