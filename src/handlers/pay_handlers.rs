// 支付API处理器
// 处理用户支付发起、网关支付结果通知与凭证热加载

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Serialize;

use crate::handlers::order_handlers::{order_error_response, payment_error_response};
use crate::models::{ApiResponse, OrderPaymentRequest, OrderStatus, PaySuccessNotification};
use crate::state::AppState;

/// 网关通知的应答格式
#[derive(Debug, Serialize)]
struct NotifyReply {
    code: &'static str,
    message: String,
}

/// 用户发起订单支付
///
/// POST /api/v1/user/orders/{id}/payment
///
/// 请求体: OrderPaymentRequest
/// 响应: InvocationPackage (调起支付参数包)
pub async fn order_payment(
    data: web::Data<AppState>,
    path: web::Path<i64>,
    request: web::Json<OrderPaymentRequest>,
) -> ActixResult<HttpResponse> {
    let order = match data.order_service.details(path.into_inner()).await {
        Ok(order) => order,
        Err(e) => return Ok(order_error_response(e)),
    };

    // 只有待付款订单可以发起支付
    if order.status != OrderStatus::PendingPayment {
        return Ok(HttpResponse::Conflict().json(ApiResponse::<()>::error(
            409,
            format!("order {} is not awaiting payment", order.id),
        )));
    }

    let openid = request
        .into_inner()
        .openid
        .unwrap_or_else(|| order.payer_openid.clone());

    match data
        .pay_service
        .create_prepay(&order.number, order.amount, &order.description, &openid)
        .await
    {
        Ok(package) => Ok(HttpResponse::Ok().json(ApiResponse::success(package))),
        Err(e) => Ok(payment_error_response(e)),
    }
}

/// 网关支付成功通知
///
/// POST /api/v1/notify/pay
///
/// 请求体: PaySuccessNotification
/// 应答: 网关约定的 code=SUCCESS/FAIL
pub async fn pay_notify(
    data: web::Data<AppState>,
    notification: web::Json<PaySuccessNotification>,
) -> ActixResult<HttpResponse> {
    match data
        .order_service
        .pay_success(&notification.out_trade_no)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(NotifyReply {
            code: "SUCCESS",
            message: String::new(),
        })),
        Err(e) => {
            // 应答FAIL后网关会按自己的节奏重试
            log::warn!(
                "pay notification for {} not applied: {}",
                notification.out_trade_no,
                e
            );
            Ok(HttpResponse::InternalServerError().json(NotifyReply {
                code: "FAIL",
                message: e.to_string(),
            }))
        }
    }
}

/// 凭证热加载
///
/// PUT /api/v1/admin/pay/credentials
///
/// 重新执行凭证解析，成功后替换缓存的凭证包；失败时保留原缓存，
/// 响应体携带完整的候选路径探查报告。
pub async fn reload_credentials(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    match data.credentials.reload() {
        Ok(bundle) => {
            log::info!(
                "payment credentials reloaded, merchant serial {}",
                bundle.mch_serial_no
            );
            Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data()))
        }
        Err(e) => {
            log::error!("credential reload failed: {}", e);
            Ok(HttpResponse::ServiceUnavailable()
                .json(ApiResponse::<()>::error(503, e.to_string())))
        }
    }
}
