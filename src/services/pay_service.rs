// 支付服务
// 负责预支付编排(下单 + 调起支付签名)与退款提交

use chrono::Utc;
use rsa::RsaPrivateKey;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::WechatConfig;
use crate::errors::{GatewayError, PaymentError};
use crate::models::{
    InvocationPackage, Payer, PrepayAmount, PrepayRequest, RefundAmount, RefundRequest,
};
use crate::services::GatewayClient;
use crate::utils::{generate_numeric_nonce, sign_sha256_rsa, to_minor_units, CredentialStore};

/// 支付服务
pub struct PayService {
    client: GatewayClient,
    credentials: Arc<CredentialStore>,
    config: WechatConfig,
}

impl PayService {
    pub fn new(
        client: GatewayClient,
        credentials: Arc<CredentialStore>,
        config: WechatConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            config,
        }
    }

    /// 创建预支付交易并生成调起支付参数
    ///
    /// 下单响应缺少prepay_id时，整个响应体原样作为错误载荷返回。
    /// 任一步骤失败都不会产生半填充的参数包。
    pub async fn create_prepay(
        &self,
        out_trade_no: &str,
        total: Decimal,
        description: &str,
        payer_openid: &str,
    ) -> Result<InvocationPackage, PaymentError> {
        let body = build_prepay_body(&self.config, out_trade_no, total, description, payer_openid)?;
        let response = self.client.post(&self.config.jsapi_url, body).await?;

        let prepay_id = match extract_prepay_id(&response) {
            Some(id) => id,
            None => {
                log::warn!(
                    "prepay for order {} rejected by gateway: {}",
                    out_trade_no,
                    response
                );
                return Err(PaymentError::GatewayRejected { body: response });
            }
        };

        // 第二次签名独立于传输层签名，使用当前凭证包的商户私钥
        let bundle = self.credentials.current().map_err(GatewayError::from)?;
        let package = sign_invocation(&self.config.app_id, &bundle.private_key, &prepay_id);
        log::info!("prepay created for order {}", out_trade_no);
        Ok(package)
    }

    /// 提交退款申请
    ///
    /// 退款金额超过原订单金额时本地直接拒绝，不发起网络请求。
    pub async fn refund(
        &self,
        out_trade_no: &str,
        out_refund_no: &str,
        refund: Decimal,
        total: Decimal,
    ) -> Result<String, PaymentError> {
        check_refund_amount(refund, total)?;

        let request = RefundRequest {
            out_trade_no: out_trade_no.to_string(),
            out_refund_no: out_refund_no.to_string(),
            amount: RefundAmount {
                refund: to_minor_units(refund),
                total: to_minor_units(total),
                currency: "CNY".to_string(),
            },
            notify_url: self.config.refund_notify_url.clone(),
        };
        let body = serde_json::to_string(&request)?;

        let response = self.client.post(&self.config.refunds_url, body).await?;
        log::info!(
            "refund {} submitted for order {} ({} / {})",
            out_refund_no,
            out_trade_no,
            refund,
            total
        );
        Ok(response)
    }
}

/// 退款金额不得超过原订单金额
fn check_refund_amount(refund: Decimal, total: Decimal) -> Result<(), PaymentError> {
    if refund > total {
        return Err(PaymentError::InvalidAmount { refund, total });
    }
    Ok(())
}

/// 构造JSAPI下单请求体，金额换算为分
fn build_prepay_body(
    config: &WechatConfig,
    out_trade_no: &str,
    total: Decimal,
    description: &str,
    payer_openid: &str,
) -> Result<String, serde_json::Error> {
    let request = PrepayRequest {
        appid: config.app_id.clone(),
        mchid: config.mch_id.clone(),
        description: description.to_string(),
        out_trade_no: out_trade_no.to_string(),
        notify_url: config.notify_url.clone(),
        amount: PrepayAmount::cny(to_minor_units(total)),
        payer: Payer {
            openid: payer_openid.to_string(),
        },
    };
    serde_json::to_string(&request)
}

/// 从下单响应中提取prepay_id
fn extract_prepay_id(response: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(response)
        .ok()?
        .get("prepay_id")?
        .as_str()
        .map(str::to_string)
}

/// 对prepay_id做应用层签名，生成调起支付参数包
///
/// 签名串: appid\n时间戳\nnonce\nprepay_id=xxx\n，nonce与时间戳每次新生成，
/// 参数包不可复用。
fn sign_invocation(
    app_id: &str,
    private_key: &RsaPrivateKey,
    prepay_id: &str,
) -> InvocationPackage {
    let time_stamp = Utc::now().timestamp().to_string();
    let nonce_str = generate_numeric_nonce(32);
    let package = format!("prepay_id={}", prepay_id);
    let message = format!("{}\n{}\n{}\n{}\n", app_id, time_stamp, nonce_str, package);
    let pay_sign = sign_sha256_rsa(private_key, &message);

    InvocationPackage {
        time_stamp,
        nonce_str,
        package,
        sign_type: "RSA".to_string(),
        pay_sign,
    }
}
