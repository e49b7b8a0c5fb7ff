// 支付网关数据模型
// 定义下单/退款请求体与调起支付参数的线格式

use serde::{Deserialize, Serialize};

/// JSAPI下单请求体
#[derive(Debug, Clone, Serialize)]
pub struct PrepayRequest {
    /// 应用ID
    pub appid: String,
    /// 商户号
    pub mchid: String,
    /// 商品描述
    pub description: String,
    /// 商户订单号，网关以此去重
    pub out_trade_no: String,
    /// 支付结果通知地址
    pub notify_url: String,
    /// 订单金额
    pub amount: PrepayAmount,
    /// 支付者
    pub payer: Payer,
}

/// 下单金额，单位为分
#[derive(Debug, Clone, Serialize)]
pub struct PrepayAmount {
    pub total: i64,
    pub currency: String,
}

impl PrepayAmount {
    pub fn cny(total: i64) -> Self {
        Self {
            total,
            currency: "CNY".to_string(),
        }
    }
}

/// 支付者
#[derive(Debug, Clone, Serialize)]
pub struct Payer {
    pub openid: String,
}

/// 退款请求体
#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    /// 商户订单号
    pub out_trade_no: String,
    /// 商户退款单号，每次退款尝试唯一
    pub out_refund_no: String,
    /// 退款金额
    pub amount: RefundAmount,
    /// 退款结果通知地址
    pub notify_url: String,
}

/// 退款金额，单位为分
#[derive(Debug, Clone, Serialize)]
pub struct RefundAmount {
    /// 本次退款金额
    pub refund: i64,
    /// 原订单金额
    pub total: i64,
    pub currency: String,
}

/// 调起支付参数包
///
/// 小程序端调起支付UI所需的完整参数，签名与四个字段要么全有要么全无。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationPackage {
    /// 秒级时间戳 (字符串类型)
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    /// 32位数字随机串，每次调用重新生成
    #[serde(rename = "nonceStr")]
    pub nonce_str: String,
    /// 形如 prepay_id=xxx
    pub package: String,
    /// 固定为 RSA
    #[serde(rename = "signType")]
    pub sign_type: String,
    /// Base64编码的SHA256withRSA签名
    #[serde(rename = "paySign")]
    pub pay_sign: String,
}

/// 用户发起支付的请求
#[derive(Debug, Deserialize)]
pub struct OrderPaymentRequest {
    /// 支付用户的openid；缺省时使用订单记录的openid
    pub openid: Option<String>,
}

/// 支付成功通知 (解密后的最小字段集)
#[derive(Debug, Deserialize)]
pub struct PaySuccessNotification {
    pub out_trade_no: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepay_request_wire_format() {
        let request = PrepayRequest {
            appid: "wx123".to_string(),
            mchid: "1900000001".to_string(),
            description: "外卖订单".to_string(),
            out_trade_no: "ORDER_001".to_string(),
            notify_url: "https://example.com/notify".to_string(),
            amount: PrepayAmount::cny(8850),
            payer: Payer {
                openid: "openid-abc".to_string(),
            },
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(json["appid"], "wx123");
        assert_eq!(json["amount"]["total"], 8850);
        assert_eq!(json["amount"]["currency"], "CNY");
        assert_eq!(json["payer"]["openid"], "openid-abc");
    }

    #[test]
    fn test_invocation_package_field_names() {
        let package = InvocationPackage {
            time_stamp: "1700000000".to_string(),
            nonce_str: "1".repeat(32),
            package: "prepay_id=abc123".to_string(),
            sign_type: "RSA".to_string(),
            pay_sign: "c2ln".to_string(),
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&package).unwrap()).unwrap();
        // 客户端SDK对字段名大小写敏感
        assert!(json.get("timeStamp").is_some());
        assert!(json.get("nonceStr").is_some());
        assert!(json.get("signType").is_some());
        assert!(json.get("paySign").is_some());
    }
}
