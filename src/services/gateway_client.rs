// 网关签名客户端
// 出站请求附加传输层签名，入站响应按平台证书验签

use chrono::Utc;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::GatewayError;
use crate::utils::{
    generate_secure_random_string, sign_sha256_rsa, verify_sha256_rsa, CredentialBundle,
    CredentialStore,
};

/// 传输层签名的认证方案标识
const AUTH_SCHEMA: &str = "WECHATPAY2-SHA256-RSA2048";

/// 网关签名客户端
///
/// 每次调用从凭证存取器取当前凭证包；调用方不做重试，
/// 幂等性依赖 out_trade_no / out_refund_no。
pub struct GatewayClient {
    http: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl GatewayClient {
    pub fn new(credentials: Arc<CredentialStore>, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http, credentials })
    }

    /// 发送POST请求，返回响应体
    ///
    /// 超时、传输失败、非2xx、验签失败分别以不同的GatewayError上报。
    pub async fn post(&self, url: &str, body: String) -> Result<String, GatewayError> {
        let bundle = self.credentials.current()?;

        let parsed = reqwest::Url::parse(url).map_err(|e| GatewayError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let timestamp = Utc::now().timestamp();
        let nonce = generate_secure_random_string(32);
        let message = build_sign_message("POST", &path_and_query(&parsed), timestamp, &nonce, &body);
        let signature = sign_sha256_rsa(&bundle.private_key, &message);
        let authorization = build_auth_header(
            &bundle.mch_id,
            &nonce,
            &signature,
            timestamp,
            &bundle.mch_serial_no,
        );

        log::info!("gateway POST {}", url);

        let response = self
            .http
            .post(parsed)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header("Wechatpay-Serial", &bundle.mch_serial_no)
            .header(AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            log::warn!("gateway returned HTTP {}: {}", status, response_body);
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: response_body,
            });
        }

        verify_response(&bundle, &headers, &response_body)?;
        Ok(response_body)
    }
}

/// 参与签名的规范化path+query
fn path_and_query(url: &reqwest::Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// 超时与其他传输失败分开上报，响应体读取阶段同样适用
fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e)
    }
}

/// 传输层签名串: METHOD\npath\ntimestamp\nnonce\nbody\n
fn build_sign_message(
    method: &str,
    path_and_query: &str,
    timestamp: i64,
    nonce: &str,
    body: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n",
        method, path_and_query, timestamp, nonce, body
    )
}

/// Authorization头的参数序列
fn build_auth_header(
    mch_id: &str,
    nonce: &str,
    signature: &str,
    timestamp: i64,
    serial_no: &str,
) -> String {
    format!(
        "{} mchid=\"{}\",nonce_str=\"{}\",signature=\"{}\",timestamp=\"{}\",serial_no=\"{}\"",
        AUTH_SCHEMA, mch_id, nonce, signature, timestamp, serial_no
    )
}

/// 响应验签串: timestamp\nnonce\nbody\n
fn build_verify_message(timestamp: &str, nonce: &str, body: &str) -> String {
    format!("{}\n{}\n{}\n", timestamp, nonce, body)
}

/// 按平台证书公钥验证响应签名
fn verify_response(
    bundle: &CredentialBundle,
    headers: &HeaderMap,
    body: &str,
) -> Result<(), GatewayError> {
    let header_str = |name: &str| -> Result<&str, GatewayError> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                GatewayError::SignatureVerification(format!("missing {} header", name))
            })
    };

    let timestamp = header_str("Wechatpay-Timestamp")?;
    let nonce = header_str("Wechatpay-Nonce")?;
    let signature = header_str("Wechatpay-Signature")?;

    let message = build_verify_message(timestamp, nonce, body);
    verify_sha256_rsa(
        &bundle.trust_certificate.public_key,
        &message,
        signature,
    )
    .map_err(GatewayError::SignatureVerification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::TrustCertificate;
    use chrono::Duration as ChronoDuration;
    use reqwest::header::HeaderValue;
    use rsa::RsaPrivateKey;

    #[test]
    fn test_path_and_query_extraction() {
        let plain =
            reqwest::Url::parse("https://api.mch.weixin.qq.com/v3/pay/transactions/jsapi").unwrap();
        assert_eq!(path_and_query(&plain), "/v3/pay/transactions/jsapi");

        let with_query =
            reqwest::Url::parse("https://api.mch.weixin.qq.com/v3/refund/domestic/refunds?a=1&b=2")
                .unwrap();
        assert_eq!(path_and_query(&with_query), "/v3/refund/domestic/refunds?a=1&b=2");
    }

    #[test]
    fn test_sign_message_layout() {
        let message = build_sign_message(
            "POST",
            "/v3/pay/transactions/jsapi",
            1700000000,
            "NONCE",
            "{\"a\":1}",
        );
        assert_eq!(
            message,
            "POST\n/v3/pay/transactions/jsapi\n1700000000\nNONCE\n{\"a\":1}\n"
        );
    }

    #[test]
    fn test_auth_header_layout() {
        let header = build_auth_header("1900000001", "NONCE", "U0lHTg==", 1700000000, "SERIAL01");
        assert!(header.starts_with("WECHATPAY2-SHA256-RSA2048 "));
        assert!(header.contains("mchid=\"1900000001\""));
        assert!(header.contains("nonce_str=\"NONCE\""));
        assert!(header.contains("signature=\"U0lHTg==\""));
        assert!(header.contains("timestamp=\"1700000000\""));
        assert!(header.contains("serial_no=\"SERIAL01\""));
    }

    #[test]
    fn test_response_verification_roundtrip() {
        // 网关侧用自己的私钥签响应，客户端按证书公钥验签
        let gateway_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let merchant_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let now = Utc::now();
        let bundle = CredentialBundle {
            private_key: merchant_key,
            trust_certificate: TrustCertificate {
                public_key: gateway_key.to_public_key(),
                not_before: now - ChronoDuration::days(1),
                not_after: now + ChronoDuration::days(365),
            },
            mch_id: "1900000001".to_string(),
            mch_serial_no: "SERIAL01".to_string(),
        };

        let body = "{\"prepay_id\":\"abc123\"}";
        let signature = sign_sha256_rsa(
            &gateway_key,
            &build_verify_message("1700000000", "NONCE", body),
        );

        let mut headers = HeaderMap::new();
        headers.insert("Wechatpay-Timestamp", HeaderValue::from_static("1700000000"));
        headers.insert("Wechatpay-Nonce", HeaderValue::from_static("NONCE"));
        headers.insert(
            "Wechatpay-Signature",
            HeaderValue::from_str(&signature).unwrap(),
        );

        assert!(verify_response(&bundle, &headers, body).is_ok());

        // 响应体被篡改应验签失败
        let tampered = verify_response(&bundle, &headers, "{\"prepay_id\":\"evil\"}");
        assert!(matches!(
            tampered,
            Err(GatewayError::SignatureVerification(_))
        ));
    }

    #[test]
    fn test_missing_signature_header() {
        let gateway_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let now = Utc::now();
        let bundle = CredentialBundle {
            private_key: gateway_key.clone(),
            trust_certificate: TrustCertificate {
                public_key: gateway_key.to_public_key(),
                not_before: now - ChronoDuration::days(1),
                not_after: now + ChronoDuration::days(365),
            },
            mch_id: "1900000001".to_string(),
            mch_serial_no: "SERIAL01".to_string(),
        };

        let result = verify_response(&bundle, &HeaderMap::new(), "{}");
        assert!(matches!(
            result,
            Err(GatewayError::SignatureVerification(_))
        ));
    }
}
