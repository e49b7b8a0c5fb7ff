// 加密工具函数
// 提供SHA256withRSA签名/验签与随机串生成

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// 使用商户私钥对消息做SHA256withRSA签名，返回Base64编码结果
pub fn sign_sha256_rsa(private_key: &RsaPrivateKey, message: &str) -> String {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key
        .sign_with_rng(&mut rand::thread_rng(), message.as_bytes())
        .to_bytes();
    BASE64.encode(signature)
}

/// 使用网关证书公钥验证SHA256withRSA签名 (Base64编码)
pub fn verify_sha256_rsa(
    public_key: &RsaPublicKey,
    message: &str,
    signature_b64: &str,
) -> Result<(), String> {
    let raw = BASE64
        .decode(signature_b64)
        .map_err(|e| format!("invalid base64 signature: {}", e))?;
    let signature =
        Signature::try_from(raw.as_slice()).map_err(|e| format!("malformed signature: {}", e))?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|e| format!("signature mismatch: {}", e))
}

/// 生成纯数字随机串 (调起支付的nonce要求32位数字)
pub fn generate_numeric_nonce(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

/// 生成安全的随机字符串 (传输层签名的nonce_str)
pub fn generate_secure_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap()
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let key = test_key();
        let public_key = key.to_public_key();
        let message = "appid\n1700000000\n12345678901234567890123456789012\nprepay_id=abc123\n";

        let signature = sign_sha256_rsa(&key, message);
        assert!(verify_sha256_rsa(&public_key, message, &signature).is_ok());
        assert!(verify_sha256_rsa(&public_key, "tampered", &signature).is_err());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let key = test_key();
        let public_key = key.to_public_key();
        assert!(verify_sha256_rsa(&public_key, "msg", "not-base64!!").is_err());
        assert!(verify_sha256_rsa(&public_key, "msg", "YWJj").is_err());
    }

    #[test]
    fn test_numeric_nonce() {
        let nonce = generate_numeric_nonce(32);
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_digit()));
        // 两次生成不应相同
        assert_ne!(nonce, generate_numeric_nonce(32));
    }

    #[test]
    fn test_secure_random_string() {
        let s = generate_secure_random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_alphanumeric()));
    }
}
