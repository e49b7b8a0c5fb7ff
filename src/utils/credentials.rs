// 商户证书与私钥解析
// 按 配置路径 -> 运行目录 -> 资源目录 的顺序定位文件，解析为可用的签名材料

use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::config::WechatConfig;

/// 资源目录搜索路径 (随部署包一起分发的证书目录)
const RESOURCE_SEARCH_PATH: &[&str] = &["certs", "resources"];

/// 凭证解析错误
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// 所有候选路径都无法提供可读的非空文件
    #[error("credential file could not be located:\n{0}")]
    NotFound(CandidateReport),
    /// 私钥文件存在但内容无法解析
    #[error("invalid private key {path}: {reason}")]
    InvalidKey { path: PathBuf, reason: String },
    /// 证书文件存在但内容无法解析
    #[error("invalid certificate {path}: {reason}")]
    InvalidCertificate { path: PathBuf, reason: String },
    /// 证书尚未生效
    #[error("certificate not valid before {not_before}, current time {now}")]
    NotYetValid {
        not_before: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    /// 证书已过期
    #[error("certificate expired at {not_after}, current time {now}")]
    Expired {
        not_after: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 单个候选路径的探测结果
#[derive(Debug, Clone)]
pub struct CandidateProbe {
    pub path: PathBuf,
    pub exists: bool,
    pub readable: bool,
    pub size: u64,
}

impl CandidateProbe {
    fn usable(&self) -> bool {
        self.exists && self.readable && self.size > 0
    }
}

/// 目录内容快照，用于排查证书未随部署分发的问题
#[derive(Debug, Clone)]
pub struct DirListing {
    pub dir: PathBuf,
    pub entries: Vec<String>,
}

/// 定位失败时的完整诊断报告：每个候选路径的探测结果 + 相关目录内容
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub file: String,
    pub attempts: Vec<CandidateProbe>,
    pub listings: Vec<DirListing>,
}

impl fmt::Display for CandidateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "file: {}", self.file)?;
        writeln!(f, "candidates tried:")?;
        for (i, probe) in self.attempts.iter().enumerate() {
            writeln!(
                f,
                "  {}. {} [exists: {}, readable: {}, size: {} bytes]",
                i + 1,
                probe.path.display(),
                probe.exists,
                probe.readable,
                probe.size
            )?;
        }
        for listing in &self.listings {
            writeln!(f, "contents of {}:", listing.dir.display())?;
            if listing.entries.is_empty() {
                writeln!(f, "  (missing or empty)")?;
            }
            for entry in &listing.entries {
                writeln!(f, "  - {}", entry)?;
            }
        }
        Ok(())
    }
}

fn probe(path: &Path) -> CandidateProbe {
    let meta = fs::metadata(path);
    let exists = meta.is_ok();
    let size = meta.map(|m| m.len()).unwrap_or(0);
    let readable = exists && fs::File::open(path).is_ok();
    CandidateProbe {
        path: path.to_path_buf(),
        exists,
        readable,
        size,
    }
}

fn list_dir(dir: &Path) -> DirListing {
    let mut entries = Vec::new();
    if let Ok(read) = fs::read_dir(dir) {
        for entry in read.flatten() {
            let meta = entry.metadata().ok();
            let kind = if meta.as_ref().map(|m| m.is_dir()).unwrap_or(false) {
                "dir"
            } else {
                "file"
            };
            let size = meta.map(|m| m.len()).unwrap_or(0);
            entries.push(format!(
                "{} [{}, {} bytes]",
                entry.file_name().to_string_lossy(),
                kind,
                size
            ));
        }
    }
    DirListing {
        dir: dir.to_path_buf(),
        entries,
    }
}

/// 逐层定位凭证文件，返回第一个可读的非空候选
///
/// 候选顺序：配置的原始路径、运行目录下的同名文件、资源目录下的同名文件。
fn locate(path_hint: &str, fallback_dir: &str) -> Result<PathBuf, CandidateReport> {
    let hint = Path::new(path_hint);
    let file_name = hint.file_name().map(|n| n.to_os_string()).unwrap_or_default();

    let mut candidates = vec![
        hint.to_path_buf(),
        Path::new(fallback_dir).join(&file_name),
    ];
    for dir in RESOURCE_SEARCH_PATH {
        candidates.push(Path::new(dir).join(&file_name));
    }

    let mut attempts = Vec::new();
    for candidate in candidates {
        let result = probe(&candidate);
        if result.usable() {
            log::info!(
                "credential file {} resolved to {} ({} bytes)",
                path_hint,
                candidate.display(),
                result.size
            );
            return Ok(candidate);
        }
        attempts.push(result);
    }

    Err(CandidateReport {
        file: path_hint.to_string(),
        attempts,
        listings: vec![list_dir(Path::new(".")), list_dir(Path::new(fallback_dir))],
    })
}

/// 网关信任证书：公钥 + 有效期窗口
#[derive(Debug, Clone)]
pub struct TrustCertificate {
    pub public_key: RsaPublicKey,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl TrustCertificate {
    /// 检查证书在给定时刻是否处于有效期内
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<(), ResolutionError> {
        if now < self.not_before {
            return Err(ResolutionError::NotYetValid {
                not_before: self.not_before,
                now,
            });
        }
        if now > self.not_after {
            return Err(ResolutionError::Expired {
                not_after: self.not_after,
                now,
            });
        }
        Ok(())
    }
}

/// 解析PKCS#8格式的商户私钥
fn parse_private_key(path: &Path) -> Result<RsaPrivateKey, ResolutionError> {
    let pem = fs::read_to_string(path).map_err(|e| ResolutionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| ResolutionError::InvalidKey {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// 解析X.509格式的网关证书并提取公钥与有效期
fn parse_certificate(path: &Path) -> Result<TrustCertificate, ResolutionError> {
    let invalid = |reason: String| ResolutionError::InvalidCertificate {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path).map_err(|e| ResolutionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (_, pem) =
        x509_parser::pem::parse_x509_pem(&bytes).map_err(|e| invalid(format!("{:?}", e)))?;
    let cert = pem.parse_x509().map_err(|e| invalid(format!("{:?}", e)))?;

    let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
        .ok_or_else(|| invalid("not_before timestamp out of range".to_string()))?;
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| invalid("not_after timestamp out of range".to_string()))?;

    let spki = cert.public_key();
    let public_key = RsaPublicKey::from_pkcs1_der(spki.subject_public_key.data.as_ref())
        .map_err(|e| invalid(format!("unsupported public key: {}", e)))?;

    Ok(TrustCertificate {
        public_key,
        not_before,
        not_after,
    })
}

/// 一次解析得到的完整凭证包，解析成功后不可变
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub private_key: RsaPrivateKey,
    pub trust_certificate: TrustCertificate,
    pub mch_id: String,
    pub mch_serial_no: String,
}

/// 凭证存取器：启动时解析一次并缓存，之后只在显式reload时重新解析
pub struct CredentialStore {
    config: WechatConfig,
    inner: RwLock<Option<Arc<CredentialBundle>>>,
}

impl CredentialStore {
    pub fn new(config: WechatConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(None),
        }
    }

    /// 获取当前凭证包；缓存为空时解析一次
    ///
    /// 缓存中的证书过了有效期会直接报错，等待运维换证后reload。
    pub fn current(&self) -> Result<Arc<CredentialBundle>, ResolutionError> {
        if let Some(bundle) = self.inner.read().unwrap().as_ref() {
            bundle.trust_certificate.check_validity(Utc::now())?;
            return Ok(Arc::clone(bundle));
        }
        self.reload()
    }

    /// 重新解析凭证并替换缓存 (证书轮换入口)
    pub fn reload(&self) -> Result<Arc<CredentialBundle>, ResolutionError> {
        let bundle = Arc::new(self.resolve()?);
        *self.inner.write().unwrap() = Some(Arc::clone(&bundle));
        log::info!(
            "merchant credentials loaded, certificate valid {} ~ {}",
            bundle.trust_certificate.not_before,
            bundle.trust_certificate.not_after
        );
        Ok(bundle)
    }

    /// 私钥与证书各自独立走一遍候选路径，允许二者来自不同层级
    fn resolve(&self) -> Result<CredentialBundle, ResolutionError> {
        let key_path = locate(&self.config.private_key_path, &self.config.fallback_dir)
            .map_err(ResolutionError::NotFound)?;
        let cert_path = locate(&self.config.cert_path, &self.config.fallback_dir)
            .map_err(ResolutionError::NotFound)?;

        let private_key = parse_private_key(&key_path)?;
        let trust_certificate = parse_certificate(&cert_path)?;
        trust_certificate.check_validity(Utc::now())?;

        Ok(CredentialBundle {
            private_key,
            trust_certificate,
            mch_id: self.config.mch_id.clone(),
            mch_serial_no: self.config.mch_serial_no.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_locate_prefers_configured_path() {
        let primary = tempfile::tempdir().unwrap();
        let fallback = tempfile::tempdir().unwrap();
        let hint = write_file(primary.path(), "apiclient_key.pem", b"key material");
        write_file(fallback.path(), "apiclient_key.pem", b"other material");

        let located = locate(
            hint.to_str().unwrap(),
            fallback.path().to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(located, hint);
    }

    #[test]
    fn test_locate_falls_back_when_configured_path_missing() {
        let fallback = tempfile::tempdir().unwrap();
        let in_fallback = write_file(fallback.path(), "apiclient_key.pem", b"key material");

        let located = locate(
            "/nonexistent/apiclient_key.pem",
            fallback.path().to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(located, in_fallback);
    }

    #[test]
    fn test_locate_skips_empty_file() {
        let primary = tempfile::tempdir().unwrap();
        let fallback = tempfile::tempdir().unwrap();
        let hint = write_file(primary.path(), "cert.pem", b"");
        let in_fallback = write_file(fallback.path(), "cert.pem", b"cert material");

        let located = locate(
            hint.to_str().unwrap(),
            fallback.path().to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(located, in_fallback);
    }

    #[test]
    fn test_locate_reports_every_candidate() {
        let fallback = tempfile::tempdir().unwrap();
        let report = locate(
            "/nonexistent/apiclient_key.pem",
            fallback.path().to_str().unwrap(),
        )
        .unwrap_err();

        // 配置路径 + 运行目录 + 资源目录
        assert_eq!(report.attempts.len(), 2 + RESOURCE_SEARCH_PATH.len());
        assert!(report.attempts.iter().all(|p| !p.exists));
        let rendered = report.to_string();
        assert!(rendered.contains("/nonexistent/apiclient_key.pem"));
        assert!(rendered.contains("exists: false"));
    }

    #[test]
    fn test_bundle_may_mix_tiers() {
        // 私钥在配置路径、证书只在运行目录，两者都应定位成功
        let primary = tempfile::tempdir().unwrap();
        let fallback = tempfile::tempdir().unwrap();
        let key_hint = write_file(primary.path(), "apiclient_key.pem", b"key");
        write_file(fallback.path(), "wechatpay_cert.pem", b"cert");

        let fb = fallback.path().to_str().unwrap();
        let key_path = locate(key_hint.to_str().unwrap(), fb).unwrap();
        let cert_hint = primary.path().join("wechatpay_cert.pem");
        let cert_path = locate(cert_hint.to_str().unwrap(), fb).unwrap();

        assert_eq!(key_path, key_hint);
        assert_eq!(cert_path, fallback.path().join("wechatpay_cert.pem"));
    }

    #[test]
    fn test_parse_private_key_roundtrip() {
        use rsa::pkcs8::EncodePrivateKey;

        let dir = tempfile::tempdir().unwrap();
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = key.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let path = write_file(dir.path(), "apiclient_key.pem", pem.as_bytes());

        let parsed = parse_private_key(&path).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_parse_private_key_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "apiclient_key.pem", b"not a pem file");
        match parse_private_key(&path) {
            Err(ResolutionError::InvalidKey { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    fn test_certificate(not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> TrustCertificate {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        TrustCertificate {
            public_key: key.to_public_key(),
            not_before,
            not_after,
        }
    }

    #[test]
    fn test_certificate_within_validity_window() {
        let now = Utc::now();
        let cert = test_certificate(now - Duration::days(30), now + Duration::days(30));
        assert!(cert.check_validity(now).is_ok());
    }

    #[test]
    fn test_expired_certificate_is_distinct_error() {
        let now = Utc::now();
        let cert = test_certificate(now - Duration::days(60), now - Duration::days(1));
        match cert.check_validity(now) {
            Err(ResolutionError::Expired { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_not_yet_valid_certificate_is_distinct_error() {
        let now = Utc::now();
        let cert = test_certificate(now + Duration::days(1), now + Duration::days(365));
        match cert.check_validity(now) {
            Err(ResolutionError::NotYetValid { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
