use chrono::{DateTime, Utc};
use openssl::{asn1::Asn1Time, x509::X509};
use thiserror::Error;

use crate::base64;

/// 證書相關操作可能出現的錯誤類型
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(#[from] openssl::error::ErrorStack),
    #[error("Invalid expiration timestamp")]
    InvalidTimestamp,
    #[error("Certificate chain is empty")]
    EmptyChain,
}

type Result<T> = std::result::Result<T, CertificateError>;

const PEM_LINE_WIDTH: usize = 64;

/// 將 DER 編碼的證書轉為 PEM 文字。
///
/// 內文為每行 64 字元的標準 Base64，結尾保留一個換行。
pub fn der_to_pem(der: &[u8]) -> String {
    let encoded = base64::encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    // Base64 輸出只含 ASCII，可以安全地依位元組切行
    for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// 一次簽發取得的證書，第一張為葉證書，其餘依 `Link rel="up"` 順序排列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Vec<String>,
}

impl CertificateChain {
    /// 由 PEM 證書列表建立；列表為空時回傳 [`CertificateError::EmptyChain`]。
    pub fn new(certificates: Vec<String>) -> Result<Self> {
        if certificates.is_empty() {
            return Err(CertificateError::EmptyChain);
        }
        Ok(Self { certificates })
    }

    pub fn certificates(&self) -> &[String] {
        &self.certificates
    }

    pub fn leaf(&self) -> &str {
        &self.certificates[0]
    }

    /// 除葉證書以外的中繼證書，以換行串接。
    pub fn chain(&self) -> String {
        self.certificates[1..].join("\n")
    }

    /// 所有證書以換行串接，內容等於 `leaf + "\n" + chain`。
    pub fn fullchain(&self) -> String {
        self.certificates.join("\n")
    }

    /// 解析葉證書的到期時間。
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        Certificate::new(self.leaf())?.not_after()
    }
}

/// X.509 證書封裝結構，提供到期時間的查詢
pub struct Certificate {
    /// 內部使用的 X509 證書對象
    pub cert: X509,
}

impl Certificate {
    /// 根據傳入的 PEM 格式字串解析生成 X.509 證書
    pub fn new(pem: &str) -> Result<Self> {
        let cert = X509::from_pem(pem.as_bytes())?;
        Ok(Certificate { cert })
    }

    /// 證書的 `notAfter` 時間
    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        let epoch = Asn1Time::from_unix(0)?;
        let diff = epoch.diff(self.cert.not_after())?;
        let seconds = diff.days as i64 * 86400 + diff.secs as i64;
        DateTime::from_timestamp(seconds, 0).ok_or(CertificateError::InvalidTimestamp)
    }
}
