use std::result;

use openssl::{
    hash::MessageDigest,
    stack::Stack,
    x509::{
        extension::{BasicConstraints, KeyUsage, SubjectAlternativeName},
        X509NameBuilder, X509Req,
    },
};
use thiserror::Error;

use crate::{
    base64::{self, DecodeError},
    key_pair::KeyPair,
};

/// 建立 CSR（證書簽名請求）過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("Openssl error: {0}")]
    OpensslError(#[from] openssl::error::ErrorStack),
    #[error("No domains given for the certificate request")]
    NoDomains,
    #[error("Malformed PEM request: {0}")]
    MalformedPem(String),
    #[error("Base64 decode error: {0}")]
    Decode(#[from] DecodeError),
}

type Result<T> = result::Result<T, CsrError>;

const PEM_HEADER: &str = "-----BEGIN CERTIFICATE REQUEST-----";
const PEM_FOOTER: &str = "-----END CERTIFICATE REQUEST-----";

/// CSR 主體中除 CN 以外的欄位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrSubject {
    pub country: String,
    pub state: String,
    pub organization: String,
}

/// 產生完成的 CSR。
#[derive(Debug, Clone)]
pub struct Csr {
    /// OpenSSL 匯出的 PEM 文字，會原樣保存為 `last.csr`。
    pub pem: String,
    /// DER 編碼的請求。
    pub der: Vec<u8>,
    /// DER 的 base64url 編碼，作為 `new-cert` 載荷中的 `csr` 欄位。
    pub payload: String,
}

/// 以 SAN 擴展涵蓋多個域名的 CSR 建構器。
///
/// CN 為第一個域名，SAN 依傳入順序列出所有域名（包含第一個）。
///
/// # 範例
///
/// ```no_run
/// # use acme_http01::csr::{CsrBuilder, CsrSubject};
/// # use acme_http01::key_pair::KeyPair;
/// let key_pair = KeyPair::generate(2048).unwrap();
/// let subject = CsrSubject {
///     country: "CZ".into(),
///     state: "Czech Republic".into(),
///     organization: "Unknown".into(),
/// };
/// let csr = CsrBuilder::new(subject)
///     .build(&key_pair, &["example.com", "www.example.com"])
///     .unwrap();
/// assert!(csr.pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
/// ```
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    subject: CsrSubject,
}

impl CsrBuilder {
    pub fn new(subject: CsrSubject) -> Self {
        Self { subject }
    }

    /// 以 `domain_key` 簽署涵蓋 `domains` 的請求。
    ///
    /// # 錯誤
    ///
    /// `domains` 為空時回傳 [`CsrError::NoDomains`]；OpenSSL 失敗時回傳
    /// [`CsrError::OpensslError`]。
    pub fn build<S: AsRef<str>>(&self, domain_key: &KeyPair, domains: &[S]) -> Result<Csr> {
        let common_name = domains.first().ok_or(CsrError::NoDomains)?.as_ref();

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("C", &self.subject.country)?;
        name.append_entry_by_text("ST", &self.subject.state)?;
        name.append_entry_by_text("O", &self.subject.organization)?;
        name.append_entry_by_text("CN", common_name)?;
        let name = name.build();

        let mut req_builder = X509Req::builder()?;
        req_builder.set_subject_name(&name)?;

        let mut san_builder = SubjectAlternativeName::new();
        for domain in domains {
            san_builder.dns(domain.as_ref());
        }
        let san_extension = san_builder.build(&req_builder.x509v3_context(None))?;

        let mut stack = Stack::new()?;
        stack.push(BasicConstraints::new().build()?)?;
        stack.push(san_extension)?;
        stack.push(
            KeyUsage::new()
                .non_repudiation()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        req_builder.add_extensions(&stack)?;

        req_builder.set_pubkey(&domain_key.pri_key)?;
        req_builder.sign(&domain_key.pri_key, MessageDigest::sha256())?;
        let req = req_builder.build();

        let pem = String::from_utf8_lossy(&req.to_pem()?).into_owned();
        let der = pem_body(&pem)?;
        let payload = base64::encode_url(&der);

        Ok(Csr { pem, der, payload })
    }
}

/// 取出 PEM 標頭與結尾之間的 Base64 內文並解碼。
fn pem_body(pem: &str) -> Result<Vec<u8>> {
    let start = pem
        .find(PEM_HEADER)
        .ok_or_else(|| CsrError::MalformedPem("missing header".to_string()))?
        + PEM_HEADER.len();
    let end = pem[start..]
        .find(PEM_FOOTER)
        .ok_or_else(|| CsrError::MalformedPem("missing footer".to_string()))?
        + start;

    let body: String = pem[start..end]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(base64::decode(&body)?)
}
