//! 證書簽發：提交 CSR、輪詢證書位址、下載中繼鏈並寫入三個 PEM 檔案。

use std::{sync::Arc, thread, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    certificate::{der_to_pem, CertificateChain, CertificateError},
    csr::{CsrBuilder, CsrError, CsrSubject},
    key_pair::{KeyError, KeyPair},
    payload::NewCertPayload,
    signer::{RequestSigner, SignerError},
    storage::{Storage, StorageError},
    transport::{Transport, TransportError},
};

/// 定義所有簽發操作可能產生的錯誤。
#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("Key pair error: {0}")]
    KeyPair(#[from] KeyError),
    #[error("CSR error: {0}")]
    Csr(#[from] CsrError),
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("No domains to issue a certificate for")]
    NoDomains,
    #[error("Invalid response code: {status}, {body}")]
    InvalidResponse { status: u16, body: String },
    #[error("Missing Location header in new-cert response")]
    MissingLocation,
}

type Result<T> = std::result::Result<T, IssuanceError>;

/// 為一組域名簽發證書，檔案存放於以第一個域名命名的目錄。
#[derive(Debug, Clone)]
pub struct CertificateIssuer {
    storage: Arc<dyn Storage>,
    subject: CsrSubject,
    key_bits: u32,
    poll_interval: Duration,
}

impl CertificateIssuer {
    pub const CSR_FILE: &'static str = "last.csr";
    pub const CERT_FILE: &'static str = "cert.pem";
    pub const CHAIN_FILE: &'static str = "chain.pem";
    pub const FULLCHAIN_FILE: &'static str = "fullchain.pem";

    pub fn new(
        storage: Arc<dyn Storage>,
        subject: CsrSubject,
        key_bits: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            storage,
            subject,
            key_bits,
            poll_interval,
        }
    }

    /// 簽發涵蓋 `domains` 的證書並寫入 `cert.pem`、`chain.pem` 與 `fullchain.pem`。
    ///
    /// 呼叫前每個域名都必須已完成授權。域名金鑰不存在時會先生成。
    ///
    /// # Errors
    ///
    /// `new-cert` 未回傳 201、輪詢時收到 200/202 以外的狀態碼，
    /// 或任一中繼證書下載失敗時回傳 [`IssuanceError`]。
    pub fn issue<T: Transport, S: AsRef<str>>(
        &self,
        signer: &mut RequestSigner<T>,
        domains: &[S],
    ) -> Result<CertificateChain> {
        let domain = domains.first().ok_or(IssuanceError::NoDomains)?.as_ref();

        let domain_key = self.domain_key(domain)?;
        let csr = CsrBuilder::new(self.subject.clone()).build(&domain_key, domains)?;
        self.storage
            .write_file(&format!("{}/{}", domain, Self::CSR_FILE), csr.pem.as_bytes())?;

        info!(domain, "Requesting certificate");
        let new_cert = signer.directory().new_cert.clone();
        let response = signer.post(&new_cert, &NewCertPayload::new(&csr.payload))?;
        if response.status != 201 {
            return Err(IssuanceError::InvalidResponse {
                status: response.status,
                body: response.text(),
            });
        }
        let location = response
            .location()
            .ok_or(IssuanceError::MissingLocation)?
            .to_string();

        let certificate = loop {
            let response = signer.get(&location)?;
            match response.status {
                202 => {
                    info!("Certificate generation pending, sleeping");
                    thread::sleep(self.poll_interval);
                }
                200 => break response,
                status => {
                    return Err(IssuanceError::InvalidResponse {
                        status,
                        body: response.text(),
                    })
                }
            }
        };

        let mut certificates = vec![der_to_pem(&certificate.body)];
        for link in certificate.up_links() {
            info!(url = %link, "Fetching issuer certificate");
            let response = signer.get(&link)?;
            if !response.is_success() {
                return Err(TransportError::UnexpectedStatus {
                    url: link,
                    status: response.status,
                    body: response.text(),
                }
                .into());
            }
            certificates.push(der_to_pem(&response.body));
        }

        let chain = CertificateChain::new(certificates)?;
        self.save(domain, &chain)?;

        match chain.expires_at() {
            Ok(expires_at) => info!(domain, expires_at = %expires_at, "Certificate issued"),
            Err(err) => debug!(domain, error = %err, "Could not read certificate expiry"),
        }
        Ok(chain)
    }

    /// 載入 `<domain>/private.pem`，不存在時生成新的金鑰對。
    fn domain_key(&self, domain: &str) -> Result<KeyPair> {
        if KeyPair::exists(&*self.storage, domain)? {
            return Ok(KeyPair::load(&*self.storage, domain)?);
        }
        info!(domain, bits = self.key_bits, "Domain key not found, generating");
        Ok(KeyPair::generate_into(&*self.storage, domain, self.key_bits)?)
    }

    fn save(&self, domain: &str, chain: &CertificateChain) -> Result<()> {
        let files = [
            (Self::FULLCHAIN_FILE, chain.fullchain()),
            (Self::CERT_FILE, chain.leaf().to_string()),
            (Self::CHAIN_FILE, chain.chain()),
        ];
        for (name, content) in files {
            self.storage
                .write_file(&format!("{}/{}", domain, name), content.as_bytes())?;
        }
        info!(domain, "Done, certificates saved");
        Ok(())
    }
}
