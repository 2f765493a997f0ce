//! 對外的客戶端介面：組合簽名器、帳戶管理、授權流程與證書簽發。

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use tracing::info;

use crate::{
    account::{AccountError, AccountManager},
    authorization::AuthorizationFlow,
    certificate::CertificateChain,
    challenge::ChallengeError,
    csr::CsrSubject,
    directory::Directory,
    issuer::{CertificateIssuer, IssuanceError},
    signer::RequestSigner,
    storage::{DirStorage, Storage, StorageError},
    transport::{HttpTransport, Transport},
};

/// 客戶端操作的錯誤，包裝各元件的錯誤類型。
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Account error: {0}")]
    Account(#[from] AccountError),
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),
    #[error("Issuance error: {0}")]
    Issuance(#[from] IssuanceError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("No domains given")]
    NoDomains,
    #[error("Invalid domain name: {0:?}")]
    InvalidDomain(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// 客戶端設定，預設值對應 Let's Encrypt 的 ACME v1 正式環境。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// CA 基礎 URL，端點路徑由此推導
    pub ca: String,
    /// 註冊時同意的訂閱協議 URL
    pub agreement: String,
    pub country: String,
    pub state: String,
    pub organization: String,
    /// 新生成 RSA 金鑰的位元長度
    pub key_bits: u32,
    /// 兩個輪詢迴圈的等待間隔
    pub poll_interval: Duration,
}

impl Config {
    pub const DEFAULT_CA: &'static str = "https://acme-v01.api.letsencrypt.org";
    pub const DEFAULT_AGREEMENT: &'static str =
        "https://letsencrypt.org/documents/LE-SA-v1.0.1-July-27-2015.pdf";
    pub const DEFAULT_COUNTRY: &'static str = "CZ";
    pub const DEFAULT_STATE: &'static str = "Czech Republic";
    pub const DEFAULT_ORGANIZATION: &'static str = "Unknown";
    pub const DEFAULT_KEY_BITS: u32 = 4096;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    fn subject(&self) -> CsrSubject {
        CsrSubject {
            country: self.country.clone(),
            state: self.state.clone(),
            organization: self.organization.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ca: Self::DEFAULT_CA.to_string(),
            agreement: Self::DEFAULT_AGREEMENT.to_string(),
            country: Self::DEFAULT_COUNTRY.to_string(),
            state: Self::DEFAULT_STATE.to_string(),
            organization: Self::DEFAULT_ORGANIZATION.to_string(),
            key_bits: Self::DEFAULT_KEY_BITS,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// ACME v1 客戶端。
///
/// 證書目錄存放帳戶金鑰與各域名的金鑰、CSR 與證書；網站根目錄用於發布挑戰檔案。
///
/// ```no_run
/// use acme_http01::client::AcmeClient;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut client = AcmeClient::builder("/etc/ssl/acme", "/var/www/html").build()?;
///     client.init_account()?;
///     client.sign_domains(&["example.com", "www.example.com"])?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct AcmeClient<T: Transport = HttpTransport> {
    signer: RequestSigner<T>,
    account: AccountManager,
    authorization: AuthorizationFlow,
    issuer: CertificateIssuer,
}

impl AcmeClient<HttpTransport> {
    /// 以證書目錄與網站根目錄建立 [`AcmeClientBuilder`]。
    pub fn builder<P: AsRef<Path>, Q: AsRef<Path>>(certs_dir: P, web_root: Q) -> AcmeClientBuilder {
        AcmeClientBuilder::new(certs_dir, web_root)
    }
}

impl<T: Transport> AcmeClient<T> {
    /// 以任意傳輸層與儲存組裝客戶端。
    pub fn new(
        config: Config,
        transport: T,
        certs: Arc<dyn Storage>,
        web_root: Arc<dyn Storage>,
    ) -> Self {
        let signer = RequestSigner::new(transport, Directory::new(&config.ca), certs.clone());
        Self {
            account: AccountManager::new(certs.clone(), &config.agreement, config.key_bits),
            authorization: AuthorizationFlow::new(web_root, config.poll_interval),
            issuer: CertificateIssuer::new(
                certs,
                config.subject(),
                config.key_bits,
                config.poll_interval,
            ),
            signer,
        }
    }

    /// 建立（或沿用）帳戶金鑰並向 CA 註冊。
    pub fn init_account(&mut self) -> Result<()> {
        Ok(self.account.init_account(&mut self.signer)?)
    }

    /// 依序授權每個域名，然後簽發一張涵蓋全部域名的證書。
    ///
    /// 第一個域名為 CN，也是證書檔案所在的目錄名稱。任何一個域名失敗都會中止整批作業。
    /// 域名會先轉為小寫並檢查，不合法時在送出任何請求前回傳 [`ClientError::InvalidDomain`]。
    pub fn sign_domains<S: AsRef<str>>(&mut self, domains: &[S]) -> Result<CertificateChain> {
        if domains.is_empty() {
            return Err(ClientError::NoDomains);
        }
        let domains = domains
            .iter()
            .map(|domain| normalize_domain(domain.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        for domain in &domains {
            self.authorization.authorize(&mut self.signer, domain)?;
        }

        let chain = self.issuer.issue(&mut self.signer, &domains)?;
        info!(
            domain = %domains[0],
            certificates = chain.certificates().len(),
            "Domains signed"
        );
        Ok(chain)
    }
}

/// 轉為小寫並檢查 DNS 名稱：以點分隔的標籤，每個 1 到 63 個 `[a-z0-9-]` 字元，
/// 不以連字號開頭或結尾。
fn normalize_domain(domain: &str) -> Result<String> {
    const MAX_LEN: usize = 253;
    const MAX_LABEL_LEN: usize = 63;

    let normalized = domain.trim().to_ascii_lowercase();
    let valid = !normalized.is_empty()
        && normalized.len() <= MAX_LEN
        && normalized.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= MAX_LABEL_LEN
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        });

    if !valid {
        return Err(ClientError::InvalidDomain(domain.to_string()));
    }
    Ok(normalized)
}

/// [`AcmeClient`] 的構造器，未設定的項目使用 [`Config`] 的預設值。
#[derive(Debug, Clone)]
pub struct AcmeClientBuilder {
    certs_dir: PathBuf,
    web_root: PathBuf,
    config: Config,
}

impl AcmeClientBuilder {
    const CERTS_DIR_MODE: u32 = 0o700;
    const CERTS_FILE_MODE: u32 = 0o600;
    const WEB_ROOT_DIR_MODE: u32 = 0o755;
    const WEB_ROOT_FILE_MODE: u32 = 0o644;

    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(certs_dir: P, web_root: Q) -> Self {
        Self {
            certs_dir: certs_dir.as_ref().to_path_buf(),
            web_root: web_root.as_ref().to_path_buf(),
            config: Config::default(),
        }
    }

    pub fn ca(mut self, ca: &str) -> Self {
        self.config.ca = ca.to_string();
        self
    }

    pub fn agreement(mut self, agreement: &str) -> Self {
        self.config.agreement = agreement.to_string();
        self
    }

    pub fn country(mut self, country: &str) -> Self {
        self.config.country = country.to_string();
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.config.state = state.to_string();
        self
    }

    pub fn organization(mut self, organization: &str) -> Self {
        self.config.organization = organization.to_string();
        self
    }

    pub fn key_bits(mut self, key_bits: u32) -> Self {
        self.config.key_bits = key_bits;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 使用 `reqwest` 傳輸層建立客戶端。
    pub fn build(self) -> Result<AcmeClient<HttpTransport>> {
        self.build_with_transport(HttpTransport::new())
    }

    /// 使用自訂傳輸層建立客戶端；兩個目錄不存在時會被建立。
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<AcmeClient<T>> {
        let certs = DirStorage::open_with_modes(
            &self.certs_dir,
            Self::CERTS_DIR_MODE,
            Self::CERTS_FILE_MODE,
        )?;
        let web_root = DirStorage::open_with_modes(
            &self.web_root,
            Self::WEB_ROOT_DIR_MODE,
            Self::WEB_ROOT_FILE_MODE,
        )?;
        Ok(AcmeClient::new(
            self.config,
            transport,
            Arc::new(certs),
            Arc::new(web_root),
        ))
    }
}
