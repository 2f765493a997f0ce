//! # ACME v1 HTTP-01 Client
//!
//! 本庫實作 ACME v1 協議（例如 Let's Encrypt 早期的 API），透過 HTTP-01 挑戰驗證域名，
//! 並取得涵蓋多個域名（SAN）的證書鏈。
//!
//! 主要元件：
//!
//! - **signer**: 以帳戶金鑰簽署每一個 CA 請求（JWS），並維護 nonce。
//! - **account**: 帳戶金鑰的生成與 `new-reg` 註冊。
//! - **authorization**: 單一域名的授權流程，從申請挑戰、發布檔案、自我檢查到輪詢結果。
//! - **issuer**: 生成 CSR、提交 `new-cert`、輪詢並下載證書鏈，寫入 `cert.pem`、
//!   `chain.pem` 與 `fullchain.pem`。
//! - **client**: 組合以上元件的 [`client::AcmeClient`]。
//!
//! 網路存取透過 [`transport::Transport`]，檔案存取透過 [`storage::Storage`]，
//! 兩者都可以替換成記憶體版本做測試。
//!
//! ## 示例
//!
//! ```no_run
//! use acme_http01::client::AcmeClient;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. 指定證書目錄與網站根目錄
//!     let mut client = AcmeClient::builder("/etc/acme", "/var/www/example").build()?;
//!
//!     // 2. 建立帳戶金鑰並註冊
//!     client.init_account()?;
//!
//!     // 3. 授權並簽發證書，結果寫入 /etc/acme/example.com/
//!     let chain = client.sign_domains(&["example.com", "www.example.com"])?;
//!     println!("{}", chain.fullchain());
//!
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod authorization;
pub mod base64;
pub mod certificate;
pub mod challenge;
pub mod client;
pub mod csr;
pub mod directory;
pub mod issuer;
pub mod jwk;
pub mod jws;
pub mod key_pair;
pub mod nonce;
pub mod payload;
pub mod protection;
pub mod signature;
pub mod signer;
pub mod storage;
pub mod transport;
