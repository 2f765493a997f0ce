//! 帳戶請求簽名。
//!
//! 每一個送往 CA 的請求都依固定順序產生：載入帳戶私鑰、建立 JWK 標頭、
//! 注入 nonce、編碼載荷、RS256 簽名，最後把信封以 JSON POST 出去。

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::{
    directory::Directory,
    jwk::JwkError,
    jws::Jws,
    key_pair::{KeyError, KeyPair},
    nonce::{Nonce, NonceError},
    payload::PayloadT,
    protection::Header,
    signature::{create_signature, SignatureError},
    storage::Storage,
    transport::{Response, Transport, TransportError},
};

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Account key error: {0}")]
    Key(#[from] KeyError),
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
    #[error("Nonce error: {0}")]
    Nonce(#[from] NonceError),
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

type Result<T> = std::result::Result<T, SignerError>;

/// 以帳戶金鑰簽署並送出請求，同時維護 nonce。
///
/// 所有經過此結構的 CA 回應都會更新 nonce 槽位；簽名時若槽位為空，
/// 會向目錄端點發送一次 HEAD 取得新的 nonce。
#[derive(Debug)]
pub struct RequestSigner<T: Transport> {
    transport: T,
    directory: Directory,
    storage: Arc<dyn Storage>,
    nonce: Nonce,
}

impl<T: Transport> RequestSigner<T> {
    /// 帳戶金鑰在儲存中的目錄。
    pub const ACCOUNT_DIR: &'static str = "_account";

    pub fn new(transport: T, directory: Directory, storage: Arc<dyn Storage>) -> Self {
        Self {
            transport,
            directory,
            storage,
            nonce: Nonce::new(),
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// 不經過 nonce 追蹤的原始傳輸層，用於對非 CA 主機的請求。
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 從儲存重新載入帳戶金鑰；金鑰不在記憶體中快取。
    pub fn account_key(&self) -> Result<KeyPair> {
        Ok(KeyPair::load(&*self.storage, Self::ACCOUNT_DIR)?)
    }

    /// `token + "." + thumbprint`，挑戰檔案的內容。
    pub fn key_authorization(&self, token: &str) -> Result<String> {
        let thumbprint = self.account_key()?.thumbprint()?;
        Ok(format!("{}.{}", token, thumbprint))
    }

    /// 建立已簽名的信封，會消耗一個 nonce。
    pub fn sign<P: PayloadT>(&mut self, payload: &P) -> Result<Jws> {
        payload.validate().map_err(SignerError::InvalidPayload)?;

        let key_pair = self.account_key()?;
        let header = Header::new(&key_pair)?;
        let protected = header.protect(self.next_nonce()?);

        let payload64 = payload.to_base64()?;
        let protected64 = protected.to_base64()?;
        let signature64 = create_signature(&protected64, &payload64, &key_pair)?;

        Ok(Jws::new(header, protected64, payload64, signature64))
    }

    /// 簽名並 POST 至 `uri`（相對路徑以 CA 基礎 URL 補全）。
    pub fn post<P: PayloadT>(&mut self, uri: &str, payload: &P) -> Result<Response> {
        let url = self.directory.resolve(uri);
        let body = self.sign(payload)?.to_json()?;

        debug!(url = %url, "Sending signed request");
        let response = self.transport.post(&url, &body)?;
        self.nonce.observe(&response);
        Ok(response)
    }

    /// 對 CA 發送未簽名的 GET，回應中的 nonce 同樣會被記錄。
    pub fn get(&mut self, uri: &str) -> std::result::Result<Response, TransportError> {
        let url = self.directory.resolve(uri);
        let response = self.transport.get(&url)?;
        self.nonce.observe(&response);
        Ok(response)
    }

    /// 取出最近一次回應的 nonce；沒有時 HEAD 目錄端點一次，仍沒有則視為協議錯誤。
    fn next_nonce(&mut self) -> std::result::Result<String, NonceError> {
        if let Some(nonce) = self.nonce.take() {
            return Ok(nonce);
        }

        let url = &self.directory.directory;
        debug!(url = %url, "Refreshing nonce");
        let response = self.transport.head(url)?;
        self.nonce.observe(&response);
        self.nonce
            .take()
            .ok_or_else(|| NonceError::NoNonceHeader(url.clone()))
    }
}
