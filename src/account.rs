//! ACME 帳戶管理：帳戶金鑰的建立與 `new-reg` 註冊。

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    key_pair::{KeyError, KeyPair},
    payload::NewRegPayload,
    signer::{RequestSigner, SignerError},
    storage::Storage,
    transport::Transport,
};

/// 帳戶初始化過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Key error: {0}")]
    KeyError(#[from] KeyError),
    #[error("Signer error: {0}")]
    SignerError(#[from] SignerError),
}

pub type Result<T> = std::result::Result<T, AccountError>;

/// 管理帳戶金鑰並向 CA 註冊帳戶。
#[derive(Debug, Clone)]
pub struct AccountManager {
    storage: Arc<dyn Storage>,
    agreement: String,
    key_bits: u32,
}

impl AccountManager {
    /// `storage` 必須與 [`RequestSigner`] 使用同一個儲存，金鑰才會被簽名器讀到。
    pub fn new(storage: Arc<dyn Storage>, agreement: &str, key_bits: u32) -> Self {
        Self {
            storage,
            agreement: agreement.to_string(),
            key_bits,
        }
    }

    /// 確保帳戶金鑰存在，然後發送 `new-reg`。
    ///
    /// 金鑰不存在時會生成 `key_bits` 位元的 RSA 金鑰並寫入 `_account/`。
    /// 註冊回應不會被檢查是否「已註冊」，非成功的狀態碼只會記錄警告。
    ///
    /// # Errors
    ///
    /// 金鑰生成、簽名或連線失敗時回傳 [`AccountError`]。
    pub fn init_account<T: Transport>(&self, signer: &mut RequestSigner<T>) -> Result<()> {
        let account_dir = RequestSigner::<T>::ACCOUNT_DIR;

        if !KeyPair::exists(&*self.storage, account_dir)? {
            info!(bits = self.key_bits, "Starting new account registration");
            KeyPair::generate_into(&*self.storage, account_dir, self.key_bits)?;
        }

        info!("Sending registration to letsencrypt server");
        let new_reg = signer.directory().new_reg.clone();
        let response = signer.post(&new_reg, &NewRegPayload::new(&self.agreement))?;

        if response.is_success() {
            info!(status = response.status, "Account registration finished");
        } else {
            warn!(
                status = response.status,
                body = %response.text(),
                "Registration response was not successful"
            );
        }
        Ok(())
    }
}
