use openssl::{
    error::ErrorStack,
    pkey::{Id, PKey, Private, Public},
    rsa::Rsa,
};
use thiserror::Error;

use crate::{
    jwk::{Jwk, JwkError},
    storage::{Storage, StorageError},
};

/// 金鑰產生、載入與匯出過程中的錯誤。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("OpenSSL error: {0}")]
    OpenSSL(#[from] ErrorStack),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Unsupported algorithm, only RSA keys are accepted")]
    UnsupportedAlgorithm,
    #[error("RSA key of {0} bits is too small, at least {min} bits required", min = KeyPair::MIN_BITS)]
    KeyTooSmall(u32),
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
}

type Result<T> = std::result::Result<T, KeyError>;

/// RSA 金鑰對，帳戶金鑰與域名金鑰共用此結構。
///
/// 金鑰在儲存中以目錄為單位存放：`<dir>/private.pem` 與 `<dir>/public.pem`。
#[derive(Debug)]
pub struct KeyPair {
    pub pri_key: PKey<Private>,
    pub pub_key: PKey<Public>,
}

impl KeyPair {
    pub const MIN_BITS: u32 = 2048;
    pub const PRIVATE_KEY_FILE: &'static str = "private.pem";
    pub const PUBLIC_KEY_FILE: &'static str = "public.pem";

    /// 產生指定長度的 RSA 金鑰對。
    ///
    /// # 錯誤
    ///
    /// 長度小於 [`KeyPair::MIN_BITS`] 時回傳 [`KeyError::KeyTooSmall`]。
    pub fn generate(bits: u32) -> Result<Self> {
        if bits < Self::MIN_BITS {
            return Err(KeyError::KeyTooSmall(bits));
        }
        let pri_key = PKey::from_rsa(Rsa::generate(bits)?)?;
        let pub_key = Self::derive_public_key(&pri_key)?;
        Ok(Self { pri_key, pub_key })
    }

    /// 由 PEM 格式的私鑰建立金鑰對，非 RSA 金鑰會被拒絕。
    pub fn from_pem(pri_key_pem: &[u8]) -> Result<Self> {
        let pri_key = PKey::private_key_from_pem(pri_key_pem)?;
        let pub_key = Self::derive_public_key(&pri_key)?;
        Ok(Self { pri_key, pub_key })
    }

    /// 從儲存中的 `<dir>/private.pem` 載入金鑰對。
    pub fn load(storage: &dyn Storage, dir: &str) -> Result<Self> {
        let pem = storage.read_file(&Self::private_key_key(dir))?;
        Self::from_pem(&pem)
    }

    /// 檢查 `<dir>/private.pem` 是否存在。
    pub fn exists(storage: &dyn Storage, dir: &str) -> Result<bool> {
        Ok(storage.exists(&Self::private_key_key(dir))?)
    }

    /// 產生新的金鑰對並寫入 `<dir>/private.pem`（PKCS#8）與 `<dir>/public.pem`。
    pub fn generate_into(storage: &dyn Storage, dir: &str, bits: u32) -> Result<Self> {
        let key_pair = Self::generate(bits)?;
        storage.create_dir_all(dir)?;
        storage.write_file(
            &Self::private_key_key(dir),
            &key_pair.pri_key.private_key_to_pem_pkcs8()?,
        )?;
        storage.write_file(
            &format!("{}/{}", dir, Self::PUBLIC_KEY_FILE),
            &key_pair.pub_key.public_key_to_pem()?,
        )?;
        Ok(key_pair)
    }

    /// 金鑰的位元長度。
    pub fn bits(&self) -> u32 {
        self.pri_key.bits()
    }

    /// 以 JWK 縮影（thumbprint）唯一識別此金鑰，用於組成 key authorization。
    pub fn thumbprint(&self) -> Result<String> {
        Ok(Jwk::new(self)?.thumbprint()?)
    }

    fn private_key_key(dir: &str) -> String {
        format!("{}/{}", dir, Self::PRIVATE_KEY_FILE)
    }

    fn derive_public_key(pri_key: &PKey<Private>) -> Result<PKey<Public>> {
        match pri_key.id() {
            Id::RSA => {
                let rsa = pri_key.rsa()?;
                let pub_rsa =
                    Rsa::from_public_components(rsa.n().to_owned()?, rsa.e().to_owned()?)?;
                Ok(PKey::from_rsa(pub_rsa)?)
            }
            _ => Err(KeyError::UnsupportedAlgorithm),
        }
    }
}
