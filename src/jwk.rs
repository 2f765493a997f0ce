use openssl::sha::sha256;
use serde::Serialize;
use thiserror::Error;

use crate::{base64, key_pair::KeyPair};

/// JWK 產生與序列化過程中的錯誤。
#[derive(Debug, Error)]
pub enum JwkError {
    /// 金鑰轉換失敗。
    #[error("Failed to convert key: {0}")]
    KeyConversionError(String),
    /// 序列化錯誤。
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// RSA 公鑰的 JSON Web Key 表示。
///
/// 欄位宣告順序即序列化順序：`kty`、`n`、`e`。CA 會對內嵌於標頭中的 JWK
/// 做逐位元組比對，不可改用 map。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Jwk {
    kty: String,
    n: String,
    e: String,
}

/// 計算縮影時使用的 RFC 7638 規範成員順序：`e`、`kty`、`n`。
#[derive(Serialize)]
struct ThumbprintInput<'a> {
    e: &'a str,
    kty: &'a str,
    n: &'a str,
}

impl Jwk {
    /// 由金鑰對的公鑰取出模數與指數，各自做 base64url 編碼。
    pub fn new(key_pair: &KeyPair) -> Result<Self, JwkError> {
        let rsa = key_pair
            .pub_key
            .rsa()
            .map_err(|e| JwkError::KeyConversionError(e.to_string()))?;

        Ok(Self {
            kty: "RSA".to_string(),
            n: base64::encode_url(rsa.n().to_vec()),
            e: base64::encode_url(rsa.e().to_vec()),
        })
    }

    pub fn to_json(&self) -> Result<String, JwkError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 以規範 JSON 的 SHA-256 雜湊做 base64url 編碼，得到金鑰縮影。
    pub fn thumbprint(&self) -> Result<String, JwkError> {
        let canonical = serde_json::to_string(&ThumbprintInput {
            e: &self.e,
            kty: &self.kty,
            n: &self.n,
        })?;
        Ok(base64::encode_url(sha256(canonical.as_bytes())))
    }
}
