use serde::Serialize;

use crate::{
    base64,
    jwk::{Jwk, JwkError},
    key_pair::KeyPair,
};

/// 所有帳戶請求共用的簽章演算法。
pub const ALG_RS256: &str = "RS256";

/// JWS 未受保護的標頭：`{"alg": ..., "jwk": {...}}`。
///
/// 欄位順序固定為 `alg`、`jwk`，序列化結果在每次請求之間逐位元組一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    alg: String,
    jwk: Jwk,
}

/// 受保護標頭：複製 [`Header`] 後再加入 `nonce`。
#[derive(Debug, Clone, Serialize)]
pub struct ProtectedHeader {
    #[serde(flatten)]
    header: Header,
    nonce: String,
}

impl Header {
    pub fn new(key_pair: &KeyPair) -> Result<Self, JwkError> {
        Ok(Self {
            alg: ALG_RS256.to_string(),
            jwk: Jwk::new(key_pair)?,
        })
    }

    /// 產生帶有指定 nonce 的受保護標頭。
    pub fn protect(&self, nonce: impl Into<String>) -> ProtectedHeader {
        ProtectedHeader {
            header: self.clone(),
            nonce: nonce.into(),
        }
    }
}

impl ProtectedHeader {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 序列化後做 base64url 編碼。
    pub fn to_base64(&self) -> serde_json::Result<String> {
        Ok(base64::encode_url(self.to_json()?))
    }
}
