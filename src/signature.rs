use openssl::{hash::MessageDigest, sign::Signer};
use thiserror::Error;

use crate::{base64, key_pair::KeyPair};

/// 簽名操作可能遇到的錯誤。
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Signing error: {0}")]
    SigningError(#[from] openssl::error::ErrorStack),
}

/// 對 `protected64 + "." + payload64` 做 RSA-SHA256（RS256）簽名，
/// 回傳 base64url 編碼的簽名。
///
/// 兩個輸入都必須是已經 base64url 編碼過的字串。
pub fn create_signature(
    protected64: &str,
    payload64: &str,
    key_pair: &KeyPair,
) -> Result<String, SignatureError> {
    let signing_input = format!("{}.{}", protected64, payload64);

    let mut signer = Signer::new(MessageDigest::sha256(), &key_pair.pri_key)?;
    signer.update(signing_input.as_bytes())?;
    let signature = signer.sign_to_vec()?;

    Ok(base64::encode_url(signature))
}
