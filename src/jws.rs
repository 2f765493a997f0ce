//! JWS 請求信封。

use serde::Serialize;

use crate::protection::Header;

/// 送往 CA 的 JSON Web Signature 信封。
///
/// 序列化結果：
///
/// ```json
/// {"header": {...}, "protected": "<b64u>", "payload": "<b64u>", "signature": "<b64u>"}
/// ```
#[derive(Serialize, Debug, Clone)]
pub struct Jws {
    header: Header,
    protected: String,
    payload: String,
    signature: String,
}

impl Jws {
    /// 組合信封，`protected64`、`payload64` 與 `signature64` 都必須已是 base64url 字串。
    pub fn new(header: Header, protected64: String, payload64: String, signature64: String) -> Self {
        Jws {
            header,
            protected: protected64,
            payload: payload64,
            signature: signature64,
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
