use serde::Serialize;

use crate::base64;

/// 所有 ACME v1 請求載荷的共同行為。
///
/// 每個載荷都帶有 `resource` 欄位，標明目標端點。
pub trait PayloadT: Serialize {
    /// 將載荷轉換成 JSON 字串。
    fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 將載荷序列化後做 base64url 編碼。
    fn to_base64(&self) -> serde_json::Result<String> {
        Ok(base64::encode_url(self.to_json_string()?))
    }

    /// 簽名前的基本檢查，回傳錯誤說明。
    fn validate(&self) -> Result<(), String>;
}

/// 帳戶註冊（`new-reg`）載荷。
#[derive(Debug, Serialize)]
pub struct NewRegPayload {
    resource: &'static str,
    agreement: String,
}

impl NewRegPayload {
    /// `agreement` 為使用者同意的訂閱協議文件 URL。
    pub fn new(agreement: &str) -> Self {
        Self {
            resource: "new-reg",
            agreement: agreement.to_string(),
        }
    }
}

impl PayloadT for NewRegPayload {
    fn validate(&self) -> Result<(), String> {
        if self.agreement.is_empty() {
            return Err("Agreement URL is required".into());
        }
        Ok(())
    }
}

/// 描述授權目標的識別項，目前只有 `dns` 類型。
#[derive(Debug, Serialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

/// 申請域名授權（`new-authz`）載荷。
#[derive(Debug, Serialize)]
pub struct NewAuthzPayload {
    resource: &'static str,
    identifier: Identifier,
}

impl NewAuthzPayload {
    pub fn new(domain: &str) -> Self {
        Self {
            resource: "new-authz",
            identifier: Identifier {
                type_: "dns".to_string(),
                value: domain.to_string(),
            },
        }
    }
}

impl PayloadT for NewAuthzPayload {
    fn validate(&self) -> Result<(), String> {
        if self.identifier.value.is_empty() {
            return Err("Identifier value cannot be empty".into());
        }
        Ok(())
    }
}

/// 回應 HTTP-01 挑戰的載荷。
#[derive(Debug, Serialize)]
pub struct ChallengeResponsePayload {
    resource: &'static str,
    #[serde(rename = "type")]
    type_: &'static str,
    #[serde(rename = "keyAuthorization")]
    key_authorization: String,
    token: String,
}

impl ChallengeResponsePayload {
    pub fn new(token: &str, key_authorization: &str) -> Self {
        Self {
            resource: "challenge",
            type_: "http-01",
            key_authorization: key_authorization.to_string(),
            token: token.to_string(),
        }
    }
}

impl PayloadT for ChallengeResponsePayload {
    /// key authorization 必須以 `<token>.` 開頭。
    fn validate(&self) -> Result<(), String> {
        let prefix = format!("{}.", self.token);
        if self.token.is_empty() || !self.key_authorization.starts_with(&prefix) {
            return Err(format!(
                "Key authorization does not belong to token {}",
                self.token
            ));
        }
        Ok(())
    }
}

/// 提交 CSR（`new-cert`）載荷。
#[derive(Debug, Serialize)]
pub struct NewCertPayload {
    resource: &'static str,
    csr: String,
}

impl NewCertPayload {
    /// `csr_b64url` 為 DER 格式 CSR 的 base64url 編碼。
    pub fn new(csr_b64url: &str) -> Self {
        Self {
            resource: "new-cert",
            csr: csr_b64url.to_string(),
        }
    }
}

impl PayloadT for NewCertPayload {
    fn validate(&self) -> Result<(), String> {
        if self.csr.is_empty() {
            return Err("CSR cannot be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_json() {
        assert_eq!(
            NewAuthzPayload::new("example.com").to_json_string().unwrap(),
            r#"{"resource":"new-authz","identifier":{"type":"dns","value":"example.com"}}"#
        );
        assert_eq!(
            ChallengeResponsePayload::new("tok", "tok.thumb")
                .to_json_string()
                .unwrap(),
            r#"{"resource":"challenge","type":"http-01","keyAuthorization":"tok.thumb","token":"tok"}"#
        );
    }

    #[test]
    fn test_urls_are_not_escaped() {
        let json = NewRegPayload::new("https://ca.example/terms/v1.pdf")
            .to_json_string()
            .unwrap();
        assert_eq!(
            json,
            r#"{"resource":"new-reg","agreement":"https://ca.example/terms/v1.pdf"}"#
        );
    }

    #[test]
    fn test_validation() {
        assert!(NewRegPayload::new("").validate().is_err());
        assert!(NewAuthzPayload::new("").validate().is_err());
        assert!(ChallengeResponsePayload::new("tok", "other.thumb")
            .validate()
            .is_err());
        assert!(ChallengeResponsePayload::new("tok", "tok.thumb")
            .validate()
            .is_ok());
        assert!(NewCertPayload::new("").validate().is_err());
    }
}
