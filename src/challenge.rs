use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::{
    signer::SignerError,
    storage::StorageError,
    transport::{Response, TransportError},
};

/// 定義與挑戰（Challenge）流程相關的錯誤類型。
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No http-01 challenge offered for {0}")]
    NoHttpChallenge(String),
    #[error("Invalid challenge token {0:?}")]
    InvalidToken(String),
    #[error("Missing Location header in authorization response for {0}")]
    MissingLocation(String),
    #[error("Challenge file at {url} does not match: expected {expected:?}, found {found:?}")]
    SelfCheckMismatch {
        url: String,
        expected: String,
        found: String,
    },
    #[error("Verification failed: {body}")]
    VerificationFailed { body: String },
}

/// 表示 ACME 挑戰的類型。
///
/// 只有 HTTP-01 會被處理，其餘類型保留原字串以便記錄。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    Http01,
    Dns01,
    TlsSni01,
    Other(String),
}

impl ChallengeType {
    fn from_str(s: &str) -> Self {
        match s {
            "http-01" => Self::Http01,
            "dns-01" => Self::Dns01,
            "tls-sni-01" => Self::TlsSni01,
            other => Self::Other(other.to_string()),
        }
    }
}

/// 表示挑戰或授權的狀態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
    Other(String),
}

impl ChallengeStatus {
    /// 根據字串返回對應的狀態，大小寫不敏感。
    fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "valid" => Self::Valid,
            "invalid" => Self::Invalid,
            _ => Self::Other(s.to_string()),
        }
    }

    /// 從回應內文讀取 `status` 欄位；內文不是 JSON、沒有此欄位或欄位為空字串時回傳 `None`。
    pub fn of(response: &Response) -> Option<Self> {
        response
            .json::<StatusBody>()
            .ok()
            .and_then(|body| body.status)
            .filter(|status| !status.is_empty())
            .map(|status| Self::from_str(&status))
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Processing => f.write_str("processing"),
            Self::Valid => f.write_str("valid"),
            Self::Invalid => f.write_str("invalid"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// 授權中的一個挑戰。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub challenge_type: ChallengeType,
    /// 提交挑戰回應的 URI
    pub uri: String,
    pub token: String,
    pub status: Option<ChallengeStatus>,
}

impl Challenge {
    /// token 會成為網站根目錄下的檔名，只接受非空的 base64url 字元。
    pub fn has_valid_token(&self) -> bool {
        !self.token.is_empty()
            && self
                .token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    /// 挑戰檔案相對於網站根目錄的路徑。
    pub fn well_known_path(&self) -> String {
        format!(".well-known/acme-challenge/{}", self.token)
    }

    /// CA 將會讀取的挑戰檔案 URL，自我檢查也使用同一個位址。
    pub fn well_known_url(&self, domain: &str) -> String {
        format!("http://{}/{}", domain, self.well_known_path())
    }
}

#[derive(Deserialize)]
struct StatusBody {
    status: Option<String>,
}

#[derive(Deserialize)]
struct AuthorizationBody {
    #[serde(default)]
    challenges: Vec<ChallengeBody>,
}

#[derive(Deserialize)]
struct ChallengeBody {
    #[serde(rename = "type")]
    challenge_type: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    token: String,
    status: Option<String>,
}

/// `new-authz` 回應中的授權，保留 CA 給出的挑戰順序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub challenges: Vec<Challenge>,
}

impl Authorization {
    /// 從 JSON 內文解析授權。
    pub fn parse(body: &[u8]) -> Result<Self, ChallengeError> {
        let body: AuthorizationBody = serde_json::from_slice(body)?;
        let challenges = body
            .challenges
            .into_iter()
            .map(|c| Challenge {
                challenge_type: ChallengeType::from_str(&c.challenge_type),
                uri: c.uri,
                token: c.token,
                status: c.status.as_deref().map(ChallengeStatus::from_str),
            })
            .collect();
        Ok(Self { challenges })
    }

    /// 取第一個 HTTP-01 挑戰。
    ///
    /// 找不到時回傳 [`ChallengeError::NoHttpChallenge`]；token 含有 base64url 以外的字元
    /// 或為空時回傳 [`ChallengeError::InvalidToken`]。
    pub fn select_http01(&self, domain: &str) -> Result<&Challenge, ChallengeError> {
        let challenge = self
            .challenges
            .iter()
            .find(|c| c.challenge_type == ChallengeType::Http01)
            .ok_or_else(|| ChallengeError::NoHttpChallenge(domain.to_string()))?;

        if !challenge.has_valid_token() {
            return Err(ChallengeError::InvalidToken(challenge.token.clone()));
        }
        Ok(challenge)
    }
}
