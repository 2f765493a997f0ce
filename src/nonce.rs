use thiserror::Error;

use crate::transport::{Response, TransportError};

/// 取得 nonce 時可能發生的錯誤。
#[derive(Error, Debug)]
pub enum NonceError {
    /// 向目錄端點發送 HEAD 請求失敗。
    #[error("Failed to refresh nonce: {0}")]
    RequestFailed(#[from] TransportError),
    /// 重新取得後回應中仍缺少 `Replay-Nonce` 標頭。
    #[error("No Replay-Nonce header found in response from {0}")]
    NoNonceHeader(String),
}

/// 保存最近一次 CA 回應所帶的 `Replay-Nonce`。
///
/// 每個 nonce 只能使用一次：[`Nonce::take`] 取出後槽位即清空，
/// 直到下一個回應再次填入。
#[derive(Debug, Default, Clone)]
pub struct Nonce {
    value: Option<String>,
}

impl Nonce {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以最新的回應取代目前的 nonce；回應沒有 `Replay-Nonce` 時槽位會被清空。
    pub fn observe(&mut self, response: &Response) {
        self.value = response
            .nonce()
            .filter(|nonce| !nonce.is_empty())
            .map(str::to_string);
    }

    /// 取出並清空目前的 nonce。
    pub fn take(&mut self) -> Option<String> {
        self.value.take()
    }

    pub fn peek(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_is_single_use() {
        let mut nonce = Nonce::new();
        nonce.observe(&Response::new(201).header("Replay-Nonce", "n-1"));

        assert_eq!(nonce.peek(), Some("n-1"));
        assert_eq!(nonce.take().as_deref(), Some("n-1"));
        assert_eq!(nonce.take(), None);
    }

    #[test]
    fn test_response_without_nonce_clears_slot() {
        let mut nonce = Nonce::new();
        nonce.observe(&Response::new(200).header("Replay-Nonce", "n-1"));
        nonce.observe(&Response::new(200));

        assert_eq!(nonce.peek(), None);
    }
}
