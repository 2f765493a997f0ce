//! 單一域名的 HTTP-01 授權流程。
//!
//! 依序執行：申請授權、選擇挑戰、發布挑戰檔案、自我檢查、提交回應、輪詢狀態，
//! 最後移除挑戰檔案。

use std::{sync::Arc, thread, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    challenge::{Authorization, Challenge, ChallengeError, ChallengeStatus},
    payload::{ChallengeResponsePayload, NewAuthzPayload},
    signer::RequestSigner,
    storage::Storage,
    transport::{Response, Transport, TransportError},
};

type Result<T> = std::result::Result<T, ChallengeError>;

/// 在網站根目錄發布挑戰檔案並等待 CA 完成驗證。
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    web_root: Arc<dyn Storage>,
    poll_interval: Duration,
}

impl AuthorizationFlow {
    pub fn new(web_root: Arc<dyn Storage>, poll_interval: Duration) -> Self {
        Self {
            web_root,
            poll_interval,
        }
    }

    /// 為 `domain` 取得授權，成功回傳時 CA 已不再回報 `pending`。
    ///
    /// 挑戰檔案無論成功與否都會嘗試刪除，刪除失敗只記錄警告。
    ///
    /// # Errors
    ///
    /// - 沒有 HTTP-01 挑戰：[`ChallengeError::NoHttpChallenge`]
    /// - token 不是 base64url：[`ChallengeError::InvalidToken`]，網站根目錄不會被寫入
    /// - 自我檢查內容不符：[`ChallengeError::SelfCheckMismatch`]，此時不會向 CA 提交挑戰
    /// - 狀態缺失或為 `invalid`：[`ChallengeError::VerificationFailed`]，附上原始內文
    pub fn authorize<T: Transport>(&self, signer: &mut RequestSigner<T>, domain: &str) -> Result<()> {
        info!(domain, "Requesting challenge");
        let (challenge, location) = self.request_authorization(signer, domain)?;

        let key_authorization = signer.key_authorization(&challenge.token)?;
        self.publish(&challenge, &key_authorization)?;
        info!(token = %challenge.token, "Token saved");

        let result = self.validate(signer, domain, &challenge, &location, &key_authorization);
        self.cleanup(&challenge);
        result
    }

    fn request_authorization<T: Transport>(
        &self,
        signer: &mut RequestSigner<T>,
        domain: &str,
    ) -> Result<(Challenge, String)> {
        let new_authz = signer.directory().new_authz.clone();
        let response = signer.post(&new_authz, &NewAuthzPayload::new(domain))?;
        if !response.is_success() {
            return Err(TransportError::UnexpectedStatus {
                url: new_authz,
                status: response.status,
                body: response.text(),
            }
            .into());
        }

        let authorization = Authorization::parse(&response.body)?;
        let challenge = authorization.select_http01(domain)?.clone();
        let location = response
            .location()
            .ok_or_else(|| ChallengeError::MissingLocation(domain.to_string()))?
            .to_string();

        debug!(uri = %challenge.uri, location = %location, "Selected http-01 challenge");
        Ok((challenge, location))
    }

    fn publish(&self, challenge: &Challenge, key_authorization: &str) -> Result<()> {
        self.web_root
            .write_file(&challenge.well_known_path(), key_authorization.as_bytes())?;
        Ok(())
    }

    fn validate<T: Transport>(
        &self,
        signer: &mut RequestSigner<T>,
        domain: &str,
        challenge: &Challenge,
        location: &str,
        key_authorization: &str,
    ) -> Result<()> {
        self.self_check(signer, domain, challenge, key_authorization)?;

        info!(uri = %challenge.uri, "Sending request to challenge");
        let response = signer.post(
            &challenge.uri,
            &ChallengeResponsePayload::new(&challenge.token, key_authorization),
        )?;
        self.poll(signer, location, response)
    }

    /// 自己先讀一次挑戰檔案；這個請求不屬於 CA 協議，不經過 nonce 追蹤。
    fn self_check<T: Transport>(
        &self,
        signer: &RequestSigner<T>,
        domain: &str,
        challenge: &Challenge,
        key_authorization: &str,
    ) -> Result<()> {
        let url = challenge.well_known_url(domain);
        debug!(url = %url, "Checking challenge file");

        let response = signer.transport().get(&url)?;
        let found = response.text();
        if !response.is_success() || found.trim() != key_authorization {
            return Err(ChallengeError::SelfCheckMismatch {
                url,
                expected: key_authorization.to_string(),
                found,
            });
        }
        Ok(())
    }

    fn poll<T: Transport>(
        &self,
        signer: &mut RequestSigner<T>,
        location: &str,
        mut response: Response,
    ) -> Result<()> {
        loop {
            match ChallengeStatus::of(&response) {
                None | Some(ChallengeStatus::Invalid) => {
                    return Err(ChallengeError::VerificationFailed {
                        body: response.text(),
                    });
                }
                Some(ChallengeStatus::Pending) => {
                    info!("Verification pending, sleeping");
                    thread::sleep(self.poll_interval);
                    response = signer.get(location)?;
                }
                Some(status) => {
                    info!(status = %status, "Verification ended");
                    return Ok(());
                }
            }
        }
    }

    fn cleanup(&self, challenge: &Challenge) {
        if let Err(err) = self.web_root.remove(&challenge.well_known_path()) {
            warn!(token = %challenge.token, error = %err, "Failed to remove challenge file");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{
        directory::Directory,
        key_pair::KeyPair,
        storage::MemStorage,
        transport::{Method, MockTransport},
    };

    const LOCATION: &str = "https://ca.example/acme/authz/1";
    const CHALLENGE_URI: &str = "https://ca.example/acme/challenge/1/2";
    const TOKEN: &str = "tok-123";

    struct Fixture<'a> {
        web_root: Arc<MemStorage>,
        signer: RequestSigner<&'a MockTransport>,
        key_authorization: String,
    }

    fn fixture(mock: &MockTransport) -> Fixture<'_> {
        let storage = Arc::new(MemStorage::new());
        KeyPair::generate_into(&*storage, "_account", 2048).unwrap();
        let signer = RequestSigner::new(mock, Directory::new("https://ca.example"), storage);
        let key_authorization = signer.key_authorization(TOKEN).unwrap();
        Fixture {
            web_root: Arc::new(MemStorage::new()),
            signer,
            key_authorization,
        }
    }

    fn authz_response(challenge_type: &str) -> Response {
        authz_response_with_token(challenge_type, TOKEN)
    }

    fn authz_response_with_token(challenge_type: &str, token: &str) -> Response {
        Response::new(201)
            .header("Replay-Nonce", "n-2")
            .header("Location", LOCATION)
            .body(format!(
                r#"{{"identifier":{{"type":"dns","value":"example.com"}},"status":"pending","challenges":[{{"type":"{}","status":"pending","uri":"{}","token":"{}"}}]}}"#,
                challenge_type, CHALLENGE_URI, token
            ))
    }

    #[test]
    fn test_poll_stops_on_valid() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response("http-01"))
            .push(Response::new(200).body(format!("{}\n", fx.key_authorization)))
            .push(Response::new(202).header("Replay-Nonce", "n-3").body(r#"{"status":"pending"}"#))
            .push(Response::new(200).body(r#"{"status":"pending"}"#))
            .push(Response::new(200).body(r#"{"status":"valid"}"#))
            .push(Response::new(200).body(r#"{"status":"valid"}"#));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::ZERO);
        flow.authorize(&mut fx.signer, "example.com").unwrap();

        let requests = mock.requests();
        let summary: Vec<(Method, &str)> = requests
            .iter()
            .map(|r| (r.method, r.url.as_str()))
            .collect();
        assert_eq!(
            summary,
            [
                (Method::Head, "https://ca.example/directory"),
                (Method::Post, "https://ca.example/acme/new-authz"),
                (Method::Get, "http://example.com/.well-known/acme-challenge/tok-123"),
                (Method::Post, CHALLENGE_URI),
                (Method::Get, LOCATION),
                (Method::Get, LOCATION),
            ]
        );
        assert_eq!(mock.remaining(), 1);
        assert!(!fx
            .web_root
            .exists(".well-known/acme-challenge/tok-123")
            .unwrap());
    }

    #[test]
    fn test_challenge_payload() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response("http-01"))
            .push(Response::new(200).body(fx.key_authorization.clone()))
            .push(Response::new(202).body(r#"{"status":"valid"}"#));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::ZERO);
        flow.authorize(&mut fx.signer, "example.com").unwrap();

        let requests = mock.requests();
        let envelope: serde_json::Value =
            serde_json::from_str(requests[3].body.as_deref().unwrap()).unwrap();
        let payload: serde_json::Value = serde_json::from_slice(
            &crate::base64::decode_url(envelope["payload"].as_str().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(payload["resource"], "challenge");
        assert_eq!(payload["type"], "http-01");
        assert_eq!(payload["token"], TOKEN);
        assert_eq!(payload["keyAuthorization"], fx.key_authorization.as_str());
    }

    #[test]
    fn test_self_check_mismatch_skips_submission() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response("http-01"))
            .push(Response::new(200).body("something else"));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::ZERO);
        let result = flow.authorize(&mut fx.signer, "example.com");

        assert!(matches!(
            result,
            Err(ChallengeError::SelfCheckMismatch { ref found, .. }) if found == "something else"
        ));
        let requests = mock.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.url != CHALLENGE_URI));
        assert!(!fx
            .web_root
            .exists(".well-known/acme-challenge/tok-123")
            .unwrap());
    }

    #[test]
    fn test_invalid_status_fails_without_polling() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response("http-01"))
            .push(Response::new(200).body(fx.key_authorization.clone()))
            .push(Response::new(202).body(r#"{"status":"invalid","error":{"detail":"nope"}}"#));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::from_secs(60));
        let started = Instant::now();
        let result = flow.authorize(&mut fx.signer, "example.com");

        assert!(started.elapsed() < Duration::from_secs(30));
        match result {
            Err(ChallengeError::VerificationFailed { body }) => assert!(body.contains("nope")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(mock.requests().len(), 4);
    }

    #[test]
    fn test_missing_status_is_fatal() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response("http-01"))
            .push(Response::new(200).body(fx.key_authorization.clone()))
            .push(Response::new(500).body("internal error"));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::ZERO);

        assert!(matches!(
            flow.authorize(&mut fx.signer, "example.com"),
            Err(ChallengeError::VerificationFailed { ref body }) if body == "internal error"
        ));
    }

    #[test]
    fn test_empty_status_is_fatal() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response("http-01"))
            .push(Response::new(200).body(fx.key_authorization.clone()))
            .push(Response::new(202).body(r#"{"status":""}"#));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::ZERO);

        assert!(matches!(
            flow.authorize(&mut fx.signer, "example.com"),
            Err(ChallengeError::VerificationFailed { ref body }) if body == r#"{"status":""}"#
        ));
        assert_eq!(mock.requests().len(), 4);
    }

    #[test]
    fn test_unsafe_token_leaves_web_root_untouched() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        fx.web_root.write_file("index.html", b"<html></html>").unwrap();
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response_with_token("http-01", "../../index.html"));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::ZERO);

        assert!(matches!(
            flow.authorize(&mut fx.signer, "example.com"),
            Err(ChallengeError::InvalidToken(ref token)) if token == "../../index.html"
        ));
        assert_eq!(fx.web_root.read_file("index.html").unwrap(), b"<html></html>");
        assert!(!fx.web_root.exists(".well-known").unwrap());
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn test_no_http_challenge_publishes_nothing() {
        let mock = MockTransport::new();
        let mut fx = fixture(&mock);
        mock.push(Response::new(200).header("Replay-Nonce", "n-1"))
            .push(authz_response("dns-01"));

        let flow = AuthorizationFlow::new(fx.web_root.clone(), Duration::ZERO);

        assert!(matches!(
            flow.authorize(&mut fx.signer, "example.com"),
            Err(ChallengeError::NoHttpChallenge(_))
        ));
        assert!(!fx.web_root.exists(".well-known").unwrap());
        assert_eq!(mock.requests().len(), 2);
    }
}
