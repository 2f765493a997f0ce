use std::{fs, path::PathBuf, time::Duration};

use acme_http01::{
    certificate::der_to_pem,
    challenge::ChallengeError,
    client::{AcmeClient, ClientError},
    transport::{Method, MockTransport, Response, Transport, TransportError},
};
use tempfile::{tempdir, TempDir};

/// 挑戰檔案的 GET 直接讀網站根目錄，其餘請求交給 [`MockTransport`]。
struct WebRootTransport {
    mock: MockTransport,
    web_root: PathBuf,
}

impl Transport for WebRootTransport {
    fn get(&self, url: &str) -> Result<Response, TransportError> {
        match url.split_once("/.well-known/acme-challenge/") {
            Some((host, token)) if host.starts_with("http://") => {
                let path = self.web_root.join(".well-known/acme-challenge").join(token);
                Ok(match fs::read(path) {
                    Ok(body) => Response::new(200).body(body),
                    Err(_) => Response::new(404).body("not found"),
                })
            }
            _ => self.mock.get(url),
        }
    }

    fn post(&self, url: &str, body: &str) -> Result<Response, TransportError> {
        self.mock.post(url, body)
    }

    fn head(&self, url: &str) -> Result<Response, TransportError> {
        self.mock.head(url)
    }
}

struct Env {
    certs: TempDir,
    web: TempDir,
    transport: WebRootTransport,
}

fn env() -> Env {
    let certs = tempdir().unwrap();
    let web = tempdir().unwrap();
    let transport = WebRootTransport {
        mock: MockTransport::new(),
        web_root: web.path().to_path_buf(),
    };
    Env {
        certs,
        web,
        transport,
    }
}

fn client(env: &Env, poll_interval: Duration) -> AcmeClient<&WebRootTransport> {
    AcmeClient::builder(env.certs.path(), env.web.path())
        .ca("https://ca.example")
        .key_bits(2048)
        .poll_interval(poll_interval)
        .build_with_transport(&env.transport)
        .unwrap()
}

fn authz(domain: &str, token: &str) -> Response {
    Response::new(201)
        .header("Replay-Nonce", format!("authz-{}", token))
        .header("Location", format!("https://ca.example/acme/authz/{}", token))
        .body(format!(
            r#"{{"identifier":{{"type":"dns","value":"{}"}},"status":"pending","challenges":[{{"type":"dns-01","status":"pending","uri":"https://ca.example/acme/challenge/{}/0","token":"dns-{}"}},{{"type":"http-01","status":"pending","uri":"https://ca.example/acme/challenge/{}/1","token":"{}"}}]}}"#,
            domain, token, token, token, token
        ))
}

fn status(code: u16, status: &str) -> Response {
    Response::new(code)
        .header("Replay-Nonce", format!("status-{}", status))
        .body(format!(r#"{{"status":"{}"}}"#, status))
}

#[test]
fn test_full_issuance_with_one_chain_link() {
    let env = env();
    let mock = &env.transport.mock;
    mock.push(Response::new(200).header("Replay-Nonce", "n-0"))
        .push(Response::new(201).header("Replay-Nonce", "n-reg"))
        .push(authz("example.com", "tok-a"))
        .push(status(202, "pending"))
        .push(status(200, "valid"))
        .push(authz("www.example.com", "tok-b"))
        .push(status(202, "valid"))
        .push(
            Response::new(201)
                .header("Replay-Nonce", "n-cert")
                .header("Location", "https://ca.example/acme/cert/1"),
        )
        .push(Response::new(202))
        .push(
            Response::new(200)
                .header("Link", "<https://ca.example/acme/issuer-cert>;rel=\"up\"")
                .body(b"leaf".to_vec()),
        )
        .push(Response::new(200).body(b"issuer".to_vec()));

    let mut client = client(&env, Duration::ZERO);
    client.init_account().unwrap();
    let chain = client
        .sign_domains(&["example.com", "www.example.com"])
        .unwrap();

    assert_eq!(chain.certificates().len(), 2);
    assert_eq!(mock.remaining(), 0);

    let dir = env.certs.path().join("example.com");
    let leaf = der_to_pem(b"leaf");
    let issuer = der_to_pem(b"issuer");
    assert_eq!(fs::read_to_string(dir.join("cert.pem")).unwrap(), leaf);
    assert_eq!(fs::read_to_string(dir.join("chain.pem")).unwrap(), issuer);
    assert_eq!(
        fs::read_to_string(dir.join("fullchain.pem")).unwrap(),
        format!("{}\n{}", leaf, issuer)
    );
    for file in ["private.pem", "public.pem", "last.csr"] {
        assert!(dir.join(file).is_file(), "{} missing", file);
    }
    assert!(env.certs.path().join("_account/private.pem").is_file());
    assert!(!env
        .web
        .path()
        .join(".well-known/acme-challenge/tok-a")
        .exists());

    let requests = mock.requests();
    let posts: Vec<&str> = requests
        .iter()
        .filter(|r| r.method == Method::Post)
        .map(|r| r.url.as_str())
        .collect();
    assert_eq!(
        posts,
        [
            "https://ca.example/acme/new-reg",
            "https://ca.example/acme/new-authz",
            "https://ca.example/acme/challenge/tok-a/1",
            "https://ca.example/acme/new-authz",
            "https://ca.example/acme/challenge/tok-b/1",
            "https://ca.example/acme/new-cert",
        ]
    );
    assert_eq!(
        requests.iter().filter(|r| r.method == Method::Head).count(),
        1
    );
}

#[cfg(unix)]
#[test]
fn test_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let env = env();
    let mock = &env.transport.mock;
    mock.push(Response::new(200).header("Replay-Nonce", "n-0"))
        .push(Response::new(201));

    client(&env, Duration::ZERO).init_account().unwrap();

    let key = env.certs.path().join("_account/private.pem");
    assert_eq!(fs::metadata(key).unwrap().permissions().mode() & 0o777, 0o600);
}

#[test]
fn test_self_check_mismatch_sends_no_challenge() {
    struct WrongContent(WebRootTransport);

    impl Transport for WrongContent {
        fn get(&self, url: &str) -> Result<Response, TransportError> {
            if url.starts_with("http://") {
                return Ok(Response::new(200).body("stale.content"));
            }
            self.0.get(url)
        }

        fn post(&self, url: &str, body: &str) -> Result<Response, TransportError> {
            self.0.post(url, body)
        }

        fn head(&self, url: &str) -> Result<Response, TransportError> {
            self.0.head(url)
        }
    }

    let env = env();
    let transport = WrongContent(WebRootTransport {
        mock: MockTransport::new(),
        web_root: env.web.path().to_path_buf(),
    });
    transport
        .0
        .mock
        .push(Response::new(200).header("Replay-Nonce", "n-0"))
        .push(Response::new(201).header("Replay-Nonce", "n-reg"))
        .push(authz("example.com", "tok-a"));

    let mut client = AcmeClient::builder(env.certs.path(), env.web.path())
        .ca("https://ca.example")
        .key_bits(2048)
        .build_with_transport(&transport)
        .unwrap();
    client.init_account().unwrap();
    let result = client.sign_domains(&["example.com"]);

    assert!(matches!(
        result,
        Err(ClientError::Challenge(ChallengeError::SelfCheckMismatch { .. }))
    ));
    let requests = transport.0.mock.requests();
    assert!(requests.iter().all(|r| !r.url.contains("/acme/challenge/")));
    assert!(!env.certs.path().join("example.com/cert.pem").exists());
}

#[test]
fn test_invalid_challenge_aborts_without_retry() {
    let env = env();
    let mock = &env.transport.mock;
    mock.push(Response::new(200).header("Replay-Nonce", "n-0"))
        .push(Response::new(201))
        .push(Response::new(200).header("Replay-Nonce", "n-1"))
        .push(authz("example.com", "tok-a"))
        .push(status(202, "invalid"));

    let mut client = client(&env, Duration::from_secs(60));
    client.init_account().unwrap();
    let started = std::time::Instant::now();
    let result = client.sign_domains(&["example.com", "www.example.com"]);

    assert!(started.elapsed() < Duration::from_secs(30));
    match result {
        Err(ClientError::Challenge(ChallengeError::VerificationFailed { body })) => {
            assert!(body.contains("invalid"))
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(mock.remaining(), 0);
    assert!(!env.certs.path().join("example.com").exists());
}
