//! HTTP 傳輸層。
//!
//! 每次呼叫都回傳一個不可變的 [`Response`]，狀態碼、標頭與內文都隨回傳值傳遞，
//! 上層不需要也無法讀取「上一次請求」之類的隱藏狀態。

use std::{collections::VecDeque, fmt, sync::Mutex};

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// 傳輸層錯誤，對應協議流程中的 HTTP 類錯誤。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },
}

type Result<T> = std::result::Result<T, TransportError>;

/// HTTP 方法，僅涵蓋協議實際使用到的三種。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
        })
    }
}

/// 依接收順序保存的回應標頭，名稱比對不分大小寫。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 附加一個標頭，同名標頭可重複出現（例如多個 `Link`）。
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// 取得第一個符合名稱的標頭值。
    pub fn get<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.get_all(name).next()
    }

    /// 依出現順序取得所有符合名稱的標頭值。
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// 一次 HTTP 呼叫的完整結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Replay-Nonce` 標頭，前後空白會被去除。
    pub fn nonce(&self) -> Option<&str> {
        self.headers.get("Replay-Nonce").map(str::trim)
    }

    /// `Location` 標頭。
    pub fn location(&self) -> Option<&str> {
        self.headers.get("Location").map(str::trim)
    }

    /// 所有 `rel="up"` 的 `Link` 目標，保持標頭中的先後順序。
    ///
    /// 一個 `Link` 標頭可能以逗號分隔多個連結，`rel` 參數可帶或不帶引號。
    pub fn up_links(&self) -> Vec<String> {
        self.headers
            .get_all("Link")
            .flat_map(split_links)
            .filter_map(parse_up_link)
            .collect()
    }

    /// 以 UTF-8（有損）解讀內文，供錯誤訊息與文字比對使用。
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// 以逗號切分 `Link` 標頭，`<...>` 內的逗號屬於 URL。
fn split_links(value: &str) -> Vec<&str> {
    let mut links = Vec::new();
    let mut in_url = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '<' => in_url = true,
            '>' => in_url = false,
            ',' if !in_url => {
                links.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    links.push(&value[start..]);
    links
}

fn parse_up_link(link: &str) -> Option<String> {
    let link = link.trim();
    let rest = link.strip_prefix('<')?;
    let (url, params) = rest.split_once('>')?;

    let is_up = params.split(';').any(|param| {
        let Some((key, value)) = param.split_once('=') else {
            return false;
        };
        key.trim().eq_ignore_ascii_case("rel") && value.trim().trim_matches('"') == "up"
    });

    is_up.then(|| url.to_string())
}

/// 泛用的 HTTP 客戶端介面。
pub trait Transport {
    fn get(&self, url: &str) -> Result<Response>;

    fn post(&self, url: &str, body: &str) -> Result<Response>;

    fn head(&self, url: &str) -> Result<Response>;
}

/// 以 `reqwest` 阻塞式客戶端實作的傳輸層。
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn send(&self, method: Method, url: &str, body: Option<&str>) -> Result<Response> {
        let request = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Head => self.client.head(url),
        }
        .header("Accept", "application/json")
        .header("Content-Type", "application/json");

        let request = match body {
            Some(body) => request.body(body.to_owned()),
            None => request,
        };

        let response = request.send()?;

        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        let body = response.bytes()?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Response> {
        self.send(Method::Get, url, None)
    }

    fn post(&self, url: &str, body: &str) -> Result<Response> {
        self.send(Method::Post, url, Some(body))
    }

    fn head(&self, url: &str) -> Result<Response> {
        self.send(Method::Head, url, None)
    }
}

/// [`MockTransport`] 記錄下來的一次請求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

/// 依序回放預先排好的回應，並記錄收到的每一個請求，通常用於測試。
///
/// 不檢查 URL：第 N 個請求拿到第 N 個回應。回應用完時回傳
/// [`TransportError::Connection`]。
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Response>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 排入下一個要回放的回應。
    pub fn push(&self, response: Response) -> &Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    /// 目前為止收到的所有請求。
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// 尚未被取用的回應數量。
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .map(|responses| responses.len())
            .unwrap_or_default()
    }

    fn respond(&self, method: Method, url: &str, body: Option<&str>) -> Result<Response> {
        let lock_err = || TransportError::Connection("mock transport lock poisoned".to_string());

        self.requests.lock().map_err(|_| lock_err())?.push(RecordedRequest {
            method,
            url: url.to_string(),
            body: body.map(str::to_string),
        });

        self.responses
            .lock()
            .map_err(|_| lock_err())?
            .pop_front()
            .ok_or_else(|| {
                TransportError::Connection(format!("no scripted response for {} {}", method, url))
            })
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<Response> {
        self.respond(Method::Get, url, None)
    }

    fn post(&self, url: &str, body: &str) -> Result<Response> {
        self.respond(Method::Post, url, Some(body))
    }

    fn head(&self, url: &str) -> Result<Response> {
        self.respond(Method::Head, url, None)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<Response> {
        (**self).get(url)
    }

    fn post(&self, url: &str, body: &str) -> Result<Response> {
        (**self).post(url, body)
    }

    fn head(&self, url: &str) -> Result<Response> {
        (**self).head(url)
    }
}
