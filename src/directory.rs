/// ACME v1 服務端點，皆由 CA 基礎 URL 推導而來。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    base: String,
    /// 帳戶註冊。
    pub new_reg: String,
    /// 申請域名授權。
    pub new_authz: String,
    /// 提交 CSR 申請憑證。
    pub new_cert: String,
    /// 目錄端點，僅用於以 HEAD 取得新的 nonce。
    pub directory: String,
}

impl Directory {
    /// 根據 CA 基礎 URL（例如 `https://acme-v01.api.letsencrypt.org`）建立端點集合。
    /// 結尾的 `/` 會被忽略。
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();

        Self {
            new_reg: format!("{}/acme/new-reg", base),
            new_authz: format!("{}/acme/new-authz", base),
            new_cert: format!("{}/acme/new-cert", base),
            directory: format!("{}/directory", base),
            base,
        }
    }

    /// 將相對路徑補上 CA 基礎 URL；已是 `http(s)://` 開頭的絕對 URL 則原樣返回。
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base, url)
        } else {
            format!("{}/{}", self.base, url)
        }
    }
}
