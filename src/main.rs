//! 命令列工具：註冊帳戶並為一組域名申請證書。

use std::{path::PathBuf, process::ExitCode, time::Duration};

use acme_http01::client::{AcmeClient, Config, Result};
use clap::Parser;
use tracing::error;

/// 以 HTTP-01 挑戰向 ACME v1 CA 申請證書
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 要簽發的域名，第一個為 CN 與輸出目錄名稱
    #[arg(required = true)]
    domains: Vec<String>,

    /// 存放帳戶金鑰、域名金鑰與證書的目錄
    #[arg(long, env = "ACME_CERTS_DIR", default_value = "certs")]
    certs_dir: PathBuf,

    /// HTTP 伺服器的網站根目錄，挑戰檔案寫在 .well-known/acme-challenge/ 之下
    #[arg(long, env = "ACME_WEB_ROOT")]
    web_root: PathBuf,

    /// CA 基礎 URL
    #[arg(long, default_value = Config::DEFAULT_CA)]
    ca: String,

    /// 訂閱協議 URL
    #[arg(long, default_value = Config::DEFAULT_AGREEMENT)]
    agreement: String,

    #[arg(long, default_value = Config::DEFAULT_COUNTRY)]
    country: String,

    #[arg(long, default_value = Config::DEFAULT_STATE)]
    state: String,

    /// 新金鑰的 RSA 位元長度
    #[arg(long, default_value_t = Config::DEFAULT_KEY_BITS)]
    key_bits: u32,

    /// 輪詢間隔（秒）
    #[arg(long, default_value_t = 1)]
    poll_interval: u64,

    /// 跳過帳戶註冊（帳戶已存在時使用）
    #[arg(long)]
    skip_register: bool,

    /// 日誌等級（trace, debug, info, warn, error），RUST_LOG 優先
    #[arg(long, env = "ACME_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn run(args: Args) -> Result<()> {
    let mut client = AcmeClient::builder(&args.certs_dir, &args.web_root)
        .ca(&args.ca)
        .agreement(&args.agreement)
        .country(&args.country)
        .state(&args.state)
        .key_bits(args.key_bits)
        .poll_interval(Duration::from_secs(args.poll_interval))
        .build()?;

    if !args.skip_register {
        client.init_account()?;
    }
    client.sign_domains(args.domains.as_slice())?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Certificate request failed");
            ExitCode::FAILURE
        }
    }
}
