//! Base64 編解碼。
//!
//! ACME 協議中所有欄位都使用 URL 安全、無填充的 Base64（base64url），
//! PEM 內文則使用標準 Base64，兩者共用同一套字元表。

use thiserror::Error;

/// Base64 解碼過程中可能出現的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// 遇到字元表以外的字元，附帶其 ASCII 值。
    #[error("Invalid character: {0}")]
    InvalidCharacter(u8),

    /// 填充符號 `=` 出現在不合法的位置。
    #[error("Invalid padding")]
    InvalidPadding,

    /// 補齊填充後長度仍不是 4 的倍數。
    #[error("Invalid length")]
    InvalidLength,
}

type Result<T> = std::result::Result<T, DecodeError>;

const BASE64_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// 以標準 Base64（含 `=` 填充）編碼任意位元組。
///
/// ```
/// use acme_http01::base64;
/// assert_eq!(base64::encode("abc"), "YWJj");
/// assert_eq!(base64::encode("a"), "YQ==");
/// ```
pub fn encode<T: AsRef<[u8]>>(input: T) -> String {
    let bytes = input.as_ref();
    let mut output = String::with_capacity(bytes.len().div_ceil(3) * 4);

    for chunk in bytes.chunks(3) {
        let b1 = chunk[0];
        let b2 = chunk.get(1).copied().unwrap_or(0);
        let b3 = chunk.get(2).copied().unwrap_or(0);

        output.push(BASE64_CHARS[(b1 >> 2) as usize] as char);
        output.push(BASE64_CHARS[((b1 & 0x03) << 4 | (b2 >> 4)) as usize] as char);
        output.push(if chunk.len() > 1 {
            BASE64_CHARS[((b2 & 0x0F) << 2 | (b3 >> 6)) as usize] as char
        } else {
            '='
        });
        output.push(if chunk.len() > 2 {
            BASE64_CHARS[(b3 & 0x3F) as usize] as char
        } else {
            '='
        });
    }

    output
}

/// 以 base64url 編碼：`+` 換成 `-`、`/` 換成 `_`，並移除結尾的 `=`。
///
/// ```
/// use acme_http01::base64;
/// assert_eq!(base64::encode_url([0xfb, 0xff]), "-_8");
/// ```
pub fn encode_url<T: AsRef<[u8]>>(input: T) -> String {
    encode(input)
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect()
}

/// 解碼標準 Base64 字串。
///
/// # 錯誤
///
/// 長度不是 4 的倍數、填充錯位或含非法字元時回傳對應的 [`DecodeError`]。
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    validate(encoded)?;

    let encoded = encoded.as_bytes();
    let mut buffer = Vec::with_capacity(encoded.len() / 4 * 3);

    for chunk in encoded.chunks_exact(4) {
        let c1 = decode_char(chunk[0])?;
        let c2 = decode_char(chunk[1])?;
        let (c3, c4, valid_bytes) = match (chunk[2], chunk[3]) {
            (b'=', b'=') => (0, 0, 1),
            (b'=', _) => return Err(DecodeError::InvalidPadding),
            (_, b'=') => (decode_char(chunk[2])?, 0, 2),
            _ => (decode_char(chunk[2])?, decode_char(chunk[3])?, 3),
        };

        let group = (c1 as u32) << 18 | (c2 as u32) << 12 | (c3 as u32) << 6 | (c4 as u32);

        buffer.push((group >> 16) as u8);
        if valid_bytes >= 2 {
            buffer.push((group >> 8 & 0xFF) as u8);
        }
        if valid_bytes >= 3 {
            buffer.push((group & 0xFF) as u8);
        }
    }

    Ok(buffer)
}

/// 解碼 base64url 字串，先換回標準字元表並補齊 `=` 至 4 的倍數。
pub fn decode_url(url_encoded: &str) -> Result<Vec<u8>> {
    let mut encoded = url_encoded.replace('-', "+").replace('_', "/");
    let rem = encoded.len() % 4;
    if rem != 0 {
        encoded.push_str(&"=".repeat(4 - rem));
    }
    decode(&encoded)
}

fn validate(s: &str) -> Result<()> {
    if s.len() % 4 != 0 {
        return Err(DecodeError::InvalidLength);
    }

    let bytes = s.as_bytes();
    let mut padding_start = None;

    for (i, &c) in bytes.iter().enumerate() {
        if c == b'=' {
            padding_start.get_or_insert(i);
            if i < bytes.len() - 2 {
                return Err(DecodeError::InvalidPadding);
            }
        } else if padding_start.is_some() {
            return Err(DecodeError::InvalidPadding);
        } else if !is_base64_char(c) {
            return Err(DecodeError::InvalidCharacter(c));
        }
    }

    Ok(())
}

fn decode_char(c: u8) -> Result<u8> {
    match c {
        b'A'..=b'Z' => Ok(c - b'A'),
        b'a'..=b'z' => Ok(c - b'a' + 26),
        b'0'..=b'9' => Ok(c - b'0' + 52),
        b'+' => Ok(62),
        b'/' => Ok(63),
        _ => Err(DecodeError::InvalidCharacter(c)),
    }
}

fn is_base64_char(c: u8) -> bool {
    matches!(c, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_encoding() {
        assert_eq!(encode("Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(encode("ab"), "YWI=");
        assert_eq!(encode([0xFF, 0x00, 0xFF]), "/wD/");
    }

    #[test]
    fn test_url_encoding_strips_padding_and_swaps_alphabet() {
        assert_eq!(encode_url("Hello, World!"), "SGVsbG8sIFdvcmxkIQ");
        assert_eq!(encode_url([0xFB, 0xEF, 0xFF]), "--__");
        assert_eq!(encode_url(""), "");
    }

    #[test]
    fn test_url_round_trip() {
        let long: Vec<u8> = (0..100u8).map(|i| i.wrapping_mul(37)).collect();
        let cases: [&[u8]; 4] = [b"", b"\xfb", b"\xff\xfe\x3e", &long];

        for bytes in cases {
            let encoded = encode_url(bytes);
            assert!(!encoded.contains(['+', '/', '=']));
            assert_eq!(decode_url(&encoded).unwrap(), bytes, "length {}", bytes.len());
        }
    }

    #[test]
    fn test_decode_standard() {
        assert_eq!(decode("SGVsbG8sIFdvcmxkIQ==").unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(decode("SGVsbG8$Ww=="), Err(DecodeError::InvalidCharacter(b'$')));
        assert_eq!(decode("A==="), Err(DecodeError::InvalidPadding));
        assert_eq!(decode("AAA"), Err(DecodeError::InvalidLength));
        assert_eq!(decode_url("A"), Err(DecodeError::InvalidPadding));
    }
}
