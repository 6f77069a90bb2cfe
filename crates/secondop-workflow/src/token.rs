//! 上传令牌编解码
//!
//! 为影像请求签发一次性、不可猜测的上传凭证。明文只在签发瞬间存在并
//! 交给通知通道，持久化的只有 SHA-256 摘要；兑换按摘要比对。

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 令牌原始熵长度（字节）
const TOKEN_BYTES: usize = 32;

/// base64url 无填充编码后的令牌长度
const TOKEN_LEN: usize = 43;

/// 一次签发的结果
///
/// `plaintext` 只允许流向外部机构的通知通道，绝不进入响应体或日志。
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plaintext: String,
    pub digest: String,
}

/// 签发新令牌
pub fn issue() -> IssuedToken {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    let plaintext = URL_SAFE_NO_PAD.encode(buf);
    let digest = digest_of(&plaintext);
    IssuedToken { plaintext, digest }
}

/// 计算令牌的持久化摘要
pub fn digest_of(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// 结构合法性检查
///
/// 格式不符的令牌无需触达存储即可拒绝；对调用方与未知令牌不可区分。
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_issued_tokens_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..200 {
            assert!(seen.insert(issue().plaintext));
        }
    }

    #[test]
    fn test_issued_token_is_well_formed() {
        let token = issue();
        assert!(is_well_formed(&token.plaintext));
    }

    #[test]
    fn test_digest_differs_from_plaintext() {
        let token = issue();
        assert_ne!(token.plaintext, token.digest);
        assert_eq!(token.digest, digest_of(&token.plaintext));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("short"));
        assert!(!is_well_formed(&"a".repeat(44)));
        assert!(!is_well_formed(&format!("{}!", "a".repeat(42))));
    }
}
