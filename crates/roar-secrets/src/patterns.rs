//! Built-in regex patterns for common secret formats (§4.10).

use regex::Regex;
use std::sync::LazyLock;

/// One built-in redaction rule: an id for detection reporting, a matching
/// regex, and a replacement template (`$1`/`$2` capture-group references
/// are honoured the way `regex::Regex::replace` interprets them).
pub struct BuiltinPattern {
    pub id: &'static str,
    pub regex: Regex,
    pub replacement: &'static str,
}

fn pattern(id: &'static str, pattern: &str, replacement: &'static str) -> BuiltinPattern {
    BuiltinPattern {
        id,
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid builtin pattern {id}: {e}")),
        replacement,
    }
}

/// The fixed set of built-in patterns, evaluated in this order.
pub static BUILTIN_PATTERNS: LazyLock<Vec<BuiltinPattern>> = LazyLock::new(|| {
    vec![
        pattern("aws_access_key", r"AKIA[A-Z0-9]{16}", "[AWS_KEY_REDACTED]"),
        pattern(
            "aws_secret_key",
            r"(?i)(aws_secret_access_key|aws_secret)[=:\s]+['\x22]?[A-Za-z0-9/+=]{40}['\x22]?",
            "$1=[REDACTED]",
        ),
        pattern("github_token", r"ghp_[A-Za-z0-9]{36,}", "[GITHUB_TOKEN_REDACTED]"),
        pattern(
            "github_pat",
            r"github_pat_[a-zA-Z0-9]{22}_[a-zA-Z0-9]{59}",
            "[GITHUB_PAT_REDACTED]",
        ),
        pattern("anthropic_key", r"sk-ant-[a-zA-Z0-9\-]+", "[ANTHROPIC_KEY_REDACTED]"),
        pattern("openai_key", r"sk-[a-zA-Z0-9]{20,}", "[OPENAI_KEY_REDACTED]"),
        pattern("huggingface_token", r"hf_[a-zA-Z0-9]{34}", "[HF_TOKEN_REDACTED]"),
        pattern(
            "generic_api_key_arg",
            r"(?i)(--?(?:api[_-]?key|apikey))[=\s]+['\x22]?[^\s'\x22]{16,}['\x22]?",
            "$1=[REDACTED]",
        ),
        pattern(
            "generic_token_arg",
            r"(?i)(--?(?:token|auth[_-]?token))[=\s]+['\x22]?[^\s'\x22]{16,}['\x22]?",
            "$1=[REDACTED]",
        ),
        pattern(
            "generic_password_arg",
            r"(?i)(--?(?:password|passwd|pwd))[=\s]+['\x22]?[^\s'\x22]+['\x22]?",
            "$1=[REDACTED]",
        ),
        pattern(
            "generic_secret_arg",
            r"(?i)(--?(?:secret|secret[_-]?key))[=\s]+['\x22]?[^\s'\x22]+['\x22]?",
            "$1=[REDACTED]",
        ),
        pattern(
            "bearer_token",
            r"(?i)(bearer)\s+[a-zA-Z0-9\-._~+/]{20,}=*",
            "$1 [REDACTED]",
        ),
        pattern(
            "git_url_creds",
            r"(https?://)([^:@/\s]+):[^@\s]+@",
            "$1$2:[REDACTED]@",
        ),
        pattern(
            "database_url",
            r"(?i)((?:postgres|mysql|mongodb|redis)://)([^:@/\s]+):[^@\s]+@",
            "$1$2:[REDACTED]@",
        ),
        pattern(
            "private_key",
            r"-----BEGIN\s+(?:RSA\s+|EC\s+|DSA\s+|OPENSSH\s+)?PRIVATE\s+KEY-----",
            "[PRIVATE_KEY_REDACTED]",
        ),
        pattern(
            "slack_webhook",
            r"(?i)(hooks\.slack\.com/services/)[A-Z0-9/]+",
            "$1[REDACTED]",
        ),
        pattern(
            "env_var_assignment",
            r"(?i)([A-Z_]*(?:KEY|TOKEN|SECRET|PASSWORD|PASSWD|PWD|CREDENTIAL|AUTH)[A-Z_]*)=\S+",
            "$1=[REDACTED]",
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtin_patterns_compile() {
        assert!(!BUILTIN_PATTERNS.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<&str> = BUILTIN_PATTERNS.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }
}
