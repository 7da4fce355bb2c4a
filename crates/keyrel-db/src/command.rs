//! Typed command set sent to the store.
//!
//! Each variant renders to the command name plus its argument list in
//! wire order. Only the commands the scan and modify engines need exist.

use std::fmt;

/// Keys requested per enumeration page (`COUNT`).
pub const PAGE_SIZE: u32 = 1000;

/// Cursor token that starts an enumeration and marks its completion.
pub const CURSOR_START: &str = "0";

/// One store command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `AUTH password`
    Auth {
        /// Password.
        password: String,
    },
    /// `SELECT index`
    Select {
        /// Database index.
        index: u32,
    },
    /// `GET key`
    Get {
        /// Key.
        key: String,
    },
    /// `SET key value`
    Set {
        /// Key.
        key: String,
        /// Value.
        value: String,
    },
    /// `DEL key`
    Del {
        /// Key.
        key: String,
    },
    /// `EXISTS key`
    Exists {
        /// Key.
        key: String,
    },
    /// `RENAME key newkey`
    Rename {
        /// Existing key.
        from: String,
        /// New name.
        to: String,
    },
    /// `HGET key field`
    HGet {
        /// Hash key.
        key: String,
        /// Field.
        field: String,
    },
    /// `HGETALL key`
    HGetAll {
        /// Hash key.
        key: String,
    },
    /// `HSET key field value`
    HSet {
        /// Hash key.
        key: String,
        /// Field.
        field: String,
        /// Value.
        value: String,
    },
    /// `HEXISTS key field`
    HExists {
        /// Hash key.
        key: String,
        /// Field.
        field: String,
    },
    /// `HDEL key field`
    HDel {
        /// Hash key.
        key: String,
        /// Field.
        field: String,
    },
    /// `LRANGE key 0 -1`
    LRangeAll {
        /// List key.
        key: String,
    },
    /// `RPUSH key value`
    RPush {
        /// List key.
        key: String,
        /// Value appended at the tail.
        value: String,
    },
    /// `SMEMBERS key`
    SMembers {
        /// Set key.
        key: String,
    },
    /// `SADD key member`
    SAdd {
        /// Set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `SREM key member`
    SRem {
        /// Set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `SISMEMBER key member`
    SIsMember {
        /// Set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `SSCAN key cursor COUNT n`
    SScan {
        /// Set key.
        key: String,
        /// Cursor token.
        cursor: String,
    },
    /// `SCAN cursor [MATCH pattern] COUNT n`
    Scan {
        /// Cursor token.
        cursor: String,
        /// Glob pattern, if the scan is filtered.
        pattern: Option<String>,
    },
    /// `ZRANGE key 0 -1 WITHSCORES`
    ZRangeWithScores {
        /// Sorted-set key.
        key: String,
    },
    /// `ZADD key score member`
    ZAdd {
        /// Sorted-set key.
        key: String,
        /// Score, as text.
        score: String,
        /// Member.
        member: String,
    },
    /// `ZREM key member`
    ZRem {
        /// Sorted-set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `ZRANK key member`
    ZRank {
        /// Sorted-set key.
        key: String,
        /// Member.
        member: String,
    },
    /// `ZSCORE key member`
    ZScore {
        /// Sorted-set key.
        key: String,
        /// Member.
        member: String,
    },
}

impl Command {
    /// Command name as sent on the wire.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "AUTH",
            Self::Select { .. } => "SELECT",
            Self::Get { .. } => "GET",
            Self::Set { .. } => "SET",
            Self::Del { .. } => "DEL",
            Self::Exists { .. } => "EXISTS",
            Self::Rename { .. } => "RENAME",
            Self::HGet { .. } => "HGET",
            Self::HGetAll { .. } => "HGETALL",
            Self::HSet { .. } => "HSET",
            Self::HExists { .. } => "HEXISTS",
            Self::HDel { .. } => "HDEL",
            Self::LRangeAll { .. } => "LRANGE",
            Self::RPush { .. } => "RPUSH",
            Self::SMembers { .. } => "SMEMBERS",
            Self::SAdd { .. } => "SADD",
            Self::SRem { .. } => "SREM",
            Self::SIsMember { .. } => "SISMEMBER",
            Self::SScan { .. } => "SSCAN",
            Self::Scan { .. } => "SCAN",
            Self::ZRangeWithScores { .. } => "ZRANGE",
            Self::ZAdd { .. } => "ZADD",
            Self::ZRem { .. } => "ZREM",
            Self::ZRank { .. } => "ZRANK",
            Self::ZScore { .. } => "ZSCORE",
        }
    }

    /// Arguments in wire order, excluding the command name.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Auth { password } => vec![password.clone()],
            Self::Select { index } => vec![index.to_string()],
            Self::Get { key }
            | Self::Del { key }
            | Self::Exists { key }
            | Self::HGetAll { key }
            | Self::SMembers { key } => vec![key.clone()],
            Self::Set { key, value } | Self::RPush { key, value } => {
                vec![key.clone(), value.clone()]
            }
            Self::Rename { from, to } => vec![from.clone(), to.clone()],
            Self::HGet { key, field } | Self::HExists { key, field } | Self::HDel { key, field } => {
                vec![key.clone(), field.clone()]
            }
            Self::HSet { key, field, value } => vec![key.clone(), field.clone(), value.clone()],
            Self::LRangeAll { key } => vec![key.clone(), "0".to_owned(), "-1".to_owned()],
            Self::SAdd { key, member }
            | Self::SRem { key, member }
            | Self::SIsMember { key, member }
            | Self::ZRem { key, member }
            | Self::ZRank { key, member }
            | Self::ZScore { key, member } => vec![key.clone(), member.clone()],
            Self::SScan { key, cursor } => vec![
                key.clone(),
                cursor.clone(),
                "COUNT".to_owned(),
                PAGE_SIZE.to_string(),
            ],
            Self::Scan { cursor, pattern } => {
                let mut args = vec![cursor.clone()];
                if let Some(pattern) = pattern {
                    args.push("MATCH".to_owned());
                    args.push(pattern.clone());
                }
                args.push("COUNT".to_owned());
                args.push(PAGE_SIZE.to_string());
                args
            }
            Self::ZRangeWithScores { key } => vec![
                key.clone(),
                "0".to_owned(),
                "-1".to_owned(),
                "WITHSCORES".to_owned(),
            ],
            Self::ZAdd { key, score, member } => vec![key.clone(), score.clone(), member.clone()],
        }
    }
}

impl fmt::Display for Command {
    /// Renders the command for logs. Passwords are masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        if matches!(self, Self::Auth { .. }) {
            return f.write_str(" ****");
        }
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Escape glob metacharacters so `text` matches itself literally in a
/// `SCAN ... MATCH` pattern.
pub fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `MATCH` pattern selecting every key that starts with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = escape_glob(prefix);
    pattern.push('*');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_args_carry_match_and_count() {
        let command = Command::Scan {
            cursor: "17".to_owned(),
            pattern: Some(prefix_pattern("user:")),
        };
        assert_eq!(command.to_string(), "SCAN 17 MATCH user:* COUNT 1000");
    }

    #[test]
    fn zadd_places_score_before_member() {
        let command = Command::ZAdd {
            key: "z".to_owned(),
            score: "3".to_owned(),
            member: "m".to_owned(),
        };
        assert_eq!(command.args(), vec!["z", "3", "m"]);
    }

    #[test]
    fn auth_is_masked_in_logs() {
        let command = Command::Auth {
            password: "hunter2".to_owned(),
        };
        assert_eq!(command.to_string(), "AUTH ****");
    }

    #[test]
    fn prefix_pattern_escapes_metacharacters() {
        assert_eq!(prefix_pattern("a*b[1]"), "a\\*b\\[1\\]*");
    }
}
