//! SELECT to Redis command translation.
//!
//! Supported shape:
//!
//! ```text
//! SELECT <columns | *> FROM <table> [WHERE key = '<key>'] [LIMIT <n>]
//! ```
//!
//! Without a `WHERE` the table is read with SCAN. With one, `*` becomes
//! HGETALL on that key and a column list becomes HMGET of those fields.

use crate::error::{RedisError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    /// Selected columns; `["*"]` for all.
    pub columns: Vec<String>,
    pub table: String,
    pub key: Option<String>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    pub fn is_wildcard(&self) -> bool {
        self.columns.len() == 1 && self.columns[0] == "*"
    }
}

/// Native command plan for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisCommand {
    /// Iterate the keyspace with SCAN, projecting `columns` (empty = all).
    Scan {
        pattern: String,
        count: usize,
        limit: Option<usize>,
        columns: Vec<String>,
    },
    HashGetAll {
        key: String,
        limit: Option<usize>,
    },
    HashGet {
        key: String,
        fields: Vec<String>,
        limit: Option<usize>,
    },
}

/// Turns query text into a command plan.
pub trait CommandTranslator: Send + Sync {
    fn translate(&self, query: &str) -> Result<RedisCommand>;
}

/// Default translator for the SELECT subset above.
#[derive(Debug, Clone)]
pub struct SelectTranslator {
    key_pattern: String,
    scan_count: usize,
}

impl Default for SelectTranslator {
    fn default() -> Self {
        Self {
            key_pattern: "*".to_string(),
            scan_count: 100,
        }
    }
}

impl SelectTranslator {
    pub fn new(key_pattern: impl Into<String>, scan_count: usize) -> Self {
        Self {
            key_pattern: key_pattern.into(),
            scan_count,
        }
    }
}

impl CommandTranslator for SelectTranslator {
    fn translate(&self, query: &str) -> Result<RedisCommand> {
        let stmt = parse_select(query)?;
        let Some(key) = stmt.key.clone() else {
            return Ok(RedisCommand::Scan {
                pattern: self.key_pattern.clone(),
                count: self.scan_count,
                limit: stmt.limit,
                columns: if stmt.is_wildcard() {
                    Vec::new()
                } else {
                    stmt.columns
                },
            });
        };
        if stmt.is_wildcard() {
            Ok(RedisCommand::HashGetAll {
                key,
                limit: stmt.limit,
            })
        } else {
            Ok(RedisCommand::HashGet {
                key,
                fields: stmt.columns,
                limit: stmt.limit,
            })
        }
    }
}

/// Parse the SELECT subset. Keywords are case-insensitive; identifiers and
/// the key literal keep their case.
pub fn parse_select(query: &str) -> Result<SelectStatement> {
    let q = query.trim().trim_end_matches(';').trim();
    let lower = q.to_ascii_lowercase();
    if !lower.starts_with("select ") {
        return Err(RedisError::query("query must start with SELECT"));
    }
    let from = lower["select".len()..]
        .find(" from ")
        .map(|i| i + "select".len())
        .ok_or_else(|| RedisError::query("missing FROM clause"))?;

    let select_list = q
        .get("select ".len()..from)
        .map(str::trim)
        .filter(|list| !list.is_empty())
        .ok_or_else(|| RedisError::query("empty select list"))?;
    let columns: Vec<String> = select_list
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect();
    if columns.iter().any(String::is_empty) {
        return Err(RedisError::query("empty column in select list"));
    }
    if columns.len() > 1 && columns.iter().any(|c| c == "*") {
        return Err(RedisError::query("'*' cannot be combined with other columns"));
    }

    let tokens = tokenize(&q[from + " from ".len()..]);
    let mut tokens = tokens.iter().map(String::as_str);
    let table = tokens
        .next()
        .ok_or_else(|| RedisError::query("missing table name after FROM"))?
        .trim_matches('"')
        .to_string();

    let mut stmt = SelectStatement {
        columns,
        table,
        key: None,
        limit: None,
    };

    while let Some(token) = tokens.next() {
        match token.to_ascii_lowercase().as_str() {
            "where" if stmt.key.is_none() => {
                let (field, op, value) = (tokens.next(), tokens.next(), tokens.next());
                match (field, op, value) {
                    (Some(f), Some("="), Some(v)) if f.eq_ignore_ascii_case("key") => {
                        stmt.key = Some(unquote(v)?);
                    }
                    _ => return Err(RedisError::query("expected WHERE key = '<value>'")),
                }
            }
            "limit" if stmt.limit.is_none() => {
                let value = tokens
                    .next()
                    .ok_or_else(|| RedisError::query("missing LIMIT value"))?;
                let limit = value
                    .parse()
                    .map_err(|_| RedisError::query(format!("invalid LIMIT value: {}", value)))?;
                stmt.limit = Some(limit);
            }
            other => return Err(RedisError::query(format!("unexpected token: {}", other))),
        }
    }

    Ok(stmt)
}

/// Split on whitespace, keeping quoted literals and `=` as single tokens.
fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                current.push(c);
                quote = None;
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                current.push(c);
                quote = Some(c);
            }
            (None, '=') => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push("=".to_string());
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(token: &str) -> Result<String> {
    let quoted = token.len() >= 2
        && ((token.starts_with('\'') && token.ends_with('\''))
            || (token.starts_with('"') && token.ends_with('"')));
    if quoted {
        Ok(token[1..token.len() - 1].to_string())
    } else if token.starts_with('\'') || token.starts_with('"') {
        Err(RedisError::query("unterminated string literal"))
    } else {
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let stmt = parse_select("SELECT field1, field2 FROM users WHERE key = 'User:1' LIMIT 5")
            .unwrap();
        assert_eq!(stmt.columns, vec!["field1", "field2"]);
        assert_eq!(stmt.table, "users");
        assert_eq!(stmt.key.as_deref(), Some("User:1"));
        assert_eq!(stmt.limit, Some(5));
    }

    #[test]
    fn test_key_with_spaces_and_no_spaces_around_eq() {
        let stmt = parse_select("select * from t where key='a b'").unwrap();
        assert!(stmt.is_wildcard());
        assert_eq!(stmt.key.as_deref(), Some("a b"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_select("DELETE FROM t").is_err());
        assert!(parse_select("SELECT a").is_err());
        assert!(parse_select("SELECT a FROM").is_err());
        assert!(parse_select("SELECT a FROM t WHERE id = '1'").is_err());
        assert!(parse_select("SELECT a FROM t LIMIT x").is_err());
        assert!(parse_select("SELECT a FROM t ORDER BY a").is_err());
        assert!(parse_select("SELECT *, a FROM t").is_err());
    }

    #[test]
    fn test_empty_select_list() {
        for query in ["SELECT FROM t", "select  from t", "SELECT \t FROM t;"] {
            assert!(
                matches!(parse_select(query), Err(RedisError::Query(_))),
                "{}",
                query
            );
        }
        assert!(parse_select("SELECT").is_err());
    }

    #[test]
    fn test_translate() {
        let t = SelectTranslator::new("*", 50);
        assert_eq!(
            t.translate("SELECT * FROM t LIMIT 3").unwrap(),
            RedisCommand::Scan {
                pattern: "*".into(),
                count: 50,
                limit: Some(3),
                columns: vec![],
            }
        );
        assert_eq!(
            t.translate("SELECT * FROM t WHERE key = 'k'").unwrap(),
            RedisCommand::HashGetAll {
                key: "k".into(),
                limit: None
            }
        );
        assert_eq!(
            t.translate("SELECT a, b FROM t WHERE key = 'k'").unwrap(),
            RedisCommand::HashGet {
                key: "k".into(),
                fields: vec!["a".into(), "b".into()],
                limit: None
            }
        );
    }
}
