//! Key-value client contract and an in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{RedisError, Result};

/// Redis `TYPE` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    List,
    Hash,
    Set,
    ZSet,
    Stream,
    /// The key does not exist.
    None,
}

/// The subset of Redis commands the connector issues.
#[async_trait]
pub trait KeyValueClient: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// One `SCAN cursor MATCH pattern COUNT count` round trip.
    /// Returns the keys and the next cursor (`0` when the iteration is complete).
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(Vec<String>, u64)>;

    async fn key_type(&self, key: &str) -> Result<KeyType>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>>;

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>>;

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    String(String),
    List(Vec<String>),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
}

/// In-memory keyspace with Redis-like SCAN paging.
///
/// SCAN walks keys in sorted order. `with_scan_overlap` makes each round
/// repeat the tail of the previous one, which real servers may do while
/// rehashing.
#[derive(Debug, Default)]
pub struct MemoryKeyValueClient {
    data: RwLock<BTreeMap<String, Value>>,
    overlap: usize,
    unavailable: AtomicBool,
    scans: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryKeyValueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data
            .write()
            .insert(key.into(), Value::String(value.into()));
    }

    pub fn rpush<I, S>(&self, key: impl Into<String>, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut data = self.data.write();
        let entry = data
            .entry(key.into())
            .or_insert_with(|| Value::List(Vec::new()));
        if let Value::List(list) = entry {
            list.extend(items.into_iter().map(Into::into));
        }
    }

    pub fn hset<I, F, V>(&self, key: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let mut data = self.data.write();
        let entry = data
            .entry(key.into())
            .or_insert_with(|| Value::Hash(BTreeMap::new()));
        if let Value::Hash(hash) = entry {
            hash.extend(fields.into_iter().map(|(f, v)| (f.into(), v.into())));
        }
    }

    pub fn sadd<I, S>(&self, key: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut data = self.data.write();
        let entry = data
            .entry(key.into())
            .or_insert_with(|| Value::Set(BTreeSet::new()));
        if let Value::Set(set) = entry {
            set.extend(members.into_iter().map(Into::into));
        }
    }

    pub fn del(&self, key: &str) -> bool {
        self.data.write().remove(key).is_some()
    }

    /// Make every command fail as if the server went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of SCAN round trips served.
    pub fn scan_calls(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RedisError::client("connection refused"));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(RedisError::client("client is closed"));
        }
        Ok(())
    }
}

fn wrong_type(key: &str) -> RedisError {
    RedisError::reply(format!(
        "WRONGTYPE Operation against key '{}' holding the wrong kind of value",
        key
    ))
}

#[async_trait]
impl KeyValueClient for MemoryKeyValueClient {
    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(Vec<String>, u64)> {
        self.check()?;
        self.scans.fetch_add(1, Ordering::SeqCst);

        let data = self.data.read();
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let count = count.max(1);
        let keys = data
            .keys()
            .skip(start)
            .take(count)
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();

        let end = start.saturating_add(count);
        let next = if end >= data.len() {
            0
        } else {
            // Step back at most count - 1 so the walk always advances.
            (end - self.overlap.min(count - 1)) as u64
        };
        Ok((keys, next))
    }

    async fn key_type(&self, key: &str) -> Result<KeyType> {
        self.check()?;
        Ok(match self.data.read().get(key) {
            Some(Value::String(_)) => KeyType::String,
            Some(Value::List(_)) => KeyType::List,
            Some(Value::Hash(_)) => KeyType::Hash,
            Some(Value::Set(_)) => KeyType::Set,
            None => KeyType::None,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        match self.data.read().get(key) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        self.check()?;
        match self.data.read().get(key) {
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        self.check()?;
        match self.data.read().get(key) {
            Some(Value::Hash(h)) => Ok(fields.iter().map(|f| h.get(f).cloned()).collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(vec![None; fields.len()]),
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.check()?;
        let data = self.data.read();
        let list = match data.get(key) {
            Some(Value::List(l)) => l,
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(Vec::new()),
        };
        let len = list.len() as i64;
        let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
        let (from, to) = (norm(start), norm(stop).min(len - 1));
        if len == 0 || from > to {
            return Ok(Vec::new());
        }
        Ok(list[from as usize..=to as usize].to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Redis-style glob with `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("user:*", "user:1"));
        assert!(!glob_match("user:*", "order:1"));
        assert!(glob_match("k?y", "key"));
        assert!(glob_match("*:1", "a:b:1"));
        assert!(!glob_match("a", "ab"));
    }

    #[tokio::test]
    async fn test_scan_walks_all_keys() {
        let client = MemoryKeyValueClient::new();
        for i in 0..5 {
            client.set(format!("k{}", i), "v");
        }
        let (first, next) = client.scan(0, "*", 2).await.unwrap();
        assert_eq!(first, vec!["k0", "k1"]);
        assert_eq!(next, 2);
        let (_, next) = client.scan(next, "*", 2).await.unwrap();
        let (last, next) = client.scan(next, "*", 2).await.unwrap();
        assert_eq!(last, vec!["k4"]);
        assert_eq!(next, 0);
    }

    #[tokio::test]
    async fn test_scan_overlap_repeats_keys() {
        let client = MemoryKeyValueClient::new().with_scan_overlap(1);
        for i in 0..4 {
            client.set(format!("k{}", i), "v");
        }
        let (first, next) = client.scan(0, "*", 3).await.unwrap();
        let (second, _) = client.scan(next, "*", 3).await.unwrap();
        assert_eq!(first.last(), second.first());
    }

    #[tokio::test]
    async fn test_typed_reads() {
        let client = MemoryKeyValueClient::new();
        client.rpush("l", ["a", "b", "c"]);
        client.hset("h", [("f1", "1")]);
        assert_eq!(client.lrange("l", 0, -1).await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(client.lrange("l", 1, 1).await.unwrap(), vec!["b"]);
        assert_eq!(client.key_type("h").await.unwrap(), KeyType::Hash);
        assert!(client.get("h").await.is_err());
        assert_eq!(
            client
                .hmget("h", &["f1".to_string(), "f2".to_string()])
                .await
                .unwrap(),
            vec![Some("1".to_string()), None]
        );
        assert_eq!(client.key_type("missing").await.unwrap(), KeyType::None);
    }
}
