//! Row sources over a Redis keyspace.
//!
//! [`ScanRows`] drives the SCAN continuation token behind the
//! [`NativeCursor`] contract: each `next` either serves a buffered key or
//! performs one more SCAN round. Keys seen in an earlier round are skipped,
//! since SCAN may return a key more than once. The set of seen keys holds at
//! most the distinct keys matching the pattern and is dropped as soon as the
//! token returns to 0.
//!
//! Single-key commands (HGETALL, HMGET) produce at most one row and are
//! served from a prepared [`MemoryCursor`].

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;

use fedlink_connector::{
    scan_into, Acceptor, ColumnDescriptor, ConnectorError, MemoryCursor, NativeCursor, NativeKind,
    NativeValue, ResultSet,
};

use crate::client::{KeyType, KeyValueClient};
use crate::error::{RedisError, Result};

/// Column produced for every scanned key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RedisField {
    Key,
    StringValues,
    ListValues,
    HashValues,
}

impl RedisField {
    pub const ALL: [RedisField; 4] = [
        RedisField::Key,
        RedisField::StringValues,
        RedisField::ListValues,
        RedisField::HashValues,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::StringValues => "string_values",
            Self::ListValues => "list_values",
            Self::HashValues => "hash_values",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn kind(self) -> NativeKind {
        match self {
            Self::Key | Self::StringValues => NativeKind::String,
            Self::ListValues => NativeKind::StringList,
            Self::HashValues => NativeKind::StringMap,
        }
    }

    /// Type name understood by [`RedisTypeMapper`](crate::RedisTypeMapper).
    pub fn type_name(self, hash_fields: &BTreeSet<String>) -> String {
        match self {
            Self::Key | Self::StringValues => "varchar".to_string(),
            Self::ListValues => "list".to_string(),
            Self::HashValues => format!(
                "hash<{}>",
                hash_fields.iter().cloned().collect::<Vec<_>>().join(",")
            ),
        }
    }

    pub fn descriptor(self, hash_fields: &BTreeSet<String>) -> ColumnDescriptor {
        ColumnDescriptor::new(self.name(), self.type_name(hash_fields), self.kind())
    }
}

/// Continuation cursor over `SCAN` rounds.
pub struct ScanRows {
    client: Arc<dyn KeyValueClient>,
    pattern: String,
    count: usize,
    limit: Option<usize>,
    fields: Vec<RedisField>,
    columns: Vec<ColumnDescriptor>,
    token: u64,
    rounds: usize,
    seen: HashSet<String>,
    pending: VecDeque<String>,
    current: Option<Vec<Option<NativeValue>>>,
    emitted: usize,
    closed: bool,
}

impl std::fmt::Debug for ScanRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRows")
            .field("pattern", &self.pattern)
            .field("fields", &self.fields)
            .field("token", &self.token)
            .field("rounds", &self.rounds)
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl ScanRows {
    pub fn new(
        client: Arc<dyn KeyValueClient>,
        pattern: impl Into<String>,
        count: usize,
        limit: Option<usize>,
        fields: Vec<RedisField>,
        hash_fields: &BTreeSet<String>,
    ) -> Self {
        let columns = fields.iter().map(|f| f.descriptor(hash_fields)).collect();
        Self {
            client,
            pattern: pattern.into(),
            count: count.max(1),
            limit,
            fields,
            columns,
            token: 0,
            rounds: 0,
            seen: HashSet::new(),
            pending: VecDeque::new(),
            current: None,
            emitted: 0,
            closed: false,
        }
    }

    /// SCAN round trips performed so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Keys remembered for de-duplication.
    pub fn tracked_keys(&self) -> usize {
        self.seen.len()
    }

    fn wants(&self, field: RedisField) -> bool {
        self.fields.contains(&field)
    }

    /// Read the projected values of one key. `None` when the key vanished
    /// between SCAN and the read.
    async fn load_row(&self, key: &str) -> Result<Option<Vec<Option<NativeValue>>>> {
        let key_type = self.client.key_type(key).await?;
        if key_type == KeyType::None {
            tracing::debug!(key, "key expired during scan");
            return Ok(None);
        }

        let string_value = match key_type {
            KeyType::String if self.wants(RedisField::StringValues) => {
                self.client.get(key).await?.map(NativeValue::String)
            }
            _ => None,
        };
        let list_value = match key_type {
            KeyType::List if self.wants(RedisField::ListValues) => {
                Some(NativeValue::StringList(self.client.lrange(key, 0, -1).await?))
            }
            _ => None,
        };
        let hash_value = match key_type {
            KeyType::Hash if self.wants(RedisField::HashValues) => {
                Some(NativeValue::StringMap(self.client.hgetall(key).await?))
            }
            _ => None,
        };

        let mut values = [
            Some(NativeValue::String(key.to_string())),
            string_value,
            list_value,
            hash_value,
        ];
        Ok(Some(
            self.fields
                .iter()
                .map(|f| values[*f as usize].take())
                .collect(),
        ))
    }

    async fn scan_round(&mut self) -> Result<()> {
        let (keys, next) = self
            .client
            .scan(self.token, &self.pattern, self.count)
            .await?;
        self.rounds += 1;
        self.token = next;
        let fresh = keys.len();
        for key in keys {
            if self.seen.insert(key.clone()) {
                self.pending.push_back(key);
            }
        }
        if self.token == 0 {
            // No later round can repeat a key.
            self.seen = HashSet::new();
        }
        tracing::trace!(
            round = self.rounds,
            returned = fresh,
            queued = self.pending.len(),
            next = self.token,
            "scan round"
        );
        Ok(())
    }
}

#[async_trait]
impl NativeCursor for ScanRows {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    async fn next_result_set(&mut self) -> fedlink_connector::Result<bool> {
        Ok(false)
    }

    async fn next(&mut self) -> fedlink_connector::Result<bool> {
        self.current = None;
        if self.closed {
            return Ok(false);
        }
        loop {
            if self.limit.is_some_and(|l| self.emitted >= l) {
                return Ok(false);
            }
            if let Some(key) = self.pending.pop_front() {
                if let Some(row) = self.load_row(&key).await? {
                    self.current = Some(row);
                    self.emitted += 1;
                    return Ok(true);
                }
                continue;
            }
            // The iteration is complete only once the token comes back to 0.
            if self.rounds > 0 && self.token == 0 {
                return Ok(false);
            }
            self.scan_round().await?;
        }
    }

    async fn scan(&mut self, acceptors: &mut [Acceptor]) -> fedlink_connector::Result<()> {
        let row = self
            .current
            .take()
            .ok_or_else(|| ConnectorError::cursor_protocol("scan without a current row"))?;
        scan_into(acceptors, row)
    }

    async fn close(&mut self) -> fedlink_connector::Result<()> {
        if !self.closed {
            self.closed = true;
            self.pending.clear();
            self.seen.clear();
        }
        Ok(())
    }
}

fn varchar(name: &str) -> ColumnDescriptor {
    ColumnDescriptor::new(name, "varchar", NativeKind::String)
}

/// HGETALL as a single row: `key` plus one varchar column per field, sorted.
///
/// A missing key yields zero rows with only the `key` column.
pub async fn hash_get_all(
    client: &dyn KeyValueClient,
    key: &str,
    limit: Option<usize>,
) -> Result<MemoryCursor> {
    let hash: BTreeMap<String, String> = client.hgetall(key).await?;
    let mut columns = vec![varchar(RedisField::Key.name())];
    columns.extend(hash.keys().map(|f| varchar(f)));

    let mut set = ResultSet::new(columns);
    if !hash.is_empty() && limit != Some(0) {
        let mut row = vec![Some(NativeValue::String(key.to_string()))];
        row.extend(hash.into_values().map(|v| Some(NativeValue::String(v))));
        set = set.with_row(row);
    }
    Ok(MemoryCursor::new(vec![set]))
}

/// HMGET as a single row with the requested fields, absent fields as null.
pub async fn hash_get(
    client: &dyn KeyValueClient,
    key: &str,
    fields: &[String],
    limit: Option<usize>,
) -> Result<MemoryCursor> {
    let mut seen = HashSet::new();
    if let Some(dup) = fields.iter().find(|f| !seen.insert(f.as_str())) {
        return Err(RedisError::query(format!("column selected twice: {}", dup)));
    }

    let mut set = ResultSet::new(fields.iter().map(|f| varchar(f)).collect());
    if client.key_type(key).await? != KeyType::None && limit != Some(0) {
        let values = client.hmget(key, fields).await?;
        set = set.with_row(values.into_iter().map(|v| v.map(NativeValue::String)).collect());
    }
    Ok(MemoryCursor::new(vec![set]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryKeyValueClient;

    async fn collect(cursor: &mut dyn NativeCursor) -> Vec<Vec<Option<NativeValue>>> {
        let mut acceptors: Vec<Acceptor> = cursor
            .native_kinds()
            .into_iter()
            .map(Acceptor::new)
            .collect();
        let mut rows = Vec::new();
        while cursor.next().await.unwrap() {
            cursor.scan(&mut acceptors).await.unwrap();
            rows.push(acceptors.iter_mut().map(Acceptor::take).collect());
        }
        rows
    }

    fn key_only(client: Arc<MemoryKeyValueClient>, count: usize) -> ScanRows {
        ScanRows::new(
            client,
            "*",
            count,
            None,
            vec![RedisField::Key],
            &BTreeSet::new(),
        )
    }

    #[tokio::test]
    async fn test_continuation_without_duplicates() {
        let client = Arc::new(MemoryKeyValueClient::new().with_scan_overlap(1));
        for i in 0..7 {
            client.set(format!("k{}", i), "v");
        }
        let mut rows = key_only(Arc::clone(&client), 3);
        let keys: Vec<_> = collect(&mut rows)
            .await
            .into_iter()
            .map(|r| r[0].clone())
            .collect();
        assert_eq!(keys.len(), 7);
        assert!(rows.rounds() >= 3);
        let unique: HashSet<_> = keys.iter().map(|k| format!("{:?}", k)).collect();
        assert_eq!(unique.len(), 7);
    }

    #[tokio::test]
    async fn test_seen_keys_released_after_last_round() {
        let client = Arc::new(MemoryKeyValueClient::new().with_scan_overlap(1));
        for i in 0..6 {
            client.set(format!("k{}", i), "v");
        }
        let mut rows = key_only(client, 2);
        assert!(rows.next().await.unwrap());
        assert!(rows.tracked_keys() > 0);

        let mut served = 1;
        while rows.next().await.unwrap() {
            served += 1;
        }
        assert_eq!(served, 6);
        assert_eq!(rows.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_typed_values_and_nulls() {
        let client = Arc::new(MemoryKeyValueClient::new());
        client.set("a", "hello");
        client.rpush("b", ["x", "y"]);
        client.hset("c", [("f", "1")]);
        client.sadd("d", ["m"]);

        let fields = RedisField::ALL.to_vec();
        let mut rows = ScanRows::new(client, "*", 10, None, fields, &BTreeSet::new());
        let rows = collect(&mut rows).await;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0][1], Some(NativeValue::String("hello".into())));
        assert_eq!(rows[0][2], None);
        assert_eq!(
            rows[1][2],
            Some(NativeValue::StringList(vec!["x".into(), "y".into()]))
        );
        assert!(matches!(rows[2][3], Some(NativeValue::StringMap(_))));
        // Sets carry only their key.
        assert_eq!(rows[3][1..], [None, None, None]);
    }

    #[tokio::test]
    async fn test_limit_and_empty() {
        let client = Arc::new(MemoryKeyValueClient::new());
        let mut rows = key_only(Arc::clone(&client), 5);
        assert!(collect(&mut rows).await.is_empty());
        assert_eq!(rows.rounds(), 1);

        for i in 0..4 {
            client.set(format!("k{}", i), "v");
        }
        let mut rows = ScanRows::new(
            client,
            "*",
            1,
            Some(2),
            vec![RedisField::Key],
            &BTreeSet::new(),
        );
        assert_eq!(collect(&mut rows).await.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_error_surfaces_as_transport() {
        let client = Arc::new(MemoryKeyValueClient::new());
        client.set("a", "1");
        client.set_unavailable(true);
        let mut rows = key_only(client, 5);
        assert!(matches!(
            rows.next().await,
            Err(ConnectorError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_hash_lookups() {
        let client = MemoryKeyValueClient::new();
        client.hset("user:1", [("name", "ann"), ("age", "30")]);

        let mut all = hash_get_all(&client, "user:1", None).await.unwrap();
        let names: Vec<_> = all.columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["key", "age", "name"]);
        assert_eq!(collect(&mut all).await.len(), 1);

        let fields = vec!["name".to_string(), "missing".to_string()];
        let mut some = hash_get(&client, "user:1", &fields, None).await.unwrap();
        assert_eq!(
            collect(&mut some).await,
            vec![vec![Some(NativeValue::String("ann".into())), None]]
        );

        let mut none = hash_get(&client, "user:2", &fields, None).await.unwrap();
        assert!(collect(&mut none).await.is_empty());
    }
}
