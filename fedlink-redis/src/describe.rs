//! Table description synthesized from a key sample.
//!
//! Redis has no catalog, so the "table" layout is inferred from up to
//! `sample_size` keys: `key` is always present, and each value column is
//! present when at least one sampled key has that type. `hash_values` carries
//! the sorted union of the sampled hash fields.

use std::collections::{BTreeSet, HashSet};

use fedlink_connector::ColumnDescriptor;

use crate::client::{KeyType, KeyValueClient};
use crate::error::Result;
use crate::rows::RedisField;

/// What a key sample revealed about the keyspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyspaceLayout {
    pub sampled: usize,
    pub has_strings: bool,
    pub has_lists: bool,
    pub has_hashes: bool,
    pub hash_fields: BTreeSet<String>,
}

impl KeyspaceLayout {
    pub fn is_empty(&self) -> bool {
        self.sampled == 0
    }

    /// Columns in their fixed order.
    pub fn fields(&self) -> Vec<RedisField> {
        RedisField::ALL
            .into_iter()
            .filter(|f| match f {
                RedisField::Key => true,
                RedisField::StringValues => self.has_strings,
                RedisField::ListValues => self.has_lists,
                RedisField::HashValues => self.has_hashes,
            })
            .collect()
    }

    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.fields()
            .into_iter()
            .map(|f| f.descriptor(&self.hash_fields))
            .collect()
    }

    /// `(column_name, data_type)` rows; none for an empty keyspace.
    pub fn describe_rows(&self) -> Vec<(String, String)> {
        if self.is_empty() {
            return Vec::new();
        }
        self.fields()
            .into_iter()
            .map(|f| (f.name().to_string(), f.type_name(&self.hash_fields)))
            .collect()
    }

    /// Resolve a projection against this layout. An empty list selects all.
    pub fn project(&self, columns: &[String]) -> std::result::Result<Vec<RedisField>, String> {
        let available = self.fields();
        if columns.is_empty() {
            return Ok(available);
        }
        columns
            .iter()
            .map(|name| {
                RedisField::from_name(name)
                    .filter(|f| available.contains(f))
                    .ok_or_else(|| format!("unknown column: {}", name))
            })
            .collect()
    }
}

/// Walk SCAN until `sample_size` distinct keys were typed or the
/// iteration completes.
pub async fn sample_layout(
    client: &dyn KeyValueClient,
    pattern: &str,
    count: usize,
    sample_size: usize,
) -> Result<KeyspaceLayout> {
    let mut layout = KeyspaceLayout::default();
    let mut seen = HashSet::new();
    let mut token = 0;

    'rounds: loop {
        let (keys, next) = client.scan(token, pattern, count).await?;
        for key in keys {
            if layout.sampled >= sample_size {
                break 'rounds;
            }
            if !seen.insert(key.clone()) {
                continue;
            }
            match client.key_type(&key).await? {
                KeyType::None => continue,
                KeyType::String => layout.has_strings = true,
                KeyType::List => layout.has_lists = true,
                KeyType::Hash => {
                    layout.has_hashes = true;
                    layout.hash_fields.extend(client.hgetall(&key).await?.into_keys());
                }
                KeyType::Set | KeyType::ZSet | KeyType::Stream => {}
            }
            layout.sampled += 1;
        }
        if next == 0 || layout.sampled >= sample_size {
            break;
        }
        token = next;
    }

    tracing::debug!(
        sampled = layout.sampled,
        hash_fields = layout.hash_fields.len(),
        "keyspace sampled"
    );
    Ok(layout)
}
