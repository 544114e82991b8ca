//! Redb table definitions for the persistent key/value store.

use redb::TableDefinition;

// Key: flat store key, Value: bincode-encoded StoredValue
pub const KEY_VALUES: TableDefinition<&str, &[u8]> = TableDefinition::new("key_values");
