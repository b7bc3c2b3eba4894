//! Column-name normalization for upstream tables whose headers vary.

use csv::StringRecord;
use shopfunnel_core::{FunnelError, FunnelResult};

/// A canonical column and the header names accepted for it, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct ColumnAliases {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

pub const EVENT_TYPE: ColumnAliases = ColumnAliases {
    canonical: "event_type",
    aliases: &["event_type", "event", "type"],
};

pub const SESSION_ID: ColumnAliases = ColumnAliases {
    canonical: "session_id",
    aliases: &["session_id", "session", "sessionId"],
};

pub const TIMESTAMP: ColumnAliases = ColumnAliases {
    canonical: "timestamp",
    aliases: &["timestamp", "time", "ts", "created_at"],
};

pub const USER_ID: ColumnAliases = ColumnAliases {
    canonical: "user_id",
    aliases: &["user_id", "userId"],
};

pub const CHANNEL: ColumnAliases = ColumnAliases {
    canonical: "channel",
    aliases: &["channel"],
};

pub const DEVICE: ColumnAliases = ColumnAliases {
    canonical: "device",
    aliases: &["device"],
};

pub const USER_AGENT: ColumnAliases = ColumnAliases {
    canonical: "user_agent",
    aliases: &["user_agent"],
};

pub const USER_TYPE: ColumnAliases = ColumnAliases {
    canonical: "user_type",
    aliases: &["user_type"],
};

pub const STEP: ColumnAliases = ColumnAliases {
    canonical: "step",
    aliases: &["step"],
};

pub const COUNT: ColumnAliases = ColumnAliases {
    canonical: "count",
    aliases: &["count"],
};

/// Resolves canonical columns against one table's header row.
pub struct HeaderIndex<'a> {
    table: &'a str,
    headers: &'a StringRecord,
}

impl<'a> HeaderIndex<'a> {
    pub fn new(table: &'a str, headers: &'a StringRecord) -> Self {
        Self { table, headers }
    }

    /// Position of the first alias present in the header, if any.
    pub fn find(&self, column: &ColumnAliases) -> Option<usize> {
        column
            .aliases
            .iter()
            .find_map(|alias| self.headers.iter().position(|h| h.trim() == *alias))
    }

    pub fn require(&self, column: &ColumnAliases) -> FunnelResult<usize> {
        self.find(column).ok_or_else(|| FunnelError::MissingColumn {
            table: self.table.to_string(),
            column: column.canonical.to_string(),
        })
    }
}

/// Non-empty trimmed field at `index`, if the column exists.
pub fn field(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_wins() {
        let headers = StringRecord::from(vec!["type", "event_type", "session"]);
        let index = HeaderIndex::new("events", &headers);
        assert_eq!(index.find(&EVENT_TYPE), Some(1));
        assert_eq!(index.find(&SESSION_ID), Some(2));
    }

    #[test]
    fn test_alias_fallback_order() {
        let headers = StringRecord::from(vec!["created_at", "ts", "sessionId"]);
        let index = HeaderIndex::new("events", &headers);
        assert_eq!(index.find(&TIMESTAMP), Some(1));
        assert_eq!(index.find(&SESSION_ID), Some(2));
        assert_eq!(index.find(&CHANNEL), None);
    }

    #[test]
    fn test_require_reports_table_and_column() {
        let headers = StringRecord::from(vec!["event_id"]);
        let index = HeaderIndex::new("events.csv", &headers);
        match index.require(&SESSION_ID) {
            Err(FunnelError::MissingColumn { table, column }) => {
                assert_eq!(table, "events.csv");
                assert_eq!(column, "session_id");
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_field_skips_blank_values() {
        let record = StringRecord::from(vec!["a", "  ", "b "]);
        assert_eq!(field(&record, Some(0)), Some("a"));
        assert_eq!(field(&record, Some(1)), None);
        assert_eq!(field(&record, Some(2)), Some("b"));
        assert_eq!(field(&record, None), None);
        assert_eq!(field(&record, Some(9)), None);
    }
}
