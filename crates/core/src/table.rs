//! Flat-file table I/O: one CSV per table with a header row.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{FunnelError, FunnelResult};

/// A record type persisted as one CSV file.
pub trait Table {
    const FILE_NAME: &'static str;
    const COLUMNS: &'static [&'static str];

    fn path_in(dir: &Path) -> PathBuf {
        dir.join(Self::FILE_NAME)
    }
}

/// Write `rows` to `<dir>/<FILE_NAME>`, creating `dir` on demand.
///
/// The header is written explicitly so an empty table still carries its schema.
pub fn write_table<T: Table + Serialize>(dir: &Path, rows: &[T]) -> FunnelResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = T::path_in(dir);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)?;
    writer.write_record(T::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(path)
}

/// Read every row of `<dir>/<FILE_NAME>`. A missing file is a [`FunnelError::MissingInput`].
pub fn read_table<T: Table + DeserializeOwned>(dir: &Path) -> FunnelResult<Vec<T>> {
    let path = T::path_in(dir);
    let mut reader = open_reader(&path)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()?;
    debug!(path = %path.display(), rows = rows.len(), "Read table");
    Ok(rows)
}

/// Like [`read_table`], but an absent file yields an empty table.
pub fn read_table_or_empty<T: Table + DeserializeOwned>(dir: &Path) -> FunnelResult<Vec<T>> {
    match read_table(dir) {
        Err(FunnelError::MissingInput(_)) => Ok(Vec::new()),
        other => other,
    }
}

/// Open a headered CSV reader, mapping an absent file to [`FunnelError::MissingInput`].
pub fn open_reader(path: &Path) -> FunnelResult<csv::Reader<fs::File>> {
    if !path.exists() {
        return Err(FunnelError::MissingInput(path.to_path_buf()));
    }
    Ok(csv::ReaderBuilder::new().flexible(true).from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Order, User};
    use chrono::NaiveDate;

    #[test]
    fn test_empty_table_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_table::<Order>(dir.path(), &[]).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(
            content.trim_end(),
            "order_id,user_id,timestamp,product_id,quantity,total,payment_success"
        );
        assert!(read_table::<Order>(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data").join("raw");
        let users = vec![User {
            user_id: "U000001".into(),
            signup_date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            channel: "organic".into(),
            device: "mobile".into(),
            country: "DE".into(),
        }];
        write_table(&nested, &users).unwrap();
        let content = fs::read_to_string(nested.join("users.csv")).unwrap();
        assert!(content.contains("U000001,2024-01-03,organic,mobile,DE"));
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        match read_table::<User>(dir.path()) {
            Err(FunnelError::MissingInput(path)) => assert!(path.ends_with("users.csv")),
            other => panic!("expected MissingInput, got {other:?}"),
        }
        assert!(read_table_or_empty::<User>(dir.path()).unwrap().is_empty());
    }
}
