//! CSV input and output tables.

use crate::commits::CommitUser;
use crate::types::{ContributionRow, ItemKind, TargetSet};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

pub fn write_contributions(path: &Path, kind: ItemKind, rows: &[ContributionRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(ContributionRow::headers(kind))?;
    for row in rows {
        writer.write_record(row.to_record(kind))?;
    }
    writer.flush()?;
    Ok(())
}

/// Loads the target-contributor set from the `Username` column of `path`.
///
/// A missing file yields an empty set.
pub fn read_target_set(path: &Path) -> Result<TargetSet> {
    if !path.exists() {
        tracing::warn!("Target contributor file {} not found", path.display());
        return Ok(TargetSet::default());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let Some(column) = reader.headers()?.iter().position(|h| h.trim() == "Username") else {
        bail!("{} has no Username column", path.display());
    };

    let mut logins = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(login) = record.get(column).map(str::trim).filter(|l| !l.is_empty()) {
            logins.push(login.to_string());
        }
    }
    Ok(logins.into_iter().collect())
}

pub fn write_commit_users(path: &Path, users: &[CommitUser]) -> Result<()> {
    write_serialized(path, users)
}

pub fn read_commit_users(path: &Path) -> Result<Vec<CommitUser>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let users = reader
        .deserialize()
        .collect::<Result<Vec<CommitUser>, _>>()
        .with_context(|| format!("malformed row in {}", path.display()))?;
    Ok(users)
}

/// Writes serde rows below a header taken from their field names.
pub fn write_serialized<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_target_set_reads_username_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(&path, "Repository,Username\nvue,alice\nreact, bob \nvue,\n").unwrap();

        let targets = read_target_set(&path).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.contains("bob"));
    }

    #[test]
    fn test_missing_target_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_target_set(&dir.path().join("nope.csv")).unwrap().is_empty());
    }

    #[test]
    fn test_commit_users_use_study_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit_users.csv");
        let users = vec![CommitUser {
            repository: "vue".to_string(),
            timeframe: "2018_2019".to_string(),
            username: "alice".to_string(),
        }];

        write_commit_users(&path, &users).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Repository,Time Frame,Username\nvue,2018_2019,alice\n"
        );
        assert_eq!(read_commit_users(&path).unwrap(), users);
    }
}
