/// Shared loading helpers for the static RON tables.
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("duplicate id '{0}'")]
    DuplicateId(String),
}

pub(crate) fn parse_ron<T: DeserializeOwned>(input: &str) -> Result<T, DataError> {
    Ok(ron::from_str(input)?)
}

/// Reads a table file; callers parse and validate the contents.
pub(crate) fn read_source(path: &Path) -> Result<String, DataError> {
    Ok(std::fs::read_to_string(path)?)
}

/// Rejects lists in which two entries share an id.
pub(crate) fn ensure_unique<'a, I>(ids: I) -> Result<(), DataError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = rustc_hash::FxHashSet::default();
    for id in ids {
        if !seen.insert(id) {
            return Err(DataError::DuplicateId(id.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_unique_detects_duplicates() {
        assert!(ensure_unique(["a", "b", "c"]).is_ok());
        assert!(matches!(
            ensure_unique(["a", "b", "a"]),
            Err(DataError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn parse_ron_reports_syntax_errors() {
        let result: Result<Vec<u32>, DataError> = parse_ron("[1, 2,");
        assert!(matches!(result, Err(DataError::Ron(_))));
    }

    #[test]
    fn read_source_reports_missing_file() {
        let result = read_source(Path::new("does/not/exist.ron"));
        assert!(matches!(result, Err(DataError::Io(_))));
    }
}
