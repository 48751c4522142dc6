//! Small JSON state files: atomic replacement and key merging

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Write `value` as pretty JSON by writing a sibling temp file and renaming it over `path`
///
/// Readers never observe a half-written file.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| Error::file(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::file(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush().map_err(|e| Error::file(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::file(path, e))?;
    tmp.persist(path).map_err(|e| Error::file(path, e.error))?;
    Ok(())
}

/// Read and parse a JSON file, `None` when it does not exist
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::file(path, e)),
    }
}

/// Merge the top-level keys of `update` into the JSON object stored at `path`
///
/// Keys absent from `update` are kept. A missing file, or one holding a
/// non-object value, starts from an empty object. Returns the merged object.
pub(crate) fn merge_json_object<T: Serialize + ?Sized>(
    path: &Path,
    update: &T,
) -> Result<Map<String, Value>> {
    let mut current = match read_json::<Value>(path)? {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    match serde_json::to_value(update)? {
        Value::Object(fields) => current.extend(fields),
        other => {
            return Err(Error::Other(format!(
                "cannot merge non-object value into {}: {other}",
                path.display()
            )));
        }
    }

    write_json_atomic(path, &current)?;
    Ok(current)
}
