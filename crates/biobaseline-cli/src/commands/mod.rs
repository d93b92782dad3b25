pub mod defaults;
pub mod generate;
pub mod parametric;

use std::fmt::Display;
use std::path::Path;

use biobaseline_core::{CalendarModel, CircadianModel, ParameterTable};
use serde::Serialize;

/// Print `context: err` and exit with status 1.
pub fn fail(context: &str, err: impl Display) -> ! {
    eprintln!("{context}: {err}");
    std::process::exit(1);
}

pub fn load_table(path: Option<&str>) -> ParameterTable {
    match path {
        Some(p) => ParameterTable::from_path(p)
            .unwrap_or_else(|e| fail(&format!("Failed to load parameter table {p}"), e)),
        None => ParameterTable::literature(),
    }
}

pub fn load_circadian(path: Option<&str>) -> CircadianModel {
    match path {
        Some(p) => CircadianModel::from_path(p)
            .unwrap_or_else(|e| fail(&format!("Failed to load circadian curves {p}"), e)),
        None => CircadianModel::literature(),
    }
}

pub fn load_calendar(path: Option<&str>) -> CalendarModel {
    match path {
        Some(p) => CalendarModel::from_path(p)
            .unwrap_or_else(|e| fail(&format!("Failed to load calendar curves {p}"), e)),
        None => CalendarModel::literature(),
    }
}

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// [`write_json`], exiting on failure.
pub fn write_json_or_exit<T: Serialize + ?Sized>(path: &Path, value: &T) {
    if let Err(e) = write_json(path, value) {
        fail(&format!("Failed to write {}", path.display()), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_json_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_json(&path, &CalendarModel::literature()).unwrap();
        let back = CalendarModel::from_path(&path).unwrap();
        assert_eq!(back, CalendarModel::literature());
    }

    #[test]
    fn test_default_loaders() {
        assert_eq!(load_table(None), ParameterTable::literature());
        assert_eq!(load_circadian(None), CircadianModel::literature());
    }
}
