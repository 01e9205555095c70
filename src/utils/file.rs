use std::fs;
use std::path::{Path, PathBuf};

/// Paths of the files in `dir` carrying `extension`, sorted by file name.
pub fn list_files_with_extension(dir: impl AsRef<Path>, extension: &str) -> Vec<PathBuf> {
    let mut entries = Vec::new();

    if let Ok(read_dir) = fs::read_dir(dir.as_ref()) {
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
                continue;
            }
            entries.push(path);
        }
    }

    entries.sort();
    entries
}

pub fn list_json_files(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    list_files_with_extension(dir, "json")
}
