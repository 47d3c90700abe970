use crate::error::Result;
use std::path::Path;

/// Writes `contents` to a sibling temp file then renames it over `path`.
/// A crash mid-write leaves the temp file behind and `path` untouched —
/// never a partially written `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp_path, contents)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
