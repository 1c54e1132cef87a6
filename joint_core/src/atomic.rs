//! Crash-safe file replacement for exported calibration tables.

use std::{fs, io::Write, path::Path};

/// Write `bytes` to `path` through a sibling `.new` file and a rename, so a
/// reader never sees a half-written table.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}
