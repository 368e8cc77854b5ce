/// Scoped ownership of the downloaded raw CSV.
///
/// The file is held as a `tempfile::TempPath`, so it is removed when the
/// handle drops, whichever way the run ends. The path is only taken over
/// once the file has been created, so a failed create never removes whatever
/// already sat at that path.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tempfile::TempPath;

use crate::error::Result;

/// Write `bytes` verbatim to `path`, replacing any previous content.
pub fn write_scratch(path: &Path, bytes: &[u8]) -> Result<TempPath> {
    let mut file = File::create(path)?;
    let scratch = TempPath::from_path(path);
    file.write_all(bytes)?;
    file.flush()?;
    Ok(scratch)
}
