//! Filesystem marker writer.

use super::Writer;
use crate::error::Result;
use std::fs::File;
use std::path::Path;

/// Creates markers with [`File::create`]. An existing marker is truncated.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWriter;

impl Writer for FsWriter {
    fn write(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        File::create(path)?;
        Ok(())
    }
}
