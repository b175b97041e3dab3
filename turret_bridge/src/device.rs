//! Device-file sink: the control device node, or any writable file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use turret_traits::CommandSink;

/// Each command is written newline-terminated in a single `write`, so a
/// character device sees one command per write call.
#[derive(Debug)]
pub struct DeviceFile {
    path: PathBuf,
    file: File,
}

impl DeviceFile {
    /// Open an existing device for writing; never creates it.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "device opened");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandSink for DeviceFile {
    fn submit(&mut self, command: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command);
        line.push(b'\n');
        self.file.write_all(&line)?;
        Ok(())
    }
}
