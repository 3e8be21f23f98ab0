use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tracing::{debug, info};

use crate::codec::FileHeader;

/// A file opened for delivery, with its size already known.
#[derive(Debug)]
pub struct OutgoingFile {
    pub header: FileHeader,
    pub file: File,
}

/// Directory backing `list` and file delivery.
#[derive(Debug, Clone)]
pub struct FileArea {
    root: PathBuf,
}

impl FileArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it doesn't exist yet.
    pub async fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!("File area ready at {}", self.root.display());
        Ok(())
    }

    /// Lists entry names directly under the root, sorted.
    pub async fn list(&self) -> io::Result<Vec<String>> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Reduces a requested name to its last path component.
    ///
    /// Both `/` and `\` count as separators. Returns `None` for names that
    /// can't refer to a plain entry under the root.
    pub fn sanitize(requested: &str) -> Option<String> {
        let base = requested.rsplit(['/', '\\']).next()?.trim();
        if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
            return None;
        }
        Some(base.to_string())
    }

    /// Opens a requested file for delivery.
    ///
    /// Returns `Ok(None)` when the sanitized name isn't a regular file under
    /// the root. The file is opened and sized before anything is sent, so a
    /// failure here can still be reported as text.
    pub async fn open(&self, requested: &str) -> io::Result<Option<OutgoingFile>> {
        let Some(name) = Self::sanitize(requested) else {
            return Ok(None);
        };
        let path = self.root.join(&name);

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }

        let file = File::open(&path).await?;
        let size = file.metadata().await?.len();
        debug!("Opened {} ({} bytes)", path.display(), size);

        Ok(Some(OutgoingFile {
            header: FileHeader::new(name, size),
            file,
        }))
    }
}
