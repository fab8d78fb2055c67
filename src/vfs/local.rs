use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::error::{NtStatus, VfsError, VfsResult};
use super::traits::VfsHandler;
use super::types::{CreateAction, CreateDisposition, CreateFileRequest, FileHandle, SmbFilename};

/// Forwarder that serves one share straight from a local directory.
pub struct LocalFs {
    service: String,
    root: PathBuf,
    session: Mutex<Option<String>>,
}

impl LocalFs {
    pub fn new(service: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            service: service.into(),
            root: root.into(),
            session: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// User of the current connection, if any.
    pub fn connected_user(&self) -> Option<String> {
        self.session.lock().clone()
    }

    /// Map a share-relative path to an entry strictly under the root.
    /// Anything that could climb out of the root is refused, and so is a
    /// path naming the root itself (`/`, `.`, empty).
    pub fn resolve(&self, share_path: &str) -> VfsResult<PathBuf> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(share_path).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(VfsError::NotPermitted)
                }
            }
        }
        if depth == 0 {
            return Err(VfsError::NotPermitted);
        }
        Ok(resolved)
    }

    fn resolve_file(&self, fname: &SmbFilename) -> VfsResult<PathBuf> {
        if fname.stream_name.is_some() {
            return Err(VfsError::Status(NtStatus::NOT_SUPPORTED));
        }
        self.resolve(&fname.base_name)
    }

    async fn create_directory(
        &self,
        path: PathBuf,
        disposition: CreateDisposition,
    ) -> VfsResult<FileHandle> {
        let existing = metadata(&path).await?;
        let action = match (disposition, existing) {
            (CreateDisposition::Open | CreateDisposition::OpenIf, Some(meta)) => {
                if !meta.is_dir() {
                    return Err(VfsError::Status(NtStatus::INVALID_PARAMETER));
                }
                CreateAction::Opened
            }
            (CreateDisposition::Open, None) => {
                return Err(io::Error::from(io::ErrorKind::NotFound).into())
            }
            (CreateDisposition::Create, Some(_)) => {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists).into())
            }
            (CreateDisposition::Create | CreateDisposition::OpenIf, None) => {
                tokio::fs::create_dir(&path).await?;
                CreateAction::Created
            }
            _ => return Err(VfsError::Status(NtStatus::INVALID_PARAMETER)),
        };
        Ok(FileHandle {
            path,
            is_directory: true,
            action,
        })
    }

    async fn create_regular(
        &self,
        path: PathBuf,
        disposition: CreateDisposition,
    ) -> VfsResult<FileHandle> {
        let existing = metadata(&path).await?;
        if existing.as_ref().is_some_and(|m| m.is_dir()) {
            return Err(VfsError::Status(NtStatus::INVALID_PARAMETER));
        }
        let exists = existing.is_some();

        let mut options = tokio::fs::OpenOptions::new();
        options.read(true).write(true);
        let action = match disposition {
            CreateDisposition::Supersede if exists => {
                options.truncate(true);
                CreateAction::Superseded
            }
            CreateDisposition::Overwrite | CreateDisposition::OverwriteIf if exists => {
                options.truncate(true);
                CreateAction::Overwritten
            }
            CreateDisposition::Open | CreateDisposition::OpenIf if exists => CreateAction::Opened,
            CreateDisposition::Create if exists => {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists).into())
            }
            CreateDisposition::Open | CreateDisposition::Overwrite => {
                return Err(io::Error::from(io::ErrorKind::NotFound).into())
            }
            _ => {
                options.create_new(true);
                CreateAction::Created
            }
        };
        options.open(&path).await?;
        Ok(FileHandle {
            path,
            is_directory: false,
            action,
        })
    }
}

async fn metadata(path: &Path) -> VfsResult<Option<std::fs::Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl VfsHandler for LocalFs {
    async fn connect(&self, service: &str, user: &str) -> VfsResult<()> {
        if service != self.service {
            return Err(VfsError::Status(NtStatus::BAD_NETWORK_NAME));
        }
        match metadata(&self.root).await? {
            Some(meta) if meta.is_dir() => {}
            _ => return Err(VfsError::Status(NtStatus::BAD_NETWORK_NAME)),
        }
        debug!(service, user, root = %self.root.display(), "share connected");
        *self.session.lock() = Some(user.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(user) = self.session.lock().take() {
            debug!(service = self.service.as_str(), user = user.as_str(), "share disconnected");
        }
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let target = self.resolve(path)?;
        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(&target).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let target = self.resolve(path)?;
        tokio::fs::remove_dir(&target).await?;
        Ok(())
    }

    async fn create_file(&self, request: &CreateFileRequest) -> VfsResult<FileHandle> {
        let path = self.resolve_file(&request.fname)?;
        if request.is_directory() {
            self.create_directory(path, request.create_disposition).await
        } else {
            self.create_regular(path, request.create_disposition).await
        }
    }

    async fn rename(&self, src: &SmbFilename, dst: &SmbFilename) -> VfsResult<()> {
        let from = self.resolve_file(src)?;
        let to = self.resolve_file(dst)?;
        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn unlink(&self, fname: &SmbFilename) -> VfsResult<()> {
        let target = self.resolve_file(fname)?;
        tokio::fs::remove_file(&target).await?;
        Ok(())
    }
}
