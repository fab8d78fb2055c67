use async_trait::async_trait;
use std::sync::Arc;

use super::error::VfsResult;
use super::types::{CreateFileRequest, FileHandle, SmbFilename};

/// One link in the operation chain.
///
/// Interception layers implement this trait and hold the next link, so a
/// stack of layers is itself a `VfsHandler`.
#[async_trait]
pub trait VfsHandler: Send + Sync {
    async fn connect(&self, service: &str, user: &str) -> VfsResult<()>;

    /// Teardown. Never gated and cannot fail.
    async fn disconnect(&self);

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()>;

    async fn rmdir(&self, path: &str) -> VfsResult<()>;

    async fn create_file(&self, request: &CreateFileRequest) -> VfsResult<FileHandle>;

    async fn rename(&self, src: &SmbFilename, dst: &SmbFilename) -> VfsResult<()>;

    async fn unlink(&self, fname: &SmbFilename) -> VfsResult<()>;
}

#[async_trait]
impl<T: VfsHandler + ?Sized> VfsHandler for Arc<T> {
    async fn connect(&self, service: &str, user: &str) -> VfsResult<()> {
        (**self).connect(service, user).await
    }

    async fn disconnect(&self) {
        (**self).disconnect().await
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        (**self).mkdir(path, mode).await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        (**self).rmdir(path).await
    }

    async fn create_file(&self, request: &CreateFileRequest) -> VfsResult<FileHandle> {
        (**self).create_file(request).await
    }

    async fn rename(&self, src: &SmbFilename, dst: &SmbFilename) -> VfsResult<()> {
        (**self).rename(src, dst).await
    }

    async fn unlink(&self, fname: &SmbFilename) -> VfsResult<()> {
        (**self).unlink(fname).await
    }
}
