//! Operation chain types: the handler trait every layer implements, the
//! per-operation request types, and the status model shared by all layers.

mod error;
pub mod layer;
pub mod local;
mod traits;
mod types;

pub use error::{NtStatus, VfsError, VfsResult};
pub use layer::{HookLayer, LayerSettings};
pub use local::LocalFs;
pub use traits::VfsHandler;
pub use types::{
    CreateAction, CreateDisposition, CreateFileRequest, FileHandle, Operation, SmbFilename,
    FILE_DIRECTORY_FILE,
};
