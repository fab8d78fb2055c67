use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::error::{NtStatus, VfsError};

/// `create_options` bit requesting a directory instead of a file.
pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;

/// Operations a hook script can gate. `disconnect` is deliberately absent:
/// teardown is always forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Connect,
    Mkdir,
    Rmdir,
    CreateFile,
    Rename,
    Unlink,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Connect,
        Operation::Mkdir,
        Operation::Rmdir,
        Operation::CreateFile,
        Operation::Rename,
        Operation::Unlink,
    ];

    /// Name of the hook script function consulted for this operation.
    pub fn hook_name(self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Mkdir => "mkdir",
            Operation::Rmdir => "rmdir",
            Operation::CreateFile => "create_file",
            Operation::Rename => "rename",
            Operation::Unlink => "unlink",
        }
    }

    /// Fixed result returned when a hook vetoes this operation.
    pub fn denial(self) -> VfsError {
        match self {
            Operation::CreateFile => VfsError::Status(NtStatus::UNSUCCESSFUL),
            _ => VfsError::NotPermitted,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hook_name())
    }
}

/// A share-relative file name, optionally addressing a named stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SmbFilename {
    pub base_name: String,
    pub stream_name: Option<String>,
}

impl SmbFilename {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            stream_name: None,
        }
    }

    pub fn with_stream(base_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            stream_name: Some(stream_name.into()),
        }
    }
}

impl fmt::Display for SmbFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stream_name {
            Some(stream) => write!(f, "{}:{}", self.base_name, stream),
            None => write!(f, "{}", self.base_name),
        }
    }
}

/// SMB2 create disposition (MS-SMB2 2.2.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CreateDisposition {
    Supersede = 0,
    Open = 1,
    Create = 2,
    OpenIf = 3,
    Overwrite = 4,
    OverwriteIf = 5,
}

impl CreateDisposition {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Supersede,
            1 => Self::Open,
            2 => Self::Create,
            3 => Self::OpenIf,
            4 => Self::Overwrite,
            5 => Self::OverwriteIf,
            _ => return None,
        })
    }
}

/// Everything a create-file call carries down the chain. Hooks only ever
/// see `fname.base_name`; the rest is forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFileRequest {
    pub fname: SmbFilename,
    pub access_mask: u32,
    pub share_access: u32,
    pub create_disposition: CreateDisposition,
    pub create_options: u32,
    pub file_attributes: u32,
    pub allocation_size: u64,
}

impl CreateFileRequest {
    pub fn new(fname: SmbFilename, create_disposition: CreateDisposition) -> Self {
        Self {
            fname,
            access_mask: 0,
            share_access: 0,
            create_disposition,
            create_options: 0,
            file_attributes: 0,
            allocation_size: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.create_options & FILE_DIRECTORY_FILE != 0
    }
}

/// What a successful create-file did to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateAction {
    Opened,
    Created,
    Overwritten,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub path: PathBuf,
    pub is_directory: bool,
    pub action: CreateAction,
}
