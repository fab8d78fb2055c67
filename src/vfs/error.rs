use std::fmt;
use std::io;

#[cfg(unix)]
use libc::{EACCES, EEXIST, EINVAL, EIO, ENOENT, ENOTSUP, EPERM};

#[cfg(not(unix))]
mod fallback_errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EACCES: i32 = 13;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const ENOTSUP: i32 = 95;
}
#[cfg(not(unix))]
use fallback_errno::{EACCES, EEXIST, EINVAL, EIO, ENOENT, ENOTSUP, EPERM};

/// NT status code carried by status-contract operations such as `create_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const OK: Self = Self(0x0000_0000);
    pub const UNSUCCESSFUL: Self = Self(0xC000_0001);
    pub const INVALID_PARAMETER: Self = Self(0xC000_000D);
    pub const ACCESS_DENIED: Self = Self(0xC000_0022);
    pub const OBJECT_NAME_NOT_FOUND: Self = Self(0xC000_0034);
    pub const OBJECT_NAME_COLLISION: Self = Self(0xC000_0035);
    pub const NOT_SUPPORTED: Self = Self(0xC000_00BB);
    pub const BAD_NETWORK_NAME: Self = Self(0xC000_00CC);

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::OK => "NT_STATUS_OK",
            Self::UNSUCCESSFUL => "NT_STATUS_UNSUCCESSFUL",
            Self::INVALID_PARAMETER => "NT_STATUS_INVALID_PARAMETER",
            Self::ACCESS_DENIED => "NT_STATUS_ACCESS_DENIED",
            Self::OBJECT_NAME_NOT_FOUND => "NT_STATUS_OBJECT_NAME_NOT_FOUND",
            Self::OBJECT_NAME_COLLISION => "NT_STATUS_OBJECT_NAME_COLLISION",
            Self::NOT_SUPPORTED => "NT_STATUS_NOT_SUPPORTED",
            Self::BAD_NETWORK_NAME => "NT_STATUS_BAD_NETWORK_NAME",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "NT_STATUS(0x{:08X})", self.0),
        }
    }
}

/// Failure result of one operation in the handler chain.
///
/// Integer-contract operations (`connect`, `mkdir`, `rmdir`, `rename`,
/// `unlink`) report through [`VfsError::errno`]; `create_file` reports
/// through [`VfsError::nt_status`].
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("operation not permitted")]
    NotPermitted,

    #[error("{0}")]
    Status(NtStatus),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotPermitted => EPERM,
            VfsError::Status(status) => match *status {
                NtStatus::ACCESS_DENIED => EACCES,
                NtStatus::OBJECT_NAME_NOT_FOUND | NtStatus::BAD_NETWORK_NAME => ENOENT,
                NtStatus::OBJECT_NAME_COLLISION => EEXIST,
                NtStatus::INVALID_PARAMETER => EINVAL,
                NtStatus::NOT_SUPPORTED => ENOTSUP,
                _ => EIO,
            },
            VfsError::Io(err) => err.raw_os_error().unwrap_or(EIO),
        }
    }

    pub fn nt_status(&self) -> NtStatus {
        match self {
            VfsError::NotPermitted => NtStatus::ACCESS_DENIED,
            VfsError::Status(status) => *status,
            VfsError::Io(err) => match err.kind() {
                io::ErrorKind::NotFound => NtStatus::OBJECT_NAME_NOT_FOUND,
                io::ErrorKind::AlreadyExists => NtStatus::OBJECT_NAME_COLLISION,
                io::ErrorKind::PermissionDenied => NtStatus::ACCESS_DENIED,
                io::ErrorKind::InvalidInput => NtStatus::INVALID_PARAMETER,
                _ => NtStatus::UNSUCCESSFUL,
            },
        }
    }

    pub fn is_not_permitted(&self) -> bool {
        matches!(self, VfsError::NotPermitted)
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
