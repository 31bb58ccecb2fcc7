use core::ffi::c_int;
use core::fmt;

/// An error of a mapping operation.
///
/// The first four kinds are detected by this library before any call into the OS. Everything
/// else is the platform's own error code, kept verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// The operation is not available on this platform or build.
    Unimplemented,
    /// A precondition on the arguments was violated.
    InvalidArgs,
    /// The operation requires an active mapping.
    Unmapped,
    /// The operation requires a file-backed mapping.
    MapIsAnon,
    /// An error code reported by the OS (`errno`, or `GetLastError` on Windows).
    Os(c_int),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// Capture the error code of the last failed OS call of this thread.
    pub fn last_os_error() -> Self {
        Error::Os(crate::provider::last_error())
    }

    /// The platform error code, if this is an OS error.
    pub fn raw_os_error(&self) -> Option<c_int> {
        match *self {
            Error::Os(code) => Some(code),
            _ => None,
        }
    }

    /// The error as a single integer code.
    ///
    /// Library errors are negative, OS errors are passed through as-is.
    pub fn code(&self) -> c_int {
        match *self {
            Error::Unimplemented => -1,
            Error::InvalidArgs => -2,
            Error::Unmapped => -3,
            Error::MapIsAnon => -4,
            Error::Os(code) => code,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Unimplemented => write!(f, "Operation not implemented on this platform"),
            Error::InvalidArgs => write!(f, "Invalid arguments for mapping operation"),
            Error::Unmapped => write!(f, "No active mapping"),
            Error::MapIsAnon => write!(f, "Operation requires a file-backed mapping"),
            Error::Os(code) => write!(f, "{}", std::io::Error::from_raw_os_error(code)),
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Os(code) => std::io::Error::from_raw_os_error(code),
            Error::Unimplemented => std::io::Error::new(std::io::ErrorKind::Unsupported, err),
            Error::InvalidArgs => std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
            Error::Unmapped | Error::MapIsAnon => {
                std::io::Error::new(std::io::ErrorKind::Other, err)
            }
        }
    }
}

#[test]
fn os_error_has_platform_message() {
    #[cfg(unix)]
    let err = Error::Os(libc::ENOENT);
    #[cfg(windows)]
    let err = Error::Os(2);

    let msg = err.to_string();
    assert!(!msg.is_empty());
    assert_eq!(err.raw_os_error(), Some(err.code()));
    assert_eq!(
        std::io::Error::from(err).kind(),
        std::io::ErrorKind::NotFound
    );
}

#[test]
fn library_codes_are_negative() {
    for err in [
        Error::Unimplemented,
        Error::InvalidArgs,
        Error::Unmapped,
        Error::MapIsAnon,
    ] {
        assert!(err.code() < 0);
        assert_eq!(err.raw_os_error(), None);
    }
}
