//
// Crate-internal error type, and the mapping to HTTP status codes.
//
use std::io;

use http::StatusCode;

use crate::fs::FsError;

pub(crate) type DavResult<T> = Result<T, DavError>;

#[derive(Debug)]
pub(crate) enum DavError {
    XmlReadError, // XML parser error
    XmlParseError, // XML element structure error
    InvalidPath,
    IllegalPath, // path not valid here (e.g. outside of the prefix)
    ForbiddenPath, // too many dotdots
    UnknownDavMethod,
    Status(StatusCode),
    StatusClose(StatusCode),
    FsError(FsError),
    IoError(io::Error),
    XmlWriteError, // XML writer error
}

impl DavError {
    /// The status code that this error maps to.
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::Status(s) => *s,
            DavError::StatusClose(s) => *s,
            DavError::FsError(e) => fserror_to_status(e),
            DavError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::XmlWriteError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Must we close the connection after sending this error.
    pub(crate) fn must_close(&self) -> bool {
        !matches!(
            self,
            DavError::Status(_) | DavError::FsError(_) | DavError::XmlReadError | DavError::XmlParseError
        )
    }
}

pub(crate) fn fserror_to_status(e: &FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Forbidden => StatusCode::FORBIDDEN,
        FsError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        FsError::LoopDetected => StatusCode::LOOP_DETECTED,
        FsError::PathTooLong => StatusCode::URI_TOO_LONG,
        FsError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        FsError::IsRemote => StatusCode::BAD_GATEWAY,
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for DavError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DavError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::FsError(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

impl From<xml::reader::Error> for DavError {
    fn from(_: xml::reader::Error) -> Self {
        DavError::XmlReadError
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(_: xml::writer::Error) -> Self {
        DavError::XmlWriteError
    }
}

impl From<xmltree::ParseError> for DavError {
    fn from(_: xmltree::ParseError) -> Self {
        DavError::XmlParseError
    }
}

impl From<DavError> for io::Error {
    fn from(e: DavError) -> Self {
        match e {
            DavError::IoError(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
