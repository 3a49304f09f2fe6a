use std::sync::Arc;

use arrow_schema::{ArrowError, DataType};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

/// Shared so that a recorded failure can be reported more than once.
pub type StdErrorShared = Arc<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns `true` if this error only states that a value does not fit the
    /// attempted type, i.e. a wider type may still succeed.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self.kind(), ErrorKind::TypeMismatch { .. })
    }

    pub fn type_mismatch(data_type: &DataType, row: usize, value: &[u8]) -> Error {
        Error(
            ErrorKind::TypeMismatch {
                data_type: data_type.clone(),
                row,
                value: String::from_utf8_lossy(value).into_owned(),
            }
            .into(),
        )
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_state(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidState { name: name.into() }.into())
    }

    pub fn arrow<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Arrow {
                context: context.into(),
                source: Arc::new(source),
            }
            .into(),
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error("value '{value}' at row {row} cannot be converted to {data_type}")]
    TypeMismatch {
        data_type: DataType,
        row: usize,
        value: String,
    },

    #[error("invalid format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid state: {name}")]
    InvalidState { name: String },

    #[error("Arrow error: {context}: {source}")]
    Arrow {
        context: String,
        source: StdErrorShared,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<ArrowError> for Error {
    fn from(e: ArrowError) -> Self {
        Error::arrow("", e)
    }
}
