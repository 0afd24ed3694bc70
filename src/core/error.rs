use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::panic::Location;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Header fields or geometry that can never be decoded.
    Validation,
    /// A read past the end of the input.
    OutOfBounds,
    /// A bit pattern, sample or index outside of its legal range.
    #[default]
    CorruptData,
    /// Input that is well formed but deliberately not decoded.
    Unsupported,
    /// More units failed than the configured threshold tolerates.
    TooManyErrors,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::OutOfBounds => "OutOfBoundsError",
            ErrorKind::CorruptData => "CorruptDataError",
            ErrorKind::Unsupported => "UnsupportedError",
            ErrorKind::TooManyErrors => "TooManyErrors",
        })
    }
}

#[derive(Debug)]
pub struct DecodeError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub context: Option<String>,
    pub source: Option<Box<dyn Error + Send + Sync>>,
    pub location: &'static Location<'static>,
}

pub type Res<T> = Result<T, DecodeError>;

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The innermost message, skipping over the context wrappers.
    pub fn root_message(&self) -> Option<&str> {
        let mut found = self.message.as_deref();
        let mut err = self;
        while let Some(inner) = err
            .source
            .as_deref()
            .and_then(|s| s.downcast_ref::<DecodeError>())
        {
            if inner.message.is_some() {
                found = inner.message.as_deref();
            }
            err = inner;
        }
        found
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.source {
            Some(ref err) => Some(err.deref()),
            None => None,
        }
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on line {}", self.kind, self.location)?;
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?
        }
        if let Some(cause) = &self.source {
            write!(f, "\ncaused by {}", cause)?
        }
        Ok(())
    }
}

impl From<DecodeError> for std::io::Error {
    fn from(value: DecodeError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, value)
    }
}

impl From<ErrorBuilder> for DecodeError {
    #[track_caller]
    fn from(
        ErrorBuilder {
            kind,
            message,
            context,
            source,
        }: ErrorBuilder,
    ) -> Self {
        Self {
            kind,
            message,
            context,
            source,
            location: Location::caller(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ErrorBuilder {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub context: Option<String>,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

pub(crate) trait ResultBuilder<T>: Sized {
    fn message<F: FnOnce(Option<&str>) -> String>(self, msg: F) -> Result<T, ErrorBuilder>;
    fn kind(self, kind: ErrorKind) -> Result<T, ErrorBuilder>;
    fn msg_of<M: Debug>(self, msg: &M) -> Result<T, ErrorBuilder> {
        self.message(|_| format!("{:?}", msg))
    }
}

impl<T> ResultBuilder<T> for Result<T, ErrorBuilder> {
    fn message<F: FnOnce(Option<&str>) -> String>(self, msg: F) -> Self {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(ErrorBuilder {
                message: Some(msg(e.message.as_deref())),
                ..e
            }),
        }
    }

    fn kind(self, kind: ErrorKind) -> Self {
        self.map_err(|e| ErrorBuilder { kind, ..e })
    }
}

impl<T> ResultBuilder<T> for Option<T> {
    fn message<F: FnOnce(Option<&str>) -> String>(self, msg: F) -> Result<T, ErrorBuilder> {
        match self {
            Some(v) => Ok(v),
            None => Err(ErrorBuilder {
                message: Some(msg(None)),
                ..Default::default()
            }),
        }
    }

    fn kind(self, kind: ErrorKind) -> Result<T, ErrorBuilder> {
        self.ok_or_else(|| ErrorBuilder {
            kind,
            ..Default::default()
        })
    }
}

pub(crate) trait WithContext<T, E: Error, C: ErrorContext + ?Sized> {
    fn at(self, context: &C) -> Result<T, ErrorBuilder>;
}

impl<T, E: Error + 'static + Send + Sync, C: ErrorContext + ?Sized> WithContext<T, E, C>
    for Result<T, E>
{
    fn at(self, context: &C) -> Result<T, ErrorBuilder> {
        self.map_err(|e| {
            let kind = (&e as &(dyn Error + 'static))
                .downcast_ref::<DecodeError>()
                .map(DecodeError::kind)
                .unwrap_or_default();
            ErrorBuilder {
                kind,
                context: context.describe(),
                source: Some(Box::new(e)),
                ..Default::default()
            }
        })
    }
}

pub(crate) trait ErrorContext {
    fn describe(&self) -> Option<String> {
        None
    }

    fn raise_kind<T>(&self, kind: ErrorKind, msg: String) -> Result<T, ErrorBuilder> {
        Err(ErrorBuilder {
            kind,
            message: Some(msg),
            context: self.describe(),
            ..Default::default()
        })
    }

    fn raise<T>(&self, msg: String) -> Result<T, ErrorBuilder> {
        self.raise_kind(ErrorKind::CorruptData, msg)
    }

    fn invalid<T>(&self, msg: String) -> Result<T, ErrorBuilder> {
        self.raise_kind(ErrorKind::Validation, msg)
    }
}
