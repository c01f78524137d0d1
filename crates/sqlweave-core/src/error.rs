//! Error types for sqlweave operations.

use std::fmt;

/// The primary error type for all sqlweave operations.
#[derive(Debug)]
pub enum Error {
    /// A condition was given operands it cannot be built from
    InvalidConditionShape(ShapeError),
    /// A relation path segment is not defined on the model it was resolved against
    UnknownRelation {
        /// The segment that failed to resolve
        segment: String,
        /// The model the segment was looked up on
        model: String,
    },
    /// A trashed-row operation on a model without soft deletes
    SoftDeleteUnsupported {
        /// The model (or table) lacking a soft-delete column
        model: String,
    },
    /// Failure reported by the driver while executing a specification
    Driver(DriverError),
    /// Type conversion errors
    Type(TypeError),
    /// A row expected to exist could not be read back
    NotFound {
        /// The model that was queried
        model: String,
    },
    /// A lifecycle hook rejected the operation
    Hook(String),
    /// Custom error with message
    Custom(String),
}

/// Details about a condition that could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    /// The condition family, e.g. `"between"`
    pub condition: &'static str,
    pub message: String,
}

impl ShapeError {
    pub fn new(condition: &'static str, message: impl Into<String>) -> Self {
        Self {
            condition,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct DriverError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a driver failure from a message.
    pub fn driver(message: impl Into<String>) -> Self {
        Error::Driver(DriverError {
            message: message.into(),
            source: None,
        })
    }

    /// Build a shape error for the given condition family.
    pub fn shape(condition: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidConditionShape(ShapeError::new(condition, message))
    }

    /// Was this error raised while validating input, before any I/O?
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidConditionShape(_)
                | Error::UnknownRelation { .. }
                | Error::SoftDeleteUnsupported { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConditionShape(e) => write!(f, "Invalid condition: {}", e),
            Error::UnknownRelation { segment, model } => {
                write!(f, "Unknown relation '{}' on model {}", segment, model)
            }
            Error::SoftDeleteUnsupported { model } => {
                write!(f, "Soft deletes are not enabled for {}", model)
            }
            Error::Driver(e) => write!(f, "Driver error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::NotFound { model } => write!(f, "No matching {} row found", model),
            Error::Hook(msg) => write!(f, "Hook aborted operation: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Driver(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.condition, self.message)
    }
}

impl std::error::Error for ShapeError {}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ShapeError> for Error {
    fn from(err: ShapeError) -> Self {
        Error::InvalidConditionShape(err)
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::Driver(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for sqlweave operations.
pub type Result<T> = std::result::Result<T, Error>;
