use crate::patient::{PatientStatus, PatientType, Site};
use crate::schema::SchedaType;
use std::fmt;

/// Local, pre-network rejection of a patient operation.
///
/// Always names the field at fault so the presentation layer can point at it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("patient is already in status {0}")]
    SameStatus(PatientStatus),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("site {site} does not accept patients of type {tipo}")]
    TypeNotAllowedAtSite { site: Site, tipo: PatientType },
}

impl ValidationError {
    /// The field this error refers to, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::SameStatus(_) => Some("status"),
            Self::MissingField(field) | Self::InvalidField { field, .. } => Some(field),
            Self::TypeNotAllowedAtSite { .. } => Some("tipo"),
        }
    }
}

/// What is wrong with a single record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Required for the record's variant but absent or blank.
    Missing,
    /// Present with a JSON type the field does not take.
    WrongType { expected: &'static str },
    /// Not one of the values the variant permits.
    NotAllowed { value: String },
    /// Longer than the field's character limit.
    TooLong { max: usize, actual: usize },
    /// The field does not belong to the record's variant.
    NotInVariant { scheda_type: SchedaType },
    /// Only meaningful when the named flag is set.
    RequiresFlag { flag: &'static str },
    /// Not a `YYYY-MM-DD` date.
    InvalidDate { value: String },
}

/// A single record-schema failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {kind}")]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("required field is missing"),
            Self::WrongType { expected } => write!(f, "expected {expected}"),
            Self::NotAllowed { value } => write!(f, "value '{value}' is not allowed"),
            Self::TooLong { max, actual } => {
                write!(f, "at most {max} characters allowed (got {actual})")
            }
            Self::NotInVariant { scheda_type } => {
                write!(f, "not a field of {scheda_type} records")
            }
            Self::RequiresFlag { flag } => write!(f, "only allowed when {flag} is set"),
            Self::InvalidDate { value } => write!(f, "'{value}' is not a YYYY-MM-DD date"),
        }
    }
}

/// Failure of a call to the persistence service.
///
/// The core does not subdivide these further; `status` is kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct RemoteCallError {
    pub operation: &'static str,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteCallError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// PDF export requested for a record variant that cannot be printed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("PDF export is only available for complete records (record {record_id} is {scheda_type})")]
pub struct ExportIneligibleError {
    pub record_id: String,
    pub scheda_type: SchedaType,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("record validation failed: {}", join_field_errors(.0))]
    RecordInvalid(Vec<FieldError>),
    #[error(transparent)]
    ExportIneligible(#[from] ExportIneligibleError),
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteCallError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// Text suitable for a user-facing notification.
    ///
    /// Local errors are shown as they are; service failures collapse into a generic
    /// retry message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::RecordInvalid(errors) => join_field_errors(errors),
            Self::ExportIneligible(e) => e.to_string(),
            Self::Remote(_) => "The operation could not be completed. Please try again.".into(),
            Self::Config(msg) => format!("Configuration error: {msg}"),
        }
    }

    /// Whether the error was raised before any call reached the persistence service.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Remote(_))
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
