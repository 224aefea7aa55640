//! # Ambulatorio Core
//!
//! Client-side decision layer for the ambulatorio patient tracker.
//!
//! This crate owns the business rules and nothing else:
//! - the patient status lifecycle and the data each transition must carry
//! - the two implant record variants, their field tables and export eligibility
//! - the site-scoped patient directory with its derived counts and filters
//!
//! **No transport concerns**: HTTP lives in `api-client`, behind the
//! [`remote::PersistenceService`] trait.

pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod patient;
pub mod record;
pub mod remote;
pub mod repository;
pub mod schema;
pub mod service;
pub mod transition;

pub use amb_types::{BoundedText, NonEmptyText, TextError};
pub use config::CoreConfig;
pub use directory::{PatientCounts, PatientDirectory, TypeFilter};
pub use error::{
    CoreError, CoreResult, ExportIneligibleError, FieldError, FieldErrorKind, RemoteCallError,
    ValidationError,
};
pub use patient::{
    DetailChange, DischargeReason, NewPatient, Patient, PatientDetails, PatientDetailsEdit,
    PatientEdit, PatientStatus, PatientType, Site,
};
pub use record::{ClinicalRecord, NewRecordPayload, PdfDocument, RecordUpdatePayload};
pub use remote::{PatientUpdate, PersistenceService};
pub use repository::RecordRepository;
pub use schema::{validate_record, RecordDraft, SchedaType, ValidatedRecord};
pub use service::PatientService;
pub use transition::{StatusTransitionEngine, StatusUpdate, TransitionRequest};
