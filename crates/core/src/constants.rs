//! Constants used throughout the ambulatorio core crate.
//!
//! Resource paths and fixed limits live here so the transport and the schema agree
//! on them.

/// Collection path for patients on the persistence service.
pub const PATIENTS_RESOURCE: &str = "patients";

/// Collection path for catheter implant records on the persistence service.
pub const IMPLANT_RECORDS_RESOURCE: &str = "schede-impianto-picc";

/// Maximum length, in characters, of the tunnelization note on a simplified record.
pub const TUNNELIZATION_NOTE_MAX_CHARS: usize = 6;

/// Date format used for `data_impianto` on the wire.
pub const IMPLANT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Leading bytes every PDF document starts with.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Keys that identify a record rather than describe it. They are stripped from drafts
/// before validation and never sent as record fields.
pub const RECORD_BOOKKEEPING_KEYS: &[&str] = &[
    "id",
    "patient_id",
    "site",
    "ambulatorio",
    "scheda_type",
    "created_at",
    "updated_at",
    "allegati",
];

/// Site used when none is configured.
pub const DEFAULT_SITE: crate::patient::Site = crate::patient::Site::PtaCentro;
