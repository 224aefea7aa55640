//! Implant record projection and wire payloads.

use crate::constants::PDF_SIGNATURE;
use crate::error::RemoteCallError;
use crate::patient::Site;
use crate::schema::{SchedaType, ValidatedRecord};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// An implant record as returned by the persistence service.
///
/// Variant-specific fields are kept in `fields` exactly as stored; use
/// [`crate::schema::RecordDraft::from_record`] to edit them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub id: String,
    pub patient_id: String,
    #[serde(alias = "ambulatorio")]
    pub site: Site,
    #[serde(default = "SchedaType::legacy_default")]
    pub scheda_type: SchedaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ClinicalRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn data_impianto(&self) -> Option<&str> {
        self.field("data_impianto").and_then(Value::as_str)
    }
}

/// Body of `POST /schede-impianto-picc`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewRecordPayload {
    pub patient_id: String,
    pub site: Site,
    pub scheda_type: SchedaType,
    #[serde(flatten)]
    pub record: ValidatedRecord,
}

/// Body of `PUT /schede-impianto-picc/{id}`.
///
/// Carries variant fields only. There is no way to express a variant change here.
///
/// Every field of the variant is written. Fields absent from the record go out as
/// `null`, which overwrites the stored value: the service merges updates into the
/// stored document and never drops a key that is not sent.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordUpdatePayload {
    pub record: ValidatedRecord,
}

impl Serialize for RecordUpdatePayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let schema = self.record.scheda_type().schema();
        let mut map = serializer.serialize_map(Some(schema.fields.len()))?;
        for spec in schema.fields {
            map.serialize_entry(spec.name, &self.record.get(spec.name))?;
        }
        map.end()
    }
}

/// A downloaded implant record PDF.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdfDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    /// Wraps downloaded bytes after a structural check of the PDF signature.
    pub fn from_download(record: &ClinicalRecord, bytes: Vec<u8>) -> Result<Self, RemoteCallError> {
        if !bytes.starts_with(PDF_SIGNATURE) {
            return Err(RemoteCallError::new(
                "export record pdf",
                "response is not a PDF document",
            ));
        }
        let filename = format!(
            "scheda_impianto_{}.pdf",
            record.data_impianto().unwrap_or("nd")
        );
        Ok(Self { filename, bytes })
    }
}
