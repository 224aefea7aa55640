//! Catheter implant record schema ("scheda impianto").
//!
//! A record is created as one of two variants, [`SchedaType::Semplificata`] or
//! [`SchedaType::Completa`], and keeps that variant for life. Each variant is a fixed
//! table of [`FieldSpec`]s; [`validate_record`] interprets whichever table applies,
//! so there is exactly one validator and one definition per variant.
//!
//! Responsibilities:
//! - Declare the field set, field kinds and required-ness of each variant
//! - Validate an editable [`RecordDraft`] into a [`ValidatedRecord`]
//! - Decide export eligibility
//!
//! Notes:
//! - Fields of the other variant are rejected, never silently dropped
//! - `tunnelizzazione_note` longer than 6 characters is rejected, never truncated

use crate::constants::{
    IMPLANT_DATE_FORMAT, RECORD_BOOKKEEPING_KEYS, TUNNELIZATION_NOTE_MAX_CHARS,
};
use crate::error::{ExportIneligibleError, FieldError, FieldErrorKind};
use crate::record::ClinicalRecord;
use amb_types::{BoundedText, NonEmptyText, TextError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Note attached to a tunnelized catheter.
pub type TunnelizationNote = BoundedText<TUNNELIZATION_NOTE_MAX_CHARS>;

// ============================================================================
// Variant tag
// ============================================================================

/// Shape of an implant record, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedaType {
    /// Short form used for routine PICC/midline placements.
    Semplificata,
    /// Full implant form, the only one that can be printed.
    Completa,
}

impl SchedaType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semplificata => "semplificata",
            Self::Completa => "completa",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "semplificata" => Some(Self::Semplificata),
            "completa" => Some(Self::Completa),
            _ => None,
        }
    }

    /// Records written before the variant split carry no tag; they used the full form.
    pub const fn legacy_default() -> Self {
        Self::Completa
    }

    pub const fn allows_export(self) -> bool {
        matches!(self, Self::Completa)
    }

    pub fn schema(self) -> &'static VariantSchema {
        match self {
            Self::Semplificata => &SEMPLIFICATA,
            Self::Completa => &COMPLETA,
        }
    }
}

impl fmt::Display for SchedaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fails fast when `record` cannot be exported to PDF.
pub fn ensure_exportable(record: &ClinicalRecord) -> Result<(), ExportIneligibleError> {
    if record.scheda_type.allows_export() {
        Ok(())
    } else {
        Err(ExportIneligibleError {
            record_id: record.id.clone(),
            scheda_type: record.scheda_type,
        })
    }
}

// ============================================================================
// Field tables
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// `YYYY-MM-DD`.
    Date,
    /// Free text.
    Text,
    /// Free text of at most [`TUNNELIZATION_NOTE_MAX_CHARS`] characters.
    ShortText,
    /// Boolean checkbox; absent means `false`.
    Flag,
    /// One of a closed set of tokens.
    Choice(&'static [&'static str]),
}

impl FieldKind {
    const fn expected(self) -> &'static str {
        match self {
            Self::Date => "a date string",
            Self::Text | Self::ShortText | Self::Choice(_) => "a string",
            Self::Flag => "a boolean",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
    /// Flag that must be `true` for this field to carry a value.
    pub requires_flag: Option<&'static str>,
}

impl FieldSpec {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Required,
            requires_flag: None,
        }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Optional,
            requires_flag: None,
        }
    }

    const fn only_with(mut self, flag: &'static str) -> Self {
        self.requires_flag = Some(flag);
        self
    }

    pub const fn is_required(&self) -> bool {
        matches!(self.presence, Presence::Required)
    }
}

/// The field table of one variant.
#[derive(Debug)]
pub struct VariantSchema {
    pub scheda_type: SchedaType,
    pub fields: &'static [FieldSpec],
}

impl VariantSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name)
    }
}

pub const CATETERE_SEMPLIFICATA: &[&str] = &["picc", "picc_port", "midline"];
pub const CATETERE_COMPLETA: &[&str] = &[
    "picc",
    "picc_port",
    "midline",
    "cvc_non_tunnellizzato",
    "cvc_tunnellizzato",
    "port",
];
pub const BRACCIO: &[&str] = &["dx", "sn"];
pub const VENA: &[&str] = &["basilica", "cefalica", "brachiale"];
pub const IGIENE_MANI: &[&str] = &["lavaggio_antisettico", "frizione_alcolica"];
pub const DISINFETTANTE: &[&str] = &["clorexidina_2", "iodiopovidone"];
pub const MODALITA: &[&str] = &["emergenza", "urgenza", "elezione"];
pub const MOTIVAZIONE: &[&str] = &[
    "chemioterapia",
    "difficolta_vene",
    "terapia_prolungata",
    "monitoraggio",
    "altro",
];

use FieldKind::*;

static SEMPLIFICATA_FIELDS: [FieldSpec; 9] = [
    FieldSpec::required("data_impianto", Date),
    FieldSpec::optional("presidio_impianto", Text),
    FieldSpec::required("tipo_catetere", Choice(CATETERE_SEMPLIFICATA)),
    FieldSpec::required("braccio", Choice(BRACCIO)),
    FieldSpec::required("vena", Choice(VENA)),
    FieldSpec::optional("tunnelizzazione", Flag),
    FieldSpec::optional("tunnelizzazione_note", ShortText).only_with("tunnelizzazione"),
    FieldSpec::optional("exit_site_cm", Text),
    FieldSpec::optional("operatore", Text),
];

static COMPLETA_FIELDS: [FieldSpec; 18] = [
    FieldSpec::required("data_impianto", Date),
    FieldSpec::required("tipo_catetere", Choice(CATETERE_COMPLETA)),
    FieldSpec::required("sede", Text),
    FieldSpec::optional("braccio", Choice(BRACCIO)),
    FieldSpec::optional("vena", Choice(VENA)),
    FieldSpec::optional("exit_site_cm", Text),
    FieldSpec::optional("ecoguidato", Flag),
    FieldSpec::optional("igiene_mani", Choice(IGIENE_MANI)),
    FieldSpec::optional("precauzioni_barriera", Flag),
    FieldSpec::optional("disinfettante", Choice(DISINFETTANTE)),
    FieldSpec::optional("sutureless_device", Flag),
    FieldSpec::optional("medicazione_trasparente", Flag),
    FieldSpec::optional("controllo_rx", Flag),
    FieldSpec::optional("controllo_ecg", Flag),
    FieldSpec::optional("modalita", Choice(MODALITA)),
    FieldSpec::optional("motivazione", Choice(MOTIVAZIONE)),
    FieldSpec::optional("operatore", Text),
    FieldSpec::optional("note", Text),
];

static SEMPLIFICATA: VariantSchema = VariantSchema {
    scheda_type: SchedaType::Semplificata,
    fields: &SEMPLIFICATA_FIELDS,
};

static COMPLETA: VariantSchema = VariantSchema {
    scheda_type: SchedaType::Completa,
    fields: &COMPLETA_FIELDS,
};

// ============================================================================
// Drafts and validated records
// ============================================================================

/// Editable field map for one pending create/update.
///
/// A draft is local to a single edit session: it is built up, handed to the
/// repository by value on submit, and simply dropped on cancel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordDraft {
    fields: Map<String, Value>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a draft with the stored values of `record` that belong to its variant.
    ///
    /// A flag-dependent value whose flag is not stored as `true` is left out, so a
    /// stale note cannot block the next edit.
    pub fn from_record(record: &ClinicalRecord) -> Self {
        let schema = record.scheda_type.schema();
        let flag_set = |flag: &str| record.fields.get(flag) == Some(&Value::Bool(true));
        let fields = record
            .fields
            .iter()
            .filter(|(_, value)| !value.is_null())
            .filter(|(name, _)| match schema.field(name).map(|spec| spec.requires_flag) {
                Some(Some(flag)) => flag_set(flag),
                Some(None) => true,
                None => false,
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self { fields }
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A typed, schema-checked field value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Date(NaiveDate),
    Text(String),
    Flag(bool),
    Choice(&'static str),
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Date(d) => serializer.collect_str(&d.format(IMPLANT_DATE_FORMAT)),
            Self::Text(t) => serializer.serialize_str(t),
            Self::Flag(b) => serializer.serialize_bool(*b),
            Self::Choice(c) => serializer.serialize_str(c),
        }
    }
}

/// Output of [`validate_record`]: exactly the fields of one variant, typed.
///
/// Serialises to the flat field map sent to the persistence service. The variant tag
/// itself is not part of the map; creation payloads add it, update payloads never do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidatedRecord {
    #[serde(skip)]
    scheda_type: SchedaType,
    #[serde(flatten)]
    fields: BTreeMap<&'static str, FieldValue>,
}

impl ValidatedRecord {
    pub fn scheda_type(&self) -> SchedaType {
        self.scheda_type
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<&'static str, FieldValue> {
        &self.fields
    }

    pub fn data_impianto(&self) -> Option<NaiveDate> {
        match self.fields.get("data_impianto") {
            Some(FieldValue::Date(d)) => Some(*d),
            _ => None,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validates `draft` against the field table of `scheda_type`.
///
/// A draft fails if a required field is absent or blank, a value has the wrong type
/// or is outside its permitted set, a field belongs to no field of the variant,
/// `tunnelizzazione_note` exceeds its limit, or a flag-dependent field is set while
/// its flag is not. Every failing field is reported, in table order.
///
/// Bookkeeping keys (`id`, `scheda_type`, ...) are ignored so that a draft seeded
/// from a stored record can be submitted as is.
pub fn validate_record(
    scheda_type: SchedaType,
    draft: &RecordDraft,
) -> Result<ValidatedRecord, Vec<FieldError>> {
    let schema = scheda_type.schema();
    let mut errors = Vec::new();

    for name in draft.fields.keys() {
        if RECORD_BOOKKEEPING_KEYS.contains(&name.as_str()) {
            tracing::debug!(field = %name, "ignoring bookkeeping key in record draft");
            continue;
        }
        if !schema.has_field(name) {
            errors.push(FieldError::new(
                name.clone(),
                FieldErrorKind::NotInVariant { scheda_type },
            ));
        }
    }

    let mut fields = BTreeMap::new();
    for spec in schema.fields {
        match convert_field(spec, draft.fields.get(spec.name)) {
            Ok(Some(value)) => {
                fields.insert(spec.name, value);
            }
            Ok(None) if spec.is_required() => {
                errors.push(FieldError::new(spec.name, FieldErrorKind::Missing));
            }
            Ok(None) => {}
            Err(kind) => errors.push(FieldError::new(spec.name, kind)),
        }
    }

    for spec in schema.fields {
        let Some(flag) = spec.requires_flag else {
            continue;
        };
        if fields.contains_key(spec.name) && fields.get(flag) != Some(&FieldValue::Flag(true)) {
            errors.push(FieldError::new(
                spec.name,
                FieldErrorKind::RequiresFlag { flag },
            ));
        }
    }

    if errors.is_empty() {
        Ok(ValidatedRecord {
            scheda_type,
            fields,
        })
    } else {
        Err(errors)
    }
}

/// Converts one raw value. `Ok(None)` means "absent": missing, null or blank.
fn convert_field(
    spec: &FieldSpec,
    raw: Option<&Value>,
) -> Result<Option<FieldValue>, FieldErrorKind> {
    let wrong_type = || FieldErrorKind::WrongType {
        expected: spec.kind.expected(),
    };

    match (spec.kind, raw) {
        (Flag, None | Some(Value::Null)) => Ok(Some(FieldValue::Flag(false))),
        (_, None | Some(Value::Null)) => Ok(None),
        (Flag, Some(Value::Bool(b))) => Ok(Some(FieldValue::Flag(*b))),
        (kind, Some(Value::String(s))) => match NonEmptyText::from_optional(Some(s)) {
            Some(text) => convert_text(kind, text).map(Some),
            None => Ok(None),
        },
        _ => Err(wrong_type()),
    }
}

fn convert_text(kind: FieldKind, text: NonEmptyText) -> Result<FieldValue, FieldErrorKind> {
    match kind {
        Date => NaiveDate::parse_from_str(text.as_str(), IMPLANT_DATE_FORMAT)
            .map(FieldValue::Date)
            .map_err(|_| FieldErrorKind::InvalidDate {
                value: text.into_inner(),
            }),
        Text => Ok(FieldValue::Text(text.into_inner())),
        ShortText => match TunnelizationNote::new(text.into_inner()) {
            Ok(note) => Ok(FieldValue::Text(note.as_str().to_owned())),
            Err(TextError::TooLong { max, actual }) => Err(FieldErrorKind::TooLong { max, actual }),
            Err(TextError::Empty) => Err(FieldErrorKind::Missing),
        },
        Choice(allowed) => allowed
            .iter()
            .copied()
            .find(|candidate| *candidate == text.as_str())
            .map(FieldValue::Choice)
            .ok_or_else(|| FieldErrorKind::NotAllowed {
                value: text.into_inner(),
            }),
        Flag => Err(FieldErrorKind::WrongType {
            expected: Flag.expected(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simplified_draft() -> RecordDraft {
        RecordDraft::new()
            .with("data_impianto", "2024-03-11")
            .with("tipo_catetere", "midline")
            .with("braccio", "dx")
            .with("vena", "basilica")
    }

    fn complete_draft() -> RecordDraft {
        RecordDraft::new()
            .with("data_impianto", "2024-03-11")
            .with("tipo_catetere", "cvc_tunnellizzato")
            .with("sede", "giugulare interna")
    }

    fn kinds_for(errors: &[FieldError], field: &str) -> Vec<FieldErrorKind> {
        errors
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.kind.clone())
            .collect()
    }

    #[test]
    fn required_fields_per_variant() {
        let simplified: Vec<_> = SchedaType::Semplificata.schema().required_fields().collect();
        assert_eq!(
            simplified,
            vec!["data_impianto", "tipo_catetere", "braccio", "vena"]
        );
        let complete: Vec<_> = SchedaType::Completa.schema().required_fields().collect();
        assert_eq!(complete, vec!["data_impianto", "tipo_catetere", "sede"]);
    }

    #[test]
    fn variants_do_not_share_exclusive_fields() {
        let simplified = SchedaType::Semplificata.schema();
        let complete = SchedaType::Completa.schema();
        assert!(simplified.has_field("tunnelizzazione"));
        assert!(!complete.has_field("tunnelizzazione"));
        assert!(!complete.has_field("tunnelizzazione_note"));
        assert!(!complete.has_field("presidio_impianto"));
        assert!(!simplified.has_field("sede"));
        assert!(!simplified.has_field("ecoguidato"));
        assert!(!simplified.has_field("note"));
    }

    #[test]
    fn valid_simplified_record_serialises_typed_fields() {
        let draft = simplified_draft()
            .with("tunnelizzazione", true)
            .with("tunnelizzazione_note", "2 cm")
            .with("operatore", "  Inf. Neri ");

        let record = validate_record(SchedaType::Semplificata, &draft).expect("valid record");
        assert_eq!(record.scheda_type(), SchedaType::Semplificata);
        assert_eq!(
            record.data_impianto(),
            NaiveDate::from_ymd_opt(2024, 3, 11)
        );
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "data_impianto": "2024-03-11",
                "tipo_catetere": "midline",
                "braccio": "dx",
                "vena": "basilica",
                "tunnelizzazione": true,
                "tunnelizzazione_note": "2 cm",
                "operatore": "Inf. Neri"
            })
        );
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let draft = RecordDraft::new().with("data_impianto", "").with("braccio", "dx");
        let errors = validate_record(SchedaType::Semplificata, &draft).unwrap_err();
        let missing: Vec<_> = errors
            .iter()
            .filter(|e| e.kind == FieldErrorKind::Missing)
            .map(|e| e.field.as_str())
            .collect();
        assert_eq!(missing, vec!["data_impianto", "tipo_catetere", "vena"]);
    }

    #[test]
    fn catheter_type_subset_depends_on_variant() {
        let draft = simplified_draft().with("tipo_catetere", "port");
        let errors = validate_record(SchedaType::Semplificata, &draft).unwrap_err();
        assert_eq!(
            kinds_for(&errors, "tipo_catetere"),
            vec![FieldErrorKind::NotAllowed {
                value: "port".into()
            }]
        );

        let draft = complete_draft().with("tipo_catetere", "port");
        assert!(validate_record(SchedaType::Completa, &draft).is_ok());
    }

    #[test]
    fn tunnelization_note_over_limit_is_rejected_not_truncated() {
        let draft = simplified_draft()
            .with("tunnelizzazione", true)
            .with("tunnelizzazione_note", "1234567");
        let errors = validate_record(SchedaType::Semplificata, &draft).unwrap_err();
        assert_eq!(
            kinds_for(&errors, "tunnelizzazione_note"),
            vec![FieldErrorKind::TooLong { max: 6, actual: 7 }]
        );
    }

    #[test]
    fn tunnelization_note_requires_flag() {
        let draft = simplified_draft().with("tunnelizzazione_note", "3cm");
        let errors = validate_record(SchedaType::Semplificata, &draft).unwrap_err();
        assert_eq!(
            kinds_for(&errors, "tunnelizzazione_note"),
            vec![FieldErrorKind::RequiresFlag {
                flag: "tunnelizzazione"
            }]
        );
    }

    #[test]
    fn fields_of_the_other_variant_are_rejected() {
        let draft = simplified_draft().with("ecoguidato", true).with("sede", "x");
        let errors = validate_record(SchedaType::Semplificata, &draft).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["ecoguidato", "sede"]);
        assert!(errors.iter().all(|e| e.kind
            == FieldErrorKind::NotInVariant {
                scheda_type: SchedaType::Semplificata
            }));

        let draft = complete_draft().with("tunnelizzazione", false);
        let errors = validate_record(SchedaType::Completa, &draft).unwrap_err();
        assert_eq!(errors[0].field, "tunnelizzazione");
    }

    #[test]
    fn bookkeeping_keys_are_ignored() {
        let draft = complete_draft()
            .with("id", "r-1")
            .with("scheda_type", "semplificata")
            .with("patient_id", "p-1");
        let record = validate_record(SchedaType::Completa, &draft).expect("valid record");
        assert_eq!(record.scheda_type(), SchedaType::Completa);
        assert!(record.get("scheda_type").is_none());
        assert!(record.get("id").is_none());
    }

    #[test]
    fn wrong_types_and_bad_dates_are_reported() {
        let draft = complete_draft()
            .with("data_impianto", "11/03/2024")
            .with("ecoguidato", "yes")
            .with("sede", 4);
        let errors = validate_record(SchedaType::Completa, &draft).unwrap_err();
        assert_eq!(
            kinds_for(&errors, "data_impianto"),
            vec![FieldErrorKind::InvalidDate {
                value: "11/03/2024".into()
            }]
        );
        assert_eq!(
            kinds_for(&errors, "ecoguidato"),
            vec![FieldErrorKind::WrongType {
                expected: "a boolean"
            }]
        );
        assert_eq!(
            kinds_for(&errors, "sede"),
            vec![FieldErrorKind::WrongType {
                expected: "a string"
            }]
        );
    }

    #[test]
    fn absent_flags_default_to_false_and_blank_optionals_are_dropped() {
        let draft = complete_draft().with("note", "   ").with("modalita", Value::Null);
        let record = validate_record(SchedaType::Completa, &draft).expect("valid record");
        assert_eq!(record.get("controllo_rx"), Some(&FieldValue::Flag(false)));
        assert!(record.get("note").is_none());
        assert!(record.get("modalita").is_none());
    }

    #[test]
    fn stored_bookkeeping_keys_do_not_block_validation() {
        let mut stored = Map::new();
        stored.insert("id".into(), json!("r-9"));
        stored.insert("ambulatorio".into(), json!("pta_centro"));
        stored.insert("updated_at".into(), json!("2024-03-12T08:00:00+00:00"));
        stored.insert("allegati".into(), json!([]));
        for (name, value) in complete_draft().fields {
            stored.insert(name, value);
        }

        let draft = RecordDraft::from_map(stored);
        assert!(validate_record(SchedaType::Completa, &draft).is_ok());
    }

    #[test]
    fn only_complete_records_are_exportable() {
        assert!(SchedaType::Completa.allows_export());
        assert!(!SchedaType::Semplificata.allows_export());
        assert_eq!(SchedaType::legacy_default(), SchedaType::Completa);
        assert_eq!(SchedaType::parse(" Semplificata"), Some(SchedaType::Semplificata));
        assert_eq!(SchedaType::parse("ridotta"), None);
    }
}
