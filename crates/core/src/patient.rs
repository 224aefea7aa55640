//! Patient model and wire payloads.
//!
//! A [`Patient`] is the client-side projection of a patient owned by the persistence
//! service. The enums here serialise to the exact tokens the service uses
//! (`PICC`, `in_cura`, `guarito`, `pta_centro`, ...).
//!
//! Status-related fields (`status`, `discharge_reason`, `discharge_notes`,
//! `suspend_notes`) are only ever written through the transition engine; see
//! [`crate::transition`]. Everything else goes through [`PatientEdit`].

use crate::error::{CoreResult, ValidationError};
use amb_types::NonEmptyText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Enumerations
// ============================================================================

/// Patient classification tag.
///
/// `PiccMed` is a dual tag: the patient is both a PICC and a MED patient. It is not
/// a third, exclusive category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatientType {
    #[serde(rename = "PICC")]
    Picc,
    #[serde(rename = "MED")]
    Med,
    #[serde(rename = "PICC_MED")]
    PiccMed,
}

impl PatientType {
    pub const ALL: [PatientType; 3] = [Self::Picc, Self::Med, Self::PiccMed];

    /// Whether the patient carries the PICC tag (alone or dual).
    pub const fn has_picc(self) -> bool {
        matches!(self, Self::Picc | Self::PiccMed)
    }

    /// Whether the patient carries the MED tag (alone or dual).
    pub const fn has_med(self) -> bool {
        matches!(self, Self::Med | Self::PiccMed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Picc => "PICC",
            Self::Med => "MED",
            Self::PiccMed => "PICC_MED",
        }
    }

    /// Parses a type tag, case-insensitively.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_uppercase().as_str() {
            "PICC" => Ok(Self::Picc),
            "MED" => Ok(Self::Med),
            "PICC_MED" => Ok(Self::PiccMed),
            _ => Err(ValidationError::InvalidField {
                field: "tipo",
                reason: format!("unknown patient type '{s}' (expected PICC, MED or PICC_MED)"),
            }),
        }
    }
}

impl fmt::Display for PatientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current care state of a patient.
///
/// Every state is reachable from every other one; what varies per target is the data
/// a transition must carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    /// Under active care.
    #[default]
    InCura,
    /// Discharged.
    Dimesso,
    /// Care suspended.
    Sospeso,
}

impl PatientStatus {
    pub const ALL: [PatientStatus; 3] = [Self::InCura, Self::Dimesso, Self::Sospeso];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InCura => "in_cura",
            Self::Dimesso => "dimesso",
            Self::Sospeso => "sospeso",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "in_cura" => Ok(Self::InCura),
            "dimesso" => Ok(Self::Dimesso),
            "sospeso" => Ok(Self::Sospeso),
            _ => Err(ValidationError::InvalidField {
                field: "status",
                reason: format!("unknown status '{s}' (expected in_cura, dimesso or sospeso)"),
            }),
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason recorded when a patient is discharged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DischargeReason {
    /// Recovered.
    Guarito,
    /// Handed over to home care (assistenza domiciliare integrata).
    Adi,
    /// Any other reason; requires explanatory notes.
    Altro,
}

impl DischargeReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guarito => "guarito",
            Self::Adi => "adi",
            Self::Altro => "altro",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "guarito" => Ok(Self::Guarito),
            "adi" => Ok(Self::Adi),
            "altro" => Ok(Self::Altro),
            _ => Err(ValidationError::InvalidField {
                field: "discharge_reason",
                reason: format!("unknown discharge reason '{s}' (expected guarito, adi or altro)"),
            }),
        }
    }
}

impl fmt::Display for DischargeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clinical site (ambulatorio) scoping patients and records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    PtaCentro,
    VillaGinestre,
}

impl Site {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PtaCentro => "pta_centro",
            Self::VillaGinestre => "villa_ginestre",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "pta_centro" => Ok(Self::PtaCentro),
            "villa_ginestre" => Ok(Self::VillaGinestre),
            _ => Err(ValidationError::InvalidField {
                field: "site",
                reason: format!("unknown site '{s}' (expected pta_centro or villa_ginestre)"),
            }),
        }
    }

    /// Whether patients of `tipo` may be created at (or moved to) this site.
    ///
    /// Villa delle Ginestre manages PICC patients only.
    pub const fn accepts(self, tipo: PatientType) -> bool {
        match self {
            Self::PtaCentro => true,
            Self::VillaGinestre => matches!(tipo, PatientType::Picc),
        }
    }

    pub fn ensure_accepts(self, tipo: PatientType) -> Result<(), ValidationError> {
        if self.accepts(tipo) {
            Ok(())
        } else {
            Err(ValidationError::TypeNotAllowedAtSite { site: self, tipo })
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Patient projection
// ============================================================================

/// A patient as returned by the persistence service.
///
/// `discharge_reason`, `discharge_notes` and `suspend_notes` are historical
/// annotations: a later return to `in_cura` leaves them in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub nome: String,
    pub cognome: String,
    pub tipo: PatientType,
    #[serde(alias = "ambulatorio")]
    pub site: Site,
    #[serde(default)]
    pub status: PatientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge_reason: Option<DischargeReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend_notes: Option<String>,
    #[serde(flatten)]
    pub details: PatientDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    /// `"Cognome Nome"`, the order used on lists and printed forms.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.cognome, self.nome)
    }
}

/// Optional anagraphic and clinical details of a patient.
///
/// A detail stored as an empty string reads as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDetails {
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_nascita: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub codice_fiscale: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub telefono: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub medico_base: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub anamnesi: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub terapia_in_atto: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub allergie: Option<String>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|v| !v.trim().is_empty()))
}

impl PatientDetails {
    /// Drops blank values so they are not sent as empty strings.
    fn normalised(self) -> Self {
        fn keep(v: Option<String>) -> Option<String> {
            NonEmptyText::from_optional(v).map(NonEmptyText::into_inner)
        }
        Self {
            data_nascita: keep(self.data_nascita),
            codice_fiscale: keep(self.codice_fiscale),
            telefono: keep(self.telefono),
            email: keep(self.email),
            medico_base: keep(self.medico_base),
            anamnesi: keep(self.anamnesi),
            terapia_in_atto: keep(self.terapia_in_atto),
            allergie: keep(self.allergie),
        }
    }
}

// ============================================================================
// Creation and edit payloads
// ============================================================================

/// Validated body of a patient creation call (`POST /patients`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewPatient {
    nome: NonEmptyText,
    cognome: NonEmptyText,
    tipo: PatientType,
    site: Site,
    #[serde(flatten)]
    details: PatientDetails,
}

impl NewPatient {
    /// Builds a creation payload.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `nome` or `cognome` is blank, or if `site` does
    /// not accept patients of type `tipo`.
    pub fn new(
        nome: impl AsRef<str>,
        cognome: impl AsRef<str>,
        tipo: PatientType,
        site: Site,
    ) -> CoreResult<Self> {
        let nome = NonEmptyText::new(nome).map_err(|_| ValidationError::MissingField("nome"))?;
        let cognome =
            NonEmptyText::new(cognome).map_err(|_| ValidationError::MissingField("cognome"))?;
        site.ensure_accepts(tipo)?;

        Ok(Self {
            nome,
            cognome,
            tipo,
            site,
            details: PatientDetails::default(),
        })
    }

    pub fn with_details(mut self, details: PatientDetails) -> Self {
        self.details = details.normalised();
        self
    }

    pub fn tipo(&self) -> PatientType {
        self.tipo
    }

    pub fn site(&self) -> Site {
        self.site
    }
}

/// Change to one optional patient detail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetailChange {
    Set(String),
    Clear,
}

impl DetailChange {
    /// Blank input clears the detail.
    pub fn from_input(value: impl AsRef<str>) -> Self {
        match NonEmptyText::new(value) {
            Ok(text) => Self::Set(text.into_inner()),
            Err(_) => Self::Clear,
        }
    }

    fn normalised(self) -> Self {
        match self {
            Self::Set(value) => Self::from_input(value),
            Self::Clear => Self::Clear,
        }
    }
}

/// The service ignores `null` in patient updates, so a cleared detail is written as
/// an empty string and read back as absent (see [`PatientDetails`]).
impl Serialize for DetailChange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Set(value) => serializer.serialize_str(value),
            Self::Clear => serializer.serialize_str(""),
        }
    }
}

/// Detail changes of a [`PatientEdit`]. `None` leaves the stored value as it is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PatientDetailsEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_nascita: Option<DetailChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codice_fiscale: Option<DetailChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefono: Option<DetailChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<DetailChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medico_base: Option<DetailChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anamnesi: Option<DetailChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terapia_in_atto: Option<DetailChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergie: Option<DetailChange>,
}

impl PatientDetailsEdit {
    fn normalised(self) -> Self {
        let norm = |c: Option<DetailChange>| c.map(DetailChange::normalised);
        Self {
            data_nascita: norm(self.data_nascita),
            codice_fiscale: norm(self.codice_fiscale),
            telefono: norm(self.telefono),
            email: norm(self.email),
            medico_base: norm(self.medico_base),
            anamnesi: norm(self.anamnesi),
            terapia_in_atto: norm(self.terapia_in_atto),
            allergie: norm(self.allergie),
        }
    }
}

/// Partial field edit of an existing patient (`PUT /patients/{id}`).
///
/// Only the fields that are set are sent. Status fields are absent:
/// status changes go through [`crate::transition::StatusTransitionEngine`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PatientEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cognome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo: Option<PatientType>,
    #[serde(flatten)]
    pub details: PatientDetailsEdit,
}

impl PatientEdit {
    pub fn is_empty(&self) -> bool {
        self.nome.is_none()
            && self.cognome.is_none()
            && self.tipo.is_none()
            && self.details == PatientDetailsEdit::default()
    }

    /// Checks the edit against the patient's site and returns the payload to send.
    ///
    /// Names, when present, must not be blank: a name can be changed but not erased.
    pub fn validate(self, site: Site) -> CoreResult<Self> {
        if self.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "patient",
                reason: "no fields to update".into(),
            }
            .into());
        }

        let nome = self
            .nome
            .map(|n| NonEmptyText::new(n).map_err(|_| ValidationError::MissingField("nome")))
            .transpose()?
            .map(NonEmptyText::into_inner);
        let cognome = self
            .cognome
            .map(|n| NonEmptyText::new(n).map_err(|_| ValidationError::MissingField("cognome")))
            .transpose()?
            .map(NonEmptyText::into_inner);
        if let Some(tipo) = self.tipo {
            site.ensure_accepts(tipo)?;
        }

        Ok(Self {
            nome,
            cognome,
            tipo: self.tipo,
            details: self.details.normalised(),
        })
    }
}
