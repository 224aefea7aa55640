//! The persistence service seam.
//!
//! The core never talks HTTP itself. Everything that leaves the process goes through
//! [`PersistenceService`]; the `api-client` crate provides the production
//! implementation and tests use [`testing::InMemoryService`].
//!
//! Every method is a single remote call. Implementations do not retry and report any
//! transport or service failure as a [`RemoteCallError`].

use crate::error::RemoteCallError;
use crate::patient::{NewPatient, Patient, PatientEdit, PatientStatus, Site};
use crate::record::{ClinicalRecord, NewRecordPayload, RecordUpdatePayload};
use crate::transition::StatusUpdate;
use async_trait::async_trait;
use serde::Serialize;

pub type RemoteResult<T> = Result<T, RemoteCallError>;

/// Body of `PUT /patients/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatientUpdate {
    Status(StatusUpdate),
    Fields(PatientEdit),
}

#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// `GET /patients?site=&status=`
    async fn list_patients(&self, site: Site, status: PatientStatus)
        -> RemoteResult<Vec<Patient>>;

    /// `GET /patients/{id}`
    async fn get_patient(&self, patient_id: &str) -> RemoteResult<Patient>;

    /// `POST /patients`
    async fn create_patient(&self, payload: &NewPatient) -> RemoteResult<Patient>;

    /// `PUT /patients/{id}`
    async fn update_patient(&self, patient_id: &str, payload: &PatientUpdate)
        -> RemoteResult<Patient>;

    /// `DELETE /patients/{id}`
    async fn delete_patient(&self, patient_id: &str) -> RemoteResult<()>;

    /// `GET /schede-impianto-picc?patient_id=&site=`
    async fn list_records(&self, patient_id: &str, site: Site)
        -> RemoteResult<Vec<ClinicalRecord>>;

    /// `POST /schede-impianto-picc`
    async fn create_record(&self, payload: &NewRecordPayload) -> RemoteResult<ClinicalRecord>;

    /// `PUT /schede-impianto-picc/{id}`
    async fn update_record(
        &self,
        record_id: &str,
        payload: &RecordUpdatePayload,
    ) -> RemoteResult<ClinicalRecord>;

    /// `DELETE /schede-impianto-picc/{id}`
    async fn delete_record(&self, record_id: &str) -> RemoteResult<()>;

    /// `GET /schede-impianto-picc/{id}/pdf`
    async fn fetch_record_pdf(&self, record_id: &str) -> RemoteResult<Vec<u8>>;
}
