//! Patient service facade.
//!
//! [`PatientService`] wires the directory, the transition engine and the record
//! repository to one persistence service and one site. It is the entry point used by
//! the command line and by anything else presenting patients to a user.
//!
//! Every operation that changes a patient is followed by a directory refresh, so the
//! counts and lists reflect the service and never an optimistic local guess.

use crate::config::CoreConfig;
use crate::directory::{PatientCounts, PatientDirectory, TypeFilter};
use crate::error::{CoreResult, ValidationError};
use crate::patient::{NewPatient, Patient, PatientEdit, PatientStatus, Site};
use crate::remote::{PatientUpdate, PersistenceService};
use crate::repository::RecordRepository;
use crate::transition::{StatusTransitionEngine, TransitionRequest};
use std::sync::Arc;

/// Facade over patient and implant-record operations at one site.
pub struct PatientService {
    remote: Arc<dyn PersistenceService>,
    site: Site,
    directory: PatientDirectory,
    engine: StatusTransitionEngine,
    records: RecordRepository,
}

impl PatientService {
    /// Creates a service for the site in `cfg`.
    ///
    /// The directory starts empty; call [`refresh`](Self::refresh) before reading it.
    pub fn new(cfg: &CoreConfig, remote: Arc<dyn PersistenceService>) -> Self {
        let site = cfg.site();
        Self {
            directory: PatientDirectory::new(remote.clone(), site),
            engine: StatusTransitionEngine::new(remote.clone()),
            records: RecordRepository::new(remote.clone(), site),
            remote,
            site,
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn directory(&self) -> &PatientDirectory {
        &self.directory
    }

    pub fn records(&self) -> &RecordRepository {
        &self.records
    }

    /// Reloads every status collection of the directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Remote`] if any of the fetches fails. The directory
    /// then still holds the result of the previous successful refresh.
    pub async fn refresh(&mut self) -> CoreResult<()> {
        self.directory.refresh().await
    }

    pub fn counts(&self) -> PatientCounts {
        self.directory.counts()
    }

    pub fn filter(
        &self,
        status: PatientStatus,
        search: &str,
        types: TypeFilter,
    ) -> Vec<&Patient> {
        self.directory.filter(status, search, types)
    }

    /// Statuses a patient may be moved to.
    pub fn offered_targets(&self, patient: &Patient) -> Vec<PatientStatus> {
        StatusTransitionEngine::offered_targets(patient.status)
    }

    /// Fetches a single patient, bypassing the directory cache.
    pub async fn get_patient(&self, patient_id: &str) -> CoreResult<Patient> {
        Ok(self.remote.get_patient(patient_id).await?)
    }

    /// Creates a patient at this site. New patients start `in_cura`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidField`] if `payload` was built for another
    /// site, or a remote error if the call or the following refresh fails.
    pub async fn create_patient(&mut self, payload: NewPatient) -> CoreResult<Patient> {
        if payload.site() != self.site {
            return Err(ValidationError::InvalidField {
                field: "site",
                reason: format!(
                    "patient is for site {} but this service works on {}",
                    payload.site(),
                    self.site
                ),
            }
            .into());
        }

        let created = self.remote.create_patient(&payload).await?;
        tracing::info!(patient_id = %created.id, tipo = %created.tipo, "patient created");
        self.directory.refresh().await?;
        Ok(created)
    }

    /// Applies a field edit. Status fields cannot be changed this way.
    pub async fn edit_patient(
        &mut self,
        patient: &Patient,
        edit: PatientEdit,
    ) -> CoreResult<Patient> {
        let edit = edit.validate(patient.site)?;
        let updated = self
            .remote
            .update_patient(&patient.id, &PatientUpdate::Fields(edit))
            .await?;
        tracing::info!(patient_id = %patient.id, "patient details updated");
        self.directory.refresh().await?;
        Ok(updated)
    }

    /// Permanently deletes a patient, whatever its status.
    pub async fn delete_patient(&mut self, patient_id: &str) -> CoreResult<()> {
        self.remote.delete_patient(patient_id).await?;
        tracing::info!(patient_id = %patient_id, "patient deleted");
        self.directory.refresh().await
    }

    /// Validates and applies a status transition, then refreshes the directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Validation`] without contacting the service when the
    /// request is missing data its target requires.
    pub async fn change_status(
        &mut self,
        patient: &Patient,
        request: &TransitionRequest,
    ) -> CoreResult<Patient> {
        self.engine
            .execute(patient, request, &mut self.directory)
            .await
    }
}
