//! Implant record repository.
//!
//! Each operation is a single remote call preceded by local validation. Nothing is
//! cached here; callers re-list a patient's records after a change.

use crate::error::{CoreError, CoreResult};
use crate::patient::Site;
use crate::record::{ClinicalRecord, NewRecordPayload, PdfDocument, RecordUpdatePayload};
use crate::remote::PersistenceService;
use crate::schema::{ensure_exportable, validate_record, RecordDraft, SchedaType};
use std::sync::Arc;

pub struct RecordRepository {
    remote: Arc<dyn PersistenceService>,
    site: Site,
}

impl RecordRepository {
    pub fn new(remote: Arc<dyn PersistenceService>, site: Site) -> Self {
        Self { remote, site }
    }

    /// Records of a patient at this site, most recent implant first.
    ///
    /// Records without an implant date sort last.
    pub async fn list_for_patient(&self, patient_id: &str) -> CoreResult<Vec<ClinicalRecord>> {
        let mut records = self.remote.list_records(patient_id, self.site).await?;
        // ISO dates compare correctly as strings.
        records.sort_by(|a, b| b.data_impianto().cmp(&a.data_impianto()));
        Ok(records)
    }

    /// Validates `draft` as a `scheda_type` record and creates it.
    ///
    /// The variant chosen here is permanent for the record.
    pub async fn create(
        &self,
        patient_id: &str,
        scheda_type: SchedaType,
        draft: RecordDraft,
    ) -> CoreResult<ClinicalRecord> {
        let record = validate_record(scheda_type, &draft).map_err(CoreError::RecordInvalid)?;
        let payload = NewRecordPayload {
            patient_id: patient_id.to_string(),
            site: self.site,
            scheda_type,
            record,
        };

        let created = self.remote.create_record(&payload).await?;
        tracing::info!(
            record_id = %created.id,
            patient_id = %patient_id,
            scheda_type = %scheda_type,
            "implant record created"
        );
        Ok(created)
    }

    /// Validates `draft` against the stored record's variant and updates it.
    ///
    /// The variant always comes from `existing`; the update body never carries it.
    /// `draft` replaces the variant fields: a field missing from it is cleared.
    pub async fn update(
        &self,
        existing: &ClinicalRecord,
        draft: RecordDraft,
    ) -> CoreResult<ClinicalRecord> {
        let record =
            validate_record(existing.scheda_type, &draft).map_err(CoreError::RecordInvalid)?;

        let updated = self
            .remote
            .update_record(&existing.id, &RecordUpdatePayload { record })
            .await?;
        tracing::info!(record_id = %existing.id, "implant record updated");
        Ok(updated)
    }

    pub async fn delete(&self, record_id: &str) -> CoreResult<()> {
        self.remote.delete_record(record_id).await?;
        tracing::info!(record_id = %record_id, "implant record deleted");
        Ok(())
    }

    /// Downloads the printable PDF of a complete record.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ExportIneligible`] for simplified records, without
    /// contacting the service.
    pub async fn export_pdf(&self, record: &ClinicalRecord) -> CoreResult<PdfDocument> {
        ensure_exportable(record)?;
        let bytes = self.remote.fetch_record_pdf(&record.id).await?;
        Ok(PdfDocument::from_download(record, bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldErrorKind;
    use crate::remote::testing::InMemoryService;
    use serde_json::{json, Map, Value};

    fn stored(id: &str, scheda_type: SchedaType, date: Option<&str>) -> ClinicalRecord {
        let mut fields = Map::new();
        if let Some(date) = date {
            fields.insert("data_impianto".into(), Value::from(date));
        }
        fields.insert("tipo_catetere".into(), json!("picc"));
        ClinicalRecord {
            id: id.into(),
            patient_id: "p-1".into(),
            site: Site::PtaCentro,
            scheda_type,
            created_at: None,
            fields,
        }
    }

    fn simplified_draft() -> RecordDraft {
        RecordDraft::new()
            .with("data_impianto", "2024-03-10")
            .with("tipo_catetere", "midline")
            .with("braccio", "dx")
            .with("vena", "basilica")
            .with("tunnelizzazione", true)
            .with("tunnelizzazione_note", "2cm")
    }

    fn repository() -> (Arc<InMemoryService>, RecordRepository) {
        let remote = Arc::new(InMemoryService::new());
        let repository = RecordRepository::new(remote.clone(), Site::PtaCentro);
        (remote, repository)
    }

    #[tokio::test]
    async fn create_sends_variant_with_validated_fields() {
        let (remote, repository) = repository();
        let created = repository
            .create("p-1", SchedaType::Semplificata, simplified_draft())
            .await
            .unwrap();

        assert_eq!(created.scheda_type, SchedaType::Semplificata);
        assert_eq!(created.patient_id, "p-1");
        assert_eq!(created.field("tunnelizzazione_note"), Some(&json!("2cm")));
        assert_eq!(remote.log(), vec!["create_record"]);
    }

    #[tokio::test]
    async fn invalid_draft_is_rejected_locally() {
        let (remote, repository) = repository();
        let draft = simplified_draft().with("tunnelizzazione_note", "troppo lunga");

        let err = repository
            .create("p-1", SchedaType::Semplificata, draft)
            .await
            .unwrap_err();

        match err {
            CoreError::RecordInvalid(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(errors[0].kind, FieldErrorKind::TooLong { max: 6, .. }));
            }
            other => panic!("expected record validation error, got {other:?}"),
        }
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn update_keeps_the_stored_variant() {
        let (remote, repository) = repository();
        let created = repository
            .create("p-1", SchedaType::Semplificata, simplified_draft())
            .await
            .unwrap();

        let mut draft = RecordDraft::from_record(&created);
        draft.set("vena", "cefalica");
        draft.set("scheda_type", "completa");
        let updated = repository.update(&created, draft).await.unwrap();

        assert_eq!(updated.scheda_type, SchedaType::Semplificata);
        assert_eq!(updated.field("vena"), Some(&json!("cefalica")));
        assert_eq!(
            remote.record(&created.id).map(|r| r.scheda_type),
            Some(SchedaType::Semplificata)
        );
    }

    #[tokio::test]
    async fn cleared_field_is_removed_on_update() {
        let (remote, repository) = repository();
        let created = repository
            .create(
                "p-1",
                SchedaType::Semplificata,
                simplified_draft().with("operatore", "Neri"),
            )
            .await
            .unwrap();

        let mut draft = RecordDraft::from_record(&created);
        draft.remove("operatore");
        let updated = repository.update(&created, draft).await.unwrap();

        assert!(updated.field("operatore").is_none());
        let stored = remote.record(&created.id).unwrap();
        assert!(stored.field("operatore").is_none());
        assert_eq!(stored.field("vena"), Some(&json!("basilica")));
    }

    #[tokio::test]
    async fn untunnelized_record_stays_editable() {
        let (remote, repository) = repository();
        let created = repository
            .create("p-1", SchedaType::Semplificata, simplified_draft())
            .await
            .unwrap();

        let mut draft = RecordDraft::from_record(&created);
        draft.set("tunnelizzazione", false);
        draft.remove("tunnelizzazione_note");
        let untunnelized = repository.update(&created, draft).await.unwrap();
        assert_eq!(untunnelized.field("tunnelizzazione"), Some(&json!(false)));
        assert!(untunnelized.field("tunnelizzazione_note").is_none());

        let mut draft = RecordDraft::from_record(&untunnelized);
        draft.set("operatore", "Neri");
        let edited = repository.update(&untunnelized, draft).await.unwrap();
        assert_eq!(edited.field("operatore"), Some(&json!("Neri")));
        assert!(remote
            .record(&created.id)
            .unwrap()
            .field("tunnelizzazione_note")
            .is_none());
    }

    #[tokio::test]
    async fn stale_note_without_flag_is_dropped_on_edit() {
        let (remote, repository) = repository();
        let mut existing = stored("r-1", SchedaType::Semplificata, Some("2024-01-01"));
        existing.fields.insert("braccio".into(), json!("sn"));
        existing.fields.insert("vena".into(), json!("cefalica"));
        existing.fields.insert("tunnelizzazione".into(), json!(false));
        existing.fields.insert("tunnelizzazione_note".into(), json!("2cm"));
        remote.insert_record(existing.clone());

        let draft = RecordDraft::from_record(&existing);
        assert!(draft.get("tunnelizzazione_note").is_none());
        let updated = repository.update(&existing, draft).await.unwrap();
        assert!(updated.field("tunnelizzazione_note").is_none());
    }

    #[tokio::test]
    async fn update_rejects_fields_of_the_other_variant() {
        let (remote, repository) = repository();
        let existing = stored("r-1", SchedaType::Semplificata, Some("2024-01-01"));
        remote.insert_record(existing.clone());

        let draft = simplified_draft().with("sede", "braccio");
        let err = repository.update(&existing, draft).await.unwrap_err();
        assert!(matches!(err, CoreError::RecordInvalid(_)));
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn simplified_export_fails_without_remote_call() {
        let (remote, repository) = repository();
        let record = stored("r-1", SchedaType::Semplificata, Some("2024-01-01"));
        remote.insert_record(record.clone());

        let err = repository.export_pdf(&record).await.unwrap_err();
        assert!(matches!(err, CoreError::ExportIneligible(_)));
        assert!(err.is_local());
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn complete_export_downloads_pdf() {
        let (remote, repository) = repository();
        let record = stored("r-2", SchedaType::Completa, Some("2024-05-06"));
        remote.insert_record(record.clone());

        let pdf = repository.export_pdf(&record).await.unwrap();
        assert_eq!(pdf.filename, "scheda_impianto_2024-05-06.pdf");
        assert!(pdf.bytes.starts_with(b"%PDF-"));
        assert_eq!(remote.log(), vec!["fetch_record_pdf"]);
    }

    #[tokio::test]
    async fn list_orders_newest_implant_first() {
        let (remote, repository) = repository();
        remote.insert_record(stored("old", SchedaType::Completa, Some("2023-11-30")));
        remote.insert_record(stored("undated", SchedaType::Completa, None));
        remote.insert_record(stored("new", SchedaType::Semplificata, Some("2024-02-01")));

        let ids: Vec<_> = repository
            .list_for_patient("p-1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);
    }

    #[tokio::test]
    async fn delete_failure_is_a_remote_error() {
        let (remote, repository) = repository();
        remote.insert_record(stored("r-1", SchedaType::Completa, Some("2024-01-01")));
        remote.fail("delete_record", 1);

        let err = repository.delete("r-1").await.unwrap_err();
        assert!(matches!(err, CoreError::Remote(_)));
        assert!(remote.record("r-1").is_some());

        repository.delete("r-1").await.unwrap();
        assert!(remote.record("r-1").is_none());
    }
}
