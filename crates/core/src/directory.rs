//! Site-scoped patient directory.
//!
//! Holds one collection per status, refreshed from the persistence service and replaced
//! all at once. Counts and filtered views are derived from the cached collections and
//! never trigger a remote call.

use crate::error::{CoreResult, ValidationError};
use crate::patient::{Patient, PatientStatus, PatientType, Site};
use crate::remote::PersistenceService;
use std::fmt;
use std::sync::Arc;

/// Aggregate counters shown on the dashboard.
///
/// `PICC_MED` patients are counted in both `picc_in_cura` and `med_in_cura`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatientCounts {
    pub in_cura: usize,
    pub dimesso: usize,
    pub sospeso: usize,
    pub picc_in_cura: usize,
    pub med_in_cura: usize,
}

/// Type filter for [`PatientDirectory::filter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TypeFilter {
    #[default]
    All,
    /// PICC and PICC_MED patients.
    Picc,
    /// MED and PICC_MED patients.
    Med,
    /// Only PICC_MED patients.
    PiccMed,
}

impl TypeFilter {
    pub fn matches(self, tipo: PatientType) -> bool {
        match self {
            Self::All => true,
            Self::Picc => tipo.has_picc(),
            Self::Med => tipo.has_med(),
            Self::PiccMed => tipo == PatientType::PiccMed,
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        PatientType::parse(s)
            .map(|tipo| match tipo {
                PatientType::Picc => Self::Picc,
                PatientType::Med => Self::Med,
                PatientType::PiccMed => Self::PiccMed,
            })
            .map_err(|_| ValidationError::InvalidField {
                field: "type_filter",
                reason: format!("unknown type filter '{s}' (expected all, PICC, MED or PICC_MED)"),
            })
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Picc => "PICC",
            Self::Med => "MED",
            Self::PiccMed => "PICC_MED",
        })
    }
}

#[derive(Clone, Debug, Default)]
struct Collections {
    in_cura: Vec<Patient>,
    dimesso: Vec<Patient>,
    sospeso: Vec<Patient>,
}

impl Collections {
    fn get(&self, status: PatientStatus) -> &[Patient] {
        match status {
            PatientStatus::InCura => &self.in_cura,
            PatientStatus::Dimesso => &self.dimesso,
            PatientStatus::Sospeso => &self.sospeso,
        }
    }
}

/// Cached, status-partitioned view of the patients at one site.
///
/// The directory is the only owner of its collections. Mutating operations elsewhere
/// call [`PatientDirectory::refresh`] after they succeed.
pub struct PatientDirectory {
    remote: Arc<dyn PersistenceService>,
    site: Site,
    collections: Collections,
}

impl PatientDirectory {
    /// Creates an empty directory. Call [`refresh`](Self::refresh) to populate it.
    pub fn new(remote: Arc<dyn PersistenceService>, site: Site) -> Self {
        Self {
            remote,
            site,
            collections: Collections::default(),
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    /// Re-fetches all three status collections concurrently.
    ///
    /// The collections are replaced only if every fetch succeeds; on any failure the
    /// previous contents are kept and the error is returned.
    pub async fn refresh(&mut self) -> CoreResult<()> {
        let remote = &self.remote;
        let site = self.site;
        let (in_cura, dimesso, sospeso) = tokio::try_join!(
            remote.list_patients(site, PatientStatus::InCura),
            remote.list_patients(site, PatientStatus::Dimesso),
            remote.list_patients(site, PatientStatus::Sospeso),
        )?;

        self.collections = Collections {
            in_cura: Self::keep_matching(in_cura, PatientStatus::InCura),
            dimesso: Self::keep_matching(dimesso, PatientStatus::Dimesso),
            sospeso: Self::keep_matching(sospeso, PatientStatus::Sospeso),
        };
        tracing::debug!(site = %site, counts = ?self.counts(), "patient directory refreshed");
        Ok(())
    }

    /// Keeps the collections disjoint even if the service returns a stray patient.
    fn keep_matching(patients: Vec<Patient>, status: PatientStatus) -> Vec<Patient> {
        patients
            .into_iter()
            .filter(|p| {
                let ok = p.status == status;
                if !ok {
                    tracing::warn!(
                        patient_id = %p.id,
                        expected = %status,
                        actual = %p.status,
                        "dropping patient listed under the wrong status"
                    );
                }
                ok
            })
            .collect()
    }

    pub fn counts(&self) -> PatientCounts {
        let in_cura = &self.collections.in_cura;
        PatientCounts {
            in_cura: in_cura.len(),
            dimesso: self.collections.dimesso.len(),
            sospeso: self.collections.sospeso.len(),
            picc_in_cura: in_cura.iter().filter(|p| p.tipo.has_picc()).count(),
            med_in_cura: in_cura.iter().filter(|p| p.tipo.has_med()).count(),
        }
    }

    pub fn patients(&self, status: PatientStatus) -> &[Patient] {
        self.collections.get(status)
    }

    /// Patients in `status` matching both the search text and the type filter.
    ///
    /// `search` is matched case-insensitively as a substring of `nome` or `cognome`,
    /// exactly as typed; only the empty string matches everyone.
    pub fn filter(
        &self,
        status: PatientStatus,
        search: &str,
        types: TypeFilter,
    ) -> Vec<&Patient> {
        let needle = search.to_lowercase();
        self.collections
            .get(status)
            .iter()
            .filter(|p| types.matches(p.tipo))
            .filter(|p| {
                needle.is_empty()
                    || p.nome.to_lowercase().contains(&needle)
                    || p.cognome.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Looks up a cached patient by id in any collection.
    pub fn find(&self, patient_id: &str) -> Option<&Patient> {
        PatientStatus::ALL
            .into_iter()
            .flat_map(|status| self.collections.get(status))
            .find(|p| p.id == patient_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::patient::PatientDetails;
    use crate::remote::testing::InMemoryService;

    fn patient(
        id: &str,
        nome: &str,
        cognome: &str,
        tipo: PatientType,
        status: PatientStatus,
    ) -> Patient {
        Patient {
            id: id.into(),
            nome: nome.into(),
            cognome: cognome.into(),
            tipo,
            site: Site::PtaCentro,
            status,
            discharge_reason: None,
            discharge_notes: None,
            suspend_notes: None,
            details: PatientDetails::default(),
            created_at: None,
            updated_at: None,
        }
    }

    fn sample() -> Vec<Patient> {
        use PatientStatus::*;
        use PatientType::*;
        let mut other_site = patient("x", "Anna", "Rossini", Picc, InCura);
        other_site.site = Site::VillaGinestre;
        vec![
            patient("1", "Mario", "Rossi", Picc, InCura),
            patient("2", "Rosa", "Verdi", Med, InCura),
            patient("3", "Luca", "Bianchi", PiccMed, InCura),
            patient("4", "Carla", "Neri", Med, Dimesso),
            patient("5", "Gino", "Ambrosio", Picc, Sospeso),
            other_site,
        ]
    }

    async fn loaded() -> (Arc<InMemoryService>, PatientDirectory) {
        let remote = Arc::new(InMemoryService::with_patients(sample()));
        let mut directory = PatientDirectory::new(remote.clone(), Site::PtaCentro);
        directory.refresh().await.expect("refresh");
        (remote, directory)
    }

    #[tokio::test]
    async fn counts_include_dual_tag_in_both_subtotals() {
        let (_, directory) = loaded().await;
        assert_eq!(
            directory.counts(),
            PatientCounts {
                in_cura: 3,
                dimesso: 1,
                sospeso: 1,
                picc_in_cura: 2,
                med_in_cura: 2,
            }
        );
    }

    #[tokio::test]
    async fn refresh_issues_one_fetch_per_status() {
        let (remote, _) = loaded().await;
        assert_eq!(remote.log(), vec!["list_patients"; 3]);
    }

    #[tokio::test]
    async fn type_filter_uses_dual_inclusion() {
        let (_, directory) = loaded().await;
        let ids = |v: Vec<&Patient>| v.into_iter().map(|p| p.id.clone()).collect::<Vec<_>>();

        assert_eq!(
            ids(directory.filter(PatientStatus::InCura, "", TypeFilter::Picc)),
            vec!["1", "3"]
        );
        assert_eq!(
            ids(directory.filter(PatientStatus::InCura, "", TypeFilter::Med)),
            vec!["2", "3"]
        );
        assert_eq!(
            ids(directory.filter(PatientStatus::InCura, "", TypeFilter::PiccMed)),
            vec!["3"]
        );
        assert_eq!(directory.filter(PatientStatus::InCura, "", TypeFilter::All).len(), 3);
    }

    #[tokio::test]
    async fn search_matches_either_name_case_insensitively() {
        let (_, directory) = loaded().await;
        let found = directory.filter(PatientStatus::InCura, "ROS", TypeFilter::All);
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        assert!(directory
            .filter(PatientStatus::Sospeso, "ros", TypeFilter::All)
            .iter()
            .all(|p| p.cognome.to_lowercase().contains("ros")));
    }

    #[tokio::test]
    async fn search_text_is_matched_as_typed() {
        let (_, directory) = loaded().await;
        assert!(directory
            .filter(PatientStatus::InCura, " ", TypeFilter::All)
            .is_empty());
        assert!(directory
            .filter(PatientStatus::InCura, "ros ", TypeFilter::All)
            .is_empty());
        assert_eq!(
            directory.filter(PatientStatus::InCura, "", TypeFilter::All).len(),
            3
        );
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_collections() {
        let (remote, mut directory) = loaded().await;
        remote.fail("list_patients", 1);

        let err = directory.refresh().await.unwrap_err();
        assert!(matches!(err, CoreError::Remote(_)));
        assert_eq!(directory.counts().in_cura, 3);
        assert!(directory.find("4").is_some());
    }

    #[test]
    fn type_filter_parses_all_and_type_tags() {
        assert_eq!(TypeFilter::parse("all").unwrap(), TypeFilter::All);
        assert_eq!(TypeFilter::parse("picc_med").unwrap(), TypeFilter::PiccMed);
        assert!(TypeFilter::parse("port").is_err());
    }
}
