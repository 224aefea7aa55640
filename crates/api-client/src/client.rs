//! reqwest implementation of [`PersistenceService`].

use crate::config::RemoteConfig;
use crate::{ClientError, ClientResult};
use amb_core::constants::{IMPLANT_RECORDS_RESOURCE, PATIENTS_RESOURCE};
use amb_core::remote::RemoteResult;
use amb_core::{
    ClinicalRecord, NewPatient, NewRecordPayload, Patient, PatientStatus, PatientUpdate,
    PersistenceService, RecordUpdatePayload, RemoteCallError, Site,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Persistence service reached over HTTP.
///
/// Every trait method maps to exactly one request. Non-2xx responses become
/// [`RemoteCallError`]s carrying the status and, when the service sends one, the
/// `detail` message of its error body.
#[derive(Clone, Debug)]
pub struct HttpPersistenceService {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpPersistenceService {
    pub fn new(cfg: &RemoteConfig) -> ClientResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = cfg.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url: cfg.base_url().clone(),
            api_token: cfg.api_token().map(str::to_string),
        })
    }

    /// `{base}/{segments...}`, each segment percent-encoded.
    fn url(&self, operation: &'static str, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteCallError::new(operation, "base URL cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> RemoteResult<Response> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "persistence service unreachable");
            RemoteCallError::new(operation, e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(operation, status = status.as_u16(), "persistence call succeeded");
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = error_message(status, &body);
        tracing::warn!(
            operation,
            status = status.as_u16(),
            message = %message,
            "persistence service rejected request"
        );
        Err(RemoteCallError::new(operation, message).with_status(status.as_u16()))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> RemoteResult<T> {
        let response = self.send(operation, request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteCallError::new(operation, e.to_string()))?;
        decode_body(operation, &body)
    }
}

/// Decodes a JSON response body, naming the offending path on mismatch.
pub(crate) fn decode_body<T: DeserializeOwned>(
    operation: &'static str,
    body: &[u8],
) -> RemoteResult<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        RemoteCallError::new(
            operation,
            format!("unexpected response at {path}: {}", err.into_inner()),
        )
    })
}

/// Error body shape of the persistence service: `{"detail": ...}` where `detail` is a
/// message or a list of field validation entries.
#[derive(Deserialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Entries(Vec<ErrorEntry>),
}

#[derive(Deserialize)]
struct ErrorEntry {
    msg: String,
    #[serde(default)]
    loc: Vec<serde_json::Value>,
}

pub(crate) fn error_message(status: StatusCode, body: &[u8]) -> String {
    let detail = serde_json::from_slice::<ErrorBody>(body).ok().map(|b| match b.detail {
        ErrorDetail::Message(msg) => msg,
        ErrorDetail::Entries(entries) => entries
            .into_iter()
            .map(|entry| {
                let loc = entry
                    .loc
                    .iter()
                    .map(|part| match part {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                if loc.is_empty() {
                    entry.msg
                } else {
                    format!("{loc}: {}", entry.msg)
                }
            })
            .collect::<Vec<_>>()
            .join("; "),
    });

    detail.unwrap_or_else(|| match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    })
}

#[async_trait]
impl PersistenceService for HttpPersistenceService {
    async fn list_patients(
        &self,
        site: Site,
        status: PatientStatus,
    ) -> RemoteResult<Vec<Patient>> {
        const OP: &str = "list patients";
        let mut url = self.url(OP, &[PATIENTS_RESOURCE])?;
        url.query_pairs_mut()
            .append_pair("site", site.as_str())
            .append_pair("status", status.as_str());
        self.send_json(OP, self.request(Method::GET, url)).await
    }

    async fn get_patient(&self, patient_id: &str) -> RemoteResult<Patient> {
        const OP: &str = "get patient";
        let url = self.url(OP, &[PATIENTS_RESOURCE, patient_id])?;
        self.send_json(OP, self.request(Method::GET, url)).await
    }

    async fn create_patient(&self, payload: &NewPatient) -> RemoteResult<Patient> {
        const OP: &str = "create patient";
        let url = self.url(OP, &[PATIENTS_RESOURCE])?;
        self.send_json(OP, self.request(Method::POST, url).json(payload))
            .await
    }

    async fn update_patient(
        &self,
        patient_id: &str,
        payload: &PatientUpdate,
    ) -> RemoteResult<Patient> {
        const OP: &str = "update patient";
        let url = self.url(OP, &[PATIENTS_RESOURCE, patient_id])?;
        self.send_json(OP, self.request(Method::PUT, url).json(payload))
            .await
    }

    async fn delete_patient(&self, patient_id: &str) -> RemoteResult<()> {
        const OP: &str = "delete patient";
        let url = self.url(OP, &[PATIENTS_RESOURCE, patient_id])?;
        self.send(OP, self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn list_records(
        &self,
        patient_id: &str,
        site: Site,
    ) -> RemoteResult<Vec<ClinicalRecord>> {
        const OP: &str = "list records";
        let mut url = self.url(OP, &[IMPLANT_RECORDS_RESOURCE])?;
        url.query_pairs_mut()
            .append_pair("patient_id", patient_id)
            .append_pair("site", site.as_str());
        self.send_json(OP, self.request(Method::GET, url)).await
    }

    async fn create_record(&self, payload: &NewRecordPayload) -> RemoteResult<ClinicalRecord> {
        const OP: &str = "create record";
        let url = self.url(OP, &[IMPLANT_RECORDS_RESOURCE])?;
        self.send_json(OP, self.request(Method::POST, url).json(payload))
            .await
    }

    async fn update_record(
        &self,
        record_id: &str,
        payload: &RecordUpdatePayload,
    ) -> RemoteResult<ClinicalRecord> {
        const OP: &str = "update record";
        let url = self.url(OP, &[IMPLANT_RECORDS_RESOURCE, record_id])?;
        self.send_json(OP, self.request(Method::PUT, url).json(payload))
            .await
    }

    async fn delete_record(&self, record_id: &str) -> RemoteResult<()> {
        const OP: &str = "delete record";
        let url = self.url(OP, &[IMPLANT_RECORDS_RESOURCE, record_id])?;
        self.send(OP, self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn fetch_record_pdf(&self, record_id: &str) -> RemoteResult<Vec<u8>> {
        const OP: &str = "fetch record pdf";
        let url = self.url(OP, &[IMPLANT_RECORDS_RESOURCE, record_id, "pdf"])?;
        let response = self.send(OP, self.request(Method::GET, url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteCallError::new(OP, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
