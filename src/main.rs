use amb_core::config::site_from_env_value;
use amb_core::{
    ClinicalRecord, CoreConfig, CoreError, DetailChange, DischargeReason, NewPatient, Patient,
    PatientDetails, PatientDetailsEdit, PatientEdit, PatientService, PatientStatus, PatientType,
    RecordDraft, SchedaType, TransitionRequest, TypeFilter,
};
use anyhow::{anyhow, Context};
use api_client::{
    base_url_from_env_value, timeout_from_env_value, HttpPersistenceService, RemoteConfig,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ambulatorio")]
#[command(about = "Patient status and implant record client for the ambulatorio service")]
struct Cli {
    /// Clinical site to work on (overrides AMB_SITE)
    #[arg(long, global = true)]
    site: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patient directory and status lifecycle
    #[command(subcommand)]
    Patients(PatientCommands),
    /// Catheter implant records
    #[command(subcommand)]
    Records(RecordCommands),
}

#[derive(Subcommand)]
enum PatientCommands {
    /// List patients in one status
    List {
        #[arg(long, default_value = "in_cura")]
        status: String,
        /// Case-insensitive match on first or last name
        #[arg(long, default_value = "")]
        search: String,
        /// all, PICC, MED or PICC_MED
        #[arg(long = "type", default_value = "all")]
        type_filter: String,
    },
    /// Show dashboard counters
    Counts,
    /// Show one patient
    Show { id: String },
    /// Create a patient (starts in_cura)
    Create {
        #[arg(long)]
        nome: String,
        #[arg(long)]
        cognome: String,
        /// PICC, MED or PICC_MED
        #[arg(long)]
        tipo: String,
        #[command(flatten)]
        details: DetailArgs,
    },
    /// Edit patient details. An empty detail value (e.g. --telefono "") clears it
    Edit {
        id: String,
        #[arg(long)]
        nome: Option<String>,
        #[arg(long)]
        cognome: Option<String>,
        #[arg(long)]
        tipo: Option<String>,
        #[command(flatten)]
        details: DetailArgs,
    },
    /// Permanently delete a patient
    Delete { id: String },
    /// Change a patient's status
    Transition {
        id: String,
        /// in_cura, dimesso or sospeso
        #[arg(long)]
        to: String,
        /// guarito, adi or altro (discharge only)
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List the statuses a patient can be moved to
    Targets { id: String },
}

#[derive(Args)]
struct DetailArgs {
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    data_nascita: Option<String>,
    #[arg(long)]
    codice_fiscale: Option<String>,
    #[arg(long)]
    telefono: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    medico_base: Option<String>,
    #[arg(long)]
    anamnesi: Option<String>,
    #[arg(long)]
    terapia_in_atto: Option<String>,
    #[arg(long)]
    allergie: Option<String>,
}

impl From<DetailArgs> for PatientDetails {
    fn from(args: DetailArgs) -> Self {
        Self {
            data_nascita: args.data_nascita,
            codice_fiscale: args.codice_fiscale,
            telefono: args.telefono,
            email: args.email,
            medico_base: args.medico_base,
            anamnesi: args.anamnesi,
            terapia_in_atto: args.terapia_in_atto,
            allergie: args.allergie,
        }
    }
}

impl From<DetailArgs> for PatientDetailsEdit {
    fn from(args: DetailArgs) -> Self {
        let change = |v: Option<String>| v.map(DetailChange::from_input);
        Self {
            data_nascita: change(args.data_nascita),
            codice_fiscale: change(args.codice_fiscale),
            telefono: change(args.telefono),
            email: change(args.email),
            medico_base: change(args.medico_base),
            anamnesi: change(args.anamnesi),
            terapia_in_atto: change(args.terapia_in_atto),
            allergie: change(args.allergie),
        }
    }
}

#[derive(Subcommand)]
enum RecordCommands {
    /// List a patient's implant records, newest first
    List { patient_id: String },
    /// Create an implant record
    Create {
        patient_id: String,
        /// semplificata or completa (cannot be changed later)
        #[arg(long)]
        variant: String,
        /// Fields as key=value (true/false for flags)
        fields: Vec<String>,
    },
    /// Update fields of an implant record
    Update {
        patient_id: String,
        record_id: String,
        /// Fields as key=value; key= clears a field
        fields: Vec<String>,
    },
    /// Permanently delete an implant record
    Delete { record_id: String },
    /// Download the PDF of a complete implant record
    Pdf {
        patient_id: String,
        record_id: String,
        /// Output file (defaults to the suggested file name)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Entry point for the ambulatorio command line client.
///
/// # Environment Variables
/// - `AMB_API_URL`: persistence service base URL (default: "http://localhost:8001/api")
/// - `AMB_SITE`: clinical site (default: "pta_centro")
/// - `AMB_API_TOKEN`: bearer token sent with every call (optional)
/// - `AMB_TIMEOUT_SECS`: per-request timeout in seconds (optional)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ambulatorio=info".parse()?)
                .add_directive("amb_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<CoreError>() {
            Some(core) => {
                tracing::debug!(error = %core, "operation failed");
                eprintln!("{}", core.user_message());
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let site = site_from_env_value(cli.site.or_else(|| std::env::var("AMB_SITE").ok()))?;
    let cfg = CoreConfig::new(site);

    let remote_cfg = RemoteConfig::new(
        &base_url_from_env_value(std::env::var("AMB_API_URL").ok()),
        std::env::var("AMB_API_TOKEN").ok(),
        timeout_from_env_value(std::env::var("AMB_TIMEOUT_SECS").ok())?,
    )?;
    let remote = Arc::new(HttpPersistenceService::new(&remote_cfg)?);
    tracing::debug!(site = %site, base_url = %remote_cfg.base_url(), "client configured");

    let mut service = PatientService::new(&cfg, remote);

    match cli.command {
        Commands::Patients(command) => patients(&mut service, command).await,
        Commands::Records(command) => records(&service, command).await,
    }
}

async fn patients(service: &mut PatientService, command: PatientCommands) -> anyhow::Result<()> {
    match command {
        PatientCommands::List {
            status,
            search,
            type_filter,
        } => {
            let status = PatientStatus::parse(&status).map_err(CoreError::from)?;
            let types = TypeFilter::parse(&type_filter).map_err(CoreError::from)?;
            service.refresh().await?;
            let found = service.filter(status, &search, types);
            if found.is_empty() {
                println!("No patients found.");
            }
            for patient in found {
                print_patient_line(patient);
            }
        }
        PatientCommands::Counts => {
            service.refresh().await?;
            let counts = service.counts();
            println!("Site: {}", service.site());
            println!(
                "In cura:   {} (PICC {}, MED {})",
                counts.in_cura, counts.picc_in_cura, counts.med_in_cura
            );
            println!("Dimessi:   {}", counts.dimesso);
            println!("Sospesi:   {}", counts.sospeso);
        }
        PatientCommands::Show { id } => {
            let patient = service.get_patient(&id).await?;
            print_patient(&patient);
        }
        PatientCommands::Create {
            nome,
            cognome,
            tipo,
            details,
        } => {
            let tipo = PatientType::parse(&tipo).map_err(CoreError::from)?;
            let payload =
                NewPatient::new(nome, cognome, tipo, service.site())?.with_details(details.into());
            let created = service.create_patient(payload).await?;
            println!("Created patient {} ({})", created.display_name(), created.id);
        }
        PatientCommands::Edit {
            id,
            nome,
            cognome,
            tipo,
            details,
        } => {
            let tipo = tipo
                .map(|t| PatientType::parse(&t))
                .transpose()
                .map_err(CoreError::from)?;
            let patient = service.get_patient(&id).await?;
            let edit = PatientEdit {
                nome,
                cognome,
                tipo,
                details: details.into(),
            };
            let updated = service.edit_patient(&patient, edit).await?;
            print_patient(&updated);
        }
        PatientCommands::Delete { id } => {
            service.delete_patient(&id).await?;
            println!("Deleted patient {id}");
        }
        PatientCommands::Transition {
            id,
            to,
            reason,
            notes,
        } => {
            let request = TransitionRequest {
                target: PatientStatus::parse(&to).map_err(CoreError::from)?,
                reason: reason
                    .map(|r| DischargeReason::parse(&r))
                    .transpose()
                    .map_err(CoreError::from)?,
                notes,
            };
            let patient = service.get_patient(&id).await?;
            let updated = service.change_status(&patient, &request).await?;
            println!(
                "{}: {} -> {}",
                updated.display_name(),
                patient.status,
                updated.status
            );
        }
        PatientCommands::Targets { id } => {
            let patient = service.get_patient(&id).await?;
            for target in service.offered_targets(&patient) {
                println!("{target}");
            }
        }
    }
    Ok(())
}

async fn records(service: &PatientService, command: RecordCommands) -> anyhow::Result<()> {
    let repository = service.records();
    match command {
        RecordCommands::List { patient_id } => {
            let records = repository.list_for_patient(&patient_id).await?;
            if records.is_empty() {
                println!("No implant records found.");
            }
            for record in &records {
                println!(
                    "{}  {}  {}  {}",
                    record.id,
                    record.data_impianto().unwrap_or("-"),
                    record.scheda_type,
                    record
                        .field("tipo_catetere")
                        .and_then(Value::as_str)
                        .unwrap_or("-")
                );
            }
        }
        RecordCommands::Create {
            patient_id,
            variant,
            fields,
        } => {
            let scheda_type = SchedaType::parse(&variant).ok_or_else(|| {
                anyhow!("unknown record variant '{variant}' (expected semplificata or completa)")
            })?;
            let draft = apply_assignments(RecordDraft::new(), &fields)?;
            let created = repository.create(&patient_id, scheda_type, draft).await?;
            println!("Created {} record {}", created.scheda_type, created.id);
        }
        RecordCommands::Update {
            patient_id,
            record_id,
            fields,
        } => {
            let existing = find_record(service, &patient_id, &record_id).await?;
            let draft = apply_assignments(RecordDraft::from_record(&existing), &fields)?;
            let updated = repository.update(&existing, draft).await?;
            println!("Updated {} record {}", updated.scheda_type, updated.id);
        }
        RecordCommands::Delete { record_id } => {
            repository.delete(&record_id).await?;
            println!("Deleted record {record_id}");
        }
        RecordCommands::Pdf {
            patient_id,
            record_id,
            output,
        } => {
            let record = find_record(service, &patient_id, &record_id).await?;
            let pdf = repository.export_pdf(&record).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&pdf.filename));
            std::fs::write(&path, &pdf.bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Saved {}", path.display());
        }
    }
    Ok(())
}

async fn find_record(
    service: &PatientService,
    patient_id: &str,
    record_id: &str,
) -> anyhow::Result<ClinicalRecord> {
    service
        .records()
        .list_for_patient(patient_id)
        .await?
        .into_iter()
        .find(|r| r.id == record_id)
        .ok_or_else(|| anyhow!("record {record_id} not found for patient {patient_id}"))
}

/// Applies `key=value` arguments to a draft. `true`/`false` become flags and an empty
/// value removes the field.
fn apply_assignments(
    mut draft: RecordDraft,
    assignments: &[String],
) -> anyhow::Result<RecordDraft> {
    for assignment in assignments {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{assignment}'"))?;
        let key = key.trim();
        match value {
            "" => {
                draft.remove(key);
            }
            "true" => {
                draft.set(key, true);
            }
            "false" => {
                draft.set(key, false);
            }
            text => {
                draft.set(key, text);
            }
        }
    }
    Ok(draft)
}

fn print_patient_line(patient: &Patient) {
    println!(
        "{}  {:<30} {:<9} {}",
        patient.id,
        patient.display_name(),
        patient.tipo,
        patient.status
    );
}

fn print_patient(patient: &Patient) {
    println!("ID:      {}", patient.id);
    println!("Name:    {}", patient.display_name());
    println!("Type:    {}", patient.tipo);
    println!("Site:    {}", patient.site);
    println!("Status:  {}", patient.status);
    if let Some(reason) = patient.discharge_reason {
        println!("Discharge reason: {reason}");
    }
    if let Some(notes) = &patient.discharge_notes {
        println!("Discharge notes:  {notes}");
    }
    if let Some(notes) = &patient.suspend_notes {
        println!("Suspend notes:    {notes}");
    }
}
