//! Export orchestration: options → selection → serialization →
//! optional encryption → artifact.
//!
//! Four formats behind one closed enum. Adding a format is a
//! compile-time-checked change: the orchestrator matches exhaustively.

pub mod backup;
pub mod document;
pub mod fhir;
pub mod tabular;

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{self, CryptoError, PasswordStrength};
use crate::labels::Language;
use crate::models::{Category, DateRange, HealthRecord};
use crate::progress::{
    CancelToken, ExportStage, ProgressSink, ProgressTracker, PERCENT_COLLECTING,
    PERCENT_ENCRYPTING, PERCENT_FINALIZING, PERCENT_PREPARING, PERCENT_PROCESSING,
};
use crate::select::select_records;

/// Minimum password strength accepted for an encrypted export.
pub const MIN_EXPORT_PASSWORD_STRENGTH: PasswordStrength = PasswordStrength::Fair;

// ─── Format selection ─────────────────────────────────────────────────────

/// Bare format identity, used for detection, labels and filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    StructuredBackup,
    TabularExtract,
    ClinicalDocument,
    InteropBundle,
}

impl FormatTag {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatTag::StructuredBackup => "structured_backup",
            FormatTag::TabularExtract => "tabular_extract",
            FormatTag::ClinicalDocument => "clinical_document",
            FormatTag::InteropBundle => "interop_bundle",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FormatTag::StructuredBackup => "json",
            FormatTag::TabularExtract => "csv",
            FormatTag::ClinicalDocument => "txt",
            FormatTag::InteropBundle => "json",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            FormatTag::StructuredBackup => "application/json",
            FormatTag::TabularExtract => "text/csv",
            FormatTag::ClinicalDocument => "text/plain",
            FormatTag::InteropBundle => "application/fhir+json",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            FormatTag::StructuredBackup => "backup",
            FormatTag::TabularExtract => "tabular",
            FormatTag::ClinicalDocument => "report",
            FormatTag::InteropBundle => "fhir",
        }
    }
}

/// Clinical document layout variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentTemplate {
    #[default]
    Standard,
    Detailed,
}

/// How the interoperability bundle groups its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleGrouping {
    /// One flat collection of resources.
    #[default]
    Collection,
    /// One sub-bundle per category.
    PerCategory,
}

/// The four export formats, each carrying its own option payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportFormat {
    StructuredBackup,
    TabularExtract,
    ClinicalDocument {
        template: DocumentTemplate,
        include_charts: bool,
    },
    InteropBundle {
        grouping: BundleGrouping,
    },
}

impl ExportFormat {
    pub fn tag(&self) -> FormatTag {
        match self {
            ExportFormat::StructuredBackup => FormatTag::StructuredBackup,
            ExportFormat::TabularExtract => FormatTag::TabularExtract,
            ExportFormat::ClinicalDocument { .. } => FormatTag::ClinicalDocument,
            ExportFormat::InteropBundle { .. } => FormatTag::InteropBundle,
        }
    }
}

/// Requested categories. `All` is the sentinel that expands to every
/// category at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySelection {
    #[default]
    All,
    Only(Vec<Category>),
}

impl CategorySelection {
    pub fn expand(&self) -> Vec<Category> {
        match self {
            CategorySelection::All => Category::ALL.to_vec(),
            CategorySelection::Only(categories) => categories.clone(),
        }
    }
}

// ─── Options & result ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub categories: CategorySelection,
    pub date_range: Option<DateRange>,
    pub language: Language,
    pub patient_name: Option<String>,
    /// When set, the serialized output is sealed in an encrypted envelope.
    pub password: Option<String>,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            categories: CategorySelection::All,
            date_range: None,
            language: Language::default(),
            patient_name: None,
            password: None,
        }
    }
}

/// Outcome of one export operation. `bytes` is opaque to callers: either
/// raw serialized content or an encrypted envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub bytes: Vec<u8>,
    pub filename: String,
    pub format: FormatTag,
    pub encrypted: bool,
    pub error: Option<String>,
}

impl ExportResult {
    fn failed(format: FormatTag, message: String) -> Self {
        Self {
            success: false,
            bytes: Vec::new(),
            filename: String::new(),
            format,
            encrypted: false,
            error: Some(message),
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Cannot serialize {} entry {entry_id}: {reason}", category.as_str())]
    Serialization {
        category: Category,
        entry_id: String,
        reason: String,
    },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Record fetch failed: {0}")]
    Fetch(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Collaborators ────────────────────────────────────────────────────────

#[derive(Error, Debug)]
#[error("{0}")]
pub struct FetchError(pub String);

/// Supplies the full health record. The store behind it is external; the
/// engine only ever reads.
pub trait RecordFetcher {
    fn fetch(&self) -> Result<HealthRecord, FetchError>;
}

/// An in-memory record is its own fetcher.
impl RecordFetcher for HealthRecord {
    fn fetch(&self) -> Result<HealthRecord, FetchError> {
        Ok(self.clone())
    }
}

// ─── Validation ───────────────────────────────────────────────────────────

/// Check options before any stage runs. Empty result = valid.
pub fn validate_export_options(options: &ExportOptions) -> Vec<String> {
    let mut errors = Vec::new();

    if options.categories.expand().is_empty() {
        errors.push("No categories selected".to_string());
    }

    if let Some(range) = &options.date_range {
        if range.start > range.end {
            errors.push(format!(
                "Date range start {} is after end {}",
                range.start, range.end
            ));
        }
    }

    match &options.password {
        Some(password) if password.is_empty() => {
            errors.push("Encryption requested but password is empty".to_string());
        }
        Some(password) => {
            let strength = crypto::estimate_password_strength(password);
            if strength < MIN_EXPORT_PASSWORD_STRENGTH {
                errors.push(format!(
                    "Password too weak ({}); minimum strength is {}",
                    strength.label(),
                    MIN_EXPORT_PASSWORD_STRENGTH.label()
                ));
            }
        }
        None => {}
    }

    errors
}

// ─── Size estimation ──────────────────────────────────────────────────────

const BASE_OVERHEAD_BYTES: u64 = 512;
const PER_CATEGORY_BYTES: u64 = 64;

/// Average serialized bytes per record, measured on representative exports.
fn bytes_per_record(format: FormatTag) -> u64 {
    match format {
        FormatTag::StructuredBackup => 280,
        FormatTag::TabularExtract => 120,
        FormatTag::ClinicalDocument => 160,
        FormatTag::InteropBundle => 640,
    }
}

/// Human-readable size estimate for a prospective export.
pub fn estimate_export_size(
    category_count: usize,
    record_count: usize,
    format: FormatTag,
) -> String {
    let total = BASE_OVERHEAD_BYTES
        + PER_CATEGORY_BYTES * category_count as u64
        + bytes_per_record(format) * record_count as u64;
    humanize_bytes(total)
}

fn humanize_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────

/// Run one export operation end to end. Validation failures return
/// immediately with no progress emissions; any later failure is converted
/// to a terminal `error` emission plus a failed result; nothing escapes
/// as a panic.
pub fn export_health_data(
    options: &ExportOptions,
    fetcher: &dyn RecordFetcher,
    sink: &mut dyn ProgressSink,
) -> ExportResult {
    export_health_data_cancellable(options, fetcher, sink, &CancelToken::new())
}

/// As [`export_health_data`], with a cooperative cancellation signal
/// checked between category boundaries. A cancelled export discards the
/// partial artifact.
pub fn export_health_data_cancellable(
    options: &ExportOptions,
    fetcher: &dyn RecordFetcher,
    sink: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> ExportResult {
    let errors = validate_export_options(options);
    if !errors.is_empty() {
        return ExportResult::failed(options.format.tag(), errors.join("; "));
    }

    let mut tracker = ProgressTracker::new(sink);
    match run_export(options, fetcher, &mut tracker, cancel) {
        Ok(result) => result,
        Err(e) => {
            tracker.error();
            tracing::warn!(error = %e, format = options.format.tag().as_str(), "Export failed");
            ExportResult::failed(options.format.tag(), e.to_string())
        }
    }
}

fn run_export(
    options: &ExportOptions,
    fetcher: &dyn RecordFetcher,
    tracker: &mut ProgressTracker<'_>,
    cancel: &CancelToken,
) -> Result<ExportResult, ExportError> {
    tracker.stage(ExportStage::Preparing, PERCENT_PREPARING);

    let record = fetcher.fetch().map_err(|e| ExportError::Fetch(e.0))?;
    tracker.stage(ExportStage::Collecting, PERCENT_COLLECTING);

    let categories = options.categories.expand();
    let selected = select_records(&record, &categories, options.date_range);
    let total = selected.total_entries();
    tracker.set_total(total);
    tracker.stage(ExportStage::Processing, PERCENT_PROCESSING);

    let bytes = match &options.format {
        ExportFormat::StructuredBackup => backup::serialize(&selected, tracker, cancel)?,
        ExportFormat::TabularExtract => tabular::serialize(&selected, tracker, cancel)?,
        ExportFormat::ClinicalDocument {
            template,
            include_charts,
        } => document::serialize(
            &selected,
            &document::DocumentOptions {
                template: *template,
                include_charts: *include_charts,
                language: options.language,
                patient_name: options.patient_name.clone(),
                date_range: options.date_range,
            },
            tracker,
            cancel,
        )?,
        ExportFormat::InteropBundle { grouping } => {
            fhir::serialize(&selected, *grouping, tracker, cancel)?
        }
    };

    let encrypted = options.password.is_some();
    let bytes = match &options.password {
        Some(password) => {
            let envelope = crypto::encrypt(&bytes, password)?;
            tracker.stage(ExportStage::Encrypting, PERCENT_ENCRYPTING);
            envelope.to_bytes()
        }
        None => bytes,
    };

    let tag = options.format.tag();
    let filename = build_filename(tag, encrypted);
    tracker.stage(ExportStage::Finalizing, PERCENT_FINALIZING);

    tracing::info!(
        format = tag.as_str(),
        records = total,
        size_bytes = bytes.len(),
        encrypted,
        "Export created"
    );
    tracker.complete();

    Ok(ExportResult {
        success: true,
        bytes,
        filename,
        format: tag,
        encrypted,
        error: None,
    })
}

/// `vitaport-<stem>-<date>.<ext>`; encrypted artifacts get the `.vpenc`
/// extension regardless of inner format.
fn build_filename(format: FormatTag, encrypted: bool) -> String {
    let date = Local::now().format("%Y-%m-%d");
    let ext = if encrypted {
        "vpenc"
    } else {
        format.extension()
    };
    format!("vitaport-{}-{date}.{ext}", format.file_stem())
}
