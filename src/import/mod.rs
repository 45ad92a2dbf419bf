//! Import pipeline: detection → optional decryption → structural
//! validation → per-category reconciliation.
//!
//! Only the Structured Backup shape reconstructs fully; the other formats
//! are one-way exports and importing one is a distinct, clearly-worded
//! error. Per-entry anomalies never abort the whole import, they are
//! counted and reported.

pub mod detect;
pub mod reconcile;
pub mod validate;

pub use detect::{detect_export_format, DetectedFormat};
pub use reconcile::{MemoryStore, RecordStore, StoreError};
pub use validate::{validate_backup, EntryFailure, ValidatedBackup};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::crypto::{self, CryptoError, EncryptedEnvelope, TAG_LENGTH};
use crate::export::backup::BACKUP_FORMAT_VERSION;
use crate::export::FormatTag;
use crate::models::HealthRecord;
use crate::progress::{
    CancelToken, ExportStage, ProgressSink, ProgressTracker, PERCENT_COLLECTING,
    PERCENT_FINALIZING, PERCENT_PREPARING, PERCENT_PROCESSING,
};

// ─── Errors ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ImportError {
    /// The input is encrypted and no password was supplied. The caller is
    /// expected to prompt and retry.
    #[error("This file is encrypted; a password is required")]
    PasswordRequired,

    /// Wrong password. User-recoverable; never conflated with file damage.
    #[error("Decryption failed: the password is incorrect or the file was tampered with")]
    Authentication,

    /// The file itself is damaged. Retyping the password will not help.
    #[error("The file is corrupt: {0}")]
    CorruptPayload(String),

    #[error("Unrecognized file format")]
    UnrecognizedFormat,

    #[error("{} exports are one-way and cannot be imported", .0.as_str())]
    UnsupportedImport(FormatTag),

    #[error("Backup was written by a newer engine (format v{found}, this engine supports up to v{supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Malformed backup: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<CryptoError> for ImportError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailed => ImportError::Authentication,
            CryptoError::CorruptEnvelope(reason) => ImportError::CorruptPayload(reason),
            other => ImportError::CorruptPayload(other.to_string()),
        }
    }
}

// ─── Options & result ─────────────────────────────────────────────────────

/// How incoming entries reconcile with what the store already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Identifier collisions are skipped; new identifiers are inserted.
    #[default]
    Merge,
    /// Categories present in the input are cleared, then refilled.
    Replace,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    pub mode: ReconcileMode,
    /// Required only for encrypted inputs; ignored (with a warning)
    /// otherwise.
    pub password: Option<String>,
}

impl ImportOptions {
    pub fn new(mode: ReconcileMode) -> Self {
        Self {
            mode,
            password: None,
        }
    }
}

/// Per-category accounting. Invariant: `imported + skipped + failed`
/// equals the number of entries present in the validated input for the
/// category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: crate::models::Category,
    #[serde(flatten)]
    pub counts: CategoryCounts,
}

/// Outcome of one import operation, with full category-by-category
/// accounting. Per-entry failures leave `success` true; only terminal
/// errors (bad format, bad password, store failure) flip it.
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub records_imported: usize,
    pub records_skipped: usize,
    pub records_failed: usize,
    pub categories: Vec<CategoryReport>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// True when the only obstacle is a missing password; the caller
    /// should prompt and retry.
    pub password_required: bool,
}

impl ImportResult {
    fn failed(error: &ImportError) -> Self {
        Self {
            success: false,
            records_imported: 0,
            records_skipped: 0,
            records_failed: 0,
            categories: Vec::new(),
            errors: vec![error.to_string()],
            warnings: Vec::new(),
            password_required: matches!(error, ImportError::PasswordRequired),
        }
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────

/// Run one import operation end to end. Terminal failures are converted to
/// an `error` progress emission plus a failed result; nothing escapes as a
/// panic.
pub fn import_health_data(
    raw: &[u8],
    options: &ImportOptions,
    store: &mut dyn RecordStore,
    sink: &mut dyn ProgressSink,
) -> ImportResult {
    import_health_data_cancellable(raw, options, store, sink, &CancelToken::new())
}

/// As [`import_health_data`], with a cooperative cancellation signal.
/// Reconciliation commits atomically per category, so a cancelled import
/// keeps every category already committed and nothing else.
pub fn import_health_data_cancellable(
    raw: &[u8],
    options: &ImportOptions,
    store: &mut dyn RecordStore,
    sink: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> ImportResult {
    let mut tracker = ProgressTracker::new(sink);
    match run_import(raw, options, store, &mut tracker, cancel) {
        Ok(result) => result,
        Err(e) => {
            tracker.error();
            tracing::warn!(error = %e, "Import failed");
            ImportResult::failed(&e)
        }
    }
}

fn run_import(
    raw: &[u8],
    options: &ImportOptions,
    store: &mut dyn RecordStore,
    tracker: &mut ProgressTracker<'_>,
    cancel: &CancelToken,
) -> Result<ImportResult, ImportError> {
    tracker.stage(ExportStage::Preparing, PERCENT_PREPARING);
    if raw.len() > crate::config::MAX_IMPORT_BYTES {
        return Err(ImportError::MalformedPayload(format!(
            "input exceeds the {} byte limit",
            crate::config::MAX_IMPORT_BYTES
        )));
    }
    match detect_export_format(raw) {
        DetectedFormat::StructuredBackup => {}
        DetectedFormat::TabularExtract => {
            return Err(ImportError::UnsupportedImport(FormatTag::TabularExtract))
        }
        DetectedFormat::InteropBundle => {
            return Err(ImportError::UnsupportedImport(FormatTag::InteropBundle))
        }
        DetectedFormat::Unknown => return Err(ImportError::UnrecognizedFormat),
    }

    tracker.stage(ExportStage::Collecting, PERCENT_COLLECTING);
    let mut warnings = Vec::new();
    let payload = decrypt_if_needed(raw, options.password.as_deref(), &mut warnings)?;

    tracker.stage(ExportStage::Processing, PERCENT_PROCESSING);
    let validated = validate_backup(&payload)?;
    warnings.extend(validated.warnings.iter().cloned());
    let errors: Vec<String> = validated.failures.iter().map(EntryFailure::message).collect();
    tracker.set_total(validated.record.total_entries());

    let reconciled = reconcile::reconcile(
        store,
        &validated.record,
        &validated.present,
        options.mode,
        cancel,
        |processed| tracker.generating_step(processed),
    )?;

    let mut categories = Vec::new();
    let mut totals = CategoryCounts::default();
    for (category, mut counts) in reconciled {
        counts.failed = validated
            .failures
            .iter()
            .filter(|f| f.category == category)
            .count();
        totals.imported += counts.imported;
        totals.skipped += counts.skipped;
        totals.failed += counts.failed;
        categories.push(CategoryReport { category, counts });
    }

    tracker.stage(ExportStage::Finalizing, PERCENT_FINALIZING);
    tracing::info!(
        imported = totals.imported,
        skipped = totals.skipped,
        failed = totals.failed,
        mode = %options.mode,
        "Import reconciled"
    );
    tracker.complete();

    Ok(ImportResult {
        success: true,
        records_imported: totals.imported,
        records_skipped: totals.skipped,
        records_failed: totals.failed,
        categories,
        errors,
        warnings,
        password_required: false,
    })
}

fn decrypt_if_needed(
    raw: &[u8],
    password: Option<&str>,
    warnings: &mut Vec<String>,
) -> Result<Vec<u8>, ImportError> {
    if crypto::is_encrypted_backup(raw) {
        let password = password.ok_or(ImportError::PasswordRequired)?;
        let envelope = EncryptedEnvelope::from_bytes(raw)?;
        Ok(crypto::decrypt(&envelope, password)?)
    } else {
        if password.is_some() {
            warnings.push("Input is not encrypted; the provided password was ignored".into());
            tracing::warn!("Password supplied for an unencrypted import, ignoring");
        }
        Ok(raw.to_vec())
    }
}

// ─── Direct restore ───────────────────────────────────────────────────────

/// Rebuild a `HealthRecord` from backup bytes without touching a store.
/// Strict: any per-entry validation failure is an error here, since there
/// is no result object to carry partial accounting.
pub fn restore_from_backup(
    raw: &[u8],
    password: Option<&str>,
) -> Result<HealthRecord, ImportError> {
    match detect_export_format(raw) {
        DetectedFormat::StructuredBackup => {}
        DetectedFormat::TabularExtract => {
            return Err(ImportError::UnsupportedImport(FormatTag::TabularExtract))
        }
        DetectedFormat::InteropBundle => {
            return Err(ImportError::UnsupportedImport(FormatTag::InteropBundle))
        }
        DetectedFormat::Unknown => return Err(ImportError::UnrecognizedFormat),
    }

    let mut warnings = Vec::new();
    let payload = decrypt_if_needed(raw, password, &mut warnings)?;
    let validated = validate_backup(&payload)?;
    if let Some(first) = validated.failures.first() {
        return Err(ImportError::MalformedPayload(format!(
            "{} invalid entries, first: {}",
            validated.failures.len(),
            first.message()
        )));
    }
    Ok(validated.record)
}

// ─── Preview ──────────────────────────────────────────────────────────────

/// Backup metadata readable before committing to an import: no password
/// needed, no reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct BackupPreview {
    pub encrypted: bool,
    /// Plaintext size when known, otherwise ciphertext size minus the
    /// authentication tag.
    pub payload_size: usize,
    pub format_version: Option<u32>,
    pub engine_version: Option<String>,
    pub exported_at: Option<String>,
    /// Per-category entry counts, absent for encrypted inputs.
    pub counts: Option<BTreeMap<String, usize>>,
}

pub fn preview_backup(raw: &[u8]) -> Result<BackupPreview, ImportError> {
    if crypto::is_encrypted_backup(raw) {
        let envelope = EncryptedEnvelope::from_bytes(raw)?;
        return Ok(BackupPreview {
            encrypted: true,
            payload_size: envelope.ciphertext.len().saturating_sub(TAG_LENGTH),
            format_version: None,
            engine_version: None,
            exported_at: None,
            counts: None,
        });
    }

    if detect_export_format(raw) != DetectedFormat::StructuredBackup {
        return Err(ImportError::UnrecognizedFormat);
    }

    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| ImportError::MalformedPayload(format!("not valid JSON: {e}")))?;
    let format_version = value.get("format_version").and_then(Value::as_u64).map(|v| v as u32);
    if let Some(found) = format_version {
        if found > BACKUP_FORMAT_VERSION {
            return Err(ImportError::UnsupportedVersion {
                found,
                supported: BACKUP_FORMAT_VERSION,
            });
        }
    }

    let counts = value.get("counts").and_then(Value::as_object).map(|map| {
        map.iter()
            .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n as usize)))
            .collect()
    });

    Ok(BackupPreview {
        encrypted: false,
        payload_size: raw.len(),
        format_version,
        engine_version: value
            .get("engine_version")
            .and_then(Value::as_str)
            .map(String::from),
        exported_at: value
            .get("exported_at")
            .and_then(Value::as_str)
            .map(String::from),
        counts,
    })
}
