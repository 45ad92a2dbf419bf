//! Vitaport: a portability engine for personal health records.
//!
//! The engine turns a categorized [`models::HealthRecord`] into one of four
//! artifacts (Structured Backup, Tabular Extract, Clinical Document,
//! Interoperability Bundle), optionally sealed in a password-protected
//! envelope, and brings Structured Backups back in through detection,
//! decryption, validation and merge/replace reconciliation.
//!
//! The crate is a pure library: no I/O beyond the bytes it is handed, no
//! background threads, no state between calls. Stores, fetchers and
//! progress sinks are injected collaborators.

pub mod config;
pub mod crypto;
pub mod export;
pub mod import;
pub mod labels;
pub mod models;
pub mod progress;
pub mod select;

pub use crypto::{
    estimate_password_strength, generate_secure_password, is_encrypted_backup,
    verify_backup_password, CryptoError, PasswordStrength,
};
pub use export::{
    estimate_export_size, export_health_data, export_health_data_cancellable,
    validate_export_options, BundleGrouping, DocumentTemplate, ExportError, ExportFormat,
    ExportOptions, ExportResult, FormatTag, RecordFetcher,
};
pub use import::{
    detect_export_format, import_health_data, import_health_data_cancellable, preview_backup,
    restore_from_backup, DetectedFormat, ImportError, ImportOptions, ImportResult, MemoryStore,
    ReconcileMode, RecordStore,
};
pub use labels::{get_category_name, get_export_format_name, Language};
pub use models::{Category, DateRange, HealthRecord};
pub use progress::{CancelToken, ExportProgress, ExportStage, ProgressSink};
pub use select::select_records;
