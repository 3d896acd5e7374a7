//! Tracing and logging (shared setup).

/// Initialize process-wide logging, format taken from `CRM_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(self::tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::LogFormat;
