//! Small helpers shared across the crate and by consuming applications.

use std::sync::{Mutex, MutexGuard};

/// Format bytes as space-separated uppercase hex, e.g. `"02 01 05"`.
///
/// Used for packet dumps in logs and by the CLI.
///
/// # Example
///
/// ```
/// use botlink_core::format_packet_hex;
///
/// assert_eq!(format_packet_hex(&[2, 1, 5]), "02 01 05");
/// assert_eq!(format_packet_hex(&[]), "");
/// ```
pub fn format_packet_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lock a std mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate is a single assignment or
/// collection call, so the protected value stays consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
