use cuebox_core::StoreError;

mod data;
pub use data::*;

mod pg;
pub use pg::*;

/// Postgres error codes that mean the transaction lost a race and can be run again.
const RETRYABLE_CODES: [&str; 3] = [
    // serialization_failure
    "40001",
    // deadlock_detected
    "40P01",
    // unique_violation
    "23505",
];

/// Helper trait to reduce boilerplate
pub trait IntoStoreError {
    fn not_found_or(self, resource: &'static str, identifier: impl ToString) -> StoreError;
    fn any(self) -> StoreError;
}

/// Returns true if the database error code marks a transaction that can be retried.
pub fn is_retryable(code: &str) -> bool {
    RETRYABLE_CODES.contains(&code)
}
