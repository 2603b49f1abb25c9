// Manifest reconciliation
pub mod apply;

// Read-only helpers
pub mod kernel;
pub mod query;
