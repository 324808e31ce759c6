/// Execution module - Run the gate, then hand over to the protected command
pub mod sync;

// Re-export for convenience
pub use sync::execute_sync;
