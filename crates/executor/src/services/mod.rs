pub mod execution_service;
pub mod signal_router;
pub mod status_reporter;
