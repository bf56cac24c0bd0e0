pub mod actors;
pub mod api;
pub mod control;
pub mod mode;
pub mod observations;
pub mod retry;
pub mod services;
