//! Types shared between the share-dispatch service and its tooling: runtime
//! settings, the error taxonomy, and the DTOs exchanged with the storage
//! backend.

pub mod config;
pub mod dto;
pub mod error;
