//! Shares folders from a storage drive with external recipients, driven by a
//! spreadsheet request form that is polled on a fixed interval.

pub mod msgraph;
pub mod notify;
pub mod poll;
pub mod processor;
pub mod record;
pub mod row_store;
pub mod run_loop;
pub mod storage;
