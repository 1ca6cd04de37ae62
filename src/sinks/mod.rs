//! External-interface CSV writers the core produces directly (§6: per-call
//! log, scaling CSV) plus the `DataStore` contract external fixture stores
//! implement (§6; CSV data-file fixtures themselves are out of scope, §1).

mod csv_writer;
mod data_store;

pub use csv_writer::{CallLogWriter, CallStatus, ScalingCsvWriter};
pub use data_store::DataStore;
