//! Format adapters between external representations and the workbook model.

pub mod delimited;
pub mod remote;
pub mod xlsx;
