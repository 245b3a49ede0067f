pub mod probe;
pub mod spool;
