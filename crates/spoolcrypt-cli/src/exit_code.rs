//! Process exit codes

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
/// Config file missing or malformed
pub const CONFIG_ERROR: u8 = 3;
/// Spool directory, input or output could not be used
pub const STORAGE_ERROR: u8 = 4;
/// Key generation or cipher setup failed
pub const CRYPTO_UNAVAILABLE: u8 = 5;
/// Backing data came back shorter than what was written
pub const CORRUPTED: u8 = 6;
