/// Expected database schema version
/// All collector databases must use this version for compatibility
pub const SCHEMA_VERSION: &str = "2";

/// Wall-clock format hubs use for meeting start/end times
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header carrying the submitting hub's identity on every hub request
pub const HUB_UUID_HEADER: &str = "x-hub-uuid";
