//! Format versioning constants for story content and persisted values.
//!
//! Every serialized format carries an explicit version so loaders can
//! reject incompatible data instead of misreading it.

/// Current schema version for JSON story files.
/// Increment MINOR for compatible changes, MAJOR for breaking changes.
pub const STORY_SCHEMA_VERSION: &str = "1.0";

/// Current binary format version for compiled stories.
/// Increment when the binary layout changes.
pub const COMPILED_FORMAT_VERSION: u16 = 1;

/// Current format version for save records.
/// Increment when the save payload changes.
pub const SAVE_FORMAT_VERSION: u16 = 2;

/// Current envelope version for encoded store values.
pub const VALUE_FORMAT_VERSION: u16 = 1;

/// Magic bytes for compiled story binaries.
pub const STORY_BINARY_MAGIC: [u8; 4] = *b"SNSC";

/// Magic bytes for encoded store values.
pub const VALUE_BINARY_MAGIC: [u8; 4] = *b"SNKV";
