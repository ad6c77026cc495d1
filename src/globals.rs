pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");

/// Global program version number
///
/// All client code should refer directly to this copy instead of reading the environment
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
