/// Crate-wide result alias for fallible plumbing (startup, server wiring).
///
/// The prediction client and the lookup cache deliberately do NOT use this:
/// they are total functions that encode failure in their return values.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
