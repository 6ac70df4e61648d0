//! TLS for the translation listener.

use std::path::PathBuf;

use serde::Deserialize;

/// Certificate and key served on the main listener and on a dedicated health listener.
///
/// Browser extensions and web clients calling over https need this unless a proxy
/// terminates TLS in front of Babel.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsServerConfig {
    /// Path to the TLS certificate PEM file.
    pub certificate: PathBuf,
    /// Path to the TLS private key PEM file.
    pub key: PathBuf,
}
