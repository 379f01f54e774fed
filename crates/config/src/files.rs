//! Uploaded-file storage configuration.

use serde::Deserialize;

/// Settings for the artifact store and the file-context injector.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    /// Object-store bucket holding uploaded artifacts.
    pub bucket: String,

    /// Region override for the object store; falls back to the Bedrock
    /// region, then the ambient SDK region.
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL, mainly for test doubles.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Hard cap on a single uploaded file.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Hard cap on the assembled context preamble.
    #[serde(default = "default_max_context_bytes")]
    pub max_context_bytes: usize,

    /// How many CSV rows are rendered before truncation.
    #[serde(default = "default_csv_preview_rows")]
    pub csv_preview_rows: usize,
}

fn default_max_file_bytes() -> usize {
    1024 * 1024
}

fn default_max_context_bytes() -> usize {
    256 * 1024
}

fn default_csv_preview_rows() -> usize {
    20
}
