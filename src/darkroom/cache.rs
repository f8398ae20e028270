use sha2::{Digest, Sha256};
use std::path::Path;

use super::{Darkroom, DarkroomError, OutputFormat};
use crate::params::RequestParameters;

impl Darkroom {
    /// Cache key over the source path, the canonical parameter string, and
    /// the output format. Canonicalization makes the key independent of
    /// query parameter order.
    pub(crate) fn generate_cache_key(
        &self,
        path: &str,
        parameters: &RequestParameters,
        format: OutputFormat,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path);
        hasher.update(parameters.canonical_string());
        hasher.update(format.extension());
        format!("{:x}", hasher.finalize())
    }

    pub(crate) fn generate_cache_filename(
        &self,
        path: &str,
        parameters: &RequestParameters,
        format: OutputFormat,
    ) -> String {
        let hash = self.generate_cache_key(path, parameters, format);
        format!("{}.{}", hash, format.extension())
    }

    /// A cache entry is valid when it exists and is at least as new as the
    /// source file.
    pub(crate) async fn is_cache_valid(
        &self,
        cache_path: &Path,
        original_path: &Path,
    ) -> Result<bool, DarkroomError> {
        if !cache_path.exists() {
            return Ok(false);
        }

        let cache_metadata = tokio::fs::metadata(cache_path).await?;
        let original_metadata = tokio::fs::metadata(original_path).await?;

        if let (Ok(cache_modified), Ok(original_modified)) =
            (cache_metadata.modified(), original_metadata.modified())
            && cache_modified >= original_modified
        {
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
