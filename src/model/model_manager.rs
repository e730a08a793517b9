use crate::{
    error::{Result, StemError},
    io::{
        crypto::verify_sha256,
        net::{download_with_progress, http_client},
        paths::models_cache_dir,
    },
    model::registry::resolve_manifest_url,
    types::ModelManifest,
};

use std::{fs, path::PathBuf};
use tracing::{info, warn};

/// Verified model weights on local disk.
#[derive(Debug)]
pub struct ModelFiles {
    pub manifest: ModelManifest,
    pub local_path: PathBuf,
}

pub fn ensure_model(model_name: &str, manifest_url_override: Option<&str>) -> Result<ModelFiles> {
    let manifest_url = match manifest_url_override {
        Some(url) => url.to_string(),
        None => resolve_manifest_url(model_name)?,
    };

    let client = http_client()?;
    let manifest: ModelManifest = client
        .get(&manifest_url)
        .send()?
        .error_for_status()?
        .json()?;

    let a = manifest
        .resolve_primary_artifact()
        .map_err(StemError::Manifest)?;
    if a.sha256.len() < 8 {
        return Err(StemError::Manifest(format!(
            "artifact `{}` has no usable sha256",
            a.file
        )));
    }

    let cache_dir = models_cache_dir()?;
    fs::create_dir_all(&cache_dir)?;
    let ext = a
        .file
        .rsplit_once('.')
        .map(|(_, e)| format!(".{e}"))
        .unwrap_or_default();
    let file_name = format!("{}-{}{}", manifest.name, &a.sha256[..8], ext);
    let local_path = cache_dir.join(file_name);

    let need_download = !matches!(verify_sha256(&local_path, &a.sha256), Ok(true));
    if need_download {
        info!(model = %manifest.name, url = %a.url, "downloading model weights");
        download_with_progress(&client, &a.url, &local_path)?;
        if !verify_sha256(&local_path, &a.sha256)? {
            return Err(StemError::Checksum {
                path: local_path.display().to_string(),
            });
        }
        if a.size_bytes > 0 {
            let size = fs::metadata(&local_path).map(|m| m.len()).unwrap_or(0);
            if size != a.size_bytes {
                warn!(
                    path = %local_path.display(),
                    expected = a.size_bytes,
                    got = size,
                    "size mismatch"
                );
            }
        }
    } else {
        info!(path = %local_path.display(), "model weights already cached");
    }

    Ok(ModelFiles {
        manifest,
        local_path,
    })
}
