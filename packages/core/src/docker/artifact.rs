//! Extract and hash the compiled binary from an image

use std::io::Read;

use bollard::container::{Config, CreateContainerOptions, DownloadFromContainerOptions};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::container::remove_container;
use super::{DockerClient, DockerError};

/// SHA-256 of the file at `path` inside `image`
///
/// The container is created but never started, so the binary is read
/// exactly as the image stores it.
pub async fn binary_digest(
    client: &DockerClient,
    image: &str,
    path: &str,
    container_name: &str,
) -> Result<String, DockerError> {
    let config = Config {
        image: Some(image.to_string()),
        ..Default::default()
    };
    let options = CreateContainerOptions {
        name: container_name,
        platform: None,
    };
    let created = client
        .inner()
        .create_container(Some(options), config)
        .await
        .map_err(|e| DockerError::Container(format!("Failed to create container from {image}: {e}")))?;

    let result = download(client, &created.id, path).await;
    let removed = remove_container(client, &created.id).await;
    let archive = result?;
    removed?;

    debug!("Downloaded {} bytes of {} from {}", archive.len(), path, image);
    digest_first_file(&archive)?.ok_or_else(|| {
        DockerError::Image(format!("{path} in {image} is not a regular file"))
    })
}

async fn download(client: &DockerClient, id: &str, path: &str) -> Result<Vec<u8>, DockerError> {
    let options = DownloadFromContainerOptions { path };
    let mut stream = std::pin::pin!(client.inner().download_from_container(id, Some(options)));

    let mut archive = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => DockerError::Image(format!("{path} does not exist in the image")),
            other => DockerError::Container(format!("Failed to copy {path}: {other}")),
        })?;
        archive.extend_from_slice(&chunk);
    }
    Ok(archive)
}

/// Hash the first regular file of an uncompressed tar stream
pub fn digest_first_file(archive: &[u8]) -> Result<Option<String>, DockerError> {
    let io_err = |e: std::io::Error| DockerError::Image(format!("Invalid archive from daemon: {e}"));

    let mut tar = tar::Archive::new(archive);
    for entry in tar.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let read = entry.read(&mut buffer).map_err(io_err)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        return Ok(Some(hex::encode(hasher.finalize())));
    }
    Ok(None)
}
