//! The container engine seen by the pipeline

use crate::docker::{
    self, BuildRequest, DockerClient, DockerError, ImageConfig, ProgressReporter,
};
use crate::recipe::BaseImage;

/// Image operations the pipeline needs from a container engine
#[allow(async_fn_in_trait)]
pub trait ImageEngine {
    /// Resolve and fetch the base image
    async fn pull_base(&mut self, base: &BaseImage) -> Result<(), DockerError>;

    /// Build and tag `request.tag`; `on_step` receives each 1-based
    /// Dockerfile step as it starts. Returns the image id.
    async fn build(
        &mut self,
        request: BuildRequest,
        on_step: &mut dyn FnMut(usize),
    ) -> Result<String, DockerError>;

    /// Configuration of an image, `None` if it does not exist
    async fn inspect(&mut self, reference: &str) -> Result<Option<ImageConfig>, DockerError>;

    async fn tag(&mut self, source: &str, repo: &str, tag: &str) -> Result<(), DockerError>;

    async fn remove(&mut self, reference: &str, force: bool) -> Result<(), DockerError>;

    /// SHA-256 of a file inside an image
    async fn file_digest(&mut self, image: &str, path: &str) -> Result<String, DockerError>;
}

/// [`ImageEngine`] backed by the local Docker daemon
pub struct DockerEngine {
    client: DockerClient,
    progress: ProgressReporter,
}

impl DockerEngine {
    pub fn new(client: DockerClient, progress: ProgressReporter) -> Self {
        Self { client, progress }
    }

    pub fn client(&self) -> &DockerClient {
        &self.client
    }

    pub fn progress_mut(&mut self) -> &mut ProgressReporter {
        &mut self.progress
    }
}

impl ImageEngine for DockerEngine {
    async fn pull_base(&mut self, base: &BaseImage) -> Result<(), DockerError> {
        let result = docker::pull_base_image(&self.client, base, &mut self.progress).await;
        self.progress.clear();
        result
    }

    async fn build(
        &mut self,
        request: BuildRequest,
        on_step: &mut dyn FnMut(usize),
    ) -> Result<String, DockerError> {
        docker::build_image(&self.client, request, &mut self.progress, on_step).await
    }

    async fn inspect(&mut self, reference: &str) -> Result<Option<ImageConfig>, DockerError> {
        docker::inspect_image_config(&self.client, reference).await
    }

    async fn tag(&mut self, source: &str, repo: &str, tag: &str) -> Result<(), DockerError> {
        docker::tag_image(&self.client, source, repo, tag).await
    }

    async fn remove(&mut self, reference: &str, force: bool) -> Result<(), DockerError> {
        docker::remove_image(&self.client, reference, force).await
    }

    async fn file_digest(&mut self, image: &str, path: &str) -> Result<String, DockerError> {
        let name = format!("z2p-image-extract-{}", docker::session_id());
        docker::binary_digest(&self.client, image, path, &name).await
    }
}
