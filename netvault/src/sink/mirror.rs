//! Keep a local copy and push another to a second endpoint.

use super::ArtifactSink;
use crate::artifact::Artifact;
use crate::error::Result;

/// Stores every artifact in a primary sink, then in a mirror.
///
/// Both endpoints are probed. An artifact counts as delivered only when
/// both accepted it; a mirror failure leaves the primary copy in place.
#[derive(Debug)]
pub struct MirrorSink<P, M> {
    primary: P,
    mirror: M,
}

impl<P: ArtifactSink, M: ArtifactSink> MirrorSink<P, M> {
    pub fn new(primary: P, mirror: M) -> Self {
        Self { primary, mirror }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    pub fn into_inner(self) -> (P, M) {
        (self.primary, self.mirror)
    }
}

impl<P: ArtifactSink, M: ArtifactSink> ArtifactSink for MirrorSink<P, M> {
    fn describe(&self) -> String {
        format!("{} + {}", self.primary.describe(), self.mirror.describe())
    }

    async fn probe(&self) -> Result<()> {
        let (primary, mirror) = tokio::join!(self.primary.probe(), self.mirror.probe());
        primary?;
        mirror
    }

    async fn ingest(&self, artifact: Artifact) -> Result<()> {
        self.primary.ingest(artifact.clone()).await?;
        self.mirror.ingest(artifact).await
    }
}
