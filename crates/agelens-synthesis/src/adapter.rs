//! The provider trait

use crate::error::UpstreamError;
use agelens_model::{AgeStage, Descriptor, ImageBytes};
use async_trait::async_trait;
use std::sync::Arc;

/// External image provider
///
/// Implementations must treat `descriptor` consistently across stages: the
/// core always passes the subject's stored descriptor, so the same value for
/// every stage of one subject.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SynthesisAdapter: Send + Sync {
    /// Render `descriptor` at `stage`, returning compressed image bytes
    async fn generate(
        &self,
        descriptor: &Descriptor,
        stage: AgeStage,
    ) -> Result<ImageBytes, UpstreamError>;
}

#[async_trait]
impl<A: SynthesisAdapter + ?Sized> SynthesisAdapter for Arc<A> {
    async fn generate(
        &self,
        descriptor: &Descriptor,
        stage: AgeStage,
    ) -> Result<ImageBytes, UpstreamError> {
        (**self).generate(descriptor, stage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agelens_model::DescriptorBuilder;

    #[tokio::test]
    async fn arc_adapter_delegates() {
        let mut mock = MockSynthesisAdapter::new();
        mock.expect_generate()
            .withf(|_, stage| *stage == AgeStage::Child)
            .times(1)
            .returning(|_, _| Ok(ImageBytes::from(vec![1u8, 2, 3])));

        let shared: Arc<dyn SynthesisAdapter> = Arc::new(mock);
        let descriptor = DescriptorBuilder::new().build("Ava").unwrap();
        let bytes = shared.generate(&descriptor, AgeStage::Child).await.unwrap();
        assert_eq!(bytes.as_slice(), &[1, 2, 3]);
    }
}
