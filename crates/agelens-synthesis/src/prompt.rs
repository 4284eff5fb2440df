//! Provider prompt rendering
//!
//! Every stage prompt embeds the same attribute description so the provider
//! is asked for one face at four ages rather than four unrelated faces.

use agelens_model::{AgeStage, Descriptor};

/// Prompt text for `descriptor` rendered at `stage`
#[must_use]
pub fn render(descriptor: &Descriptor, stage: AgeStage) -> String {
    let framing = match stage {
        AgeStage::Infant => "peaceful expression, bright eyes, soft natural lighting",
        AgeStage::Child | AgeStage::Teen | AgeStage::Adult => {
            "natural and realistic for their age, natural lighting"
        }
    };

    format!(
        "Photorealistic close-up portrait of {phrase} named {name}. \
         Professional photography, clear facial features, {framing}. \
         Keep these identity features consistent: {features}. \
         Identity seed {seed:016x}.",
        phrase = stage.prompt_phrase(),
        name = descriptor.name(),
        features = descriptor.attributes().describe(),
        seed = descriptor.seed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agelens_model::DescriptorBuilder;

    #[test]
    fn prompt_mentions_stage_and_name() {
        let d = DescriptorBuilder::new().build("Ava").unwrap();
        let prompt = render(&d, AgeStage::Teen);
        assert!(prompt.contains("a teenage person (14-16 years old)"));
        assert!(prompt.contains("named Ava"));
    }

    #[test]
    fn every_stage_shares_identity_features() {
        let d = DescriptorBuilder::new().build("Ava").unwrap();
        let features = d.attributes().describe();
        for stage in AgeStage::ALL {
            let prompt = render(&d, stage);
            assert!(prompt.contains(&features), "{stage} prompt lost features");
            assert!(prompt.contains(&format!("{:016x}", d.seed())));
        }
    }

    #[test]
    fn prompt_is_deterministic() {
        let d = DescriptorBuilder::new().build("Noah").unwrap();
        assert_eq!(render(&d, AgeStage::Adult), render(&d, AgeStage::Adult));
        assert_ne!(render(&d, AgeStage::Adult), render(&d, AgeStage::Child));
    }
}
