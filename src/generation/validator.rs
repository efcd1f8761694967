//! Required-field checks, run before any side effect.

use super::GenerationRequest;
use crate::error::ValidationError;

/// Checks a request has a face asset and a non-blank prompt.
///
/// The mask is optional and never causes a failure.
pub fn validate(request: &GenerationRequest) -> Result<(), ValidationError> {
    if request.face.is_none() {
        return Err(ValidationError::MissingFace);
    }
    if request.prompt.trim().is_empty() {
        return Err(ValidationError::MissingPrompt);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::UploadedAsset;

    fn face() -> UploadedAsset {
        UploadedAsset::new(vec![1, 2, 3], "me.png")
    }

    #[test]
    fn missing_face_is_rejected_first() {
        let request = GenerationRequest::new("");
        assert_eq!(validate(&request), Err(ValidationError::MissingFace));
        assert_eq!(
            ValidationError::MissingFace.to_string(),
            "missing face image"
        );
    }

    #[test]
    fn blank_prompts_are_rejected() {
        for prompt in ["", "   ", "\n\t"] {
            let request = GenerationRequest::new(prompt).with_face(face());
            assert_eq!(validate(&request), Err(ValidationError::MissingPrompt));
        }
    }

    #[test]
    fn mask_is_optional() {
        let request = GenerationRequest::new("a person in a forest").with_face(face());
        assert_eq!(validate(&request), Ok(()));
        let request = request.with_mask(UploadedAsset::new(vec![0], "mask.png"));
        assert_eq!(validate(&request), Ok(()));
    }

    #[test]
    fn verdict_is_stable() {
        let request = GenerationRequest::new(" ").with_face(face());
        assert_eq!(validate(&request), validate(&request));
        let request = GenerationRequest::new("x").with_face(face());
        assert_eq!(validate(&request), validate(&request));
    }
}
