use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use std::str::FromStr;
use tracing::{debug, instrument};

use super::AppState;
use crate::constants::{ALLOWED_IMAGE_TYPES, DEFAULT_NEGATIVE_PROMPT, INVALID_FILE_TYPE_MESSAGE};
use crate::error::StoryError;
use crate::generation::{GenerationRequest, GenerationResult, UploadedAsset};

/// handles the /generate POST
#[instrument(skip_all)]
pub(crate) async fn generate_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerationResult>, StoryError> {
    let request = read_generation_form(&mut multipart, state.max_file_size).await?;
    Ok(Json(state.orchestrator.run(&request).await))
}

/// Collects the multipart fields into a request. Nothing here checks required fields,
/// that's the orchestrator's job.
async fn read_generation_form(
    multipart: &mut Multipart,
    max_file_size: usize,
) -> Result<GenerationRequest, StoryError> {
    let mut request = GenerationRequest::default();
    let mut negative_prompt: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "faceImage" | "face_image" => {
                request.face = read_file(field, max_file_size).await?;
            }
            "maskImage" | "mask_image" => {
                request.mask = read_file(field, max_file_size).await?;
            }
            "prompt" => {
                request.prompt = field.text().await?;
            }
            "negativePrompt" | "negative_prompt" => {
                negative_prompt = Some(field.text().await?);
            }
            "numImages" | "num_images" => {
                request.options.num_images = parse_field(field, "numImages").await?;
            }
            "guidanceScale" | "guidance_scale" => {
                request.options.guidance_scale = parse_field(field, "guidanceScale").await?;
            }
            "numInferenceSteps" | "num_inference_steps" => {
                request.options.num_inference_steps =
                    parse_field(field, "numInferenceSteps").await?;
            }
            "width" => {
                request.options.width = parse_field(field, "width").await?;
            }
            "height" => {
                request.options.height = parse_field(field, "height").await?;
            }
            other => debug!("Ignoring unknown field {:?}", other),
        }
    }

    request.negative_prompt =
        negative_prompt.unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string());
    Ok(request)
}

/// Reads a file part, treating an empty, unnamed part as no file at all.
///
/// Anything that isn't a JPEG, PNG or WebP upload is a bad request.
async fn read_file(
    mut field: Field<'_>,
    max_file_size: usize,
) -> Result<Option<UploadedAsset>, StoryError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if bytes.len() + chunk.len() > max_file_size {
            return Err(StoryError::PayloadTooLarge(format!(
                "File too large. Maximum size is {}MB",
                max_file_size / 1024 / 1024
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    if bytes.is_empty() && filename.is_empty() {
        return Ok(None);
    }
    if !content_type.as_deref().is_some_and(is_allowed_image_type) {
        debug!("Rejecting upload {:?} of type {:?}", filename, content_type);
        return Err(StoryError::BadRequest(INVALID_FILE_TYPE_MESSAGE.to_string()));
    }
    Ok(Some(UploadedAsset {
        bytes,
        filename,
        content_type,
    }))
}

fn is_allowed_image_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    ALLOWED_IMAGE_TYPES
        .iter()
        .any(|allowed| essence.eq_ignore_ascii_case(allowed))
}

async fn parse_field<T: FromStr>(field: Field<'_>, name: &str) -> Result<T, StoryError> {
    let value = field.text().await?;
    value
        .trim()
        .parse()
        .map_err(|_| StoryError::BadRequest(format!("invalid {name}: {value:?}")))
}
