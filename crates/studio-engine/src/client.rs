use std::sync::Arc;

use studio_contracts::studio::{ImageFile, SubjectKind};

use crate::error::StudioError;
use crate::providers::{ContentPart, ImageGenerator};

pub const TRY_ON_PROMPT: &str = "Place the garment from the second image onto the model in the first image. Make it look realistic, with proper draping, lighting, and shadows. Ensure the garment fits the model naturally.";

pub const GHOST_MANNEQUIN_PROMPT: &str = "Create a professional \"ghost mannequin\" effect. The clothing item must appear to be worn by an invisible body, retaining a perfect 3D volume and shape. The mannequin must be COMPLETELY INVISIBLE. Show the hollow interior (e.g., inside the neck label area) to create a sense of depth. Front-facing view on a clean white background. High detailed fabric texture, natural draping, and soft studio lighting. No visible skin, no hands, no head, no stands.";

pub fn background_prompt(color: &str, subject: SubjectKind) -> String {
    format!(
        "Change the background of this {} image to a smooth, elegant {color} color. Ensure the subject is perfectly cut out and naturally lit, with soft shadows.",
        subject.as_str()
    )
}

/// The four studio operations, each one request against a single model.
#[derive(Clone)]
pub struct GenerationClient {
    generator: Arc<dyn ImageGenerator>,
    model: String,
}

impl GenerationClient {
    pub fn new(generator: Arc<dyn ImageGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &str {
        self.generator.name()
    }

    pub fn change_background(
        &self,
        image: &ImageFile,
        color: &str,
        subject: SubjectKind,
    ) -> Result<String, StudioError> {
        self.invoke(vec![
            ContentPart::from_image(image)?,
            ContentPart::text(background_prompt(color, subject)),
        ])
    }

    /// Model photo goes first, garment second; the instruction refers to that order.
    pub fn virtual_try_on(
        &self,
        garment: &ImageFile,
        model_image: &ImageFile,
    ) -> Result<String, StudioError> {
        self.invoke(vec![
            ContentPart::from_image(model_image)?,
            ContentPart::from_image(garment)?,
            ContentPart::text(TRY_ON_PROMPT),
        ])
    }

    pub fn edit_with_text(
        &self,
        image: &ImageFile,
        instruction: &str,
    ) -> Result<String, StudioError> {
        self.invoke(vec![
            ContentPart::from_image(image)?,
            ContentPart::text(instruction),
        ])
    }

    pub fn render_ghost_mannequin(&self, image: &ImageFile) -> Result<String, StudioError> {
        self.invoke(vec![
            ContentPart::from_image(image)?,
            ContentPart::text(GHOST_MANNEQUIN_PROMPT),
        ])
    }

    fn invoke(&self, parts: Vec<ContentPart>) -> Result<String, StudioError> {
        self.generator.invoke(&parts, &self.model)
    }
}
