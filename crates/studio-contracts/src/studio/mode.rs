use serde::{Deserialize, Serialize};

/// The six studio operations. Wire names match the saved session payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "model")]
    Model,
    #[serde(rename = "flatlay")]
    Flatlay,
    #[serde(rename = "tryOn")]
    TryOn,
    #[serde(rename = "aiEdit")]
    AiEdit,
    #[serde(rename = "render3D")]
    Render3D,
    #[serde(rename = "convertToWebP")]
    ConvertToWebP,
}

/// What the background-recolor instruction describes the subject as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Model,
    Product,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Product => "product",
        }
    }
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Model,
        Mode::Flatlay,
        Mode::TryOn,
        Mode::AiEdit,
        Mode::Render3D,
        Mode::ConvertToWebP,
    ];

    /// Accepts wire names plus a few shell-friendly aliases.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "model" | "modelbackground" => Some(Self::Model),
            "flatlay" | "flatlaybackground" | "product" => Some(Self::Flatlay),
            "tryon" | "virtualtryon" => Some(Self::TryOn),
            "aiedit" | "edit" => Some(Self::AiEdit),
            "render3d" | "3drender" | "3d" | "ghost" | "ghostmannequin" => Some(Self::Render3D),
            "converttowebp" | "webp" | "convert" => Some(Self::ConvertToWebP),
            _ => None,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Flatlay => "flatlay",
            Self::TryOn => "tryOn",
            Self::AiEdit => "aiEdit",
            Self::Render3D => "render3D",
            Self::ConvertToWebP => "convertToWebP",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Model => "Model Background",
            Self::Flatlay => "Flatlay Background",
            Self::TryOn => "Virtual Try-On",
            Self::AiEdit => "AI Edit",
            Self::Render3D => "3D Render",
            Self::ConvertToWebP => "Convert to WebP",
        }
    }

    pub fn uploader_label(self) -> &'static str {
        match self {
            Self::Model => "Upload Model Photo",
            Self::Flatlay => "Upload Flatlay Photo",
            Self::TryOn => "Upload Garment Photo",
            Self::AiEdit => "Upload Image to Edit",
            Self::Render3D => "Upload Product for 3D Render",
            Self::ConvertToWebP => "Upload Image to Convert",
        }
    }

    pub fn action_text(self) -> &'static str {
        match self {
            Self::ConvertToWebP => "Convert",
            _ => "Generate Image",
        }
    }

    pub fn loading_text(self) -> &'static str {
        match self {
            Self::ConvertToWebP => "Converting...",
            _ => "Generating...",
        }
    }

    pub fn refinement_placeholder(self) -> &'static str {
        match self {
            Self::TryOn => "e.g., 'Make the sleeves shorter' or 'Change the material to silk'",
            Self::Render3D => {
                "e.g., 'Show more texture on the fabric' or 'Make the lighting brighter'"
            }
            Self::AiEdit => "e.g., 'Now make it black and white' or 'Add a vintage feel'",
            Self::Model | Self::Flatlay => {
                "e.g., 'Make the shadow softer' or 'The background color is too dark'"
            }
            Self::ConvertToWebP => "Describe what you want to change...",
        }
    }

    /// Message shown when the main image is missing at dispatch time.
    pub fn missing_image_message(self) -> &'static str {
        match self {
            Self::Model => "Please upload a model photo.",
            Self::Flatlay => "Please upload a flatlay photo.",
            Self::TryOn => "Please upload both garment and model photos.",
            Self::AiEdit => "Please upload an image to edit.",
            Self::Render3D => "Please upload a product photo.",
            Self::ConvertToWebP => "Please upload an image to convert.",
        }
    }

    pub fn is_refinable(self) -> bool {
        !matches!(self, Self::ConvertToWebP)
    }

    pub fn needs_model_image(self) -> bool {
        matches!(self, Self::TryOn)
    }

    pub fn uses_background_color(self) -> bool {
        matches!(self, Self::Model | Self::Flatlay)
    }

    pub fn subject_kind(self) -> Option<SubjectKind> {
        match self {
            Self::Model => Some(SubjectKind::Model),
            Self::Flatlay => Some(SubjectKind::Product),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}
