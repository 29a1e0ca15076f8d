use serde::{Deserialize, Serialize};

/// An image the user loaded, or a prior result re-wrapped for refinement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFile {
    pub name: String,
    #[serde(rename = "dataURL")]
    pub data_url: String,
    pub mime_type: String,
}

impl ImageFile {
    pub const REFINEMENT_NAME: &'static str = "result_for_refinement.jpg";

    pub fn new(
        name: impl Into<String>,
        data_url: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_url: data_url.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Wraps a displayed result so it can be sent back as an edit input.
    ///
    /// The media type comes from the data URL header, defaulting to JPEG.
    pub fn from_result(data_url: &str) -> Self {
        let mime_type = data_url
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or("image/jpeg");
        Self::new(Self::REFINEMENT_NAME, data_url, mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::ImageFile;

    #[test]
    fn from_result_reads_media_type_from_header() {
        let image = ImageFile::from_result("data:image/webp;base64,AAAA");
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(image.name, "result_for_refinement.jpg");

        let bare = ImageFile::from_result("AAAA");
        assert_eq!(bare.mime_type, "image/jpeg");
    }

    #[test]
    fn serializes_with_browser_field_names() -> anyhow::Result<()> {
        let image = ImageFile::new("a.png", "data:image/png;base64,AA==", "image/png");
        let value = serde_json::to_value(&image)?;
        assert_eq!(value["dataURL"], "data:image/png;base64,AA==");
        assert_eq!(value["mimeType"], "image/png");
        Ok(())
    }
}
