use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Output image file format, as identified by the host renderer
/// (`PNG`, `JPEG`, `BMP`, `TIFF`, `OPEN_EXR`, ...).
///
/// Formats we don't know the file extension of are kept verbatim in `Other`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Bmp,
    Tiff,
    OpenExr,
    Other(String),
}

impl ImageFormat {
    pub fn from_identifier<S: AsRef<str>>(identifier: S) -> Self {
        match identifier.as_ref() {
            "PNG" => Self::Png,
            "JPEG" => Self::Jpeg,
            "BMP" => Self::Bmp,
            "TIFF" => Self::Tiff,
            "OPEN_EXR" => Self::OpenExr,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::OpenExr => "OPEN_EXR",
            ImageFormat::Other(identifier) => identifier,
        }
    }

    /// File extension (including the leading dot) the renderer appends when writing
    /// an image in this format. `None` for unrecognized formats.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ImageFormat::Png => Some(".png"),
            ImageFormat::Jpeg => Some(".jpg"),
            ImageFormat::Bmp => Some(".bmp"),
            ImageFormat::Tiff => Some(".tiff"),
            ImageFormat::OpenExr => Some(".exr"),
            ImageFormat::Other(_) => None,
        }
    }

    /// Append this format's extension to an extension-less output path.
    pub fn apply_extension(&self, output_path: &str) -> String {
        match self.extension() {
            Some(extension) => format!("{output_path}{extension}"),
            None => output_path.to_string(),
        }
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.identifier())
    }
}

impl From<String> for ImageFormat {
    fn from(value: String) -> Self {
        Self::from_identifier(value)
    }
}

impl From<ImageFormat> for String {
    fn from(value: ImageFormat) -> Self {
        value.identifier().to_string()
    }
}
