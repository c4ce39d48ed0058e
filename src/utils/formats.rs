use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::utils::PipelineError;

/// Output encodings supported by the file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    JPEG,
    PNG,
    WebP,
}

impl ImageFormat {
    /// Get the default quality value for this format
    pub fn default_quality(&self) -> u8 {
        match self {
            Self::JPEG => 92,
            Self::PNG | Self::WebP => 100, // lossless encoders ignore quality
        }
    }

    /// Get file extensions associated with this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::JPEG => &["jpg", "jpeg"],
            Self::PNG => &["png"],
            Self::WebP => &["webp"],
        }
    }

    /// Check if the extension matches this format
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions().contains(&ext.as_str())
    }

    /// Get the primary extension for this format
    pub fn primary_extension(&self) -> &str {
        self.extensions()[0]
    }

    pub fn codec_format(&self) -> image::ImageFormat {
        match self {
            Self::JPEG => image::ImageFormat::Jpeg,
            Self::PNG => image::ImageFormat::Png,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

impl FromStr for ImageFormat {
    type Err = PipelineError;

    fn from_str(ext: &str) -> Result<Self, Self::Err> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::JPEG),
            "png" => Ok(Self::PNG),
            "webp" => Ok(Self::WebP),
            _ => Err(PipelineError::config(format!(
                "Unsupported output format: {}", ext
            ))),
        }
    }
}

/// Whether `path` carries an extension the decoder understands.
pub fn is_supported_source(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(image::ImageFormat::from_extension)
        .is_some_and(|f| f.reading_enabled())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn parses_extensions_case_insensitively() {
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::JPEG);
        assert_eq!("png".parse::<ImageFormat>().unwrap(), ImageFormat::PNG);
        assert!("avif".parse::<ImageFormat>().is_err());
        assert!(ImageFormat::JPEG.matches_extension("JPEG"));
        assert_eq!(ImageFormat::WebP.primary_extension(), "webp");
    }

    #[test]
    fn recognizes_decodable_sources() {
        assert!(is_supported_source(Path::new("images/cat.png")));
        assert!(is_supported_source(Path::new("images/cat.JPG")));
        assert!(!is_supported_source(Path::new("images/notes.txt")));
        assert!(!is_supported_source(Path::new("images/no_extension")));
    }
}
