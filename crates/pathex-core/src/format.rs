use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Family of rendered artifact. Each kind is cached in its own directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Raster,
    SlideDeck,
    Document,
    ExchangeFormat,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Raster => "raster",
            ArtifactKind::SlideDeck => "slidedeck",
            ArtifactKind::Document => "document",
            ArtifactKind::ExchangeFormat => "exchange-format",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format requested by the caller, usually taken from the URL extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Png,
    Jpeg,
    Gif,
    Svg,
    Pptx,
    Pdf,
    Sbml,
    Sbgn,
}

impl Format {
    pub const ALL: [Format; 8] = [
        Format::Png,
        Format::Jpeg,
        Format::Gif,
        Format::Svg,
        Format::Pptx,
        Format::Pdf,
        Format::Sbml,
        Format::Sbgn,
    ];

    pub fn from_extension(ext: &str) -> Result<Self, ParseError> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Format::Png),
            "jpg" | "jpeg" => Ok(Format::Jpeg),
            "gif" => Ok(Format::Gif),
            "svg" => Ok(Format::Svg),
            "pptx" => Ok(Format::Pptx),
            "pdf" => Ok(Format::Pdf),
            "sbml" => Ok(Format::Sbml),
            "sbgn" => Ok(Format::Sbgn),
            _ => Err(ParseError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Canonical file extension, used for cache filenames and download names.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpeg => "jpg",
            Format::Gif => "gif",
            Format::Svg => "svg",
            Format::Pptx => "pptx",
            Format::Pdf => "pdf",
            Format::Sbml => "sbml",
            Format::Sbgn => "sbgn",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
            Format::Gif => "image/gif",
            Format::Svg => "image/svg+xml",
            Format::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Format::Pdf => "application/pdf",
            Format::Sbml => "application/sbml+xml",
            Format::Sbgn => "application/xml",
        }
    }

    pub fn kind(self) -> ArtifactKind {
        match self {
            Format::Png | Format::Jpeg | Format::Gif | Format::Svg => ArtifactKind::Raster,
            Format::Pptx => ArtifactKind::SlideDeck,
            Format::Pdf => ArtifactKind::Document,
            Format::Sbml | Format::Sbgn => ArtifactKind::ExchangeFormat,
        }
    }

    /// Pixel-bounded output whose memory footprint scales with the requested quality.
    pub fn is_pixel_bounded(self) -> bool {
        matches!(self, Format::Png | Format::Jpeg | Format::Gif)
    }

    /// Scalable output (svg, pptx) whose rendering cost does not depend on a pixel grid.
    pub fn is_vector(self) -> bool {
        matches!(self, Format::Svg | Format::Pptx)
    }

    /// Whether the artifact is drawn from a diagram layout, and therefore subject to
    /// ancestor-diagram resolution. PDF reports and SBML describe the entity itself.
    pub fn requires_diagram(self) -> bool {
        match self.kind() {
            ArtifactKind::Raster | ArtifactKind::SlideDeck => true,
            ArtifactKind::Document => false,
            ArtifactKind::ExchangeFormat => self == Format::Sbgn,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Requested render quality. Only obtainable through a [`QualityRange`], so every value is
/// within the configured bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quality(u8);

impl Quality {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The documented quality range and its default (mid-range unless configured otherwise).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityRange {
    min: u8,
    max: u8,
    default: u8,
}

impl QualityRange {
    pub fn new(min: u8, max: u8, default: u8) -> Result<Self, ParseError> {
        if min == 0 || min > max || !(min..=max).contains(&default) {
            return Err(ParseError::InvalidQualityRange { min, max, default });
        }
        Ok(Self { min, max, default })
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn default_quality(&self) -> Quality {
        Quality(self.default)
    }

    /// Validates a caller-supplied quality; `None` selects the default.
    pub fn parse(&self, requested: Option<i64>) -> Result<Quality, ParseError> {
        let Some(value) = requested else {
            return Ok(self.default_quality());
        };
        if value < i64::from(self.min) || value > i64::from(self.max) {
            return Err(ParseError::QualityOutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(Quality(value as u8))
    }
}

impl Default for QualityRange {
    fn default() -> Self {
        Self {
            min: 1,
            max: 10,
            default: 5,
        }
    }
}
