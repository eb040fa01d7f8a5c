use pathex_core::{ArtifactKind, EntityId, Format, Profile, Quality};
use std::path::PathBuf;

/// Identity of a persisted artifact within one release.
///
/// Only inputs that change the rendered bytes of an undecorated request are part of the key.
/// Quality is kept for pixel-bounded formats only, so vector and document exports share a
/// single file across qualities. Decoration is never part of a key: decorated renders are not
/// cached at all.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    owner: EntityId,
    profile: Profile,
    format: Format,
    quality: Option<Quality>,
}

impl CacheKey {
    pub fn new(owner: EntityId, profile: Profile, format: Format, quality: Quality) -> Self {
        let quality = format.is_pixel_bounded().then_some(quality);
        Self {
            owner,
            profile,
            format,
            quality,
        }
    }

    pub fn owner(&self) -> &EntityId {
        &self.owner
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn quality(&self) -> Option<Quality> {
        self.quality
    }

    pub fn kind(&self) -> ArtifactKind {
        self.format.kind()
    }

    /// `<owner>-q<quality>.<ext>` for raster formats, `<owner>.<ext>` otherwise.
    pub fn file_name(&self) -> String {
        let ext = self.format.extension();
        match self.quality {
            Some(quality) => format!("{}-q{}.{ext}", self.owner, quality.get()),
            None => format!("{}.{ext}", self.owner),
        }
    }

    /// `<kind>/<profile>/<file>`, relative to a release directory.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind().as_str())
            .join(self.profile.as_str())
            .join(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathex_core::{ProfileSet, QualityRange};

    fn key(format: Format, quality: i64) -> CacheKey {
        let profiles = ProfileSet::new(["modern", "standard"], "modern").unwrap();
        let quality = QualityRange::default().parse(Some(quality)).unwrap();
        CacheKey::new(
            EntityId::parse("R-HSA-1").unwrap(),
            profiles.resolve(None).unwrap(),
            format,
            quality,
        )
    }

    #[test]
    fn raster_keys_carry_quality() {
        assert_eq!(key(Format::Png, 7).file_name(), "R-HSA-1-q7.png");
        assert_ne!(key(Format::Png, 7), key(Format::Png, 8));
        assert_eq!(
            key(Format::Jpeg, 3).relative_path(),
            PathBuf::from("raster/modern/R-HSA-1-q3.jpg")
        );
    }

    #[test]
    fn non_raster_keys_ignore_quality() {
        assert_eq!(key(Format::Svg, 2), key(Format::Svg, 9));
        assert_eq!(key(Format::Svg, 2).file_name(), "R-HSA-1.svg");
        assert_eq!(
            key(Format::Pdf, 5).relative_path(),
            PathBuf::from("document/modern/R-HSA-1.pdf")
        );
        assert_eq!(
            key(Format::Sbgn, 5).relative_path(),
            PathBuf::from("exchange-format/modern/R-HSA-1.sbgn")
        );
    }
}
