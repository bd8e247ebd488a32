//! Render options selected by the user for a mount.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Independent render toggles.
///
/// Output bytes depend on these, so changing them on a mount rebuilds the
/// catalog and discards every cached frame of that mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Render at reduced resolution (see [`DraftScale`]).
    pub draft: bool,
    /// Apply the lens shading map to correct vignetting.
    pub vignette_correction: bool,
    /// Normalize raw values against the shading map.
    pub normalize_shading_map: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }

    pub fn with_vignette_correction(mut self, enabled: bool) -> Self {
        self.vignette_correction = enabled;
        self
    }

    pub fn with_normalize_shading_map(mut self, enabled: bool) -> Self {
        self.normalize_shading_map = enabled;
        self
    }

    /// Effective downscale factor: the draft scale in draft mode, else 1.
    pub fn scale(&self, draft_scale: DraftScale) -> u32 {
        if self.draft {
            draft_scale.factor()
        } else {
            1
        }
    }
}

impl fmt::Display for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.draft {
            flags.push("draft");
        }
        if self.vignette_correction {
            flags.push("vignette_correction");
        }
        if self.normalize_shading_map {
            flags.push("normalize_shading_map");
        }
        if flags.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

/// Downscale factor used in draft mode.
///
/// Serialized as the factor (2, 4 or 8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DraftScale {
    #[default]
    Half,
    Quarter,
    Eighth,
}

/// Error for a draft scale outside {2, 4, 8}.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid draft scale {0}: must be 2, 4 or 8")]
pub struct InvalidDraftScale(pub u32);

impl DraftScale {
    pub fn factor(self) -> u32 {
        match self {
            DraftScale::Half => 2,
            DraftScale::Quarter => 4,
            DraftScale::Eighth => 8,
        }
    }
}

impl TryFrom<u32> for DraftScale {
    type Error = InvalidDraftScale;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(DraftScale::Half),
            4 => Ok(DraftScale::Quarter),
            8 => Ok(DraftScale::Eighth),
            other => Err(InvalidDraftScale(other)),
        }
    }
}

impl From<DraftScale> for u32 {
    fn from(scale: DraftScale) -> Self {
        scale.factor()
    }
}

impl fmt::Display for DraftScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1/{}", self.factor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_only_applies_in_draft_mode() {
        let options = RenderOptions::new().with_vignette_correction(true);
        assert_eq!(options.scale(DraftScale::Quarter), 1);

        let options = options.with_draft(true);
        assert_eq!(options.scale(DraftScale::Quarter), 4);
        assert_eq!(options.scale(DraftScale::Eighth), 8);
    }

    #[test]
    fn test_draft_scale_try_from() {
        assert_eq!(DraftScale::try_from(2), Ok(DraftScale::Half));
        assert_eq!(DraftScale::try_from(4), Ok(DraftScale::Quarter));
        assert_eq!(DraftScale::try_from(8), Ok(DraftScale::Eighth));
        assert_eq!(DraftScale::try_from(3), Err(InvalidDraftScale(3)));
        assert_eq!(DraftScale::try_from(1), Err(InvalidDraftScale(1)));
    }

    #[test]
    fn test_options_display() {
        assert_eq!(RenderOptions::new().to_string(), "none");
        let options = RenderOptions::new()
            .with_draft(true)
            .with_normalize_shading_map(true);
        assert_eq!(options.to_string(), "draft|normalize_shading_map");
        assert_eq!(DraftScale::Eighth.to_string(), "1/8");
    }

    #[test]
    fn test_options_serde() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"draft": true, "vignette_correction": true}"#).unwrap();
        assert_eq!(
            options,
            RenderOptions::new().with_draft(true).with_vignette_correction(true)
        );

        assert_eq!(serde_json::to_string(&DraftScale::Quarter).unwrap(), "4");
        assert_eq!(serde_json::from_str::<DraftScale>("8").unwrap(), DraftScale::Eighth);
        assert!(serde_json::from_str::<DraftScale>("3").is_err());
    }
}
