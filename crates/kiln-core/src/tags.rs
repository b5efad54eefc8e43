use std::fmt;

use kiln_domain::ProjectModel;

use crate::error::{BuildError, Result};

/// `(python, abi, platform)` triple naming the environments a wheel installs into.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompatibilityTag {
    pub python: String,
    pub abi: String,
    pub platform: String,
}

impl CompatibilityTag {
    /// `py3-none-any`: pure Python, any interpreter ABI, any platform.
    pub fn universal() -> Self {
        Self {
            python: "py3".to_string(),
            abi: "none".to_string(),
            platform: "any".to_string(),
        }
    }

    /// Parses `python-abi-platform`. Each part may itself be a `.`-joined set.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split('-').collect();
        let [python, abi, platform] = parts[..] else {
            return Err(BuildError::Configuration(format!(
                "compatibility tag `{raw}` must have the form <python>-<abi>-<platform>"
            )));
        };
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.'))
        };
        if !(valid(python) && valid(abi) && valid(platform)) {
            return Err(BuildError::Configuration(format!(
                "compatibility tag `{raw}` contains invalid characters"
            )));
        }
        Ok(Self {
            python: python.to_string(),
            abi: abi.to_string(),
            platform: platform.to_string(),
        })
    }

    /// Pure wheels install into purelib; anything ABI- or platform-bound goes to platlib.
    pub fn is_pure(&self) -> bool {
        self.abi == "none" && self.platform == "any"
    }
}

impl fmt::Display for CompatibilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.python, self.abi, self.platform)
    }
}

/// The tag pinned in `[tool.kiln]`, or the universal tag.
pub fn resolve_tag(model: &ProjectModel) -> Result<CompatibilityTag> {
    match model.tool.tag.as_deref() {
        Some(raw) => CompatibilityTag::parse(raw),
        None => Ok(CompatibilityTag::universal()),
    }
}
