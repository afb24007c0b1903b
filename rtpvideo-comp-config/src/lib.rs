// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Version of the on-disk configuration layout understood by this crate.
pub const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_DESTINATION_ADDRESS: &str = "232.0.0.1";
pub const DEFAULT_DESTINATION_PORT: u16 = 49410;
pub const DEFAULT_WIDTH: i32 = 640;
pub const DEFAULT_HEIGHT: i32 = 480;

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_destination_address() -> Option<String> {
    Some(DEFAULT_DESTINATION_ADDRESS.to_string())
}

fn default_destination_port() -> u16 {
    DEFAULT_DESTINATION_PORT
}

fn default_width() -> i32 {
    DEFAULT_WIDTH
}

fn default_height() -> i32 {
    DEFAULT_HEIGHT
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RtpVideoConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default)]
    pub bind_port: u16,
    /// `None` streams to nobody, the output still runs.
    #[serde(default = "default_destination_address")]
    pub destination_address: Option<String>,
    #[serde(default = "default_destination_port")]
    pub destination_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    /// One of `RGB`, `ARGB`, `BGR` or `ABGR`. Parsed by the backend, so that a typo
    /// is reported as a configuration error instead of a deserialization failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorspace: Option<String>,
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
}

impl Default for RtpVideoConfig {
    fn default() -> Self {
        RtpVideoConfig {
            version: CONFIG_VERSION,
            bind_address: None,
            bind_port: 0,
            destination_address: default_destination_address(),
            destination_port: DEFAULT_DESTINATION_PORT,
            ssrc: None,
            colorspace: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl RtpVideoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Version {
                found: self.version,
                expected: CONFIG_VERSION,
            });
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(ConfigError::Size(self.width, self.height));
        }
        self.colorspace()?;
        Ok(())
    }

    /// Resolved pixel format selector, `RGB` when unset.
    pub fn colorspace(&self) -> Result<ColorSpace, ConfigError> {
        match self.colorspace.as_deref() {
            None => Ok(ColorSpace::default()),
            Some(name) => name.parse(),
        }
    }
}

/// Component order requested for the scanlines put on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ColorSpace {
    #[default]
    Rgb,
    Argb,
    Bgr,
    Abgr,
}

impl ColorSpace {
    pub const ALL: [ColorSpace; 4] = [
        ColorSpace::Rgb,
        ColorSpace::Argb,
        ColorSpace::Bgr,
        ColorSpace::Abgr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorSpace::Rgb => "RGB",
            ColorSpace::Argb => "ARGB",
            ColorSpace::Bgr => "BGR",
            ColorSpace::Abgr => "ABGR",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorSpace {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorSpace::ALL
            .into_iter()
            .find(|space| space.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownColorSpace(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown colorspace: {0}. Must be one of RGB, ARGB, BGR, ABGR")]
    UnknownColorSpace(String),
    #[error("Unsupported configuration version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("Invalid output size {0}x{1}")]
    Size(i32, i32),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn colorspace_names() {
        for space in ColorSpace::ALL {
            assert_eq!(space.as_str().parse::<ColorSpace>(), Ok(space));
        }
        assert_eq!(
            "rgb".parse::<ColorSpace>(),
            Err(ConfigError::UnknownColorSpace("rgb".into()))
        );
        assert_eq!(
            "YUV".parse::<ColorSpace>().unwrap_err().to_string(),
            "Unknown colorspace: YUV. Must be one of RGB, ARGB, BGR, ABGR"
        );
    }

    #[test]
    fn defaults() {
        let config = RtpVideoConfig::default();
        assert_eq!(config.destination_address.as_deref(), Some("232.0.0.1"));
        assert_eq!(config.destination_port, 49410);
        assert_eq!(config.ssrc, None);
        assert_eq!(config.colorspace(), Ok(ColorSpace::Rgb));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: RtpVideoConfig =
            ron::from_str(r#"(destination_port: 5004, colorspace: Some("BGR"))"#).unwrap();
        assert_eq!(config.destination_port, 5004);
        assert_eq!(config.destination_address.as_deref(), Some("232.0.0.1"));
        assert_eq!(config.colorspace(), Ok(ColorSpace::Bgr));
        assert_eq!((config.width, config.height), (640, 480));
    }

    #[test]
    fn rejects_bad_config() {
        let config = RtpVideoConfig {
            version: 2,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Version {
                found: 2,
                expected: 1
            })
        );

        let config = RtpVideoConfig {
            colorspace: Some("RGBA".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownColorSpace(_))
        ));
    }
}
