// SPDX-License-Identifier: GPL-3.0-only

use crate::utils::geometry::Size;
use anyhow::{anyhow, Context, Result};
pub use rtpvideo_comp_config::{ColorSpace, ConfigError, RtpVideoConfig};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

pub const CONFIG_FILE: &str = "rtpvideo-comp.ron";

#[derive(Debug)]
pub struct Config {
    pub rtp: RtpVideoConfig,
    /// File the configuration was read from, `None` when running on defaults.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Reads `explicit` if given, otherwise the first config file found in the usual
    /// locations. Falls back to the defaults if there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        if let Some(path) = explicit {
            return Ok(Config {
                rtp: load_file(path)?,
                path: Some(path.to_path_buf()),
            });
        }

        let xdg = xdg::BaseDirectories::new().ok();
        for path in locations(xdg.as_ref()) {
            debug!("Trying config location: {}", path.display());
            if path.exists() {
                info!("Using config at {}", path.display());
                return Ok(Config {
                    rtp: load_file(&path)?,
                    path: Some(path),
                });
            }
        }

        info!("No config file found, using defaults");
        Ok(Config {
            rtp: RtpVideoConfig::default(),
            path: None,
        })
    }
}

fn locations(xdg: Option<&xdg::BaseDirectories>) -> Vec<PathBuf> {
    let mut locations = if let Some(base) = xdg {
        vec![
            base.get_config_file(CONFIG_FILE),
            base.get_config_file("rtpvideo-comp/config.ron"),
        ]
    } else {
        Vec::with_capacity(3)
    };
    if cfg!(debug_assertions) {
        if let Ok(mut cwd) = std::env::current_dir() {
            cwd.push(CONFIG_FILE);
            locations.push(cwd);
        }
    }
    locations.push(PathBuf::from("/etc/rtpvideo-comp/config.ron"));
    locations.push(PathBuf::from("/etc").join(CONFIG_FILE));
    locations
}

pub fn load_file(path: &Path) -> Result<RtpVideoConfig> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("Failed to open config file {}", path.display()))?;
    let config: RtpVideoConfig = ron::de::from_reader(file)
        .with_context(|| format!("Malformed config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

/// Settings given on the command line, taking precedence over the config file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub destination: Option<String>,
    pub port: Option<u16>,
    pub ssrc: Option<u32>,
    pub colorspace: Option<String>,
    pub size: Option<Size>,
}

impl Overrides {
    pub fn apply(&self, config: &mut RtpVideoConfig) {
        if let Some(destination) = &self.destination {
            config.destination_address = Some(destination.clone());
        }
        if let Some(port) = self.port {
            config.destination_port = port;
        }
        if let Some(ssrc) = self.ssrc {
            config.ssrc = Some(ssrc);
        }
        if let Some(colorspace) = &self.colorspace {
            config.colorspace = Some(colorspace.clone());
        }
        if let Some(size) = self.size {
            config.width = size.w;
            config.height = size.h;
        }
    }
}

/// Parses `<width>x<height>`.
pub fn parse_size(value: &str) -> Result<Size> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("Expected <width>x<height>, got {value:?}"))?;
    let size = Size::new(
        w.trim().parse().with_context(|| format!("Invalid width {w:?}"))?,
        h.trim().parse().with_context(|| format!("Invalid height {h:?}"))?,
    );
    if size.is_empty() {
        return Err(anyhow!("Size {size} is empty"));
    }
    Ok(size)
}

/// Parses a decimal or `0x` prefixed hexadecimal SSRC.
pub fn parse_ssrc(value: &str) -> Result<u32> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("Invalid ssrc {value:?}"))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("640x480").unwrap(), Size::new(640, 480));
        assert_eq!(parse_size("1920X1080").unwrap(), Size::new(1920, 1080));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("ax480").is_err());
    }

    #[test]
    fn ssrcs() {
        assert_eq!(parse_ssrc("1234").unwrap(), 1234);
        assert_eq!(parse_ssrc("0xdeadbeef").unwrap(), 0xdead_beef);
        assert!(parse_ssrc("-1").is_err());
        assert!(parse_ssrc("0x1_0000_0000").is_err());
    }

    #[test]
    fn overrides_win() {
        let mut config = RtpVideoConfig::default();
        Overrides {
            destination: Some("127.0.0.1".into()),
            port: Some(5004),
            ssrc: None,
            colorspace: Some("ABGR".into()),
            size: Some(Size::new(320, 240)),
        }
        .apply(&mut config);

        assert_eq!(config.destination_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.destination_port, 5004);
        assert_eq!(config.ssrc, None);
        assert_eq!(config.colorspace().unwrap(), ColorSpace::Abgr);
        assert_eq!((config.width, config.height), (320, 240));
    }

    #[test]
    fn explicit_file() {
        let path = write_temp(
            "explicit.ron",
            r#"(version: 1, destination_port: 5004, colorspace: Some("BGR"))"#,
        );
        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.path.as_deref(), Some(path.as_path()));
        assert_eq!(config.rtp.destination_port, 5004);
        assert_eq!(config.rtp.destination_address.as_deref(), Some("232.0.0.1"));
        assert_eq!(config.rtp.colorspace().unwrap(), ColorSpace::Bgr);
    }

    #[test]
    fn invalid_files() {
        let path = write_temp("version.ron", "(version: 3)");
        let err = load_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Version { found: 3, .. })
        ));

        let path = write_temp("colorspace.ron", r#"(colorspace: Some("YUV"))"#);
        let err = load_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownColorSpace("YUV".into()))
        );

        let path = write_temp("malformed.ron", "(version: ");
        assert!(load_file(&path).is_err());
        std::fs::remove_file(&path).unwrap();

        assert!(load_file(Path::new("/nonexistent/rtpvideo-comp.ron")).is_err());
    }
}
