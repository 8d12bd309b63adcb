/// Device grouping keys
///
/// A `DeviceGroupKey` is a heuristic: requests from identically configured
/// devices collapse onto the same key. It is a dedup key for the device
/// ceiling, never an identity.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Placeholder key for headless or signal-less clients
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Client-reported environment signals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSignals {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub screen_width: Option<u32>,
    #[serde(default)]
    pub screen_height: Option<u32>,
    #[serde(default)]
    pub color_depth: Option<u32>,
    #[serde(default)]
    pub pixel_ratio: Option<f32>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl ClientSignals {
    fn is_empty(&self) -> bool {
        self.user_agent.as_deref().map_or(true, str::is_empty)
            && self.screen_width.is_none()
            && self.screen_height.is_none()
            && self.color_depth.is_none()
            && self.pixel_ratio.is_none()
            && self.platform.as_deref().map_or(true, str::is_empty)
            && self.language.as_deref().map_or(true, str::is_empty)
            && self.timezone.as_deref().map_or(true, str::is_empty)
    }
}

/// Collision-tolerant device grouping key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceGroupKey(String);

impl DeviceGroupKey {
    /// Derive a key from client signals. Deterministic and side-effect free.
    pub fn derive(signals: &ClientSignals) -> Self {
        if signals.is_empty() {
            return Self::unknown();
        }

        let (os, browser) = signals
            .user_agent
            .as_deref()
            .map(coarse_user_agent)
            .unwrap_or(("unknown-os", String::from("unknown-browser")));

        let material = [
            os.to_string(),
            browser,
            format!(
                "{}x{}",
                signals.screen_width.unwrap_or(0),
                signals.screen_height.unwrap_or(0)
            ),
            signals.color_depth.unwrap_or(0).to_string(),
            // Two decimals is enough to separate 1x/1.25x/1.5x/2x/3x displays
            format!("{:.2}", signals.pixel_ratio.unwrap_or(0.0)),
            normalize(signals.platform.as_deref()),
            normalize(signals.language.as_deref()),
            signals.timezone.clone().unwrap_or_default(),
        ]
        .join("|");

        let digest = Sha256::digest(material.as_bytes());
        Self(format!("dg-{}", &hex::encode(digest)[..24]))
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_DEVICE.to_string())
    }

    /// Wrap a value read back from storage
    pub fn from_stored(value: String) -> Self {
        if value.is_empty() {
            Self::unknown()
        } else {
            Self(value)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_DEVICE
    }
}

impl fmt::Display for DeviceGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_lowercase()).unwrap_or_default()
}

/// Reduce a user agent to (OS family, browser family/major version).
///
/// Patch versions and build ids change on every update; keeping them would
/// split one device into many.
fn coarse_user_agent(ua: &str) -> (&'static str, String) {
    let os = if ua.contains("Windows") {
        "windows"
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        "ios"
    } else if ua.contains("Android") {
        "android"
    } else if ua.contains("CrOS") {
        "chromeos"
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        "macos"
    } else if ua.contains("Linux") {
        "linux"
    } else {
        "other-os"
    };

    // Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari.
    let families = [
        ("Edg/", "edge"),
        ("OPR/", "opera"),
        ("Firefox/", "firefox"),
        ("FxiOS/", "firefox"),
        ("CriOS/", "chrome"),
        ("Chrome/", "chrome"),
        ("Version/", "safari"),
    ];

    for (marker, family) in families {
        if let Some(idx) = ua.find(marker) {
            let major: String = ua[idx + marker.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            return (os, format!("{}/{}", family, if major.is_empty() { "0" } else { major.as_str() }));
        }
    }

    (os, String::from("other-browser"))
}
