use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const ENV_USE_TZ: &str = "LOOKUP_PROPERTY_USE_TZ";
pub const ENV_COMPILE_DEBUG: &str = "LOOKUP_PROPERTY_COMPILE_DEBUG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `now()` yields UTC timestamps when set, local-offset timestamps otherwise.
    pub use_tz: bool,
    /// Escalate per-property compile reports from `debug` to `info`.
    pub compile_debug: bool,
    /// Bound on nested property evaluation and expansion.
    pub max_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_tz: true,
            compile_debug: false,
            max_depth: 32,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(use_tz) = std::env::var(ENV_USE_TZ).ok().and_then(|raw| parse_flag(&raw)) {
            settings.use_tz = use_tz;
        }
        settings.compile_debug = compile_debug_enabled();
        settings
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn with_use_tz(mut self, use_tz: bool) -> Self {
        self.use_tz = use_tz;
        self
    }
}

pub(crate) fn compile_debug_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(ENV_COMPILE_DEBUG)
            .ok()
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(false)
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    let v = raw.trim().to_ascii_lowercase();
    match v.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag(" On "), Some(true));
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn json_fills_missing_keys_with_defaults() {
        let settings = Settings::from_json(r#"{"use_tz": false}"#).expect("settings should parse");
        assert!(!settings.use_tz);
        assert_eq!(settings.max_depth, Settings::default().max_depth);
    }
}
