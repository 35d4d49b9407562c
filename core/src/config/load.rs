use std::path::Path;

use super::types::EngineConfig;

/// Load engine defaults: `config.toml` in the working directory when
/// present, then `RULEGATE_*` environment overrides on top.
pub fn load_default() -> anyhow::Result<EngineConfig> {
    let mut cfg: EngineConfig = if Path::new("config.toml").exists() {
        let s = std::fs::read_to_string("config.toml")?;
        toml::from_str::<EngineConfig>(&s)?
    } else {
        EngineConfig::default()
    };

    if let Ok(v) = std::env::var("RULEGATE_DEFAULT_TIMEOUT_MS") {
        if let Ok(ms) = v.trim().parse() {
            cfg.default_timeout_ms = ms;
        }
    }
    if let Ok(v) = std::env::var("RULEGATE_MAX_CALL_DEPTH") {
        if let Ok(depth) = v.trim().parse() {
            cfg.max_call_depth = depth;
        }
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use crate::sandbox::RuleLogMode;

    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_timeout_ms, 5000);
        assert_eq!(cfg.default_log_mode, RuleLogMode::Drop);
        assert_eq!(cfg.max_call_depth, 256);
    }

    #[test]
    fn toml_roundtrip_with_partial_file() {
        let cfg: EngineConfig = toml::from_str("default_timeout_ms = 250\n").unwrap();
        assert_eq!(cfg.default_timeout_ms, 250);
        assert_eq!(cfg.max_call_depth, 256);
    }

    #[test]
    fn log_mode_parses_lowercase() {
        let cfg: EngineConfig = toml::from_str("default_log_mode = \"capture\"\n").unwrap();
        assert_eq!(cfg.default_log_mode, RuleLogMode::Capture);
    }
}
