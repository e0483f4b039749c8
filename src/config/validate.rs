// src/config/validate.rs

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{GatedagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = GatedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let synthesizer = raw.synthesizer.ok_or_else(|| {
            GatedagError::ConfigError("config must contain a [synthesizer] section".to_string())
        })?;
        Ok(ConfigFile::new_unchecked(
            raw.config,
            raw.planner,
            raw.processor,
            synthesizer,
        ))
    }
}

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - there is at least one `[processor.<kind>]` and a `[synthesizer]`
/// - every command is non-blank
/// - every processor has exactly one of `validator` / `accept_pattern`
/// - `accept_pattern` regexes compile
/// - all duration strings parse
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_processors(cfg)?;
    validate_global_config(cfg)?;
    validate_planner(cfg)?;
    validate_processors(cfg)?;
    validate_synthesizer(cfg)?;
    Ok(())
}

fn ensure_has_processors(cfg: &RawConfigFile) -> Result<()> {
    if cfg.processor.is_empty() {
        return Err(GatedagError::ConfigError(
            "config must contain at least one [processor.<kind>] section".to_string(),
        ));
    }
    if cfg.synthesizer.is_none() {
        return Err(GatedagError::ConfigError(
            "config must contain a [synthesizer] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    check_timeout("[config].default_timeout", cfg.config.default_timeout.as_deref())
}

fn validate_planner(cfg: &RawConfigFile) -> Result<()> {
    if let Some(planner) = &cfg.planner {
        check_cmd("[planner].cmd", &planner.cmd)?;
        check_timeout("[planner].timeout", planner.timeout.as_deref())?;
    }
    Ok(())
}

fn validate_processors(cfg: &RawConfigFile) -> Result<()> {
    for (kind, processor) in cfg.processor.iter() {
        if kind.trim().is_empty() {
            return Err(GatedagError::ConfigError(
                "processor kinds must not be blank".to_string(),
            ));
        }

        check_cmd(&format!("[processor.{kind}].cmd"), &processor.cmd)?;
        check_timeout(
            &format!("[processor.{kind}].timeout"),
            processor.timeout.as_deref(),
        )?;

        match (&processor.validator, &processor.accept_pattern) {
            (Some(validator), None) => {
                check_cmd(&format!("[processor.{kind}].validator"), validator)?;
            }
            (None, Some(pattern)) => {
                Regex::new(pattern).map_err(|e| {
                    GatedagError::ConfigError(format!(
                        "[processor.{kind}].accept_pattern is not a valid regex: {e}"
                    ))
                })?;
            }
            (Some(_), Some(_)) => {
                return Err(GatedagError::ConfigError(format!(
                    "processor '{kind}' sets both `validator` and `accept_pattern`; pick one"
                )));
            }
            (None, None) => {
                return Err(GatedagError::ConfigError(format!(
                    "processor '{kind}' needs either `validator` or `accept_pattern`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_synthesizer(cfg: &RawConfigFile) -> Result<()> {
    if let Some(synth) = &cfg.synthesizer {
        check_cmd("[synthesizer].cmd", &synth.cmd)?;
        check_timeout("[synthesizer].timeout", synth.timeout.as_deref())?;
    }
    Ok(())
}

fn check_cmd(field: &str, cmd: &str) -> Result<()> {
    if cmd.trim().is_empty() {
        return Err(GatedagError::ConfigError(format!("{field} must not be blank")));
    }
    Ok(())
}

fn check_timeout(field: &str, value: Option<&str>) -> Result<()> {
    if let Some(s) = value {
        parse_duration(s)
            .map_err(|e| GatedagError::ConfigError(format!("{field}: {e}")))?;
    }
    Ok(())
}
