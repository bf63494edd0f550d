// Config Resolver
// Merges document metadata, caller settings and system defaults

use serde_json::Value;
use tracing::debug;

use crate::domain::environment::slugify;
use crate::domain::{
    AppMeta, CallerSettings, Mode, OutputFormat, ResolvedSettings, SettingSource, SystemDefaults,
};
use crate::error::{AppError, Result};

/// Resolve the execution settings of one app invocation
///
/// Precedence per field, highest first:
/// 1. caller value, when the caller is in override mode
/// 2. document metadata value
/// 3. caller value
/// 4. system default
///
/// The environment has no system default: without an explicit name, an app
/// declaring packages gets an environment named after its slug, and an app
/// without packages runs in the host environment.
///
/// # Errors
/// - AppError::Config for non-positive timeouts, unknown modes/formats or blank names
pub fn resolve(
    app_name: &str,
    meta: &AppMeta,
    caller: &CallerSettings,
    defaults: &SystemDefaults,
) -> Result<ResolvedSettings> {
    let document = &meta.settings;
    let supplied = &caller.settings;
    let override_mode = caller.override_mode;

    let timeout_secs = match pick(&document.timeout, &supplied.timeout, override_mode) {
        Some((value, source)) => timeout_secs(value, source)?,
        None => defaults.timeout_secs,
    };

    let mode = match pick(&document.mode, &supplied.mode, override_mode) {
        Some((value, source)) => text("mode", value, source)?
            .parse::<Mode>()
            .map_err(AppError::Config)?,
        None => defaults.mode,
    };

    let format = match pick(&document.format, &supplied.format, override_mode) {
        Some((value, source)) => text("format", value, source)?
            .parse::<OutputFormat>()
            .map_err(AppError::Config)?,
        None => defaults.format,
    };

    let output = match pick(&document.output, &supplied.output, override_mode) {
        Some((value, source)) => Some(text("output", value, source)?.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string),
        None => None,
    };

    let (env, env_source) = match pick(&document.env, &supplied.env, override_mode) {
        Some((value, source)) => {
            let name = text("env", value, source)?.trim();
            if name.is_empty() {
                return Err(AppError::Config("environment name must not be empty".into()));
            }
            (Some(name.to_string()), source)
        }
        None if !meta.pkgs.is_empty() => (Some(slugify(app_name)), SettingSource::Default),
        None => (None, SettingSource::Default),
    };

    let resolved = ResolvedSettings {
        timeout_secs,
        mode,
        format,
        output,
        env,
        env_source,
    };
    debug!(app = %app_name, override_mode, settings = ?resolved, "Resolved settings");
    Ok(resolved)
}

/// Choose between a document value and a caller value
fn pick<'a>(
    document: &'a Option<Value>,
    caller: &'a Option<Value>,
    override_mode: bool,
) -> Option<(&'a Value, SettingSource)> {
    match (document.as_ref(), caller.as_ref()) {
        (_, Some(c)) if override_mode => Some((c, SettingSource::Caller)),
        (Some(d), _) => Some((d, SettingSource::Document)),
        (None, Some(c)) => Some((c, SettingSource::Caller)),
        (None, None) => None,
    }
}

/// Whole positive seconds, as a JSON integer or a string of digits
fn timeout_secs(value: &Value, source: SettingSource) -> Result<u64> {
    let secs = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match secs {
        Some(secs) if secs > 0 => Ok(secs as u64),
        _ => Err(AppError::Config(format!(
            "timeout must be a positive whole number of seconds, got {} ({})",
            value,
            source_label(source)
        ))),
    }
}

fn text<'a>(field: &str, value: &'a Value, source: SettingSource) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        AppError::Config(format!(
            "{} must be a string, got {} ({})",
            field,
            value,
            source_label(source)
        ))
    })
}

fn source_label(source: SettingSource) -> &'static str {
    match source {
        SettingSource::Caller => "caller",
        SettingSource::Document => "document metadata",
        SettingSource::Default => "default",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawSettings;
    use serde_json::json;

    fn meta_with(settings: RawSettings, pkgs: &[&str]) -> AppMeta {
        AppMeta {
            settings,
            pkgs: pkgs.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    fn caller(settings: RawSettings, override_mode: bool) -> CallerSettings {
        CallerSettings {
            settings,
            override_mode,
        }
    }

    #[test]
    fn test_override_mode_caller_wins() {
        let meta = meta_with(
            RawSettings {
                timeout: Some(30.into()),
                ..Default::default()
            },
            &[],
        );
        let supplied = RawSettings {
            timeout: Some(5.into()),
            ..Default::default()
        };

        let on = resolve("app", &meta, &caller(supplied.clone(), true), &SystemDefaults::default())
            .unwrap();
        assert_eq!(on.timeout_secs, 5);

        let off = resolve("app", &meta, &caller(supplied, false), &SystemDefaults::default())
            .unwrap();
        assert_eq!(off.timeout_secs, 30);
    }

    #[test]
    fn test_caller_fills_gaps_then_defaults() {
        let meta = meta_with(
            RawSettings {
                mode: Some("stream".into()),
                ..Default::default()
            },
            &[],
        );
        let supplied = RawSettings {
            mode: Some("quiet".into()),
            format: Some("md".into()),
            ..Default::default()
        };
        let resolved =
            resolve("app", &meta, &caller(supplied, false), &SystemDefaults::default()).unwrap();
        assert_eq!(resolved.mode, Mode::Stream);
        assert_eq!(resolved.format, OutputFormat::Markdown);
        assert_eq!(resolved.timeout_secs, 10);
        assert_eq!(resolved.output, None);
    }

    #[test]
    fn test_override_without_value_keeps_document() {
        let meta = meta_with(
            RawSettings {
                format: Some("py".into()),
                ..Default::default()
            },
            &[],
        );
        let resolved = resolve(
            "app",
            &meta,
            &caller(RawSettings::default(), true),
            &SystemDefaults::default(),
        )
        .unwrap();
        assert_eq!(resolved.format, OutputFormat::Python);
    }

    #[test]
    fn test_env_defaults_to_slug_when_packages_declared() {
        let meta = meta_with(RawSettings::default(), &["numpy"]);
        let resolved = resolve(
            "Sales Report",
            &meta,
            &CallerSettings::default(),
            &SystemDefaults::default(),
        )
        .unwrap();
        assert_eq!(resolved.env.as_deref(), Some("sales-report"));
        assert_eq!(resolved.env_source, SettingSource::Default);
    }

    #[test]
    fn test_no_packages_means_host_env() {
        let meta = meta_with(RawSettings::default(), &[]);
        let resolved =
            resolve("app", &meta, &CallerSettings::default(), &SystemDefaults::default()).unwrap();
        assert_eq!(resolved.env, None);
    }

    #[test]
    fn test_caller_env_source_recorded() {
        let meta = meta_with(RawSettings::default(), &["numpy"]);
        let supplied = RawSettings {
            env: Some("analysis".into()),
            ..Default::default()
        };
        let resolved =
            resolve("app", &meta, &caller(supplied, false), &SystemDefaults::default()).unwrap();
        assert_eq!(resolved.env.as_deref(), Some("analysis"));
        assert_eq!(resolved.env_source, SettingSource::Caller);
    }

    #[test]
    fn test_malformed_settings_rejected() {
        let defaults = SystemDefaults::default();
        for bad in [
            RawSettings {
                timeout: Some(0.into()),
                ..Default::default()
            },
            RawSettings {
                timeout: Some((-4).into()),
                ..Default::default()
            },
            RawSettings {
                mode: Some("api".into()),
                ..Default::default()
            },
            RawSettings {
                format: Some("pdf".into()),
                ..Default::default()
            },
            RawSettings {
                env: Some("  ".into()),
                ..Default::default()
            },
            RawSettings {
                timeout: Some(json!(2.5)),
                ..Default::default()
            },
            RawSettings {
                timeout: Some(json!("ten")),
                ..Default::default()
            },
            RawSettings {
                mode: Some(json!(3)),
                ..Default::default()
            },
            RawSettings {
                env: Some(json!(["a"])),
                ..Default::default()
            },
        ] {
            let meta = meta_with(bad, &[]);
            let err = resolve("app", &meta, &CallerSettings::default(), &defaults).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "got {:?}", err);
        }
    }

    #[test]
    fn test_numeric_string_timeout_accepted() {
        let meta = meta_with(
            RawSettings {
                timeout: Some(json!(" 25 ")),
                ..Default::default()
            },
            &[],
        );
        let resolved =
            resolve("app", &meta, &CallerSettings::default(), &SystemDefaults::default()).unwrap();
        assert_eq!(resolved.timeout_secs, 25);
    }

    #[test]
    fn test_mistyped_document_settings_are_config_errors() {
        let meta: AppMeta = serde_json::from_value(json!({
            "inputs": {},
            "timeout": 1.5,
            "format": false
        }))
        .unwrap();
        let err = resolve("app", &meta, &CallerSettings::default(), &SystemDefaults::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ref msg) if msg.contains("1.5")), "{:?}", err);
        assert_eq!(err.exit_code(), 1);
    }
}
