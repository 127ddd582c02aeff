//! `flagproxy validate`: check an options file for errors.
//!
//! Parses and validates the options file, reporting results in either
//! human-readable text or machine-readable JSON format.

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::sources::parse_options_str;
use crate::config::trust::TrustProxy;
use crate::config::validation;
use crate::error::ProxyError;

pub fn execute(args: &ValidateArgs) -> Result<(), ProxyError> {
    let path = &args.config;

    if !path.exists() {
        return Err(ProxyError::ConfigFileNotFound { path: path.clone() });
    }

    let content = std::fs::read_to_string(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let options = parse_options_str(ext, &content, &path.display().to_string())?;

    if let Err(errors) = validation::validate(&options) {
        match args.format {
            ValidateFormat::Text => {
                eprintln!("\u{2717} {} has {} errors\n", path.display(), errors.len());
                for error in &errors {
                    eprintln!("{error}");
                }
            }
            ValidateFormat::Json => {
                let json_errors: Vec<serde_json::Value> = errors
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "field": e.field,
                            "message": e.message,
                            "suggestion": e.suggestion,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "valid": false,
                        "errors": json_errors,
                    })
                );
            }
        }
        return Err(ProxyError::ConfigValidation { errors });
    }

    // An unusable trustProxy does not stop the server, so report it as a warning.
    let trust_warning = options
        .trust_proxy
        .as_ref()
        .and_then(|setting| TrustProxy::parse(setting).err())
        .map(|e| e.to_string());

    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&path.display().to_string(), &options)
            );
            if let Some(ref warning) = trust_warning {
                eprintln!("  warning: {warning}");
            }
        }
        ValidateFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "bootstrap": options.bootstrap.len(),
                    "warnings": trust_warning.into_iter().collect::<Vec<_>>(),
                })
            );
        }
    }

    Ok(())
}
