//! Configuration validation.

use crate::config::{Config, StoreKind};

/// Validate the configuration.
///
/// Checks for:
/// - A known log level
/// - A usable metrics path and address
/// - A non-zero query timeout
/// - The settings required by the selected store backend
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    // Validate metrics endpoint
    let metrics = &config.global.metrics;
    if metrics.enabled {
        if !metrics.path.starts_with('/') {
            errors.push(format!("metrics path '{}' must start with '/'", metrics.path));
        }
        if metrics.address == config.server.listen {
            errors.push(format!(
                "metrics address {} conflicts with server listen address",
                metrics.address
            ));
        }
    }

    if config.server.query_timeout.is_zero() {
        errors.push("server.query_timeout must be greater than zero".to_string());
    }

    if let Some(dir) = &config.server.static_dir {
        if dir.as_os_str().is_empty() {
            errors.push("server.static_dir cannot be empty".to_string());
        }
    }

    // Validate store backend settings
    let store = &config.store;
    match store.kind {
        StoreKind::File => match &store.path {
            None => errors.push("file store requires store.path".to_string()),
            Some(path) if path.as_os_str().is_empty() => {
                errors.push("store.path cannot be empty".to_string())
            }
            Some(_) => {}
        },
        StoreKind::Postgrest => {
            match store.url.as_deref() {
                None => errors.push("postgrest store requires store.url".to_string()),
                Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                    errors.push(format!("store.url '{}' must be an http(s) URL", url))
                }
                Some(_) => {}
            }
            if store.table.is_empty() {
                errors.push("store.table cannot be empty".to_string());
            }
            if store.watch {
                errors.push("store.watch is only supported for file stores".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
