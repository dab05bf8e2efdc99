//! `roar config {list,get,set}` (§6).
//!
//! Grounded on `original_source/roar/cli/commands/config.py`; the key
//! catalog mirrors its hardcoded `CONFIG_KEYS` table (no equivalent
//! exists in `roar-config`, which only knows the typed struct shape).

use anyhow::{bail, Context, Result};

use crate::paths::find_roar_dir;

/// `(dotted key, description, default)`.
const CONFIG_KEYS: &[(&str, &str, &str)] = &[
    ("output.json", "emit --json by default", "false"),
    ("output.quiet", "suppress non-essential output", "false"),
    ("output.no_color", "disable ANSI colors", "false"),
    ("analyzers.experiment_trackers", "detect experiment-tracker URLs", "true"),
    ("filters.system_reads", "ignore system file reads", "true"),
    ("filters.torch_cache", "ignore torch/triton cache churn", "true"),
    ("filters.package_reads", "ignore reads resolved to installed packages", "true"),
    ("filters.temp_files", "ignore /tmp writes unless cleanup.strict", "true"),
    ("cleanup.strict", "delete /tmp writes made during the run", "false"),
    ("glaas.url", "GLaaS server URL", "(unset; $GLAAS_URL overrides)"),
    ("glaas.key", "path to the SSH private key used for signing", "(unset; $ROAR_SSH_KEY overrides)"),
    ("registration.batch_max_bytes", "target artifact batch size in bytes", "92160"),
    ("registration.link_batch_max_count", "max I/O links per batch", "100"),
    ("hash.algorithms", "hash algorithms computed for every observed file", "[\"blake3\"]"),
    ("reversible.enabled", "back up outputs before a re-run overwrites them", "false"),
    ("logging.level", "log level (error, warn, info, debug, trace)", "info"),
    ("logging.json", "emit JSON-formatted log lines", "false"),
];

pub fn cmd_config_list(json: bool) -> Result<i32> {
    if json {
        let entries: Vec<_> = CONFIG_KEYS
            .iter()
            .map(|(key, desc, default)| serde_json::json!({"key": key, "description": desc, "default": default}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }
    for (key, desc, default) in CONFIG_KEYS {
        println!("{key:<40} {desc} (default: {default})");
    }
    Ok(0)
}

pub fn cmd_config_get(key: &str, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let config = roar_config::load_config(paths.is_initialized().then(|| paths.config_path()).as_deref())
        .context("load config")?;

    let value = roar_config::get(&config, key);
    if json {
        println!("{}", serde_json::json!({"key": key, "value": value}));
    } else {
        match value {
            Some(v) => println!("{key}: {v}"),
            None => println!("{key}: (not set)"),
        }
    }
    Ok(0)
}

pub fn cmd_config_set(key: &str, value: &str, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        bail!("not a roar project (run `roar init` first)");
    }

    let raw = std::fs::read_to_string(paths.config_path()).context("read config.toml")?;
    let updated = roar_config::set_raw(&raw, key, value).context("update config value")?;

    // Validate before committing to disk, mirroring the Python
    // `config_set`'s load-parse-validate-then-write sequence.
    let parsed = roar_config::parse_toml(&updated).context("parsed config is invalid")?;
    roar_config::validate_config(&parsed, &updated).context("validate updated config")?;

    std::fs::write(paths.config_path(), &updated).context("write config.toml")?;

    let typed = roar_config::get(&parsed, key).unwrap_or_else(|| value.to_string());
    if json {
        println!("{}", serde_json::json!({"key": key, "value": typed}));
    } else {
        println!("Set {key} = {typed}");
        println!("Saved to {}", paths.config_path().display());
    }
    Ok(0)
}
