//! `roar env {set,get,list,unset}` (§6): a persistent env-var map in
//! `.roar/config.toml`, injected into traced subprocess environments.
//!
//! Grounded on `original_source/roar/cli/commands/env.py`.

use anyhow::{bail, Context, Result};
use roar_config::RoarConfig;

use crate::paths::find_roar_dir;

fn load(paths: &crate::paths::RoarPaths) -> Result<RoarConfig> {
    if !paths.is_initialized() {
        bail!("not a roar project (run `roar init` first)");
    }
    roar_config::load_config(Some(&paths.config_path())).context("load config")
}

fn save(paths: &crate::paths::RoarPaths, config: &RoarConfig) -> Result<()> {
    let toml = toml::to_string_pretty(config).context("serialize config")?;
    std::fs::write(paths.config_path(), toml).context("write config.toml")
}

pub fn cmd_env_set(name: &str, value: &str, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let mut config = load(&paths)?;
    config.env.insert(name.to_string(), value.to_string());
    save(&paths, &config)?;
    if json {
        println!("{}", serde_json::json!({"name": name, "value": value}));
    } else {
        println!("Set {name}={value}");
    }
    Ok(0)
}

pub fn cmd_env_get(name: &str, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let config = load(&paths)?;
    match config.env.get(name) {
        Some(value) => {
            if json {
                println!("{}", serde_json::json!({"name": name, "value": value}));
            } else {
                println!("{value}");
            }
            Ok(0)
        }
        None => {
            eprintln!("Environment variable not set: {name}");
            Ok(1)
        }
    }
}

pub fn cmd_env_list(json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let config = load(&paths)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config.env)?);
        return Ok(0);
    }
    if config.env.is_empty() {
        println!("No environment variables set.");
        return Ok(0);
    }
    for (name, value) in &config.env {
        println!("{name}={value}");
    }
    Ok(0)
}

pub fn cmd_env_unset(name: &str, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let mut config = load(&paths)?;
    if config.env.remove(name).is_none() {
        eprintln!("Environment variable not set: {name}");
        return Ok(1);
    }
    save(&paths, &config)?;
    if json {
        println!("{}", serde_json::json!({"name": name, "unset": true}));
    } else {
        println!("Unset {name}");
    }
    Ok(0)
}
