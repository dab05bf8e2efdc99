//! `roar auth {register,test,status}` (§6): SSH-key discovery and a
//! round-trip check against the LaaS server.
//!
//! Grounded on `original_source/roar/cli/commands/auth.py`. `roar-http`
//! keeps its own SSH-pubkey discovery private to `signing.rs` (it only
//! needs the private key, for signing), so this reimplements the same
//! priority search the Python original's independent `_find_ssh_pubkey`
//! does: `$ROAR_SSH_KEY` env -> `glaas.key` config -> `~/.ssh/` defaults.

use anyhow::{Context, Result};
use roar_http::{compute_pubkey_fingerprint, GlaasClient};

use crate::paths::find_roar_dir;

struct FoundKey {
    key_type: String,
    pubkey: String,
    path: String,
}

fn read_pubkey_at(private_key_path: &str) -> Option<FoundKey> {
    let pub_path = format!("{private_key_path}.pub");
    let content = std::fs::read_to_string(&pub_path).ok()?;
    let content = content.trim().to_string();
    let mut parts = content.split_whitespace();
    let key_type = parts.next()?.to_string();
    Some(FoundKey { key_type, pubkey: content, path: pub_path })
}

fn find_ssh_pubkey(glaas_key: Option<&str>) -> Option<FoundKey> {
    if let Ok(env_key) = std::env::var("ROAR_SSH_KEY") {
        if let Some(found) = read_pubkey_at(&env_key) {
            return Some(found);
        }
    }

    if let Some(config_key) = glaas_key {
        if let Some(found) = read_pubkey_at(config_key) {
            return Some(found);
        }
    }

    let home = std::env::var("HOME").ok()?;
    let ssh_dir = std::path::Path::new(&home).join(".ssh");
    if !ssh_dir.exists() {
        return None;
    }

    for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
        if let Some(found) = read_pubkey_at(&ssh_dir.join(name).to_string_lossy()) {
            return Some(found);
        }
    }

    let entries = std::fs::read_dir(&ssh_dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("pub") {
            if let Ok(content) = std::fs::read_to_string(&path) {
                let content = content.trim().to_string();
                let mut parts = content.split_whitespace();
                if let Some(key_type) = parts.next() {
                    if parts.next().is_some() {
                        return Some(FoundKey { key_type: key_type.to_string(), pubkey: content, path: path.to_string_lossy().to_string() });
                    }
                }
            }
        }
    }

    None
}

fn load_glaas_key() -> Option<String> {
    let cwd = std::env::current_dir().ok()?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        return None;
    }
    let config = roar_config::load_config(Some(&paths.config_path())).ok()?;
    config.glaas.key
}

pub fn cmd_auth_register() -> Result<i32> {
    let glaas_key = load_glaas_key();
    let Some(found) = find_ssh_pubkey(glaas_key.as_deref()) else {
        println!("No SSH public key found.");
        println!();
        println!("Generate one with:");
        println!("  ssh-keygen -t ed25519");
        println!();
        println!("Then run `roar auth register` again.");
        return Ok(1);
    };

    println!("Your SSH public key:");
    println!();
    println!("  {}", found.pubkey);
    println!();
    println!("Key type: {}", found.key_type);
    println!("Path: {}", found.path);
    println!();
    println!("Copy and paste this key when you sign up at https://glaas.ai");
    Ok(0)
}

pub fn cmd_auth_test() -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let config = if paths.is_initialized() {
        roar_config::load_config(Some(&paths.config_path())).context("load config")?
    } else {
        roar_config::RoarConfig::default()
    };

    let glaas_url = config.glaas.url.clone().or_else(|| std::env::var("GLAAS_URL").ok());
    let Some(glaas_url) = glaas_url else {
        println!("GLaaS server URL not configured.");
        println!();
        println!("Set it with:");
        println!("  roar config set glaas.url https://glaas.example.com");
        println!();
        println!("Or set GLAAS_URL environment variable.");
        return Ok(1);
    };

    println!("Testing connection to {glaas_url}...");

    let client = GlaasClient::new(config.glaas.clone(), Some(glaas_url.clone()));
    let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    if let Err(e) = rt.block_on(client.health_check()) {
        println!("Failed to connect: {e}");
        return Ok(1);
    }
    println!("Server is reachable.");

    println!("Testing authentication...");
    let Some(found) = find_ssh_pubkey(config.glaas.key.as_deref()) else {
        println!("No SSH key found. Run `roar auth register` first.");
        return Ok(1);
    };
    let fingerprint = compute_pubkey_fingerprint(&found.pubkey).context("compute key fingerprint")?;
    println!("Using key: {}", found.path);
    println!("Fingerprint: {fingerprint}");

    match rt.block_on(client.get_artifact("00000000")) {
        Ok(_) => println!("Authentication successful!"),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("404") {
                println!("Authentication successful!");
            } else if msg.contains("401") {
                println!("Authentication failed: {msg}");
                println!();
                println!("Your key may not be registered with the server.");
                println!("Sign up for GLaaS at https://glaas.ai where you can paste your public key.");
                return Ok(1);
            } else {
                println!("Server error: {msg}");
                return Ok(1);
            }
        }
    }

    Ok(0)
}

pub fn cmd_auth_status() -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let config = if paths.is_initialized() {
        roar_config::load_config(Some(&paths.config_path())).context("load config")?
    } else {
        roar_config::RoarConfig::default()
    };

    let glaas_url = config.glaas.url.clone().or_else(|| std::env::var("GLAAS_URL").ok());
    let found = find_ssh_pubkey(config.glaas.key.as_deref());

    println!("GLaaS Auth Status");
    println!("{}", "=".repeat(40));
    println!("Server URL: {}", glaas_url.as_deref().unwrap_or("(not configured)"));
    println!("SSH key: {}", found.as_ref().map(|f| f.path.as_str()).unwrap_or("(not found)"));

    if let Some(found) = &found {
        if let Ok(fp) = compute_pubkey_fingerprint(&found.pubkey) {
            println!("Fingerprint: {fp}");
        }
    }

    Ok(0)
}
