//! `roar init` (§6): create `.roar/`, write the default config, and
//! optionally wire up `.gitignore`.
//!
//! Grounded on `original_source/roar/cli/commands/init.py`.

use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use roar_config::RoarConfig;

pub fn cmd_init(yes: bool, no: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let roar_dir = cwd.join(".roar");

    if roar_dir.exists() {
        println!(".roar directory already exists at {}", roar_dir.display());
        return Ok(0);
    }

    std::fs::create_dir(&roar_dir).with_context(|| format!("create {}", roar_dir.display()))?;
    println!("Created {}", roar_dir.display());
    println!();
    println!("roar records file hashes, commands, and dependency metadata.");
    println!("It does not upload file contents to GLaaS.");
    println!();

    let config_path = roar_dir.join("config.toml");
    let config_toml = toml::to_string_pretty(&RoarConfig::default()).context("serialize default config")?;
    std::fs::write(&config_path, config_toml).with_context(|| format!("write {}", config_path.display()))?;
    println!("Created {}", config_path.display());

    let Some(repo_root) = roar_git::find_repo_root(&cwd) else {
        println!("Not in a git repository. Done.");
        return Ok(0);
    };

    let gitignore_path = repo_root.join(".gitignore");
    if !gitignore_path.exists() {
        println!("No .gitignore found. Done.");
        return Ok(0);
    }

    let gitignore_content =
        std::fs::read_to_string(&gitignore_path).with_context(|| format!("read {}", gitignore_path.display()))?;
    if gitignore_content.contains(".roar") {
        println!(".roar is already in .gitignore. Done.");
        return Ok(0);
    }

    println!();
    let add = if yes {
        true
    } else if no {
        false
    } else {
        confirm("Add .roar/ to .gitignore?", true)
    };

    if add {
        add_to_gitignore(&gitignore_path, &gitignore_content)?;
        println!("Added .roar/ to .gitignore");
    } else {
        println!("Skipped .gitignore update.");
    }

    println!("Done.");
    Ok(0)
}

fn add_to_gitignore(path: &Path, existing: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    if !existing.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, ".roar/")?;
    Ok(())
}

fn confirm(prompt: &str, default: bool) -> bool {
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    print!("{prompt} {suffix} ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return default;
    }
    match line.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}
