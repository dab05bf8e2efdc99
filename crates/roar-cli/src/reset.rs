//! `roar reset` (§6): deactivate the current session and start a fresh one.
//!
//! Grounded on `original_source/roar/cli/commands/reset.py`.

use anyhow::{Context, Result};
use roar_store::Store;
use uuid::Uuid;

use crate::paths::find_roar_dir;

fn confirm(prompt: &str, default: bool) -> bool {
    use std::io::Write as _;
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

pub fn cmd_reset(yes: bool, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        anyhow::bail!("not a roar project (run `roar init` first)");
    }
    let store = Store::open(&paths.db_path()).context("open store")?;

    let active = store.get_active_session().context("load active session")?;

    let prompt = if let Some(session) = &active {
        let step_count = store.get_steps(session.id).context("load session steps")?.len();
        println!("Current session has {step_count} step(s).");
        "Start a new session?"
    } else {
        "No active session. Create one?"
    };

    if !yes && !confirm(prompt, true) {
        println!("Aborted.");
        return Ok(1);
    }

    let new_hash = Uuid::new_v4().simple().to_string();
    let git_context = roar_git::context(&cwd).ok().flatten();
    let new_session = store
        .create_session(
            &new_hash,
            git_context.as_ref().and_then(|c| c.remote_url.as_deref()),
            git_context.as_ref().map(|c| c.commit.as_str()),
            git_context.as_ref().and_then(|c| c.branch.as_deref()),
        )
        .context("create session")?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "previous_session_id": active.as_ref().map(|s| s.id),
                "session_id": new_session.id,
            })
        );
        return Ok(0);
    }

    if let Some(session) = &active {
        println!("Deactivated session {}.", session.id);
    }
    println!("Created new session {}.", new_session.id);
    Ok(0)
}
