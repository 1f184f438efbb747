//! Environment readiness check.

use std::path::Path;
use std::process::Command;

use anyhow::Result;

use crate::cli::output::{self, Styled};
use crate::config::{self, RuntimeConfig};
use crate::renderer::chromium::find_chromium;

/// Check config, Chromium availability, the result log and available memory.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let loaded = RuntimeConfig::load(config_path);
    let (config, source, config_error) = match loaded {
        Ok((config, source)) => (config, source, None),
        Err(e) => (RuntimeConfig::default(), None, Some(e.to_string())),
    };
    let chromium = find_chromium(config.chromium_path.as_deref());
    let log_path = config.result_log_path();
    let log_dir_ok = log_path
        .parent()
        .map(|p| std::fs::create_dir_all(p).is_ok())
        .unwrap_or(false);
    let mem_mb = get_available_memory_mb();
    let ready = chromium.is_some() && config_error.is_none() && log_dir_ok;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "config": source.as_ref().map(|p| p.display().to_string()),
            "config_error": config_error,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "result_log": log_path.display().to_string(),
            "result_log_writable": log_dir_ok,
            "available_memory_mb": mem_mb,
            "ready": ready,
        }));
        return Ok(());
    }

    let s = Styled::new();
    println!("Stockcheck Doctor");
    println!("=================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match (&source, &config_error) {
        (_, Some(e)) => println!("{} {e}", s.fail_sym()),
        (Some(path), None) => println!("{} Config: {}", s.ok_sym(), path.display()),
        (None, None) => println!(
            "{} No config file, using defaults (set {} or create {})",
            s.ok_sym(),
            config::CONFIG_ENV,
            config::LOCAL_CONFIG
        ),
    }

    match &chromium {
        Some(path) => println!("{} Chromium found: {}", s.ok_sym(), path.display()),
        None => println!(
            "{} Chromium NOT found. Install Chrome or Chromium, or set chromium_path in the config.",
            s.fail_sym()
        ),
    }

    if log_dir_ok {
        println!("{} Result log: {}", s.ok_sym(), log_path.display());
    } else {
        println!(
            "{} Result log directory is not writable: {}",
            s.fail_sym(),
            log_path.display()
        );
    }

    match mem_mb {
        Some(mb) if mb >= 512 => println!("{} Available memory: {mb}MB", s.ok_sym()),
        Some(mb) => println!(
            "{} Available memory: {mb}MB (each worker page needs roughly 200MB)",
            s.warn_sym()
        ),
        None => println!("{} Could not determine available memory", s.warn_sym()),
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        parse_free_output(&String::from_utf8_lossy(&output.stdout))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// The `available` column of `free -m`.
fn parse_free_output(text: &str) -> Option<u64> {
    text.lines()
        .find(|line| line.starts_with("Mem:"))
        .and_then(|line| line.split_whitespace().nth(6))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_output() {
        let text = "              total        used        free      shared  buff/cache   available\n\
                    Mem:          15902        4210        6001         312        5690       11050\n\
                    Swap:          2047           0        2047\n";
        assert_eq!(parse_free_output(text), Some(11050));
        assert_eq!(parse_free_output("garbage"), None);
    }
}
