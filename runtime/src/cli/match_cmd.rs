//! `stockcheck match <displayed> <requested>`: explain an option match.

use std::path::Path;

use anyhow::Result;
use stockcheck_engine::{normalize, OptionMatcher};

use crate::cli::output::{self, Styled};
use crate::config::RuntimeConfig;

pub async fn run(displayed: &str, requested: &str, config_path: Option<&Path>) -> Result<()> {
    let (config, _) = RuntimeConfig::load(config_path)?;
    let matcher = OptionMatcher::new(config.engine.match_rules.clone());
    let rule = matcher.match_rule(displayed, requested);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "displayed": displayed,
            "requested": requested,
            "normalized_displayed": normalize(displayed),
            "normalized_requested": normalize(requested),
            "matched": rule.is_some(),
            "rule": rule.map(|r| r.name()),
        }));
        return Ok(());
    }

    let s = Styled::new();
    println!("  displayed: {:?}", normalize(displayed));
    println!("  requested: {:?}", normalize(requested));
    match rule {
        Some(rule) => println!("  {} matched by {}", s.ok_sym(), s.bold(rule.name())),
        None => {
            let chain: Vec<_> = config.engine.match_rules.iter().map(|r| r.name()).collect();
            println!("  {} no match ({} tried)", s.fail_sym(), chain.join(", "));
        }
    }
    Ok(())
}
