//! `devmatch config` command implementation

use colored::Colorize;
use devmatch_kernel::ResolverConfig;

/// Execute the `devmatch config` command
pub fn run(config: &ResolverConfig) -> anyhow::Result<()> {
    println!("{} Effective resolver configuration", "->".green());
    println!();
    println!("{}", render(config)?);
    Ok(())
}

fn render(config: &ResolverConfig) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}
