//! Check-config command - print the resolved, redacted configuration.

use voxwatch_config::{ResolvedConfig, ShowFormat};

use crate::theme::Theme;

/// Print `resolved` with source annotations.
pub(crate) fn show_config(resolved: &ResolvedConfig, format: ShowFormat) -> anyhow::Result<()> {
    let rendered = resolved
        .show(format)
        .map_err(|_| anyhow::anyhow!("failed to render configuration"))?;
    println!("{rendered}");
    if format == ShowFormat::Toml {
        println!("{}", Theme::success("Configuration is valid"));
    }
    Ok(())
}
