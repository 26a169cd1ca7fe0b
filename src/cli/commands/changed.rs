//! Changed command implementation
//!
//! Implements `vxb changed`: moves the checkout through a git range and
//! lists the packages that need rebuilding at its end.

use anyhow::{Context, Result};

use super::{git_sync, load_settings, CollectionArgs, GlobalOptions, Toolset};
use crate::core::sync::parse_range;

/// Execute the changed command
pub async fn execute(
    global: &GlobalOptions,
    collection: &CollectionArgs,
    arch: &str,
    range: Option<&str>,
    json: bool,
) -> Result<()> {
    let settings = load_settings(global, collection, Some(arch), true)?;
    let mut tools = Toolset::new(&settings);
    let mut sync = git_sync(&settings)?;

    let changed = sync
        .changed(&mut tools.oracle, &settings.target_arch, &parse_range(range))
        .await
        .context("Failed to compute changed packages")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&changed)?);
    } else {
        for name in &changed {
            println!("{name}");
        }
    }
    Ok(())
}
