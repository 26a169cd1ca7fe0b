//! Clean command implementation
//!
//! Implements `vxb clean`: removes a sandbox left behind by an interrupted
//! run, unmounting it first if needed.

use anyhow::{Context, Result};

use super::{load_settings, CollectionArgs, GlobalOptions, Toolset};
use crate::cli::output::status;

/// Execute the clean command
pub fn execute(global: &GlobalOptions, collection: &CollectionArgs) -> Result<()> {
    let settings = load_settings(global, collection, None, false)?;
    let tools = Toolset::new(&settings);
    let path = tools.manager.path();

    let existed = path.exists();
    tools
        .manager
        .remove_stale()
        .with_context(|| format!("Failed to remove sandbox at {}", path.display()))?;

    if !global.quiet {
        if existed {
            println!("{} Removed {}", status::SUCCESS, path.display());
        } else {
            println!("{} Nothing to clean", status::SUCCESS);
        }
    }
    Ok(())
}
