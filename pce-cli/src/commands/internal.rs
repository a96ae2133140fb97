//! Inner phase entry point
//!
//! Runs in the re-entered process inside the new namespaces. No async
//! runtime is started here.

use anyhow::{Context, Result};

use pce_core::RuntimeConfig;
use pce_namespace::platform_runtime;

use crate::cli::InternalArgs;

pub fn execute(args: InternalArgs, verbose: bool) -> Result<i32> {
    let config = RuntimeConfig::new().with_hostname(args.hostname);
    let runtime = platform_runtime(config, verbose)?;

    let state = runtime
        .enter(&args.root, &args.command)
        .with_context(|| {
            format!(
                "Failed to run {:?} in {}",
                args.command,
                args.root.display()
            )
        })?;

    Ok(state.exit_code())
}
