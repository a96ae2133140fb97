//! CLI argument definitions

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use pce_core::constants::DEFAULT_HOSTNAME;
use pce_core::{AbsoluteSymlinks, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "pce")]
#[command(about = "Rootless container engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull an image and run a command in it
    Run(RunArgs),

    /// Pull an image to a tarball or an extracted root filesystem
    Download(DownloadArgs),

    /// Inner phase of `run`, started by the engine itself
    #[command(name = "internalrun", hide = true)]
    InternalRun(InternalArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference (e.g. alpine, docker.io/library/alpine:3.19)
    pub image: String,

    /// Hostname inside the container
    #[arg(long, default_value = DEFAULT_HOSTNAME)]
    pub hostname: String,

    /// Seconds between SIGTERM and SIGKILL after an interrupt
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub grace_period: u64,

    /// Leave the root filesystem in place after the container exits
    #[arg(long)]
    pub keep_rootfs: bool,

    /// Resolve absolute symlinks in layers against the container root
    #[arg(long)]
    pub allow_absolute_symlinks: bool,

    /// Command to run instead of the image default
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Runtime configuration described by the flags
    pub fn runtime_config(&self) -> RuntimeConfig {
        let absolute_symlinks = if self.allow_absolute_symlinks {
            AbsoluteSymlinks::RootRelative
        } else {
            AbsoluteSymlinks::Reject
        };

        RuntimeConfig::new()
            .with_hostname(&self.hostname)
            .with_grace_period(Duration::from_secs(self.grace_period))
            .with_keep_rootfs(self.keep_rootfs)
            .with_absolute_symlinks(absolute_symlinks)
    }
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Image reference
    pub image: String,

    /// Extract the layers into a directory instead of writing a tarball
    #[arg(long)]
    pub extract: bool,

    /// Directory that receives the tarball or extracted root
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Resolve absolute symlinks in layers against the extracted root
    #[arg(long, requires = "extract")]
    pub allow_absolute_symlinks: bool,
}

#[derive(Args, Debug)]
pub struct InternalArgs {
    /// Hostname to set in the UTS namespace
    #[arg(long, default_value = DEFAULT_HOSTNAME)]
    pub hostname: String,

    /// Root filesystem to change into
    pub root: PathBuf,

    /// Command to execute
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}
