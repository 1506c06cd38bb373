//! CLI command definitions.

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline for a trigger event
    Run(RunArgs),

    /// Show the job graph of a pipeline
    Graph(GraphArgs),

    /// Validate a pipeline file
    Validate {
        /// Path to pipeline file
        #[arg(default_value = "slipway.yaml")]
        path: String,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to a pipeline file; the built-in pipeline when omitted
    pub pipeline: Option<String>,

    /// Trigger event kind (push, pull_request, tag_push)
    #[arg(short, long)]
    pub event: String,

    /// Git ref that produced the event, e.g. refs/tags/v1.2.3
    #[arg(long = "ref")]
    pub git_ref: String,

    /// Source checkout the build scripts run in
    #[arg(short, long, default_value = ".")]
    pub workspace: String,

    /// Container repository images are tagged into
    #[arg(long, default_value = "granulate/gprofiler")]
    pub repository: String,

    /// GitHub owner/repo releases are created in
    #[arg(long, default_value = "Granulate/gprofiler")]
    pub github_repo: String,

    /// Gate the release on the test matrix (built-in pipeline only)
    #[arg(long)]
    pub require_tests: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Path to a pipeline file; the built-in pipeline when omitted
    pub pipeline: Option<String>,
}
