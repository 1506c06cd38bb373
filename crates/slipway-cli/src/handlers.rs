//! Command handlers.

use crate::commands::{GraphArgs, RunArgs};
use console::style;
use slipway_core::job::{JobStatus, PipelineDefinition, SkipReason};
use slipway_scheduler::dag::JobGraph;
use slipway_scheduler::{RunReport, Scheduler, TriggerClassifier};
use slipway_steps::pipeline::{BUILD_EXECUTABLE, BUILD_IMAGE, PUBLISH_RELEASE, RUN_TESTS};
use slipway_steps::{
    ContainerBuild, DockerCli, ExecutableBuild, GitHubReleases, ReleasePublisher, TestRun,
    canonical_pipeline,
};
use slipway_store::{ArtifactStore, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

type CliError = Box<dyn std::error::Error>;

fn load_pipeline(path: Option<&str>, require_tests: bool) -> Result<PipelineDefinition, CliError> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&raw)?)
        }
        None => Ok(canonical_pipeline(require_tests)),
    }
}

pub async fn run(args: RunArgs) -> Result<(), CliError> {
    let pipeline = load_pipeline(args.pipeline.as_deref(), args.require_tests)?;
    let classifier = TriggerClassifier::new(pipeline.release_tag_prefix.clone());
    let trigger = classifier.classify(&args.event, &args.git_ref)?;

    let token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
    if token.is_empty() && trigger.is_release_tag(&pipeline.release_tag_prefix) {
        warn!("GITHUB_TOKEN is not set; release creation will fail");
    }

    let registry = Arc::new(DockerCli::new());
    let releases = Arc::new(GitHubReleases::new(args.github_repo.clone(), token));
    let scheduler = Scheduler::new()
        .register(BUILD_EXECUTABLE, Arc::new(ExecutableBuild))
        .register(
            BUILD_IMAGE,
            Arc::new(ContainerBuild::new(registry.clone(), args.repository.clone())),
        )
        .register(RUN_TESTS, Arc::new(TestRun))
        .register(
            PUBLISH_RELEASE,
            Arc::new(ReleasePublisher::new(registry, releases, args.repository)),
        );

    let store = ArtifactStore::new(StoreConfig::default());
    let workspace = PathBuf::from(&args.workspace);
    let report = scheduler.run(&pipeline, trigger, store, workspace).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn glyph(status: JobStatus) -> console::StyledObject<&'static str> {
    match status {
        JobStatus::Succeeded => style("✓").green(),
        JobStatus::Failed => style("✗").red(),
        JobStatus::Skipped => style("-").dim(),
        JobStatus::Pending | JobStatus::Running => style("▶").cyan(),
    }
}

fn print_report(report: &RunReport) {
    println!(
        "\n{} {} ({})",
        style("run").bold(),
        report.run_id,
        report.trigger.git_ref
    );
    for job in &report.jobs {
        let note = match (job.skip_reason, job.failed_needs.is_empty()) {
            (Some(SkipReason::ConditionUnmet), _) => " (condition unmet)".to_string(),
            (Some(SkipReason::UpstreamFailed), false) => {
                let needs: Vec<&str> = job.failed_needs.iter().map(|j| j.as_str()).collect();
                format!(" (upstream failed: {})", needs.join(", "))
            }
            (Some(SkipReason::UpstreamFailed), true) => " (upstream failed)".to_string(),
            (None, _) => String::new(),
        };
        println!(
            "  {} {} [{}ms]{}",
            glyph(job.status),
            style(job.job.as_str()).bold(),
            job.duration_ms,
            note
        );
        for instance in &job.instances {
            println!(
                "      {} {} [{}ms]",
                glyph(instance.status),
                instance.display_name,
                instance.duration_ms
            );
        }
        if let Some(error) = &job.error {
            println!("      {}", style(error).red());
        }
    }

    // A release can publish while the test matrix has failures; make that
    // loud rather than silent.
    let tests_failed = report
        .job("test")
        .is_some_and(|j| j.status == JobStatus::Failed);
    let released = report
        .job("release")
        .is_some_and(|j| j.status == JobStatus::Succeeded);
    if tests_failed && released {
        println!(
            "\n{} release published despite test failures",
            style("!").yellow()
        );
    }

    match report.succeeded() {
        true => println!("\n{} run succeeded [{}ms]", style("✓").green(), report.duration_ms),
        false => println!("\n{} run failed [{}ms]", style("✗").red(), report.duration_ms),
    }
}

pub fn graph(args: GraphArgs) -> Result<(), CliError> {
    let pipeline = load_pipeline(args.pipeline.as_deref(), false)?;
    let graph = JobGraph::build(&pipeline)?;
    for node in graph.topological_order()? {
        if node.definition.needs.is_empty() {
            println!("{}", style(node.id.as_str()).bold());
        } else {
            let needs: Vec<&str> = node.definition.needs.iter().map(|j| j.as_str()).collect();
            println!(
                "{} {} {}",
                style(node.id.as_str()).bold(),
                style("<-").dim(),
                needs.join(", ")
            );
        }
    }
    Ok(())
}

pub fn validate(path: &str) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path)?;
    let pipeline: PipelineDefinition = serde_yaml::from_str(&raw)?;
    let graph = JobGraph::build(&pipeline)?;
    println!(
        "{} {} is valid ({} jobs)",
        style("✓").green(),
        path,
        graph.len()
    );
    Ok(())
}
