//! The canonical dual-architecture build/test/release pipeline.

use serde_json::json;
use slipway_core::JobId;
use slipway_core::artifact::{Arch, executable_name, image_export_name};
use slipway_core::job::{JobDefinition, MatrixConfig, PipelineDefinition};
use slipway_core::trigger::RunCondition;
use std::collections::HashMap;

/// Executor key for [`crate::ExecutableBuild`].
pub const BUILD_EXECUTABLE: &str = "build-executable";
/// Executor key for [`crate::ContainerBuild`].
pub const BUILD_IMAGE: &str = "build-image";
/// Executor key for [`crate::TestRun`].
pub const RUN_TESTS: &str = "run-tests";
/// Executor key for [`crate::ReleasePublisher`].
pub const PUBLISH_RELEASE: &str = "publish-release";

fn arch_params(arch: Arch) -> HashMap<String, String> {
    HashMap::from([("arch".to_string(), arch.as_str().to_string())])
}

/// The pipeline as wired for gprofiler: executables and images for both
/// architectures, a test matrix over runtimes, and a tag-gated release that
/// fans in on the builds. By default the release does not wait for the test
/// matrix; `require_tests_for_release` makes it a hard gate.
pub fn canonical_pipeline(require_tests_for_release: bool) -> PipelineDefinition {
    let tool = "gprofiler".to_string();

    let build_jobs = |arch: Arch| {
        let exe = JobDefinition {
            id: JobId::new(format!("build-exe-{arch}")),
            needs: vec![],
            condition: RunCondition::Always,
            matrix: None,
            uses: BUILD_EXECUTABLE.to_string(),
            params: arch_params(arch),
            produces: vec![executable_name(&tool, arch)],
        };
        let image = JobDefinition {
            id: JobId::new(format!("build-image-{arch}")),
            // The image build injects the executable instead of recompiling
            // it inside the container.
            needs: vec![exe.id.clone()],
            condition: RunCondition::Always,
            matrix: None,
            uses: BUILD_IMAGE.to_string(),
            params: arch_params(arch),
            // Only the x86_64 image travels through the store; aarch64 is
            // pushed to the registry during its build.
            produces: match arch {
                Arch::X86_64 => vec![image_export_name(&tool, arch)],
                Arch::Aarch64 => vec![],
            },
        };
        (exe, image)
    };
    let (exe_x86, image_x86) = build_jobs(Arch::X86_64);
    let (exe_arm, image_arm) = build_jobs(Arch::Aarch64);

    let test = JobDefinition {
        id: JobId::new("test"),
        needs: vec![exe_x86.id.clone(), exe_arm.id.clone()],
        condition: RunCondition::Always,
        matrix: Some(MatrixConfig {
            dimensions: HashMap::from([
                (
                    "arch".to_string(),
                    vec![json!("x86_64"), json!("aarch64")],
                ),
                (
                    "scenario".to_string(),
                    vec![
                        json!("java"),
                        json!("python"),
                        json!("ruby"),
                        json!("php"),
                        json!("dotnet"),
                    ],
                ),
            ]),
            // Container scenarios run the exported x86_64 image instead of
            // the bare executable.
            include: vec![
                HashMap::from([
                    ("arch".to_string(), json!("x86_64")),
                    ("scenario".to_string(), json!("java")),
                    ("target".to_string(), json!("container")),
                ]),
                HashMap::from([
                    ("arch".to_string(), json!("x86_64")),
                    ("scenario".to_string(), json!("python")),
                    ("target".to_string(), json!("container")),
                ]),
            ],
            // The dotnet profiler is x86_64 only.
            exclude: vec![HashMap::from([
                ("arch".to_string(), json!("aarch64")),
                ("scenario".to_string(), json!("dotnet")),
            ])],
            fail_fast: false,
            max_parallel: None,
            run_only: None,
        }),
        uses: RUN_TESTS.to_string(),
        params: HashMap::new(),
        produces: vec![],
    };

    let mut release_needs = vec![
        exe_x86.id.clone(),
        exe_arm.id.clone(),
        image_x86.id.clone(),
        image_arm.id.clone(),
    ];
    if require_tests_for_release {
        release_needs.push(test.id.clone());
    }
    let release = JobDefinition {
        id: JobId::new("release"),
        needs: release_needs,
        condition: RunCondition::TagOnly,
        matrix: None,
        uses: PUBLISH_RELEASE.to_string(),
        params: HashMap::new(),
        produces: vec![],
    };

    PipelineDefinition {
        name: "gprofiler".to_string(),
        tool,
        release_tag_prefix: "v".to_string(),
        require_tests_for_release,
        jobs: vec![exe_x86, exe_arm, image_x86, image_arm, test, release],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_scheduler::dag::JobGraph;

    #[test]
    fn test_canonical_pipeline_is_valid() {
        let pipeline = canonical_pipeline(false);
        let graph = JobGraph::build(&pipeline).unwrap();
        assert_eq!(graph.len(), 6);
    }

    #[test]
    fn test_release_does_not_need_tests_by_default() {
        let pipeline = canonical_pipeline(false);
        let release = pipeline.job(&JobId::new("release")).unwrap();
        assert!(!release.needs.contains(&JobId::new("test")));

        let gated = canonical_pipeline(true);
        let release = gated.job(&JobId::new("release")).unwrap();
        assert!(release.needs.contains(&JobId::new("test")));
    }

    #[test]
    fn test_image_builds_need_their_executable_builds() {
        let pipeline = canonical_pipeline(false);
        for arch in Arch::ALL {
            let image = pipeline
                .job(&JobId::new(format!("build-image-{arch}")))
                .unwrap();
            assert_eq!(image.needs, vec![JobId::new(format!("build-exe-{arch}"))]);
        }
    }

    #[test]
    fn test_matrix_includes_container_scenarios() {
        let pipeline = canonical_pipeline(false);
        let test = pipeline.job(&JobId::new("test")).unwrap();
        let expansion = slipway_scheduler::matrix::MatrixExpander::expand(test).unwrap();

        let container: Vec<&slipway_core::job::JobInstance> = expansion
            .instances
            .iter()
            .map(|i| &i.instance)
            .filter(|i| i.cell_str("target") == Some("container"))
            .collect();
        assert_eq!(container.len(), 2);
        // Only x86_64 exports an image through the store.
        assert!(container.iter().all(|i| i.cell_str("arch") == Some("x86_64")));
    }

    #[test]
    fn test_one_producer_per_artifact() {
        let pipeline = canonical_pipeline(false);
        let producers: Vec<&String> = pipeline
            .jobs
            .iter()
            .flat_map(|j| j.produces.iter())
            .collect();
        let mut unique = producers.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(producers.len(), unique.len());
    }
}
