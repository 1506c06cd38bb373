//! End-to-end build/test/release runs against fake infrastructure.

use async_trait::async_trait;
use slipway_core::ports::{ContainerRegistry, ReleaseClient, ReleaseHandle};
use slipway_core::job::{JobStatus, RunStatus};
use slipway_core::trigger::{Trigger, TriggerKind};
use slipway_core::{Error, Result};
use slipway_scheduler::Scheduler;
use slipway_steps::pipeline::{BUILD_EXECUTABLE, BUILD_IMAGE, PUBLISH_RELEASE, RUN_TESTS};
use slipway_steps::{ContainerBuild, ExecutableBuild, ReleasePublisher, TestRun, canonical_pipeline};
use slipway_store::{ArtifactStore, StoreConfig};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};

const REPOSITORY: &str = "granulate/gprofiler";

#[derive(Default)]
struct RegistryState {
    local: HashSet<String>,
    remote: HashSet<String>,
    manifests: HashMap<String, Vec<String>>,
    pushed_manifests: Vec<String>,
}

/// In-memory stand-in for the docker daemon and remote registry.
#[derive(Default)]
struct FakeRegistry {
    state: Mutex<RegistryState>,
}

impl FakeRegistry {
    fn seed_remote(&self, tag: &str) {
        self.state.lock().unwrap().remote.insert(tag.to_string());
    }

    fn remote_has(&self, tag: &str) -> bool {
        self.state.lock().unwrap().remote.contains(tag)
    }

    fn pushed_manifests(&self) -> Vec<String> {
        self.state.lock().unwrap().pushed_manifests.clone()
    }
}

#[async_trait]
impl ContainerRegistry for FakeRegistry {
    async fn save(&self, image: &str, dest: &Path) -> Result<()> {
        std::fs::write(dest, format!("tar of {image}"))?;
        self.state.lock().unwrap().local.insert(image.to_string());
        Ok(())
    }

    async fn load(&self, tar: &Path) -> Result<String> {
        if !tar.is_file() {
            return Err(Error::Registry(format!("no tar at {}", tar.display())));
        }
        let loaded = "loaded-image:latest".to_string();
        self.state.lock().unwrap().local.insert(loaded.clone());
        Ok(loaded)
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.local.contains(source) {
            return Err(Error::Registry(format!("unknown local image {source}")));
        }
        state.local.insert(target.to_string());
        Ok(())
    }

    async fn push(&self, tag: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.local.contains(tag) {
            return Err(Error::Registry(format!("unknown local tag {tag}")));
        }
        state.remote.insert(tag.to_string());
        Ok(())
    }

    async fn image_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().remote.contains(tag))
    }

    async fn create_manifest(&self, target: &str, refs: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let missing: Vec<String> = refs
            .iter()
            .filter(|r| !state.remote.contains(*r))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::ManifestIncomplete {
                target: target.to_string(),
                missing,
            });
        }
        state.manifests.insert(target.to_string(), refs.to_vec());
        Ok(())
    }

    async fn push_manifest(&self, target: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.manifests.contains_key(target) {
            return Err(Error::Registry(format!("manifest {target} was never created")));
        }
        state.pushed_manifests.push(target.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeReleases {
    created: Mutex<Vec<String>>,
    assets: Mutex<Vec<String>>,
    fail_create: std::sync::atomic::AtomicBool,
}

impl FakeReleases {
    fn fail_creates(&self) {
        self.fail_create
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl ReleaseClient for FakeReleases {
    async fn create_release(&self, tag: &str) -> Result<ReleaseHandle> {
        if self.fail_create.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::ReleaseApi("create release: HTTP 502".to_string()));
        }
        self.created.lock().unwrap().push(tag.to_string());
        Ok(ReleaseHandle {
            id: "1".to_string(),
            tag: tag.to_string(),
        })
    }

    async fn upload_asset(&self, _release: &ReleaseHandle, name: &str, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::ReleaseApi(format!("no file at {}", path.display())));
        }
        self.assets.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "#!/bin/sh\n{body}").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

// Refuses to run unless the prebuilt executable is injected the way the
// real build scripts expect.
const CONTAINER_BUILD: &str = r#"[ "$1" = "--skip-exe-build" ] || exit 64
exe=""
provenance=0
while [ $# -gt 0 ]; do
  case "$1" in
    --build-arg) shift; exe="${1#EXE_PATH=}" ;;
    --provenance=false) provenance=1 ;;
  esac
  shift
done
[ "$provenance" = 1 ] || exit 65
test -f "$exe""#;

/// A workspace with working build/test scripts and a tracked version.
fn workspace(version: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let scripts = dir.path().join("scripts");
    std::fs::create_dir_all(&scripts).unwrap();
    write_script(&scripts, "build.sh", "echo \"binary for $1\" > \"$2\"");
    write_script(&scripts, "build_x86_64_container.sh", CONTAINER_BUILD);
    write_script(&scripts, "build_aarch64_container.sh", CONTAINER_BUILD);
    write_script(&scripts, "test.sh", "test -f \"$2\"");
    write_script(&scripts, "test_container.sh", "test -f \"$2\"");
    std::fs::write(dir.path().join("version.txt"), format!("{version}\n")).unwrap();
    dir
}

fn scheduler(
    registry: Arc<FakeRegistry>,
    releases: Arc<FakeReleases>,
) -> Scheduler {
    Scheduler::new()
        .register(BUILD_EXECUTABLE, Arc::new(ExecutableBuild))
        .register(
            BUILD_IMAGE,
            Arc::new(ContainerBuild::new(registry.clone(), REPOSITORY)),
        )
        .register(RUN_TESTS, Arc::new(TestRun))
        .register(
            PUBLISH_RELEASE,
            Arc::new(ReleasePublisher::new(registry, releases, REPOSITORY)),
        )
}

fn tag_trigger(tag: &str) -> Trigger {
    Trigger::new(TriggerKind::TagPush, format!("refs/tags/{tag}"))
}

#[tokio::test]
async fn test_full_release_run() {
    let dir = workspace("1.2.3");
    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());
    // The aarch64 image build pushes from inside the build script, which the
    // fake cannot observe; stand in for that push.
    registry.seed_remote("granulate/gprofiler:v1.2.3-aarch64");

    let report = scheduler(registry.clone(), releases.clone())
        .run(
            &canonical_pipeline(false),
            tag_trigger("v1.2.3"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success, "report: {report:?}");
    assert_eq!(report.job("release").unwrap().status, JobStatus::Succeeded);

    // One asset per architecture plus the unsuffixed default.
    assert_eq!(
        *releases.assets.lock().unwrap(),
        vec!["gprofiler_x86_64", "gprofiler_aarch64", "gprofiler"]
    );
    assert!(registry.remote_has("granulate/gprofiler:v1.2.3-x86_64"));
    assert_eq!(
        registry.pushed_manifests(),
        vec!["granulate/gprofiler:v1.2.3", "granulate/gprofiler:latest"]
    );
}

#[tokio::test]
async fn test_non_tag_run_skips_release() {
    let dir = workspace("1.2.3");
    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());
    registry.seed_remote("granulate/gprofiler:ci-aarch64");

    let report = scheduler(registry.clone(), releases.clone())
        .run(
            &canonical_pipeline(false),
            Trigger::new(TriggerKind::Push, "refs/heads/main"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.job("release").unwrap().status, JobStatus::Skipped);
    assert!(releases.created.lock().unwrap().is_empty());
    assert!(registry.pushed_manifests().is_empty());
}

#[tokio::test]
async fn test_version_mismatch_blocks_release() {
    let dir = workspace("9.9.9");
    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());
    registry.seed_remote("granulate/gprofiler:v1.2.3-aarch64");

    let report = scheduler(registry.clone(), releases.clone())
        .run(
            &canonical_pipeline(false),
            tag_trigger("v1.2.3"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failure);
    let release = report.job("release").unwrap();
    assert_eq!(release.status, JobStatus::Failed);
    assert!(
        release.instances[0]
            .error
            .as_deref()
            .unwrap()
            .contains("does not match tracked version")
    );
    assert!(releases.created.lock().unwrap().is_empty());
    assert!(registry.pushed_manifests().is_empty());
}

#[tokio::test]
async fn test_failed_release_creation_pushes_nothing() {
    // Creating the release record fails; nothing may have reached the
    // registry yet, not even the x86_64 arch tag.
    let dir = workspace("1.2.3");
    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());
    releases.fail_creates();
    registry.seed_remote("granulate/gprofiler:v1.2.3-aarch64");

    let report = scheduler(registry.clone(), releases.clone())
        .run(
            &canonical_pipeline(false),
            tag_trigger("v1.2.3"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.job("release").unwrap().status, JobStatus::Failed);
    assert!(!registry.remote_has("granulate/gprofiler:v1.2.3-x86_64"));
    assert!(registry.pushed_manifests().is_empty());
}

#[tokio::test]
async fn test_lost_aarch64_push_fails_its_build() {
    // The aarch64 image never arrives in the registry; its build job fails
    // and the release is skipped, never partially published.
    let dir = workspace("1.2.3");
    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());

    let report = scheduler(registry.clone(), releases.clone())
        .run(
            &canonical_pipeline(false),
            tag_trigger("v1.2.3"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(
        report.job("build-image-aarch64").unwrap().status,
        JobStatus::Failed
    );
    assert_eq!(report.job("release").unwrap().status, JobStatus::Skipped);
    assert!(releases.created.lock().unwrap().is_empty());
    assert!(registry.pushed_manifests().is_empty());
}

#[tokio::test]
async fn test_partial_manifest_is_never_created() {
    let registry = FakeRegistry::default();
    registry.seed_remote("granulate/gprofiler:v1.0.0-x86_64");

    let refs = vec![
        "granulate/gprofiler:v1.0.0-x86_64".to_string(),
        "granulate/gprofiler:v1.0.0-aarch64".to_string(),
    ];
    let err = registry
        .create_manifest("granulate/gprofiler:v1.0.0", &refs)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ManifestIncomplete { .. }));
    assert!(registry.pushed_manifests().is_empty());
}

#[tokio::test]
async fn test_failing_scenario_does_not_block_release() {
    let dir = workspace("1.2.3");
    // Ruby scenarios fail; everything else passes.
    let scripts = dir.path().join("scripts");
    write_script(
        &scripts,
        "test.sh",
        "if [ \"$1\" = ruby ]; then exit 1; fi\ntest -f \"$2\"",
    );

    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());
    registry.seed_remote("granulate/gprofiler:v1.2.3-aarch64");

    let report = scheduler(registry.clone(), releases.clone())
        .run(
            &canonical_pipeline(false),
            tag_trigger("v1.2.3"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    // The run reports failure, but the release still went out.
    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.job("test").unwrap().status, JobStatus::Failed);
    assert_eq!(report.job("release").unwrap().status, JobStatus::Succeeded);
    assert_eq!(releases.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_tests_gate_release_when_required() {
    let dir = workspace("1.2.3");
    let scripts = dir.path().join("scripts");
    write_script(&scripts, "test.sh", "exit 1");

    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());
    registry.seed_remote("granulate/gprofiler:v1.2.3-aarch64");

    let report = scheduler(registry.clone(), releases.clone())
        .run(
            &canonical_pipeline(true),
            tag_trigger("v1.2.3"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.job("release").unwrap().status, JobStatus::Skipped);
    assert!(releases.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_build_script_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("version.txt"), "1.2.3\n").unwrap();

    let registry = Arc::new(FakeRegistry::default());
    let releases = Arc::new(FakeReleases::default());
    let report = scheduler(registry, releases)
        .run(
            &canonical_pipeline(false),
            Trigger::new(TriggerKind::Push, "refs/heads/main"),
            ArtifactStore::new(StoreConfig::default()),
            dir.path().to_path_buf(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failure);
    let build = report.job("build-exe-x86_64").unwrap();
    assert_eq!(build.status, JobStatus::Failed);
    assert!(build.instances[0].error.as_deref().unwrap().contains("script not found"));
}
