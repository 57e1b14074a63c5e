//! Stage plan composition tests
//!
//! These tests verify:
//! - Phase ordering of a composed `all` plan
//! - Trusted/legacy boot generators never mix
//! - Failures carry the phase they happened in
//! - A bare target root still yields a full plan
//! - Unknown systems still compose
//! - Persisted plans read back in phase order

use osplan::assets::{BuiltinAssets, MemoryAssets};
use osplan::config::RunConfig;
use osplan::extensions::{FragmentSource, StaticFragments};
use osplan::logic::composer::compose_plan;
use osplan::matrices::COMMON_PACKAGES;
use osplan::output::{load_plan, write_plan};
use osplan::probe::{FsKernelProbe, KernelProbe, StaticKernelProbe};
use osplan::system::{OsRelease, SystemDescriptor};
use osplan::types::{Architecture, Family, Phase, Pipeline};
use osplan::{PlanError, Stage, StagePlan};
use tempfile::TempDir;

fn system_from(os_release: &str, arch: Architecture) -> SystemDescriptor {
    SystemDescriptor::resolve(&OsRelease::parse(os_release), arch)
}

fn ubuntu() -> SystemDescriptor {
    system_from(
        "ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"24.04\"\nPRETTY_NAME=\"Ubuntu 24.04 LTS\"\n",
        Architecture::Amd64,
    )
}

fn compose(config: &RunConfig, system: &SystemDescriptor) -> Result<StagePlan, PlanError> {
    let assets = MemoryAssets::placeholders();
    let probe = StaticKernelProbe::new(["6.8.0-45-generic"]);
    compose_plan(config, system, &assets, &probe, &[])
}

fn stage_names(plan: &StagePlan) -> Vec<String> {
    plan.iter().map(|(_, s)| s.name().to_string()).collect()
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_all_plan_phases_in_order() {
    let plan = compose(&RunConfig::default(), &ubuntu()).unwrap();

    let phases: Vec<Phase> = plan.iter().map(|(phase, _)| phase).collect();
    let mut sorted = phases.clone();
    sorted.sort();
    assert_eq!(phases, sorted);

    let position = |phase: Phase| -> Vec<usize> {
        phases
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == phase)
            .map(|(i, _)| i)
            .collect()
    };
    let install = position(Phase::Install);
    let after_install = position(Phase::AfterInstall);
    let before_init = position(Phase::BeforeInit);
    assert!(!install.is_empty() && !after_install.is_empty() && !before_init.is_empty());
    assert!(install.iter().max() < after_install.iter().min());
    assert!(after_install.iter().max() < before_init.iter().min());
}

#[test]
fn test_pipeline_selection_limits_phases() {
    let config = RunConfig {
        pipeline: Pipeline::Install,
        ..RunConfig::default()
    };
    let plan = compose(&config, &ubuntu()).unwrap();
    let phases: Vec<Phase> = plan.phases().map(|(p, _)| p).collect();
    assert_eq!(phases, vec![Phase::BeforeInstall, Phase::Install, Phase::AfterInstall]);
}

#[test]
fn test_install_phase_starts_with_common_packages() {
    let plan = compose(&RunConfig::default(), &ubuntu()).unwrap();
    let install = &plan.stages(Phase::Install)[0];
    let packages = &install.packages().install;
    assert_eq!(&packages[..COMMON_PACKAGES.len()], COMMON_PACKAGES);
    assert!(packages.iter().any(|p| p == "linux-image-generic-hwe-24.04"));
}

#[test]
fn test_composition_is_deterministic() {
    let first = compose(&RunConfig::default(), &ubuntu()).unwrap();
    let second = compose(&RunConfig::default(), &ubuntu()).unwrap();
    assert_eq!(first, second);
}

// =============================================================================
// Boot mode exclusion
// =============================================================================

#[test]
fn test_legacy_boot_plan() {
    let names = stage_names(&compose(&RunConfig::default(), &ubuntu()).unwrap());
    assert!(names.contains(&"Grub boot arguments".to_string()));
    assert!(names.contains(&"Rebuild initrd".to_string()));
    assert!(!names.contains(&"UKI command line".to_string()));
    assert!(!names.contains(&"Remove initrd".to_string()));
}

#[test]
fn test_trusted_boot_plan() {
    let config = RunConfig {
        trusted_boot: true,
        ..RunConfig::default()
    };
    let plan = compose(&config, &ubuntu()).unwrap();
    let names = stage_names(&plan);
    assert!(names.contains(&"UKI command line".to_string()));
    assert!(names.contains(&"Remove initrd".to_string()));
    assert!(!names.contains(&"Grub boot arguments".to_string()));
    assert!(!names.contains(&"Rebuild initrd".to_string()));

    let packages = &plan.stages(Phase::Install)[0].packages().install;
    assert!(!packages.iter().any(|p| p.starts_with("grub")));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_kernel_listing_failure_fails_init_phase() {
    struct BrokenProbe;

    impl KernelProbe for BrokenProbe {
        fn installed_kernels(&self) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("permission denied")
        }
    }

    let config = RunConfig {
        pipeline: Pipeline::Init,
        ..RunConfig::default()
    };
    let assets = MemoryAssets::placeholders();
    let err = compose_plan(&config, &ubuntu(), &assets, &BrokenProbe, &[]).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Init));
    match err {
        PlanError::Generator { generator, .. } => assert_eq!(generator, "kernel"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_asset_fails_after_install() {
    let assets = MemoryAssets::new();
    let probe = StaticKernelProbe::new(["6.8.0-45-generic"]);
    let err = compose_plan(&RunConfig::default(), &ubuntu(), &assets, &probe, &[]).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::AfterInstall));
}

#[test]
fn test_bad_system_version_fails_install() {
    let system = system_from("ID=ubuntu\nVERSION_ID=rolling\n", Architecture::Amd64);
    let err = compose(&RunConfig::default(), &system).unwrap_err();
    assert!(matches!(err, PlanError::Resolve { phase: Phase::Install, .. }));
}

// =============================================================================
// Kernel selection on a bare target
// =============================================================================

#[test]
fn test_all_plan_composes_on_bare_root() {
    let root = TempDir::new().unwrap();
    let probe = FsKernelProbe::new(root.path());
    let plan = compose_plan(&RunConfig::default(), &ubuntu(), &BuiltinAssets, &probe, &[]).unwrap();

    let init = plan.stages(Phase::Init);
    let link = init.iter().find(|s| s.name() == "Link newest kernel").unwrap();
    assert!(link.commands()[0].contains("/lib/modules"));
    let initrd = init.iter().find(|s| s.name() == "Rebuild initrd").unwrap();
    assert!(initrd.commands()[0].contains("dracut -f /boot/initrd-$kernel $kernel"));
}

#[test]
fn test_init_plan_pins_installed_kernel() {
    let root = TempDir::new().unwrap();
    let modules = root.path().join("lib/modules");
    std::fs::create_dir_all(modules.join("6.8.0-31-generic")).unwrap();
    std::fs::create_dir_all(modules.join("6.8.0-45-generic")).unwrap();

    let config = RunConfig {
        pipeline: Pipeline::Init,
        ..RunConfig::default()
    };
    let probe = FsKernelProbe::new(root.path());
    let plan = compose_plan(&config, &ubuntu(), &BuiltinAssets, &probe, &[]).unwrap();
    let names: Vec<&str> = plan.stages(Phase::Init).iter().map(|s| s.name()).collect();
    assert!(names.contains(&"Link kernel 6.8.0-45-generic"));
}

// =============================================================================
// Unknown systems and predicates
// =============================================================================

#[test]
fn test_unknown_system_composes() {
    let plan = compose(&RunConfig::default(), &SystemDescriptor::unknown()).unwrap();
    let packages = &plan.stages(Phase::Install)[0].packages().install;
    assert_eq!(packages, COMMON_PACKAGES);
}

#[test]
fn test_predicates_are_not_evaluated() {
    let plan = compose(&RunConfig::default(), &ubuntu()).unwrap();
    let alpine_only = plan
        .iter()
        .filter(|(_, s)| s.predicate().families == vec![Family::Alpine])
        .count();
    assert!(alpine_only > 0, "family-gated stages stay in the plan");
}

#[test]
fn test_alpine_plan() {
    let system = system_from(
        "ID=alpine\nVERSION_ID=3.19.1\nPRETTY_NAME=\"Alpine Linux v3.19\"\n",
        Architecture::Arm64,
    );
    assert_eq!(system.version, "3.19");
    let plan = compose(&RunConfig::default(), &system).unwrap();
    let services = plan.stages(Phase::Init).iter().find(|s| s.name() == "Enable services").unwrap();
    assert!(services.services().enable.contains(&"chronyd".to_string()));
}

// =============================================================================
// Fragments and persistence
// =============================================================================

#[test]
fn test_fragment_sources_merge_after_builtins_in_order() {
    let assets = MemoryAssets::placeholders();
    let probe = StaticKernelProbe::new(["6.8.0-45-generic"]);
    let fragments = StaticFragments::new("extensions")
        .with(Phase::AfterInit, Stage::builder("from-fragments").build());
    let stage_extensions = StaticFragments::new("stage-extensions")
        .with(Phase::AfterInit, Stage::builder("from-stage-extensions").build());
    let sources: [&dyn FragmentSource; 2] = [&fragments, &stage_extensions];

    let plan = compose_plan(&RunConfig::default(), &ubuntu(), &assets, &probe, &sources).unwrap();
    let names: Vec<&str> = plan.stages(Phase::AfterInit).iter().map(|s| s.name()).collect();
    let n = names.len();
    assert_eq!(names[n - 2..], ["from-fragments", "from-stage-extensions"]);
    assert_eq!(names[n - 3], "Clean logs and machine-id");
}

#[test]
fn test_plan_persisted_and_reloaded() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig {
        output_dir: dir.path().to_path_buf(),
        ..RunConfig::default()
    };
    let plan = compose(&config, &ubuntu()).unwrap();
    let path = write_plan(&config, &plan).unwrap();
    assert!(path.ends_with("osplan-all.yaml"));

    let text = std::fs::read_to_string(&path).unwrap();
    let offsets: Vec<usize> = Phase::ALL
        .iter()
        .map(|p| text.find(&format!("\n  {}:", p)).unwrap())
        .collect();
    let mut sorted = offsets.clone();
    sorted.sort();
    assert_eq!(offsets, sorted);

    let doc = load_plan(&path).unwrap();
    assert_eq!(doc.stages.len(), 6);
    assert_eq!(doc.stages["init"], plan.stages(Phase::Init));
}
