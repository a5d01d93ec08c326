//! Managed and unmanaged stack lifecycle through the manager store, using the
//! in-memory engine and compose fakes.

mod common;

use common::{container, TestEnv};
use stack_agent::{Error, InitParams, StackOutput, StackStatus};

const COMPOSE: &str = "services:\n  web:\n    image: nginx:alpine\n    volumes:\n      - ./html:/usr/share/nginx/html:ro\n";

fn scratch() -> InitParams {
    InitParams::new().with("compose_content", COMPOSE)
}

#[tokio::test]
async fn test_scratch_init_writes_config_and_project_dir() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    let stack = manager.init_stack("web", "scratch", &scratch()).await.unwrap();
    assert!(stack.is_managed());
    assert!(stack.exists().await);

    let stacks_dir = env.stacks_dir();
    assert!(stacks_dir.join("web.stack.json").is_file());
    assert_eq!(
        std::fs::read_to_string(stacks_dir.join("web/docker-compose.yml")).unwrap(),
        COMPOSE
    );
    assert!(manager.get("web").is_some());
}

#[tokio::test]
async fn test_init_rejects_duplicates_and_unknown_kinds() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    manager.init_stack("web", "scratch", &scratch()).await.unwrap();
    let err = manager.init_stack("web", "scratch", &scratch()).await.err().unwrap();
    assert!(matches!(err, Error::AlreadyExists { .. }), "{}", err);

    let err = manager.init_stack("api", "svn", &scratch()).await.err().unwrap();
    assert!(matches!(err, Error::Configuration(_)), "{}", err);

    let err = manager.init_stack("Bad Name", "scratch", &scratch()).await.err().unwrap();
    assert!(matches!(err, Error::Configuration(_)), "{}", err);
}

#[tokio::test]
async fn test_deregistered_initializer_is_configuration_error() {
    let env = TestEnv::new();
    assert!(env
        .store
        .deregister_initializer(stack_agent::InitializerKind::Scratch));
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    let err = manager.init_stack("web", "scratch", &scratch()).await.err().unwrap();
    assert!(err.to_string().contains("not registered"));
    assert!(!env.stacks_dir().join("web.stack.json").exists());
}

#[tokio::test]
async fn test_managed_up_list_destroy() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, StackStatus::Created);

    let out = manager.start("web").await.unwrap();
    assert!(matches!(out, StackOutput::Compose(_)));
    let listed = manager.list().await.unwrap();
    assert_eq!(listed[0].status, StackStatus::Running);
    assert!(listed[0].managed);

    manager.stop("web").await.unwrap();
    assert_eq!(manager.list().await.unwrap()[0].status, StackStatus::Idle);

    let report = manager.destroy("web").await;
    assert!(report.is_clean(), "{:?}", report);
    assert!(!env.stacks_dir().join("web").exists());
    assert!(!env.stacks_dir().join("web.stack.json").exists());
    assert!(manager.list().await.unwrap().is_empty());
    assert_eq!(env.compose.commands(), vec!["up", "stop", "down"]);
}

#[tokio::test]
async fn test_compose_invocation_defaults() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();

    manager.start("web").await.unwrap();
    let up = env.compose.last().unwrap();
    assert_eq!(up.project_name, "web");
    assert_eq!(up.compose_file, "docker-compose.yml");
    assert_eq!(up.working_dir, env.stacks_dir().join("web"));
    assert_eq!(
        up.args.to_cmdargs(),
        vec!["--detach", "--build", "--force-recreate"]
    );
    assert_eq!(up.env.get("COMPOSE_PROJECT_NAME").unwrap(), "web");
    assert_eq!(
        up.env.get("DOCKER_HOST").unwrap(),
        "unix:///var/run/docker.sock"
    );
    assert!(!up.env.contains_key("RUST_LOG"));

    manager.restart("web").await.unwrap();
    let restart = env.compose.last().unwrap();
    assert_eq!(restart.args.to_cmdargs(), vec!["--timeout", "60"]);
}

#[tokio::test]
async fn test_compose_failure_is_external_process_error() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();

    env.compose.fail_with(1, "no such image: nginx:nope");
    let err = manager.start("web").await.unwrap_err();
    match err {
        Error::ExternalProcess {
            stderr, exit_code, ..
        } => {
            assert_eq!(stderr, "no such image: nginx:nope");
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_destroy_ignores_engine_failures_and_is_idempotent() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();

    env.compose.fail_with(1, "Cannot connect to the Docker daemon");
    let report = manager.destroy("web").await;
    assert_eq!(report.errors.len(), 1, "{:?}", report);
    assert!(report.errors[0].starts_with("down failed"));
    assert!(!env.stacks_dir().join("web").exists());
    assert!(!env.stacks_dir().join("web.stack.json").exists());
    assert!(manager.get("web").is_none());

    // Second destroy sees an unmanaged stack with no containers.
    let report = manager.destroy("web").await;
    assert!(report.is_clean(), "{:?}", report);
}

#[tokio::test]
async fn test_unknown_name_adopts_empty_unmanaged_stack() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    let stack = manager.get_or_unmanaged("ghost").await;
    assert!(!stack.is_managed());
    assert!(!stack.exists().await);
    assert_eq!(stack.project_dir(), None);

    let err = manager.describe("ghost").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_adoption_survives_engine_failure() {
    let env = TestEnv::new();
    env.engine.fail_listing(true);
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    let stack = manager.get_or_unmanaged("legacy").await;
    assert_eq!(stack.project_dir(), None);
    assert!(!stack.exists().await);
}

#[tokio::test]
async fn test_unmanaged_stack_operates_per_container() {
    let env = TestEnv::new();
    env.engine.add(container("a1", "legacy", "/opt/legacy", "exited"));
    env.engine.add(container("a2", "legacy", "/opt/legacy", "exited"));
    env.engine.add(container("b1", "other", "/opt/other", "running"));
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    let stack = manager.get_or_unmanaged("legacy").await;
    assert_eq!(stack.project_dir(), Some(std::path::Path::new("/opt/legacy")));

    match manager.start("legacy").await.unwrap() {
        StackOutput::Containers(batch) => {
            assert_eq!(batch.attempted, 2);
            assert!(batch.is_success());
        }
        other => panic!("unexpected output: {}", other),
    }
    assert_eq!(env.engine.state_of("a1").as_deref(), Some("running"));
    assert_eq!(env.engine.state_of("b1").as_deref(), Some("running"));

    match manager.delete("legacy").await.unwrap() {
        StackOutput::Containers(batch) => {
            assert!(batch.notes[0].contains("DESTROY"));
        }
        other => panic!("unexpected output: {}", other),
    }
    assert_eq!(env.engine.state_of("a2").as_deref(), Some("exited"));
    assert!(env.compose.commands().is_empty());
}

#[tokio::test]
async fn test_unmanaged_failures_are_collected() {
    let env = TestEnv::new();
    env.engine.add(container("a1", "legacy", "/opt/legacy", "running"));
    env.engine.add(container("a2", "legacy", "/opt/legacy", "running"));
    env.engine.add(container("a3", "legacy", "/opt/legacy", "running"));
    env.engine.fail_container("a2");
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    let StackOutput::Containers(batch) = manager.stop("legacy").await.unwrap() else {
        panic!("expected per-container output");
    };
    assert_eq!(batch.attempted, 3);
    assert_eq!(batch.succeeded, vec!["a1", "a3"]);
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(env.engine.state_of("a3").as_deref(), Some("exited"));

    let err = batch.into_result().unwrap_err();
    assert!(matches!(err, Error::PartialFailure { failed: 1, attempted: 3, .. }));
}

#[tokio::test]
async fn test_unmanaged_destroy_removes_containers() {
    let env = TestEnv::new();
    env.engine.add(container("a1", "legacy", "/opt/legacy", "running"));
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    let report = manager.destroy("legacy").await;
    assert!(report.is_clean(), "{:?}", report);
    assert!(env.engine.containers().is_empty());
    assert!(!manager.get_or_unmanaged("legacy").await.exists().await);
}

#[tokio::test]
async fn test_list_includes_unmanaged_projects() {
    let env = TestEnv::new();
    env.engine.add(container("a1", "legacy", "/opt/legacy", "exited"));
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();

    let listed = manager.list().await.unwrap();
    let names: Vec<_> = listed.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["legacy", "web"]);
    assert!(!listed[0].managed);
    assert_eq!(listed[0].status, StackStatus::Idle);
    assert_eq!(
        listed[0].project_dir.as_deref(),
        Some(std::path::Path::new("/opt/legacy"))
    );
}

#[tokio::test]
async fn test_list_without_engine_still_shows_managed() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();
    env.engine.fail_listing(true);

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, StackStatus::Created);
}

#[tokio::test]
async fn test_enumerate_skips_broken_configs() {
    let env = TestEnv::new();
    let stacks_dir = env.stacks_dir();
    std::fs::create_dir_all(&stacks_dir).unwrap();
    std::fs::write(stacks_dir.join("broken.stack.json"), "{not json").unwrap();
    std::fs::write(stacks_dir.join("notes.txt"), "ignored").unwrap();

    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();

    assert_eq!(manager.enumerate().unwrap(), 1);
    assert!(manager.get("broken").is_none());
    assert!(manager.get("web").is_some());
}

#[tokio::test]
async fn test_enumerate_ignores_configs_with_invalid_file_names() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;
    manager.init_stack("web", "scratch", &scratch()).await.unwrap();

    let stacks_dir = env.stacks_dir();
    let config = std::fs::read(stacks_dir.join("web.stack.json")).unwrap();
    std::fs::write(stacks_dir.join("..stack.json"), &config).unwrap();
    std::fs::write(stacks_dir.join("Web.stack.json"), &config).unwrap();

    assert_eq!(manager.enumerate().unwrap(), 1);
    assert_eq!(manager.names(), vec!["web"]);

    // "." is not managed, so destroying it only touches containers.
    let report = manager.destroy(".").await;
    assert!(report.is_clean(), "{:?}", report);
    assert!(stacks_dir.join("web.stack.json").is_file());
    assert!(stacks_dir.join("web/docker-compose.yml").is_file());
    assert!(manager.get("web").is_some());
}

#[tokio::test]
async fn test_enumerate_drops_adopted_stacks() {
    let env = TestEnv::new();
    let manager = env.store.get("local").unwrap();
    let mut manager = manager.lock().await;

    manager.get_or_unmanaged("ghost").await;
    assert_eq!(manager.names(), vec!["ghost"]);
    manager.enumerate().unwrap();
    assert!(manager.names().is_empty());
}

#[tokio::test]
async fn test_store_hands_out_one_manager_per_context() {
    let env = TestEnv::new();
    let a = env.store.get("local").unwrap();
    let b = env.store.get("local").unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));

    let default = env.store.get("default").unwrap();
    assert!(!std::sync::Arc::ptr_eq(&a, &default));

    let err = env.store.get("nowhere").err().unwrap();
    assert!(matches!(err, Error::NotFound { kind: "Context", .. }));
}

#[tokio::test]
async fn test_stacks_are_scoped_per_context() {
    let env = TestEnv::new();
    {
        let local = env.store.get("local").unwrap();
        let mut local = local.lock().await;
        local.init_stack("web", "scratch", &scratch()).await.unwrap();
    }
    let other = env.store.get("default").unwrap();
    let mut other = other.lock().await;
    assert!(other.get("web").is_none());
    other.init_stack("web", "scratch", &scratch()).await.unwrap();
    assert!(env
        .data_dir()
        .join("stacks/default/web.stack.json")
        .is_file());
}
