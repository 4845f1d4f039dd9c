//! Tree reconciliation driven through the dispatcher, the way a controller
//! pre-run followed by an agent run would drive it

mod common;

use common::{mode_of, TestEnvironment};
use rustle_converge::playbook::{Task, Vars, ASSETS_ARG};
use rustle_converge::runtime::TaskStatus;
use serde_json::json;

fn vars() -> Vars {
    serde_json::from_value(json!({"env": "staging"})).unwrap()
}

fn source_tree(env: &TestEnvironment) {
    env.create_file("files/etc/motd", "Welcome to {{ env }}\n");
    let script = env.create_file("files/bin/deploy.sh", "#!/bin/sh\necho deploy\n");
    env.create_file("files/secret/token", "s3cr3t\n");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o700)).unwrap();
    }
}

fn tree_task(env: &TestEnvironment, dst: &str) -> Task {
    Task::new("tree")
        .with_arg("src", "files")
        .with_arg("dst", env.join(dst).to_string_lossy().to_string())
}

#[cfg(unix)]
#[tokio::test]
async fn test_tree_converges_then_is_idempotent() {
    let env = TestEnvironment::new();
    source_tree(&env);
    env.create_dir("target");
    let dispatcher = env.dispatcher();

    let mut task = tree_task(&env, "target");
    let loaded = dispatcher.pre_run(&mut task, &vars()).await;
    assert_eq!(loaded.status, TaskStatus::Success, "{}", loaded.output);
    assert!(task.args.contains_key(ASSETS_ARG));

    let first = dispatcher.run(task.clone(), &vars()).await;
    assert_eq!(first.status, TaskStatus::Success, "{}", first.output);
    assert!(first.changed);
    assert_eq!(env.read("target/etc/motd"), "Welcome to staging\n");
    assert_eq!(mode_of(&env.join("target/etc")), 0o755);
    assert_eq!(mode_of(&env.join("target/etc/motd")), 0o644);
    assert_eq!(mode_of(&env.join("target/bin/deploy.sh")), 0o755);
    assert!(!first
        .task
        .as_ref()
        .unwrap()
        .args
        .keys()
        .any(|k| k.starts_with(ASSETS_ARG)));

    let second = dispatcher.run(task, &vars()).await;
    assert_eq!(second.status, TaskStatus::Success);
    assert!(!second.changed);
    for line in second.trimmed_output() {
        assert!(line.starts_with("ok "), "unexpected line {line}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_prefix_umask_and_notify() {
    let env = TestEnvironment::new();
    source_tree(&env);
    env.create_dir("target");
    let dispatcher = env.dispatcher();

    let mut task = tree_task(&env, "target")
        .with_arg("/secret", "umask=077 notify=rotate,audit")
        .with_arg("/etc", "notify=reload-motd");
    dispatcher.pre_run(&mut task, &vars()).await;

    let result = dispatcher.run(task.clone(), &vars()).await;
    assert_eq!(result.status, TaskStatus::Success, "{}", result.output);
    assert_eq!(mode_of(&env.join("target/secret")), 0o700);
    assert_eq!(mode_of(&env.join("target/secret/token")), 0o600);
    let notified: Vec<&str> = result.notify.iter().map(String::as_str).collect();
    assert_eq!(notified, vec!["audit", "reload-motd", "rotate"]);

    // only the changed subtree notifies on the next run
    std::fs::write(env.join("target/etc/motd"), "drifted\n").unwrap();
    let again = dispatcher.run(task, &vars()).await;
    assert!(again.changed);
    let notified: Vec<&str> = again.notify.iter().map(String::as_str).collect();
    assert_eq!(notified, vec!["reload-motd"]);
}

#[tokio::test]
async fn test_type_conflict_fails_task() {
    let env = TestEnvironment::new();
    source_tree(&env);
    env.create_file("target/etc", "a file where a directory belongs\n");
    let dispatcher = env.dispatcher();

    let mut task = tree_task(&env, "target");
    dispatcher.pre_run(&mut task, &vars()).await;
    let result = dispatcher.run(task, &vars()).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.output.contains("Cannot overwrite"), "{}", result.output);
}

#[tokio::test]
async fn test_missing_destination_fails_task() {
    let env = TestEnvironment::new();
    source_tree(&env);
    let dispatcher = env.dispatcher();

    let mut task = tree_task(&env, "absent");
    dispatcher.pre_run(&mut task, &vars()).await;
    let result = dispatcher.run(task, &vars()).await;
    assert_eq!(result.status, TaskStatus::Failed);
}

#[cfg(unix)]
#[tokio::test]
async fn test_mode_drift_is_corrected_without_rewrite() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnvironment::new();
    source_tree(&env);
    env.create_dir("target");
    let dispatcher = env.dispatcher();

    let mut task = tree_task(&env, "target");
    dispatcher.pre_run(&mut task, &vars()).await;
    dispatcher.run(task.clone(), &vars()).await;

    let motd = env.join("target/etc/motd");
    std::fs::set_permissions(&motd, std::fs::Permissions::from_mode(0o600)).unwrap();

    let result = dispatcher.run(task, &vars()).await;
    assert_eq!(result.status, TaskStatus::Success, "{}", result.output);
    assert!(result.changed);
    assert_eq!(mode_of(&motd), 0o644);
    assert_eq!(env.read("target/etc/motd"), "Welcome to staging\n");
    let changed: Vec<&str> = result
        .output
        .lines()
        .filter(|line| line.starts_with("changed"))
        .collect();
    assert_eq!(changed.len(), 1, "{}", result.output);
    assert!(changed[0].ends_with("etc/motd"));
}

/// A group of the current user other than its effective one, falling back
/// to the effective group
#[cfg(target_os = "linux")]
fn assignable_gid() -> u32 {
    use nix::unistd::{getegid, getgroups};

    let egid = getegid();
    getgroups()
        .unwrap_or_default()
        .into_iter()
        .find(|gid| *gid != egid)
        .unwrap_or(egid)
        .as_raw()
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_prefix_ownership_is_reconciled_once() {
    use std::os::unix::fs::MetadataExt;

    let env = TestEnvironment::new();
    source_tree(&env);
    env.create_dir("target");
    let dispatcher = env.dispatcher();

    let uid = nix::unistd::geteuid().as_raw();
    let gid = assignable_gid();
    let mut task = tree_task(&env, "target")
        .with_arg("/etc", format!("owner={uid} group={gid}"));
    dispatcher.pre_run(&mut task, &vars()).await;

    let first = dispatcher.run(task.clone(), &vars()).await;
    assert_eq!(first.status, TaskStatus::Success, "{}", first.output);
    assert!(first.changed);
    for path in ["target/etc", "target/etc/motd"] {
        let metadata = std::fs::metadata(env.join(path)).unwrap();
        assert_eq!((metadata.uid(), metadata.gid()), (uid, gid), "{path}");
    }

    let second = dispatcher.run(task, &vars()).await;
    assert_eq!(second.status, TaskStatus::Success, "{}", second.output);
    assert!(!second.changed, "{}", second.output);
}
