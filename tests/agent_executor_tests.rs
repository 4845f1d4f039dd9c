//! The agent loop fed with encoded job bytes, as it would read them on stdin

mod common;

use async_trait::async_trait;
use common::shell;
use rustle_converge::playbook::{Play, Task, Vars};
use rustle_converge::protocol::{
    encode_job, spawn_frame_reader, Compression, Job, RecordReader, RecordWriter,
};
use rustle_converge::runners::{RunContext, Runner, RunnerError, RunnerRegistry};
use rustle_converge::runtime::{AgentExecutor, Dispatcher, ExecutionSummary, TaskResult, TaskStatus};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

struct Exploding;

#[async_trait]
impl Runner for Exploding {
    fn name(&self) -> &'static str {
        "explode"
    }

    async fn run(
        &self,
        _task: &mut Task,
        _ctx: &RunContext<'_>,
    ) -> Result<TaskResult, RunnerError> {
        panic!("runner blew up")
    }
}

async fn run_agent(job: &Job, compression: Compression) -> (ExecutionSummary, Vec<TaskResult>) {
    let mut registry = RunnerRegistry::with_core_runners();
    registry.register(Box::new(Exploding));
    let executor = AgentExecutor::new(Dispatcher::new(Arc::new(registry)));

    let stdin = encode_job(job, compression).unwrap();
    let frames = spawn_frame_reader(Cursor::new(stdin), compression);
    let mut writer = RecordWriter::new(Vec::new());
    let summary = executor.execute(frames, &mut writer).await.unwrap();

    let stdout = writer.into_inner();
    let mut reader = RecordReader::new(stdout.as_slice());
    let mut results = Vec::new();
    while let Some(result) = reader.next_record::<TaskResult>().await.unwrap() {
        results.push(result);
    }
    (summary, results)
}

fn job(plays: Vec<Play>) -> Job {
    let vars: Vars = serde_json::from_value(json!({"greeting": "hello", "who": "job"})).unwrap();
    Job { vars, plays }
}

#[tokio::test]
async fn test_compressed_job_runs_in_order() {
    let play = Play {
        name: "greet".to_string(),
        vars: serde_json::from_value(json!({"who": "play"})).unwrap(),
        tasks: vec![
            shell("echo {{ greeting }} {{ who }}"),
            Task::new("debug").with_arg("msg", "{{ who }}"),
        ],
        ..Default::default()
    };
    let (summary, results) = run_agent(&job(vec![play]), Compression::Zstd).await;

    assert_eq!(summary.results, 2);
    assert_eq!(results[0].output, "hello play\n");
    assert!(results[0].changed);
    assert_eq!((results[1].play_idx, results[1].task_idx), (0, 1));
    assert!(!results[1].changed);
}

#[tokio::test]
async fn test_handlers_follow_notifications() {
    let play = Play {
        tasks: vec![
            shell("true").with_notify("restart"),
            Task::new("debug").with_arg("msg", "unchanged").with_notify("reload"),
        ],
        handlers: vec![
            shell("echo restarting").with_name("restart"),
            shell("echo reloading").with_name("reload"),
        ],
        ..Default::default()
    };
    let (_, results) = run_agent(&job(vec![play]), Compression::None).await;

    assert_eq!(results.len(), 4);
    assert_eq!(results[2].output, "restarting\n");
    assert_eq!(results[2].task_idx, 2);
    assert_eq!(results[3].status, TaskStatus::Skipped);
}

#[tokio::test]
async fn test_panicking_runner_fails_task_not_agent() {
    let first = Play {
        tasks: vec![Task::new("explode"), shell("echo unreachable")],
        ..Default::default()
    };
    let second = Play {
        tasks: vec![shell("echo still running")],
        ..Default::default()
    };
    let (summary, results) = run_agent(&job(vec![first, second]), Compression::Zstd).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, TaskStatus::Failed);
    assert!(results[0].output.contains("runner blew up"), "{}", results[0].output);
    assert_eq!(results[1].play_idx, 1);
    assert_eq!(results[1].output, "still running\n");
    assert_eq!((summary.plays, summary.failed), (2, 1));
}

#[tokio::test]
async fn test_unless_guard_short_circuits() {
    let mut guarded = shell("echo should not run");
    guarded.unless = Some("true".to_string());
    let play = Play {
        tasks: vec![guarded],
        ..Default::default()
    };
    let (_, results) = run_agent(&job(vec![play]), Compression::None).await;

    assert_eq!(results[0].status, TaskStatus::Success);
    assert!(!results[0].changed);
    assert!(!results[0].output.contains("should not run"));
}
