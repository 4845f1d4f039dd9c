//! Agent-side job execution

use std::collections::BTreeSet;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::playbook::{Play, Vars};
use crate::protocol::{JobFrame, ProtocolError, RecordWriter};
use crate::runtime::dispatch::{merge_vars, Dispatcher};
use crate::runtime::error::ExecutionError;
use crate::runtime::state::TaskResult;

/// Counters for one executed job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub plays: usize,
    pub results: usize,
    pub changed: usize,
    pub failed: usize,
}

impl ExecutionSummary {
    fn record(&mut self, result: &TaskResult) {
        self.results += 1;
        if result.changed {
            self.changed += 1;
        }
        if result.is_failed() {
            self.failed += 1;
        }
    }
}

/// Executes plays in order, one task at a time, streaming each result as
/// soon as it is known
pub struct AgentExecutor {
    dispatcher: Dispatcher,
}

impl AgentExecutor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Consume job frames until the stream ends. The first frame must be the
    /// header; each following play is executed as soon as it arrives.
    pub async fn execute<W>(
        &self,
        mut frames: mpsc::Receiver<Result<JobFrame, ProtocolError>>,
        writer: &mut RecordWriter<W>,
    ) -> Result<ExecutionSummary, ExecutionError>
    where
        W: AsyncWrite + Unpin,
    {
        let job_vars = match frames.recv().await.transpose()? {
            Some(JobFrame::Header { vars }) => vars,
            Some(other) => {
                return Err(ProtocolError::UnexpectedFrame {
                    expected: "header".to_string(),
                    found: other.kind().to_string(),
                }
                .into())
            }
            None => return Err(ProtocolError::MissingHeader.into()),
        };

        let mut summary = ExecutionSummary::default();
        while let Some(frame) = frames.recv().await.transpose()? {
            let play = match frame {
                JobFrame::Play(play) => play,
                other => {
                    return Err(ProtocolError::UnexpectedFrame {
                        expected: "play".to_string(),
                        found: other.kind().to_string(),
                    }
                    .into())
                }
            };
            self.run_play(summary.plays, &play, &job_vars, writer, &mut summary)
                .await?;
            summary.plays += 1;
        }

        info!(
            "Job finished: {} plays, {} results, {} changed, {} failed",
            summary.plays, summary.results, summary.changed, summary.failed
        );
        Ok(summary)
    }

    /// Run the tasks of one play, then its notified handlers. A failed task
    /// or handler ends the play.
    pub async fn run_play<W>(
        &self,
        play_idx: usize,
        play: &Play,
        job_vars: &Vars,
        writer: &mut RecordWriter<W>,
        summary: &mut ExecutionSummary,
    ) -> Result<(), ExecutionError>
    where
        W: AsyncWrite + Unpin,
    {
        info!("Play {}: {}", play_idx, play.name);
        let inherited = merge_vars(&[job_vars, &play.vars]);
        let mut notified = BTreeSet::new();

        for (task_idx, task) in play.tasks.iter().enumerate() {
            let mut result = self.dispatcher.run(task.clone(), &inherited).await;
            result.play_idx = play_idx;
            result.task_idx = task_idx;
            notified.extend(result.notified_handlers());

            summary.record(&result);
            writer.write_record(&result).await?;
            if result.is_failed() {
                warn!("Task {} failed, ending play '{}'", task.label(), play.name);
                return Ok(());
            }
        }

        for (handler_idx, handler) in play.handlers.iter().enumerate() {
            let mut result = if notified.contains(&handler.name) {
                self.dispatcher.run(handler.clone(), &inherited).await
            } else {
                TaskResult::skipped("not notified\n").with_task(handler.stripped())
            };
            result.play_idx = play_idx;
            result.task_idx = play.tasks.len() + handler_idx;
            notified.extend(result.notified_handlers());

            summary.record(&result);
            writer.write_record(&result).await?;
            if result.is_failed() {
                warn!("Handler {} failed, ending play '{}'", handler.label(), play.name);
                return Ok(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::{Task, POSITIONAL_ARG};
    use crate::protocol::RecordReader;
    use crate::runners::RunnerRegistry;
    use crate::runtime::TaskStatus;
    use std::sync::Arc;

    fn shell(script: &str) -> Task {
        Task::new("shell").with_arg(POSITIONAL_ARG, script)
    }

    async fn run_job(plays: Vec<Play>) -> (ExecutionSummary, Vec<TaskResult>) {
        let executor = AgentExecutor::new(Dispatcher::new(Arc::new(
            RunnerRegistry::with_core_runners(),
        )));
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(JobFrame::Header { vars: Vars::new() }))
            .await
            .unwrap();
        for play in plays {
            tx.send(Ok(JobFrame::Play(play))).await.unwrap();
        }
        drop(tx);

        let mut writer = RecordWriter::new(Vec::new());
        let summary = executor.execute(rx, &mut writer).await.unwrap();

        let output = writer.into_inner();
        let mut reader = RecordReader::new(output.as_slice());
        let mut results = Vec::new();
        while let Some(result) = reader.next_record::<TaskResult>().await.unwrap() {
            results.push(result);
        }
        (summary, results)
    }

    #[tokio::test]
    async fn test_failed_task_ends_play_only() {
        let failing = Play {
            name: "failing".to_string(),
            tasks: vec![shell("echo one"), shell("exit 1"), shell("echo never")],
            handlers: vec![shell("echo handler").with_name("h")],
            ..Default::default()
        };
        let next = Play {
            name: "next".to_string(),
            tasks: vec![shell("echo two")],
            ..Default::default()
        };

        let (summary, results) = run_job(vec![failing, next]).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].status, TaskStatus::Failed);
        assert_eq!((results[2].play_idx, results[2].output.as_str()), (1, "two\n"));
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.plays, 2);
    }

    #[tokio::test]
    async fn test_handlers_run_only_when_notified() {
        let play = Play {
            tasks: vec![
                shell("echo changed").with_notify("restart"),
                Task::new("debug").with_arg("msg", "unchanged").with_notify("reload"),
            ],
            handlers: vec![
                shell("echo restarting").with_name("restart"),
                shell("echo reloading").with_name("reload"),
            ],
            ..Default::default()
        };

        let (_, results) = run_job(vec![play]).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[2].status, TaskStatus::Success);
        assert_eq!(results[2].output, "restarting\n");
        assert_eq!(results[2].task_idx, 2);
        assert_eq!(results[3].status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn test_handler_can_notify_later_handler() {
        let play = Play {
            tasks: vec![shell("true").with_notify("first")],
            handlers: vec![
                shell("echo first").with_name("first").with_notify("second"),
                shell("echo second").with_name("second"),
            ],
            ..Default::default()
        };

        let (_, results) = run_job(vec![play]).await;
        assert_eq!(results[1].output, "first\n");
        assert_eq!(results[2].output, "second\n");
    }

    #[tokio::test]
    async fn test_missing_header_is_a_protocol_error() {
        let executor = AgentExecutor::new(Dispatcher::new(Arc::new(RunnerRegistry::new())));
        let (tx, rx) = mpsc::channel(1);
        tx.send(Ok(JobFrame::Play(Play::default()))).await.unwrap();
        drop(tx);

        let mut writer = RecordWriter::new(Vec::new());
        let err = executor.execute(rx, &mut writer).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Protocol(ProtocolError::UnexpectedFrame { .. })
        ));
    }
}
