use serde::{Deserialize, Serialize};

use crate::playbook::{Play, Vars};

/// Unit of work shipped to one host: the plays targeting it plus job vars
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub vars: Vars,
    #[serde(default)]
    pub plays: Vec<Play>,
}

impl Job {
    /// Results a host reports when every task and handler runs
    pub fn result_count(&self) -> usize {
        self.plays.iter().map(Play::result_count).sum()
    }

    /// Wire frames for this job: one header, then one frame per play
    pub fn frames(&self) -> impl Iterator<Item = JobFrame> + '_ {
        std::iter::once(JobFrame::Header {
            vars: self.vars.clone(),
        })
        .chain(self.plays.iter().cloned().map(JobFrame::Play))
    }
}

/// One record of the controller to agent stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum JobFrame {
    Header {
        #[serde(default)]
        vars: Vars,
    },
    Play(Play),
}

impl JobFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            JobFrame::Header { .. } => "header",
            JobFrame::Play(_) => "play",
        }
    }
}
