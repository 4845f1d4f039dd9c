use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::playbook::{Playbook, Vars};
use crate::protocol::Job;

/// Slice a compiled playbook into one Job per host. Plays keep their
/// playbook order inside each Job; a host listed twice in one play gets the
/// play once, and hosts without plays get no Job at all.
pub fn assemble_jobs(playbook: &Playbook, job_vars: &Vars) -> BTreeMap<String, Job> {
    let mut jobs: BTreeMap<String, Job> = BTreeMap::new();

    for play in playbook.iter() {
        let hosts: BTreeSet<&str> = play
            .hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();

        for host in hosts {
            jobs.entry(host.to_string())
                .or_insert_with(|| Job {
                    vars: job_vars.clone(),
                    plays: Vec::new(),
                })
                .plays
                .push(play.clone());
        }
    }

    for (host, job) in &jobs {
        debug!("Job for {}: {} plays", host, job.plays.len());
    }
    jobs
}
