//! Process tree discovery and termination.
//!
//! The injection helper may start children of its own (PowerShell hosts do),
//! so tearing it down means killing every descendant, not just the pid we
//! spawned.

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::debug;

/// A process identified by pid and start time, so a recycled pid is never
/// mistaken for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessMark {
    pub pid: u32,
    pub start_time: u64,
}

/// Finds and kills a process together with all of its descendants.
///
/// Uses the `sysinfo` crate to snapshot the process table and walk the
/// parent links downwards from a root pid.
///
/// # Example
///
/// ```no_run
/// use key_presser::process_tree::ProcessTree;
///
/// let child = std::process::Command::new("sleep").arg("60").spawn().unwrap();
/// let mut tree = ProcessTree::new();
/// let killed = tree.kill_tree(child.id());
/// println!("killed {} processes", killed);
/// ```
pub struct ProcessTree {
    system: System,
}

impl Default for ProcessTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTree {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// All descendants of `root`, parents before children.
    pub fn descendants(&mut self, root: u32) -> Vec<u32> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let mut found = Vec::new();
        let mut frontier = vec![Pid::from_u32(root)];
        while let Some(parent) = frontier.pop() {
            for (pid, process) in self.system.processes() {
                if process.parent() == Some(parent) && !found.contains(&pid.as_u32()) {
                    found.push(pid.as_u32());
                    frontier.push(*pid);
                }
            }
        }
        found
    }

    /// Marks for every current descendant of `root`.
    pub fn snapshot(&mut self, root: u32) -> Vec<ProcessMark> {
        self.descendants(root)
            .into_iter()
            .filter_map(|pid| {
                self.system.process(Pid::from_u32(pid)).map(|p| ProcessMark {
                    pid,
                    start_time: p.start_time(),
                })
            })
            .collect()
    }

    /// Kill the still-running processes among `marks`. Used after the root
    /// died, when its children have been re-parented out of the tree.
    pub fn kill_marked(&mut self, marks: &[ProcessMark]) -> usize {
        if marks.is_empty() {
            return 0;
        }
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let mut killed = 0;
        for mark in marks.iter().rev() {
            match self.system.process(Pid::from_u32(mark.pid)) {
                Some(process) if process.start_time() == mark.start_time => {
                    if process.kill() {
                        killed += 1;
                    }
                }
                _ => {}
            }
        }
        killed
    }

    /// Whether `pid` is running. Zombies count as gone.
    pub fn is_alive(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }

    /// Kill `root` and every descendant. Children go first so none of them is
    /// re-parented away from the tree while we work. Processes that already
    /// exited are skipped. Returns how many kills were delivered.
    pub fn kill_tree(&mut self, root: u32) -> usize {
        let mut targets = self.descendants(root);
        targets.reverse();
        targets.push(root);

        let mut killed = 0;
        for pid in targets {
            if let Some(process) = self.system.process(Pid::from_u32(pid)) {
                if process.kill() {
                    killed += 1;
                } else {
                    debug!(pid, "kill not delivered");
                }
            }
        }
        killed
    }
}
