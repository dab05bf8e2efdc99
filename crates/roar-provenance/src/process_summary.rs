//! Process-tree summarization (§4.9): collapse fork-only descendants into
//! a `fork_count` on their nearest execed ancestor.
//!
//! Grounded on
//! `original_source/roar/services/execution/provenance/process_summarizer.py`'s
//! `ProcessSummarizerService`. That source's `_summarize_node` only
//! collapses one level of fork-only grandchildren past a fork-only child,
//! silently dropping anything further down a longer fork chain. spec.md's
//! "count fork-only descendants ... recurse into children whose command
//! differs" has no such depth limit, so this walks an arbitrary-length
//! fork chain instead of reproducing that one-level cutoff.

use std::collections::BTreeMap;

use serde::Serialize;

/// One observed process, as ingested from the tracer (§4.5).
#[derive(Debug, Clone)]
pub struct ProcessNode {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub command: Vec<String>,
}

/// A summarized subtree: `fork_count` and `children` are present only
/// when non-empty, per spec.md's "suppressed empty fields".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fork_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ProcessSummary>>,
}

/// Collapse fork-only duplicates into a tree rooted at every process with
/// no parent present in `processes`.
pub fn summarize(processes: &[ProcessNode]) -> Vec<ProcessSummary> {
    if processes.is_empty() {
        return Vec::new();
    }

    let by_pid: BTreeMap<u32, &ProcessNode> = processes.iter().map(|p| (p.pid, p)).collect();
    let mut children_of: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for p in processes {
        if let Some(parent) = p.parent_pid {
            children_of.entry(parent).or_default().push(p.pid);
        }
    }

    processes
        .iter()
        .filter(|p| !p.parent_pid.is_some_and(|parent| by_pid.contains_key(&parent)))
        .map(|root| summarize_node(root.pid, &by_pid, &children_of))
        .collect()
}

fn summarize_node(
    pid: u32,
    by_pid: &BTreeMap<u32, &ProcessNode>,
    children_of: &BTreeMap<u32, Vec<u32>>,
) -> ProcessSummary {
    let command = by_pid[&pid].command.clone();

    let mut fork_count = 0u32;
    let mut exec_children = Vec::new();
    walk_fork_chain(pid, &command, by_pid, children_of, &mut fork_count, &mut exec_children);

    ProcessSummary {
        command,
        fork_count: (fork_count > 0).then_some(fork_count),
        children: (!exec_children.is_empty()).then_some(exec_children),
    }
}

/// Walk `pid`'s children against `root_command`: a child with the same
/// command is fork-only, counted, and its own children are walked against
/// the same `root_command`; a child with a different command has execed
/// and becomes its own summarized subtree.
fn walk_fork_chain(
    pid: u32,
    root_command: &[String],
    by_pid: &BTreeMap<u32, &ProcessNode>,
    children_of: &BTreeMap<u32, Vec<u32>>,
    fork_count: &mut u32,
    exec_children: &mut Vec<ProcessSummary>,
) {
    let Some(child_pids) = children_of.get(&pid) else { return };
    for &child_pid in child_pids {
        let Some(child) = by_pid.get(&child_pid) else { continue };
        if child.command == root_command {
            *fork_count += 1;
            walk_fork_chain(child_pid, root_command, by_pid, children_of, fork_count, exec_children);
        } else {
            exec_children.push(summarize_node(child_pid, by_pid, children_of));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(pid: u32, parent: Option<u32>, command: &[&str]) -> ProcessNode {
        ProcessNode { pid, parent_pid: parent, command: command.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(summarize(&[]).is_empty());
    }

    #[test]
    fn single_process_has_no_fork_count_or_children() {
        let summary = summarize(&[node(1, None, &["python", "x.py"])]);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].fork_count, None);
        assert_eq!(summary[0].children, None);
    }

    #[test]
    fn execed_child_becomes_nested_summary() {
        let processes = vec![node(1, None, &["bash"]), node(2, Some(1), &["python", "x.py"])];
        let summary = summarize(&processes);
        assert_eq!(summary.len(), 1);
        let children = summary[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].command, vec!["python".to_string(), "x.py".to_string()]);
    }

    #[test]
    fn single_fork_only_child_is_counted_not_nested() {
        let processes = vec![node(1, None, &["python", "x.py"]), node(2, Some(1), &["python", "x.py"])];
        let summary = summarize(&processes);
        assert_eq!(summary[0].fork_count, Some(1));
        assert_eq!(summary[0].children, None);
    }

    #[test]
    fn long_fork_chain_collapses_fully_and_final_exec_still_surfaces() {
        // A forks B forks C forks D (all same command), D execs E.
        let processes = vec![
            node(1, None, &["python", "x.py"]),
            node(2, Some(1), &["python", "x.py"]),
            node(3, Some(2), &["python", "x.py"]),
            node(4, Some(3), &["python", "x.py"]),
            node(5, Some(4), &["gcc", "-o", "out", "a.c"]),
        ];
        let summary = summarize(&processes);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].fork_count, Some(3));
        let children = summary[0].children.as_ref().expect("exec child must survive a long fork chain");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].command, vec!["gcc".to_string(), "-o".to_string(), "out".to_string(), "a.c".to_string()]);
    }

    #[test]
    fn unrelated_roots_are_each_summarized() {
        let processes = vec![node(1, None, &["bash"]), node(2, None, &["python", "x.py"])];
        let summary = summarize(&processes);
        assert_eq!(summary.len(), 2);
    }

    #[test]
    fn process_with_unknown_parent_is_treated_as_root() {
        let processes = vec![node(5, Some(99), &["python", "x.py"])];
        let summary = summarize(&processes);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].command, vec!["python".to_string(), "x.py".to_string()]);
    }
}
