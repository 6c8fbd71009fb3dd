//! Cooperative, priority-ordered dispatch over a circuit's dependency
//! graph (§4.7 "Scheduling model").
//!
//! Each step walks the execution order via Kahn's algorithm: a node is
//! *ready* once every predecessor has run this step, and among several
//! ready nodes the one with the highest priority runs next. Ties are
//! broken by node index, so dispatch order is deterministic.

use crate::{
    circuit::runtime::Runtime,
    error::{Error, Result},
};
use priority_queue::PriorityQueue;

/// One schedulable unit: a step closure plus its dispatch priority.
pub struct ScheduledNode {
    pub priority: i32,
    pub step: Box<dyn FnMut() -> Result<()>>,
}

/// Runs one pass over `nodes` in dependency order, where `successors[i]`
/// lists the node indices that depend on node `i`'s output.
///
/// Returns [`Error::InvariantViolation`] if the graph has a cycle not
/// mediated by a delay operator (a delay node has no incoming edge for
/// the value it reads from the *previous* step, so true cycles collapse
/// to an unsatisfiable dependency and are caught here).
pub fn run_step(nodes: &mut [ScheduledNode], successors: &[Vec<usize>]) -> Result<()> {
    let n = nodes.len();
    debug_assert_eq!(successors.len(), n);

    let mut indeg = vec![0usize; n];
    for succ in successors {
        for &s in succ {
            indeg[s] += 1;
        }
    }

    let mut ready: PriorityQueue<usize, i32> = PriorityQueue::new();
    for (i, &d) in indeg.iter().enumerate() {
        if d == 0 {
            ready.push(i, nodes[i].priority);
        }
    }

    let mut completed = 0usize;
    while let Some((i, priority)) = ready.pop() {
        if Runtime::kill_in_progress() {
            return Err(Error::Cancelled);
        }
        log::debug!("dispatching node {i} (priority {priority})");
        (nodes[i].step)()?;
        completed += 1;
        for &s in &successors[i] {
            indeg[s] -= 1;
            if indeg[s] == 0 {
                ready.push(s, nodes[s].priority);
            }
        }
    }

    if completed != n {
        return Err(Error::InvariantViolation(
            "circuit graph has a cycle not mediated by a delay operator".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn runs_in_dependency_order() {
        let trace = Rc::new(RefCell::new(Vec::new()));

        let mk = |id: usize, trace: Rc<RefCell<Vec<usize>>>, priority: i32| ScheduledNode {
            priority,
            step: Box::new(move || {
                trace.borrow_mut().push(id);
                Ok(())
            }),
        };

        // 0 -> 2, 1 -> 2; 0 has higher priority than 1 but both are
        // independent roots, so 0 must run before 1, and 2 last.
        let mut nodes = vec![
            mk(0, trace.clone(), 10),
            mk(1, trace.clone(), 1),
            mk(2, trace.clone(), 0),
        ];
        let successors = vec![vec![2], vec![2], vec![]];

        run_step(&mut nodes, &successors).unwrap();
        assert_eq!(*trace.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn detects_cycles() {
        let mk = |priority: i32| ScheduledNode {
            priority,
            step: Box::new(|| Ok(())),
        };
        let mut nodes = vec![mk(0), mk(0)];
        let successors = vec![vec![1], vec![0]];
        assert!(run_step(&mut nodes, &successors).is_err());
    }
}
