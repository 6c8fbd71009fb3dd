//! The circuit runtime (§4.7): an explicit dataflow DAG of operators,
//! wired together by a [`CircuitBuilder`] and driven one step at a time
//! by [`Circuit::step`].

pub mod runtime;
pub mod scheduler;

use crate::error::{Error, Result};
use scheduler::ScheduledNode;
use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

/// Lifecycle state of a circuit (§4.7 "Circuit states").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Created,
    Running,
    Paused,
    Stopped,
    Faulted,
}

type Cell<T> = Rc<RefCell<Option<T>>>;

/// A handle to one node's output, pluggable as the input to later nodes.
/// Cloning a `Stream` shares the same underlying cell — it is fan-out,
/// not a copy of data.
pub struct Stream<T> {
    cell: Cell<T>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone> Stream<T> {
    fn new() -> Self {
        Self {
            cell: Rc::new(RefCell::new(None)),
        }
    }

    fn set(&self, value: T) {
        *self.cell.borrow_mut() = Some(value);
    }

    /// The value produced by this stream's node during the current step.
    ///
    /// # Panics
    /// Panics if read before the producing node has run this step. The
    /// execution order derived by [`CircuitBuilder::build`] guarantees
    /// this never happens for a well-formed circuit.
    pub fn get(&self) -> T {
        self.cell
            .borrow()
            .clone()
            .expect("stream read before its producing node ran this step")
    }
}

/// A bounded-capacity input to the circuit, fed from outside the circuit
/// thread (§4.7 "input handles").
pub struct InputHandle<T> {
    sender: crossbeam_channel::Sender<T>,
}

impl<T> InputHandle<T> {
    /// Pushes one delta onto the handle's bounded channel. Blocks if the
    /// channel is at capacity (back-pressure).
    pub fn push(&self, value: T) -> Result<()> {
        self.sender.send(value).map_err(|_| Error::ChannelClosed)
    }
}

/// The latest value a node has produced, readable from outside the
/// circuit thread (§4.7 "output handles").
pub struct OutputHandle<T> {
    cell: Cell<T>,
}

impl<T: Clone> OutputHandle<T> {
    pub fn latest(&self) -> Option<T> {
        self.cell.borrow().clone()
    }
}

/// Builds a circuit by registering operators in dependency order; each
/// `add_*` call returns a [`Stream`] that later calls can consume.
pub struct CircuitBuilder {
    nodes: Vec<ScheduledNode>,
    successors: Vec<Vec<usize>>,
    /// Maps a stream cell's address to the id of the node that produces
    /// it, so later `add_*` calls can record a dependency edge on the
    /// stream's producer.
    producer_by_ptr: hashbrown::HashMap<usize, usize>,
}

impl Default for CircuitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            successors: Vec::new(),
            producer_by_ptr: hashbrown::HashMap::new(),
        }
    }

    fn push_node(&mut self, priority: i32, step: Box<dyn FnMut() -> Result<()>>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(ScheduledNode { priority, step });
        self.successors.push(Vec::new());
        id
    }

    fn record_edge(&mut self, producer: usize, consumer: usize) {
        self.successors[producer].push(consumer);
    }

    fn register_producer<T>(&mut self, stream: &Stream<T>, id: usize) {
        let ptr = Rc::as_ptr(&stream.cell) as *const () as usize;
        self.producer_by_ptr.insert(ptr, id);
    }

    /// Registers a source node: a zero-input generator invoked once per
    /// step.
    pub fn add_source<T, F>(&mut self, priority: i32, mut f: F) -> Stream<T>
    where
        T: Clone + 'static,
        F: FnMut() -> T + 'static,
    {
        let out = Stream::new();
        let out_cell = out.clone();
        let id = self.push_node(
            priority,
            Box::new(move || {
                out_cell.set(f());
                Ok(())
            }),
        );
        self.register_producer(&out, id);
        out
    }

    /// Drains an [`InputHandle`]'s channel each step (up to `budget`
    /// items), folding them with `zero`/`fold` into this step's value.
    pub fn add_input<T, F>(
        &mut self,
        priority: i32,
        capacity: usize,
        budget: usize,
        zero: T,
        fold: F,
    ) -> (InputHandle<T>, Stream<T>)
    where
        T: Clone + 'static,
        F: Fn(T, T) -> T + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let out = Stream::new();
        let out_cell = out.clone();
        let id = self.push_node(
            priority,
            Box::new(move || {
                let mut acc = zero.clone();
                for _ in 0..budget {
                    match receiver.try_recv() {
                        Ok(v) => acc = fold(acc, v),
                        Err(_) => break,
                    }
                }
                out_cell.set(acc);
                Ok(())
            }),
        );
        self.register_producer(&out, id);
        (InputHandle { sender }, out)
    }

    /// Registers a unary operator node consuming `input`.
    pub fn add_unary<T, O, F>(&mut self, priority: i32, input: &Stream<T>, mut f: F) -> Stream<O>
    where
        T: Clone + 'static,
        O: Clone + 'static,
        F: FnMut(T) -> O + 'static,
    {
        let out = Stream::new();
        let out_cell = out.clone();
        let input_s = input.clone();
        let producer = self.last_producer_of(&input_s);
        let id = self.push_node(
            priority,
            Box::new(move || {
                out_cell.set(f(input_s.get()));
                Ok(())
            }),
        );
        if let Some(p) = producer {
            self.record_edge(p, id);
        }
        self.register_producer(&out, id);
        out
    }

    /// Registers a binary operator node consuming `left` and `right`.
    pub fn add_binary<T1, T2, O, F>(
        &mut self,
        priority: i32,
        left: &Stream<T1>,
        right: &Stream<T2>,
        mut f: F,
    ) -> Stream<O>
    where
        T1: Clone + 'static,
        T2: Clone + 'static,
        O: Clone + 'static,
        F: FnMut(T1, T2) -> O + 'static,
    {
        let out = Stream::new();
        let out_cell = out.clone();
        let left_s = left.clone();
        let right_s = right.clone();
        let left_producer = self.last_producer_of(&left_s);
        let right_producer = self.last_producer_of(&right_s);
        let id = self.push_node(
            priority,
            Box::new(move || {
                out_cell.set(f(left_s.get(), right_s.get()));
                Ok(())
            }),
        );
        if let Some(p) = left_producer {
            self.record_edge(p, id);
        }
        if let Some(p) = right_producer {
            self.record_edge(p, id);
        }
        self.register_producer(&out, id);
        out
    }

    /// Exposes `stream`'s value as an externally-readable output handle.
    pub fn add_output<T: Clone + 'static>(&mut self, priority: i32, stream: &Stream<T>) -> OutputHandle<T> {
        let cell: Cell<T> = Rc::new(RefCell::new(None));
        let out_cell = cell.clone();
        let input_s = stream.clone();
        let producer = self.last_producer_of(&input_s);
        let id = self.push_node(
            priority,
            Box::new(move || {
                *out_cell.borrow_mut() = Some(input_s.get());
                Ok(())
            }),
        );
        if let Some(p) = producer {
            self.record_edge(p, id);
        }
        OutputHandle { cell }
    }

    /// Looks up which node produces `stream`'s cell, used to record a
    /// dependency edge for scheduling. Builder callers register a
    /// stream's producer (via [`Self::register_producer`]) at the point
    /// they create it, before any consumer can reference it, so the
    /// lookup below always has an entry.
    fn last_producer_of<T>(&self, stream: &Stream<T>) -> Option<usize> {
        let ptr = Rc::as_ptr(&stream.cell) as *const () as usize;
        self.producer_by_ptr.get(&ptr).copied()
    }

    pub fn build(self) -> Result<Circuit> {
        Ok(Circuit {
            nodes: self.nodes,
            successors: self.successors,
            state: CircuitState::Created,
            epoch: 0,
        })
    }
}

/// A built, runnable circuit: a fixed set of operator nodes plus the
/// dependency edges the scheduler walks each step.
pub struct Circuit {
    nodes: Vec<ScheduledNode>,
    successors: Vec<Vec<usize>>,
    state: CircuitState,
    epoch: u64,
}

impl Circuit {
    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Runs one step: admits input, walks the execution order, advances
    /// the epoch counter. Transitions to `Faulted` on error (§4.7
    /// "Circuit states").
    pub fn step(&mut self) -> Result<()> {
        self.step_with_timeout(None)
    }

    /// As [`Self::step`], aborting with [`Error::StepTimeout`] if the
    /// step does not complete within `timeout` (§4.7 "Cancellation and
    /// timeouts").
    pub fn step_with_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.state == CircuitState::Faulted || self.state == CircuitState::Stopped {
            return Err(Error::InvariantViolation(format!(
                "cannot step a circuit in state {:?}",
                self.state
            )));
        }
        self.state = CircuitState::Running;

        let start = Instant::now();
        let result = scheduler::run_step(&mut self.nodes, &self.successors);

        if let Some(budget) = timeout {
            let elapsed = start.elapsed();
            if elapsed > budget {
                self.state = CircuitState::Faulted;
                return Err(Error::StepTimeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    budget_ms: budget.as_millis() as u64,
                });
            }
        }

        match result {
            Ok(()) => {
                self.epoch += 1;
                Ok(())
            }
            Err(e) => {
                self.state = CircuitState::Faulted;
                Err(e)
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == CircuitState::Running {
            self.state = CircuitState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == CircuitState::Paused {
            self.state = CircuitState::Running;
        }
    }

    pub fn stop(&mut self) {
        self.state = CircuitState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wires_source_through_unary_to_output() {
        let mut builder = CircuitBuilder::new();
        let src = builder.add_source(0, || 41i64);
        let plus_one = builder.add_unary(0, &src, |x| x + 1);
        let out = builder.add_output(0, &plus_one);
        let mut circuit = builder.build().unwrap();

        circuit.step().unwrap();
        assert_eq!(out.latest(), Some(42));
        assert_eq!(circuit.epoch(), 1);
    }

    #[test]
    fn binary_operator_combines_two_sources() {
        let mut builder = CircuitBuilder::new();
        let a = builder.add_source(0, || 10i64);
        let b = builder.add_source(0, || 32i64);
        let sum = builder.add_binary(0, &a, &b, |x, y| x + y);
        let out = builder.add_output(0, &sum);
        let mut circuit = builder.build().unwrap();

        circuit.step().unwrap();
        assert_eq!(out.latest(), Some(42));
    }

    #[test]
    fn input_handle_folds_pending_messages() {
        let mut builder = CircuitBuilder::new();
        let (handle, stream) = builder.add_input(0, 16, 8, 0i64, |a, b| a + b);
        let out = builder.add_output(0, &stream);
        let mut circuit = builder.build().unwrap();

        handle.push(1).unwrap();
        handle.push(2).unwrap();
        handle.push(3).unwrap();
        circuit.step().unwrap();
        assert_eq!(out.latest(), Some(6));
    }

    #[test]
    fn stepping_a_stopped_circuit_errors() {
        let mut builder = CircuitBuilder::new();
        builder.add_source(0, || 1i64);
        let mut circuit = builder.build().unwrap();
        circuit.stop();
        assert!(circuit.step().is_err());
    }
}
