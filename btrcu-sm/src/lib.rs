//! A small hierarchical state machine engine: states with optional parent/child nesting,
//! entry/exit callbacks, event- and signal-triggered transitions, delayed events cancellable
//! by id or by type, and cross-thread event posting back onto the owning loop.
//!
//! Every sub-service in `btrcu-core` is built on top of one instance of [`StateMachine`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::mem::Discriminant;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Opaque numeric identifier for a state. Caller-assigned, must be unique within one machine.
pub type StateId = u32;

/// Opaque identifier returned by [`Poster::post_delayed`], usable with
/// [`Poster::cancel_delayed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelayedEventId(u64);

/// Events carried by a state machine. Any `Clone + Debug + Send + 'static` type qualifies;
/// event-triggered transitions match on [`std::mem::discriminant`], so carried payloads never
/// affect transition resolution, only callback logic that inspects the event itself.
pub trait Event: Clone + fmt::Debug + Send + 'static {}
impl<T: Clone + fmt::Debug + Send + 'static> Event for T {}

#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("state {0} already exists")]
    DuplicateState(StateId),
    #[error("unknown state {0}")]
    UnknownState(StateId),
    #[error("cannot mutate a running state machine")]
    RunningMutation,
    #[error("state machine is not running")]
    NotRunning,
    #[error("state machine is already running")]
    AlreadyRunning,
    #[error("super-state {0} has no initial child")]
    MissingInitialChild(StateId),
}

struct StateNode<E: Event> {
    parent: Option<StateId>,
    initial_child: Option<StateId>,
    is_final: bool,
    name: String,
    transitions: Vec<(Discriminant<E>, StateId)>,
    signal_transitions: Vec<(&'static str, StateId)>,
}

type EntryCallback<E> = Box<dyn FnMut(&mut Poster<E>) + Send>;
type ExitCallback<E> = Box<dyn FnMut(&mut Poster<E>) + Send>;

/// Handle passed to entry/exit callbacks so they can post further local or delayed events.
/// Events posted here are drained by the engine before the next externally-delivered event is
/// considered, per the engine's re-entrancy guarantee.
pub struct Poster<E: Event> {
    local: VecDeque<E>,
    delayed: DelayedHandle<E>,
}

impl<E: Event> Poster<E> {
    /// Queue `event` for local (same-loop-turn) delivery.
    pub fn post(&mut self, event: E) {
        self.local.push_back(event);
    }

    /// Post `event` for delivery after `delay`, not earlier. Returns an id usable to cancel it.
    pub fn post_delayed(&mut self, event: E, delay: Duration) -> DelayedEventId {
        self.delayed.post(event, delay)
    }

    /// Cancel a previously posted delayed event by id. Returns `true` if it was still pending.
    /// Race-free with respect to an in-flight firing: once cancelled, the event is never
    /// delivered even if its timer had already elapsed.
    pub fn cancel_delayed(&self, id: DelayedEventId) -> bool {
        self.delayed.cancel(id)
    }

    /// Cancel every pending delayed event whose discriminant matches `sample`.
    pub fn cancel_delayed_of_type(&self, sample: &E) -> usize {
        self.delayed.cancel_of_type(std::mem::discriminant(sample))
    }
}

struct DelayedEntry<E: Event> {
    kind: Discriminant<E>,
}

struct DelayedRegistry<E: Event> {
    next_id: u64,
    pending: HashMap<DelayedEventId, DelayedEntry<E>>,
    cancelled: HashSet<DelayedEventId>,
}

impl<E: Event> DelayedRegistry<E> {
    fn new() -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            cancelled: HashSet::new(),
        }
    }
}

/// Clonable handle onto the delayed-event bookkeeping, shared between the machine and the
/// spawned timer tasks. Protected by a mutex, as required by the cross-thread posting contract.
#[derive(Clone)]
struct DelayedHandle<E: Event> {
    registry: Arc<Mutex<DelayedRegistry<E>>>,
    sink: mpsc::UnboundedSender<E>,
}

impl<E: Event> DelayedHandle<E> {
    fn post(&self, event: E, delay: Duration) -> DelayedEventId {
        let kind = std::mem::discriminant(&event);
        let id = {
            let mut registry = self.registry.lock().unwrap();
            let id = DelayedEventId(registry.next_id);
            registry.next_id += 1;
            registry.pending.insert(id, DelayedEntry { kind });
            id
        };

        let registry = self.registry.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let mut guard = registry.lock().unwrap();
            let was_cancelled = guard.cancelled.remove(&id);
            let was_pending = guard.pending.remove(&id).is_some();
            drop(guard);
            if was_pending && !was_cancelled {
                // Receiver may already be gone if the machine stopped; that's not an error here.
                let _ = sink.send(event);
            }
        });
        id
    }

    fn cancel(&self, id: DelayedEventId) -> bool {
        let mut registry = self.registry.lock().unwrap();
        if registry.pending.remove(&id).is_some() {
            true
        } else {
            registry.cancelled.insert(id);
            false
        }
    }

    fn cancel_of_type(&self, kind: Discriminant<E>) -> usize {
        let mut registry = self.registry.lock().unwrap();
        let ids: Vec<DelayedEventId> = registry
            .pending
            .iter()
            .filter(|(_, entry)| entry.kind == kind)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            registry.pending.remove(id);
        }
        ids.len()
    }
}

/// A hierarchical state machine over event type `E`.
///
/// Construct with [`StateMachine::new`], describe the graph with [`add_state`](Self::add_state),
/// [`add_transition`](Self::add_transition) and friends, then [`start`](Self::start) it. Events
/// are delivered with [`post_event`](Self::post_event); [`post_event_external`](Self::post_event_external)
/// is safe to call from any thread.
pub struct StateMachine<E: Event> {
    name: String,
    states: HashMap<StateId, StateNode<E>>,
    current: Option<StateId>,
    initial: Option<StateId>,
    running: bool,
    entry_callbacks: HashMap<StateId, Vec<EntryCallback<E>>>,
    exit_callbacks: HashMap<StateId, Vec<ExitCallback<E>>>,
    local_queue: VecDeque<E>,
    within_mover: bool,
    cross_thread_tx: mpsc::UnboundedSender<E>,
    cross_thread_rx: mpsc::UnboundedReceiver<E>,
    delayed: DelayedHandle<E>,
    stopped_final: bool,
    final_events: HashMap<StateId, E>,
}

impl<E: Event> StateMachine<E> {
    pub fn new(name: impl Into<String>) -> Self {
        let (cross_thread_tx, cross_thread_rx) = mpsc::unbounded_channel();
        let delayed = DelayedHandle {
            registry: Arc::new(Mutex::new(DelayedRegistry::new())),
            sink: cross_thread_tx.clone(),
        };
        Self {
            name: name.into(),
            states: HashMap::new(),
            current: None,
            initial: None,
            running: false,
            entry_callbacks: HashMap::new(),
            exit_callbacks: HashMap::new(),
            local_queue: VecDeque::new(),
            within_mover: false,
            cross_thread_tx,
            delayed,
            cross_thread_rx,
            stopped_final: false,
            final_events: HashMap::new(),
        }
    }

    /// A sender that can be cloned out and handed to other threads/tasks; events sent through
    /// it are queued back onto this machine's owning loop.
    pub fn external_sender(&self) -> mpsc::UnboundedSender<E> {
        self.cross_thread_tx.clone()
    }

    pub fn add_state(&mut self, state: StateId, name: impl Into<String>) -> Result<(), StateMachineError> {
        self.add_state_inner(state, None, name)
    }

    pub fn add_child_state(
        &mut self,
        parent: StateId,
        state: StateId,
        name: impl Into<String>,
    ) -> Result<(), StateMachineError> {
        if !self.states.contains_key(&parent) {
            return Err(StateMachineError::UnknownState(parent));
        }
        self.add_state_inner(state, Some(parent), name)?;
        self.states.get_mut(&parent).unwrap().initial_child.get_or_insert(state);
        Ok(())
    }

    fn add_state_inner(
        &mut self,
        state: StateId,
        parent: Option<StateId>,
        name: impl Into<String>,
    ) -> Result<(), StateMachineError> {
        if self.running {
            log::error!("{}: addState({}) while running", self.name, state);
            return Err(StateMachineError::RunningMutation);
        }
        if self.states.contains_key(&state) {
            return Err(StateMachineError::DuplicateState(state));
        }
        self.states.insert(
            state,
            StateNode {
                parent,
                initial_child: None,
                is_final: false,
                name: name.into(),
                transitions: Vec::new(),
                signal_transitions: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn set_initial_child(&mut self, parent: StateId, child: StateId) -> Result<(), StateMachineError> {
        self.require_state(child)?;
        self.states
            .get_mut(&parent)
            .ok_or(StateMachineError::UnknownState(parent))?
            .initial_child = Some(child);
        Ok(())
    }

    pub fn set_initial_state(&mut self, state: StateId) -> Result<(), StateMachineError> {
        self.require_state(state)?;
        self.initial = Some(state);
        Ok(())
    }

    /// Mark `state` as a top-level final state: reaching it stops the machine and records that
    /// it finished naturally (see [`finished_naturally`](Self::finished_naturally)).
    pub fn set_final_state(&mut self, state: StateId) -> Result<(), StateMachineError> {
        self.states
            .get_mut(&state)
            .ok_or(StateMachineError::UnknownState(state))?
            .is_final = true;
        Ok(())
    }

    /// Mark `state` as the terminal child of its super-state: reaching it synthesises
    /// `finished_event` as a local event (dispatched against the super-state's transitions,
    /// since the engine's ancestor walk matches it there).
    pub fn set_super_state_terminal(
        &mut self,
        state: StateId,
        finished_event: E,
    ) -> Result<(), StateMachineError> {
        self.states
            .get_mut(&state)
            .ok_or(StateMachineError::UnknownState(state))?
            .is_final = true;
        self.final_events.insert(state, finished_event);
        Ok(())
    }

    /// Register an event-triggered transition. `sample` is only used to capture the event's
    /// discriminant; its payload is never inspected.
    pub fn add_transition(
        &mut self,
        from: StateId,
        sample: &E,
        to: StateId,
    ) -> Result<(), StateMachineError> {
        if self.running {
            return Err(StateMachineError::RunningMutation);
        }
        self.require_state(to)?;
        let kind = std::mem::discriminant(sample);
        self.states
            .get_mut(&from)
            .ok_or(StateMachineError::UnknownState(from))?
            .transitions
            .push((kind, to));
        Ok(())
    }

    /// Register a named external-signal-triggered transition.
    pub fn add_signal_transition(
        &mut self,
        from: StateId,
        signal: &'static str,
        to: StateId,
    ) -> Result<(), StateMachineError> {
        if self.running {
            return Err(StateMachineError::RunningMutation);
        }
        self.require_state(to)?;
        self.states
            .get_mut(&from)
            .ok_or(StateMachineError::UnknownState(from))?
            .signal_transitions
            .push((signal, to));
        Ok(())
    }

    pub fn on_enter<F>(&mut self, state: StateId, callback: F)
    where
        F: FnMut(&mut Poster<E>) + Send + 'static,
    {
        self.entry_callbacks
            .entry(state)
            .or_default()
            .push(Box::new(callback));
    }

    pub fn on_exit<F>(&mut self, state: StateId, callback: F)
    where
        F: FnMut(&mut Poster<E>) + Send + 'static,
    {
        self.exit_callbacks
            .entry(state)
            .or_default()
            .push(Box::new(callback));
    }

    fn require_state(&self, state: StateId) -> Result<(), StateMachineError> {
        if self.states.contains_key(&state) {
            Ok(())
        } else {
            Err(StateMachineError::UnknownState(state))
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_state(&self) -> Option<StateId> {
        self.current
    }

    pub fn in_state(&self, state: StateId) -> bool {
        match self.current {
            Some(mut cur) => loop {
                if cur == state {
                    return true;
                }
                match self.states.get(&cur).and_then(|s| s.parent) {
                    Some(parent) => cur = parent,
                    None => return false,
                }
            },
            None => false,
        }
    }

    pub fn state_name(&self, state: StateId) -> Option<&str> {
        self.states.get(&state).map(|s| s.name.as_str())
    }

    /// Resolve a target state to its eventual leaf by repeatedly following `initial_child`.
    fn resolve_leaf(&self, mut state: StateId) -> Result<StateId, StateMachineError> {
        loop {
            let node = self.states.get(&state).ok_or(StateMachineError::UnknownState(state))?;
            match node.initial_child {
                Some(child) => state = child,
                None => return Ok(state),
            }
        }
    }

    fn ancestors(&self, state: StateId) -> Vec<StateId> {
        let mut chain = vec![state];
        let mut cur = state;
        while let Some(parent) = self.states.get(&cur).and_then(|s| s.parent) {
            chain.push(parent);
            cur = parent;
        }
        chain
    }

    pub fn start(&mut self) -> Result<(), StateMachineError> {
        if self.running {
            return Err(StateMachineError::AlreadyRunning);
        }
        let initial = self.initial.ok_or(StateMachineError::MissingInitialChild(0))?;
        self.running = true;
        self.stopped_final = false;
        let leaf = self.resolve_leaf(initial)?;
        self.enter_chain(&self.ancestors(leaf).into_iter().rev().collect::<Vec<_>>());
        self.current = Some(leaf);
        self.drain_local();
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Some(cur) = self.current {
            for state in self.ancestors(cur) {
                self.run_exit(state);
            }
        }
        self.running = false;
        self.current = None;
    }

    /// Deliver an event synchronously. Fails silently (logged) if the machine is not running,
    /// per the engine's failure model.
    pub fn post_event(&mut self, event: E) {
        if !self.running {
            log::warn!("{}: postEvent({:?}) on stopped machine ignored", self.name, event);
            return;
        }
        if self.within_mover {
            self.local_queue.push_back(event);
            return;
        }
        self.dispatch(event);
        self.drain_local();
    }

    /// Non-blocking receive of any cross-thread-posted events; call this from the owning loop.
    pub fn try_recv_external(&mut self) -> Option<E> {
        self.cross_thread_rx.try_recv().ok()
    }

    /// Await the next cross-thread-posted event; call this from the owning loop's select.
    pub async fn recv_external(&mut self) -> Option<E> {
        self.cross_thread_rx.recv().await
    }

    /// Raise a named external signal, resolving any signal-triggered transition from the current
    /// state or an ancestor.
    pub fn raise_signal(&mut self, signal: &'static str) {
        if !self.running {
            log::warn!("{}: raiseSignal({}) on stopped machine ignored", self.name, signal);
            return;
        }
        let Some(cur) = self.current else { return };
        for state in self.ancestors(cur) {
            if let Some(node) = self.states.get(&state) {
                if let Some(&(_, to)) = node.signal_transitions.iter().find(|(s, _)| *s == signal) {
                    self.move_to_state(to);
                    self.drain_local();
                    return;
                }
            }
        }
    }

    fn dispatch(&mut self, event: E) {
        let Some(cur) = self.current else { return };
        let kind = std::mem::discriminant(&event);
        for state in self.ancestors(cur) {
            if let Some(node) = self.states.get(&state) {
                if let Some(&(_, to)) = node.transitions.iter().find(|(k, _)| *k == kind) {
                    self.move_to_state(to);
                    return;
                }
            }
        }
        log::trace!("{}: no transition for {:?} in state {:?}", self.name, event, cur);
    }

    fn drain_local(&mut self) {
        while let Some(event) = self.local_queue.pop_front() {
            self.dispatch(event);
        }
    }

    fn move_to_state(&mut self, target: StateId) {
        let Ok(target_leaf) = self.resolve_leaf(target) else {
            log::error!("{}: transition target {} has no initial child", self.name, target);
            return;
        };
        let Some(from) = self.current else { return };

        let from_chain = self.ancestors(from);
        let to_chain: Vec<StateId> = self.ancestors(target_leaf).into_iter().rev().collect();

        let common_ancestor = to_chain.iter().find(|s| from_chain.contains(s)).copied();

        self.within_mover = true;

        // Exit from the leaf up to (but not including) the common ancestor.
        for state in &from_chain {
            if Some(*state) == common_ancestor {
                break;
            }
            self.run_exit(*state);
        }

        // Enter from just below the common ancestor down to the new leaf.
        let mut entering = false;
        for state in &to_chain {
            if !entering {
                if Some(*state) == common_ancestor {
                    entering = true;
                }
                continue;
            }
            self.run_enter(*state);
        }
        if common_ancestor.is_none() {
            for state in &to_chain {
                self.run_enter(*state);
            }
        }

        self.current = Some(target_leaf);
        self.within_mover = false;

        self.maybe_synthesize_finished(target_leaf);
    }

    fn maybe_synthesize_finished(&mut self, leaf: StateId) {
        let Some(node) = self.states.get(&leaf) else { return };
        if !node.is_final {
            return;
        }
        match node.parent {
            None => {
                log::info!("{}: reached top-level final state, stopping", self.name);
                self.stopped_final = true;
                self.stop();
            }
            Some(_) => {
                if let Some(event) = self.final_events.get(&leaf).cloned() {
                    self.local_queue.push_back(event);
                }
            }
        }
    }

    fn enter_chain(&mut self, chain: &[StateId]) {
        self.within_mover = true;
        for state in chain {
            self.run_enter(*state);
        }
        self.within_mover = false;
    }

    fn run_enter(&mut self, state: StateId) {
        log::debug!("{}: enter {}", self.name, self.state_name(state).unwrap_or("?"));
        if let Some(mut callbacks) = self.entry_callbacks.remove(&state) {
            let mut poster = Poster {
                local: VecDeque::new(),
                delayed: self.delayed.clone(),
            };
            for cb in callbacks.iter_mut() {
                cb(&mut poster);
            }
            self.local_queue.extend(poster.local);
            self.entry_callbacks.insert(state, callbacks);
        }
    }

    fn run_exit(&mut self, state: StateId) {
        log::debug!("{}: exit {}", self.name, self.state_name(state).unwrap_or("?"));
        if let Some(mut callbacks) = self.exit_callbacks.remove(&state) {
            let mut poster = Poster {
                local: VecDeque::new(),
                delayed: self.delayed.clone(),
            };
            for cb in callbacks.iter_mut() {
                cb(&mut poster);
            }
            self.local_queue.extend(poster.local);
            self.exit_callbacks.insert(state, callbacks);
        }
    }

    /// Whether the machine stopped itself by reaching a top-level final state (as opposed to an
    /// explicit external [`stop`](Self::stop) call).
    pub fn finished_naturally(&self) -> bool {
        self.stopped_final
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Go,
        Back,
        Timeout,
    }

    const IDLE: StateId = 0;
    const RUNNING: StateId = 1;
    const SUPER: StateId = 2;
    const CHILD_A: StateId = 3;
    const CHILD_B: StateId = 4;

    #[test]
    fn basic_transition() {
        let mut sm = StateMachine::<Ev>::new("test");
        sm.add_state(IDLE, "Idle").unwrap();
        sm.add_state(RUNNING, "Running").unwrap();
        sm.set_initial_state(IDLE).unwrap();
        sm.add_transition(IDLE, &Ev::Go, RUNNING).unwrap();
        sm.add_transition(RUNNING, &Ev::Back, IDLE).unwrap();

        sm.start().unwrap();
        assert_eq!(sm.current_state(), Some(IDLE));
        sm.post_event(Ev::Go);
        assert_eq!(sm.current_state(), Some(RUNNING));
        sm.post_event(Ev::Back);
        assert_eq!(sm.current_state(), Some(IDLE));
    }

    #[test]
    fn nested_super_state_transition_matches_from_child() {
        let mut sm = StateMachine::<Ev>::new("test");
        sm.add_state(IDLE, "Idle").unwrap();
        sm.add_state(SUPER, "Super").unwrap();
        sm.add_child_state(SUPER, CHILD_A, "A").unwrap();
        sm.add_child_state(SUPER, CHILD_B, "B").unwrap();
        sm.set_initial_state(IDLE).unwrap();
        sm.add_transition(IDLE, &Ev::Go, SUPER).unwrap();
        // Registered on the super-state: should fire while in the nested child too.
        sm.add_transition(SUPER, &Ev::Back, IDLE).unwrap();

        sm.start().unwrap();
        sm.post_event(Ev::Go);
        assert_eq!(sm.current_state(), Some(CHILD_A));
        sm.post_event(Ev::Back);
        assert_eq!(sm.current_state(), Some(IDLE));
    }

    #[test]
    fn entry_callback_can_post_local_event_before_next_external() {
        let mut sm = StateMachine::<Ev>::new("test");
        sm.add_state(IDLE, "Idle").unwrap();
        sm.add_state(RUNNING, "Running").unwrap();
        sm.add_state(SUPER, "Super").unwrap();
        sm.set_initial_state(IDLE).unwrap();
        sm.add_transition(IDLE, &Ev::Go, RUNNING).unwrap();
        sm.add_transition(RUNNING, &Ev::Timeout, SUPER).unwrap();
        sm.on_enter(RUNNING, |poster| poster.post(Ev::Timeout));

        sm.start().unwrap();
        sm.post_event(Ev::Go);
        // The entry callback's posted Timeout must be drained before we return.
        assert_eq!(sm.current_state(), Some(SUPER));
    }

    #[tokio::test]
    async fn delayed_event_cancel_is_never_delivered() {
        let mut sm = StateMachine::<Ev>::new("test");
        sm.add_state(IDLE, "Idle").unwrap();
        sm.add_state(RUNNING, "Running").unwrap();
        sm.set_initial_state(IDLE).unwrap();
        sm.add_transition(IDLE, &Ev::Timeout, RUNNING).unwrap();
        let id = std::sync::Arc::new(std::sync::Mutex::new(None));
        let id_clone = id.clone();
        sm.on_enter(IDLE, move |poster| {
            *id_clone.lock().unwrap() = Some(poster.post_delayed(Ev::Timeout, Duration::from_millis(50)));
        });

        sm.start().unwrap();
        let delayed_id = id.lock().unwrap().take().unwrap();
        assert!(sm.cancel_delayed_by_id_for_test(delayed_id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sm.try_recv_external().is_none());
        assert_eq!(sm.current_state(), Some(IDLE));
    }

    impl<E: Event> StateMachine<E> {
        #[cfg(test)]
        fn cancel_delayed_by_id_for_test(&self, id: DelayedEventId) -> bool {
            self.delayed.cancel(id)
        }
    }
}
