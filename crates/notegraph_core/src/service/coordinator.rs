//! Incremental update coordinator.
//!
//! # Responsibility
//! - Track per-note sync state and the latest content/version per note.
//! - Schedule detection runs on a worker pool, at most one in flight per note.
//! - Re-dirty dependent notes when match terms change or nodes disappear.
//!
//! # Invariants
//! - State transitions: Clean -> Dirty on edit, Dirty -> Detecting when a run
//!   starts, Detecting -> Clean on a successful apply for the triggering
//!   version, Detecting -> Dirty if the note changed meanwhile, any -> Removed
//!   on deletion (terminal).
//! - Events whose version is not newer than the known version are ignored.
//! - Lock order is registry, then graph. No graph guard is held while the
//!   registry is locked by a worker.

use crate::error::{GraphError, GraphResult};
use crate::index::text::derive_note_title;
use crate::model::node::{Node, NodeId, PersonNames};
use crate::service::knowledge_graph::{KnowledgeGraph, RemovedNode, UpsertOutcome};
use crate::store::graph_store::DiffSummary;
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// `detect_now` retries when an edit supersedes its run.
const MAX_SYNC_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Clean,
    Dirty,
    Detecting,
    Removed,
}

/// What `note_changed` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteChange {
    /// Node updated and detection scheduled; `affected` other notes re-dirtied.
    Scheduled { version: u64, affected: usize },
    /// Cached graph state for this exact version was adopted as clean.
    Adopted { version: u64 },
    /// Version not newer than `known_version`.
    Stale { known_version: u64 },
    /// Note was deleted earlier.
    Removed,
}

/// Result of a synchronous detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRun {
    pub version: u64,
    pub summary: DiffSummary,
}

#[derive(Debug)]
enum Job {
    Detect(NodeId),
    Shutdown,
}

#[derive(Debug)]
struct NoteTracker {
    state: SyncState,
    version: u64,
    content: Arc<str>,
    in_flight: bool,
    queued: bool,
}

#[derive(Debug, Default)]
struct Registry {
    trackers: HashMap<NodeId, NoteTracker>,
    shutting_down: bool,
}

impl Registry {
    fn busy(&self) -> bool {
        self.trackers
            .values()
            .any(|tracker| tracker.queued || tracker.in_flight)
    }
}

struct Shared {
    graph: Arc<KnowledgeGraph>,
    registry: Mutex<Registry>,
    settled: Condvar,
    sender: Sender<Job>,
    /// Cached node versions match the content they were detected from.
    trust_cached_versions: bool,
}

pub struct UpdateCoordinator {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl UpdateCoordinator {
    /// Starts `worker_count` detection workers over `graph`.
    pub fn start(
        graph: Arc<KnowledgeGraph>,
        worker_count: usize,
        trust_cached_versions: bool,
    ) -> io::Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let shared = Arc::new(Shared {
            graph,
            registry: Mutex::new(Registry::default()),
            settled: Condvar::new(),
            sender,
            trust_cached_versions,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let worker_receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("notegraph-detect-{worker_id}"))
                .spawn(move || worker_loop(worker_shared, worker_receiver));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    error!(
                        "event=coordinator_start module=coordinator status=error worker_id={} error={}",
                        worker_id, err
                    );
                    let coordinator = Self {
                        shared,
                        workers: Mutex::new(workers),
                    };
                    coordinator.shutdown();
                    return Err(err);
                }
            }
        }

        info!(
            "event=coordinator_start module=coordinator status=ok workers={} trust_cache={}",
            workers.len(),
            trust_cached_versions
        );
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.shared.graph
    }

    /// Records a note edit and schedules detection.
    ///
    /// # Errors
    /// - `InvalidNode` for version `0`.
    pub fn note_changed(&self, note_id: NodeId, content: &str, version: u64) -> GraphResult<NoteChange> {
        if version == 0 {
            return Err(GraphError::InvalidNode(format!(
                "note {note_id} event carries version 0"
            )));
        }
        let mut registry = self.shared.lock_registry();
        let content: Arc<str> = Arc::from(content);

        if let Some(tracker) = registry.trackers.get(&note_id) {
            if tracker.state == SyncState::Removed {
                debug!("event=note_changed module=coordinator status=skipped note_id={note_id} reason=removed");
                return Ok(NoteChange::Removed);
            }
            if version <= tracker.version {
                debug!(
                    "event=note_changed module=coordinator status=skipped note_id={} version={} known_version={}",
                    note_id, version, tracker.version
                );
                return Ok(NoteChange::Stale {
                    known_version: tracker.version,
                });
            }
        } else if let Some(cached) = self.shared.graph.version_of(note_id) {
            if version < cached {
                return Ok(NoteChange::Stale {
                    known_version: cached,
                });
            }
            if version == cached {
                let state = if self.shared.trust_cached_versions {
                    SyncState::Clean
                } else {
                    SyncState::Dirty
                };
                registry.trackers.insert(
                    note_id,
                    NoteTracker {
                        state,
                        version,
                        content,
                        in_flight: false,
                        queued: false,
                    },
                );
                if state == SyncState::Dirty {
                    self.shared.schedule(&mut registry, note_id);
                    return Ok(NoteChange::Scheduled {
                        version,
                        affected: 0,
                    });
                }
                return Ok(NoteChange::Adopted { version });
            }
        }

        let node = Node::note(note_id, derive_note_title(&content), version);
        let outcome = self.shared.graph.upsert_node(node)?;

        let tracker = registry
            .trackers
            .entry(note_id)
            .or_insert_with(|| NoteTracker {
                state: SyncState::Clean,
                version,
                content: Arc::clone(&content),
                in_flight: false,
                queued: false,
            });
        tracker.version = version;
        tracker.content = content;
        self.shared.schedule(&mut registry, note_id);

        let affected = if outcome.terms_changed {
            self.shared.redirty_dependents(&mut registry, &outcome.node)
        } else {
            0
        };
        Ok(NoteChange::Scheduled { version, affected })
    }

    /// Deletes a note with cascade and re-dirties notes that were connected.
    pub fn note_deleted(&self, note_id: NodeId) -> GraphResult<RemovedNode> {
        let mut registry = self.shared.lock_registry();
        let removed = self.shared.graph.remove_node(note_id)?;
        self.shared.mark_removed(&mut registry, note_id);
        self.shared
            .redirty_notes(&mut registry, removed_neighbors(&removed));
        Ok(removed)
    }

    /// Mirrors a person create/rename.
    pub fn person_changed(&self, person_id: NodeId, names: &PersonNames) -> GraphResult<UpsertOutcome> {
        let mut registry = self.shared.lock_registry();
        let outcome = self
            .shared
            .graph
            .upsert_node(Node::person(person_id, names, 0))?;
        if outcome.terms_changed {
            self.shared.redirty_dependents(&mut registry, &outcome.node);
        }
        Ok(outcome)
    }

    pub fn person_deleted(&self, person_id: NodeId) -> GraphResult<RemovedNode> {
        let mut registry = self.shared.lock_registry();
        let removed = self.shared.graph.remove_node(person_id)?;
        self.shared
            .redirty_notes(&mut registry, removed_neighbors(&removed));
        Ok(removed)
    }

    /// Runs detection for `note_id` on the caller's thread and applies it.
    ///
    /// Waits for an in-flight worker run on the same note first.
    pub fn detect_now(&self, note_id: NodeId) -> GraphResult<SyncRun> {
        for _ in 0..MAX_SYNC_ATTEMPTS {
            let (version, content) = {
                let mut registry = self.shared.lock_registry();
                loop {
                    let status = registry
                        .trackers
                        .get(&note_id)
                        .map(|tracker| (tracker.state, tracker.in_flight));
                    match status {
                        None if self.shared.graph.contains(note_id) => {
                            return Err(GraphError::InvalidNode(format!(
                                "no content loaded for note {note_id}"
                            )));
                        }
                        None | Some((SyncState::Removed, _)) => {
                            return Err(GraphError::NotFound(note_id));
                        }
                        Some((_, true)) => {
                            registry = self
                                .shared
                                .settled
                                .wait(registry)
                                .unwrap_or_else(PoisonError::into_inner);
                        }
                        Some((_, false)) => break,
                    }
                }
                match Shared::begin_run(&mut registry, note_id) {
                    Some(run) => run,
                    None => return Err(GraphError::NotFound(note_id)),
                }
            };

            let result = self.shared.run_detection(note_id, version, &content);
            self.shared.finish_run(note_id, version, &result);
            match result {
                Ok(summary) => return Ok(SyncRun { version, summary }),
                Err(GraphError::Conflict { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(GraphError::Conflict {
            node_id: note_id,
            expected: 0,
            actual: self.shared.graph.version_of(note_id).unwrap_or(0),
        })
    }

    pub fn sync_state(&self, node_id: NodeId) -> Option<SyncState> {
        self.shared
            .lock_registry()
            .trackers
            .get(&node_id)
            .map(|tracker| tracker.state)
    }

    /// Latest content known for a note.
    pub fn content_of(&self, note_id: NodeId) -> Option<Arc<str>> {
        self.shared
            .lock_registry()
            .trackers
            .get(&note_id)
            .filter(|tracker| tracker.state != SyncState::Removed)
            .map(|tracker| Arc::clone(&tracker.content))
    }

    /// Blocks until no detection is queued or running.
    pub fn wait_idle(&self) {
        let mut registry = self.shared.lock_registry();
        while registry.busy() {
            registry = self
                .shared
                .settled
                .wait(registry)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stops and joins the worker pool. Idempotent.
    pub fn shutdown(&self) {
        let handles = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *workers)
        };
        {
            let mut registry = self.shared.lock_registry();
            if registry.shutting_down && handles.is_empty() {
                return;
            }
            registry.shutting_down = true;
            for tracker in registry.trackers.values_mut() {
                tracker.queued = false;
            }
        }
        for _ in &handles {
            let _ = self.shared.sender.send(Job::Shutdown);
        }
        let worker_count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                warn!("event=coordinator_stop module=coordinator status=error reason=worker_panicked");
            }
        }
        self.shared.settled.notify_all();
        info!("event=coordinator_stop module=coordinator status=ok workers={worker_count}");
    }
}

impl Drop for UpdateCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dirty -> queued unless a run is already queued or in flight.
    fn schedule(&self, registry: &mut Registry, note_id: NodeId) {
        let shutting_down = registry.shutting_down;
        let Some(tracker) = registry.trackers.get_mut(&note_id) else {
            return;
        };
        if tracker.state == SyncState::Removed {
            return;
        }
        tracker.state = SyncState::Dirty;
        // An in-flight run sees `Dirty` on finish and re-enqueues.
        if tracker.in_flight || tracker.queued || shutting_down {
            return;
        }
        tracker.queued = true;
        if self.sender.send(Job::Detect(note_id)).is_err() {
            tracker.queued = false;
            warn!("event=detect_schedule module=coordinator status=error note_id={note_id} reason=queue_closed");
        }
    }

    fn mark_removed(&self, registry: &mut Registry, note_id: NodeId) {
        let tracker = registry
            .trackers
            .entry(note_id)
            .or_insert_with(|| NoteTracker {
                state: SyncState::Removed,
                version: 0,
                content: Arc::from(""),
                in_flight: false,
                queued: false,
            });
        tracker.state = SyncState::Removed;
        tracker.content = Arc::from("");
        tracker.queued = false;
        self.settled.notify_all();
    }

    /// Re-dirties notes connected to `node` or whose content names it.
    fn redirty_dependents(&self, registry: &mut Registry, node: &Node) -> usize {
        let mut affected = self
            .graph
            .connected_notes(node.id)
            .into_iter()
            .collect::<BTreeSet<_>>();
        let contents = registry
            .trackers
            .iter()
            .filter(|(_, tracker)| tracker.state != SyncState::Removed)
            .map(|(note_id, tracker)| (*note_id, Arc::clone(&tracker.content)))
            .collect::<Vec<_>>();
        affected.extend(self.graph.notes_matching(
            node,
            contents
                .iter()
                .map(|(note_id, content)| (*note_id, content.as_ref())),
        ));
        affected.remove(&node.id);
        self.redirty_notes(registry, affected)
    }

    fn redirty_notes(&self, registry: &mut Registry, notes: impl IntoIterator<Item = NodeId>) -> usize {
        let mut count = 0;
        for note_id in notes {
            match registry.trackers.get(&note_id) {
                Some(tracker) if tracker.state != SyncState::Removed => {
                    self.schedule(registry, note_id);
                    count += 1;
                }
                Some(_) => {}
                None => debug!(
                    "event=redirty module=coordinator status=skipped note_id={note_id} reason=content_unknown"
                ),
            }
        }
        count
    }

    /// Dirty -> Detecting; returns the version/content snapshot to run on.
    fn begin_run(registry: &mut Registry, note_id: NodeId) -> Option<(u64, Arc<str>)> {
        let tracker = registry.trackers.get_mut(&note_id)?;
        if tracker.state == SyncState::Removed || tracker.in_flight {
            return None;
        }
        tracker.state = SyncState::Detecting;
        tracker.in_flight = true;
        Some((tracker.version, Arc::clone(&tracker.content)))
    }

    fn run_detection(&self, note_id: NodeId, version: u64, content: &str) -> GraphResult<DiffSummary> {
        let detection = self.graph.detect(note_id, content)?;
        if detection.version != version {
            return Err(GraphError::Conflict {
                node_id: note_id,
                expected: version,
                actual: detection.version,
            });
        }
        self.graph.apply_diff(note_id, version, &detection.edges)
    }

    fn finish_run(&self, note_id: NodeId, version: u64, result: &GraphResult<DiffSummary>) {
        let mut registry = self.lock_registry();
        let Some(tracker) = registry.trackers.get_mut(&note_id) else {
            self.settled.notify_all();
            return;
        };
        tracker.in_flight = false;
        let mut requeue = false;

        match result {
            Ok(_) if tracker.state == SyncState::Detecting && tracker.version == version => {
                tracker.state = SyncState::Clean;
            }
            Ok(_) => requeue = tracker.state == SyncState::Dirty,
            Err(GraphError::Conflict { expected, actual, .. }) => {
                info!(
                    "event=graph_diff_apply module=coordinator status=superseded note_id={} expected_version={} actual_version={}",
                    note_id, expected, actual
                );
                if tracker.state != SyncState::Removed {
                    tracker.state = SyncState::Dirty;
                    requeue = true;
                }
            }
            Err(GraphError::NotFound(missing)) if *missing == note_id => {
                debug!("event=graph_diff_apply module=coordinator status=skipped note_id={note_id} reason=removed");
            }
            Err(GraphError::NotFound(missing)) => {
                info!(
                    "event=graph_diff_apply module=coordinator status=superseded note_id={} missing_node={}",
                    note_id, missing
                );
                if tracker.state != SyncState::Removed {
                    tracker.state = SyncState::Dirty;
                    requeue = true;
                }
            }
            Err(err) => {
                error!(
                    "event=graph_diff_apply module=coordinator status=error note_id={} error_code={} error={}",
                    note_id,
                    err.code(),
                    err
                );
                if tracker.state != SyncState::Removed {
                    tracker.state = SyncState::Dirty;
                }
            }
        }

        if requeue {
            self.schedule(&mut registry, note_id);
        }
        self.settled.notify_all();
    }
}

fn worker_loop(shared: Arc<Shared>, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        let note_id = match job {
            Job::Detect(note_id) => note_id,
            Job::Shutdown => break,
        };
        let started_at = Instant::now();

        let run = {
            let mut registry = shared.lock_registry();
            let ready = registry.trackers.get_mut(&note_id).map(|tracker| {
                tracker.queued = false;
                tracker.state == SyncState::Dirty && !tracker.in_flight
            });
            let run = match ready {
                Some(true) => Shared::begin_run(&mut registry, note_id),
                _ => None,
            };
            if run.is_none() {
                shared.settled.notify_all();
            }
            run
        };
        let Some((version, content)) = run else {
            continue;
        };

        let result = shared.run_detection(note_id, version, &content);
        shared.finish_run(note_id, version, &result);
        debug!(
            "event=detect_job module=coordinator status={} note_id={} version={} duration_ms={}",
            if result.is_ok() { "ok" } else { "error" },
            note_id,
            version,
            started_at.elapsed().as_millis()
        );
    }
}

/// Notes worth re-detecting after `removed` disappeared: other endpoints of
/// its edges and the notes that contributed to them.
fn removed_neighbors(removed: &RemovedNode) -> BTreeSet<NodeId> {
    let mut notes = BTreeSet::new();
    for edge in &removed.edges {
        if let Some(other) = edge.key.other(removed.node.id) {
            notes.insert(other);
        }
        notes.extend(edge.contributors());
    }
    notes.remove(&removed.node.id);
    notes
}

#[cfg(test)]
mod tests {
    use super::{NoteChange, SyncState, UpdateCoordinator};
    use crate::config::GraphConfig;
    use crate::model::edge::ConnectionType;
    use crate::model::node::PersonNames;
    use crate::service::knowledge_graph::KnowledgeGraph;
    use std::sync::Arc;
    use uuid::Uuid;

    fn id(value: u128) -> Uuid {
        Uuid::from_u128(value)
    }

    fn coordinator(workers: usize) -> UpdateCoordinator {
        let graph = Arc::new(KnowledgeGraph::new(GraphConfig::default()));
        UpdateCoordinator::start(graph, workers, true).unwrap()
    }

    #[test]
    fn edit_becomes_clean_after_detection() {
        let coordinator = coordinator(2);
        coordinator
            .person_changed(id(10), &PersonNames::new("Alice Smith"))
            .unwrap();
        let change = coordinator
            .note_changed(id(1), "Lunch with Alice Smith", 1)
            .unwrap();
        assert_eq!(
            change,
            NoteChange::Scheduled {
                version: 1,
                affected: 0
            }
        );

        coordinator.wait_idle();
        assert_eq!(coordinator.sync_state(id(1)), Some(SyncState::Clean));
        let edges = coordinator.graph().attributed_edges(id(1));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind(), ConnectionType::Mentions);
    }

    #[test]
    fn stale_and_removed_events_are_ignored() {
        let coordinator = coordinator(1);
        coordinator.note_changed(id(1), "v2 text", 2).unwrap();
        assert_eq!(
            coordinator.note_changed(id(1), "v1 text", 1).unwrap(),
            NoteChange::Stale { known_version: 2 }
        );

        coordinator.note_deleted(id(1)).unwrap();
        assert_eq!(
            coordinator.note_changed(id(1), "v3 text", 3).unwrap(),
            NoteChange::Removed
        );
        coordinator.wait_idle();
        assert_eq!(coordinator.sync_state(id(1)), Some(SyncState::Removed));
        assert!(!coordinator.graph().contains(id(1)));
    }

    #[test]
    fn person_rename_redetects_dependent_notes() {
        let coordinator = coordinator(2);
        coordinator
            .person_changed(id(10), &PersonNames::new("Alice Smith"))
            .unwrap();
        coordinator
            .note_changed(id(1), "Call Alicia Smith tomorrow", 1)
            .unwrap();
        coordinator.wait_idle();
        assert!(coordinator.graph().attributed_edges(id(1)).is_empty());

        coordinator
            .person_changed(id(10), &PersonNames::new("Alicia Smith"))
            .unwrap();
        coordinator.wait_idle();
        let edges = coordinator.graph().attributed_edges(id(1));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target(), id(10));
    }

    #[test]
    fn detect_now_runs_synchronously() {
        let coordinator = coordinator(0);
        coordinator
            .person_changed(id(20), &PersonNames::new("Bob Jones"))
            .unwrap();
        coordinator.note_changed(id(1), "Bob Jones called", 1).unwrap();
        assert_eq!(coordinator.sync_state(id(1)), Some(SyncState::Dirty));

        let run = coordinator.detect_now(id(1)).unwrap();
        assert_eq!(run.version, 1);
        assert_eq!(run.summary.added, 1);
        assert_eq!(coordinator.sync_state(id(1)), Some(SyncState::Clean));
        assert!(coordinator.detect_now(id(99)).is_err());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let coordinator = coordinator(2);
        coordinator.shutdown();
        coordinator.shutdown();
        coordinator.note_changed(id(1), "after shutdown", 1).unwrap();
        coordinator.wait_idle();
        assert_eq!(coordinator.sync_state(id(1)), Some(SyncState::Dirty));
    }
}
