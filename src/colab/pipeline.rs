//! The single write path for diagram state.
//!
//! Every write, conventional or live, is queued to a worker task owned by
//! its diagram. One worker processes its queue strictly in order, so the
//! read-modify-write cycles of one diagram never interleave while writes to
//! different diagrams run on different workers in parallel. State handed to
//! a joining or resyncing connection goes through the same queue, so it is
//! ordered with the broadcasts of every write.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::gate::{ensure_no_active_session, DirectMutation};
use super::presence::ConnectionId;
use super::registry::SessionRegistry;
use crate::db::DiagramStore;
use crate::error::{ColabError, ColabResult, TransformError};
use crate::models::{DiagramSnapshot, SendMessage};

const WORKER_QUEUE: usize = 64;

/// What a transform hands back: the new snapshot and whether the cell graph changed
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub snapshot: DiagramSnapshot,
    pub changed: bool,
}

/// Pure edit of a diagram snapshot. Must not perform I/O.
pub type DiagramTransform =
    Box<dyn FnOnce(DiagramSnapshot) -> Result<TransformOutput, TransformError> + Send>;

/// Which channel issued a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    RestApi,
    Live { connection_id: ConnectionId },
}

impl UpdateSource {
    fn originator(&self) -> Option<ConnectionId> {
        match self {
            Self::RestApi => None,
            Self::Live { connection_id } => Some(*connection_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub diagram_id: Uuid,
    pub source: UpdateSource,
    pub actor: String,
    pub changed: bool,
    pub update_vector: i64,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub snapshot: DiagramSnapshot,
    pub event: UpdateEvent,
}

enum Job {
    Update {
        transform: DiagramTransform,
        source: UpdateSource,
        actor: String,
        /// Refuse the write if a session is active when it persists
        gate: Option<DirectMutation>,
        reply: oneshot::Sender<ColabResult<UpdateOutcome>>,
    },
    Delete {
        actor: String,
        reply: oneshot::Sender<ColabResult<()>>,
    },
    SendState {
        outbound: mpsc::WeakSender<SendMessage>,
        reply: oneshot::Sender<ColabResult<i64>>,
    },
}

struct WorkerHandle {
    worker_id: Uuid,
    jobs: mpsc::Sender<Job>,
}

struct PipelineInner {
    store: Arc<dyn DiagramStore>,
    registry: SessionRegistry,
    workers: Mutex<HashMap<Uuid, Arc<WorkerHandle>>>,
    worker_idle: Duration,
}

#[derive(Clone)]
pub struct UpdatePipeline {
    inner: Arc<PipelineInner>,
}

impl UpdatePipeline {
    pub fn new(store: Arc<dyn DiagramStore>, registry: SessionRegistry, worker_idle: Duration) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                store,
                registry,
                workers: Mutex::new(HashMap::new()),
                worker_idle,
            }),
        }
    }

    /// Load, transform, persist and broadcast one write to `diagram_id`.
    ///
    /// A transform error aborts the write: nothing is persisted and the
    /// update vector does not move.
    pub async fn update_diagram(
        &self,
        diagram_id: Uuid,
        transform: DiagramTransform,
        source: UpdateSource,
        actor: &str,
    ) -> ColabResult<UpdateOutcome> {
        let actor = actor.to_string();
        self.submit(diagram_id, |reply| Job::Update {
            transform,
            source,
            actor,
            gate: None,
            reply,
        })
        .await
    }

    /// Conventional write. Fails with a conflict when a session is active on
    /// the diagram at the moment it would persist.
    pub async fn update_without_session(
        &self,
        diagram_id: Uuid,
        transform: DiagramTransform,
        actor: &str,
    ) -> ColabResult<UpdateOutcome> {
        let actor = actor.to_string();
        self.submit(diagram_id, |reply| Job::Update {
            transform,
            source: UpdateSource::RestApi,
            actor,
            gate: Some(DirectMutation::Modify),
            reply,
        })
        .await
    }

    /// Delete the diagram unless a session is active on it
    pub async fn delete_diagram(&self, diagram_id: Uuid, actor: &str) -> ColabResult<()> {
        let actor = actor.to_string();
        self.submit(diagram_id, |reply| Job::Delete { actor, reply }).await
    }

    /// Queue the current diagram state on `outbound`, ordered after every
    /// write already queued for the diagram. Returns the update vector sent.
    pub async fn send_state(&self, diagram_id: Uuid, outbound: mpsc::WeakSender<SendMessage>) -> ColabResult<i64> {
        self.submit(diagram_id, |reply| Job::SendState { outbound, reply }).await
    }

    /// Number of live per-diagram workers
    pub async fn worker_count(&self) -> usize {
        self.inner.workers.lock().await.len()
    }

    async fn submit<T>(
        &self,
        diagram_id: Uuid,
        job: impl FnOnce(oneshot::Sender<ColabResult<T>>) -> Job,
    ) -> ColabResult<T> {
        let (reply, response) = oneshot::channel();
        let mut job = job(reply);

        // a worker that died under us is replaced once
        let mut attempts = 0;
        loop {
            attempts += 1;
            let worker = self.worker_for(diagram_id).await;
            match worker.jobs.send(job).await {
                Ok(()) => break,
                Err(mpsc::error::SendError(returned)) => {
                    self.discard_worker(diagram_id, &worker).await;
                    if attempts >= 2 {
                        error!("No update worker available for diagram {}", diagram_id);
                        return Err(ColabError::server("Diagram update worker unavailable"));
                    }
                    warn!("Update worker for diagram {} is gone, respawning", diagram_id);
                    job = returned;
                }
            }
        }

        response
            .await
            .map_err(|_| ColabError::server("Diagram update worker stopped before replying"))?
    }

    async fn worker_for(&self, diagram_id: Uuid) -> Arc<WorkerHandle> {
        let mut workers = self.inner.workers.lock().await;
        if let Some(worker) = workers.get(&diagram_id) {
            return Arc::clone(worker);
        }

        let (jobs, queue) = mpsc::channel(WORKER_QUEUE);
        let worker = Arc::new(WorkerHandle {
            worker_id: Uuid::new_v4(),
            jobs,
        });
        workers.insert(diagram_id, Arc::clone(&worker));
        debug!("Spawning update worker for diagram {}", diagram_id);
        tokio::spawn(run_worker(
            Arc::clone(&self.inner),
            diagram_id,
            worker.worker_id,
            queue,
        ));
        worker
    }

    async fn discard_worker(&self, diagram_id: Uuid, worker: &Arc<WorkerHandle>) {
        let mut workers = self.inner.workers.lock().await;
        if let Some(current) = workers.get(&diagram_id) {
            if Arc::ptr_eq(current, worker) {
                workers.remove(&diagram_id);
            }
        }
    }
}

async fn run_worker(
    inner: Arc<PipelineInner>,
    diagram_id: Uuid,
    worker_id: Uuid,
    mut queue: mpsc::Receiver<Job>,
) {
    loop {
        match tokio::time::timeout(inner.worker_idle, queue.recv()).await {
            Ok(Some(job)) => inner.process(diagram_id, job).await,
            Ok(None) => break,
            Err(_) => {
                // Only exit when no caller holds a handle and nothing is queued.
                // Callers clone the handle under this same lock, so no job can
                // slip in after the check.
                let mut workers = inner.workers.lock().await;
                let ours = match workers.get(&diagram_id) {
                    Some(handle) if handle.worker_id == worker_id => Some(Arc::strong_count(handle)),
                    _ => None,
                };
                if matches!(ours, Some(count) if count > 1) {
                    continue;
                }
                match queue.try_recv() {
                    Ok(job) => {
                        drop(workers);
                        inner.process(diagram_id, job).await;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                        if ours.is_some() {
                            workers.remove(&diagram_id);
                        }
                        break;
                    }
                }
            }
        }
    }
    debug!("Update worker for diagram {} stopped", diagram_id);
}

fn answer<T>(diagram_id: Uuid, reply: oneshot::Sender<ColabResult<T>>, result: ColabResult<T>) {
    if reply.send(result).is_err() {
        debug!("Caller for diagram {} went away", diagram_id);
    }
}

impl PipelineInner {
    async fn process(&self, diagram_id: Uuid, job: Job) {
        match job {
            Job::Update {
                transform,
                source,
                actor,
                gate,
                reply,
            } => {
                let result = self.apply(diagram_id, transform, source, &actor, gate).await;
                answer(diagram_id, reply, result);
            }
            Job::Delete { actor, reply } => {
                let result = self.delete(diagram_id, &actor).await;
                answer(diagram_id, reply, result);
            }
            Job::SendState { outbound, reply } => {
                let result = self.send_state(diagram_id, outbound).await;
                answer(diagram_id, reply, result);
            }
        }
    }

    async fn load(&self, diagram_id: Uuid) -> ColabResult<DiagramSnapshot> {
        self.store
            .get(diagram_id)
            .await?
            .ok_or_else(|| ColabError::not_found(format!("Diagram '{}' not found", diagram_id)))
    }

    async fn apply(
        &self,
        diagram_id: Uuid,
        transform: DiagramTransform,
        source: UpdateSource,
        actor: &str,
        gate: Option<DirectMutation>,
    ) -> ColabResult<UpdateOutcome> {
        let current = self.load(diagram_id).await?;

        let id = current.id;
        let threat_model_id = current.threat_model_id;
        let created_at = current.created_at;
        let previous_vector = current.update_vector;

        let TransformOutput {
            mut snapshot,
            changed,
        } = transform(current).map_err(|e| {
            debug!("Transform on diagram {} by {} rejected: {}", diagram_id, actor, e);
            e
        })?;

        // identity and the clock are owned here, not by the transform
        snapshot.id = id;
        snapshot.threat_model_id = threat_model_id;
        snapshot.created_at = created_at;
        snapshot.update_vector = previous_vector + i64::from(changed);
        snapshot.modified_at = Utc::now();

        let guard = match gate {
            Some(mutation) => Some(ensure_no_active_session(&self.registry, diagram_id, mutation).await?),
            None => None,
        };
        self.store.update(&snapshot).await?;
        // must go before broadcast reads the registry again
        drop(guard);

        info!(
            "Diagram {} updated by {} via {:?} (changed: {}, update_vector: {})",
            diagram_id, actor, source, changed, snapshot.update_vector
        );

        if changed {
            self.broadcast(&snapshot, source).await;
        }

        Ok(UpdateOutcome {
            event: UpdateEvent {
                diagram_id,
                source,
                actor: actor.to_string(),
                changed,
                update_vector: snapshot.update_vector,
            },
            snapshot,
        })
    }

    async fn delete(&self, diagram_id: Uuid, actor: &str) -> ColabResult<()> {
        let guard = ensure_no_active_session(&self.registry, diagram_id, DirectMutation::Delete).await?;
        let deleted = self.store.delete(diagram_id).await?;
        drop(guard);

        if !deleted {
            return Err(ColabError::not_found(format!("Diagram '{}' not found", diagram_id)));
        }
        info!("Diagram {} deleted by {}", diagram_id, actor);
        Ok(())
    }

    async fn send_state(&self, diagram_id: Uuid, outbound: mpsc::WeakSender<SendMessage>) -> ColabResult<i64> {
        let diagram = self.load(diagram_id).await?;
        let update_vector = diagram.update_vector;
        let Some(outbound) = outbound.upgrade() else {
            debug!("Connection went away before state of diagram {} was sent", diagram_id);
            return Ok(update_vector);
        };
        let frame = SendMessage::DiagramState {
            update_vector,
            cells: diagram.cells,
        };
        if let Err(e) = outbound.try_send(frame) {
            warn!("Could not queue state of diagram {}: {}", diagram_id, e);
        }
        Ok(update_vector)
    }

    async fn broadcast(&self, snapshot: &DiagramSnapshot, source: UpdateSource) {
        let Some(session) = self.registry.get(snapshot.id).await else {
            return;
        };
        let frame = SendMessage::DiagramState {
            update_vector: snapshot.update_vector,
            cells: snapshot.cells.clone(),
        };
        let fan_out = session.broadcast(&frame, source.originator()).await;
        debug!(
            "Broadcast update_vector {} of diagram {} to session {} ({:?})",
            snapshot.update_vector, snapshot.id, session.id, fan_out
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colab::presence::Participant;
    use crate::db::MemoryStore;
    use crate::error::StoreError;
    use crate::models::Cell;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    async fn setup(worker_idle: Duration) -> (UpdatePipeline, Arc<MemoryStore>, SessionRegistry, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let diagram = DiagramSnapshot::new(Uuid::new_v4(), "d1");
        let diagram_id = diagram.id;
        store.create(&diagram).await.unwrap();
        let registry = SessionRegistry::new();
        let pipeline = UpdatePipeline::new(store.clone(), registry.clone(), worker_idle);
        (pipeline, store, registry, diagram_id)
    }

    fn add_cell() -> DiagramTransform {
        Box::new(|mut snapshot: DiagramSnapshot| {
            snapshot.cells.push(Cell::new(Uuid::new_v4()));
            Ok(TransformOutput { snapshot, changed: true })
        })
    }

    fn rename(name: &str) -> DiagramTransform {
        let name = name.to_string();
        Box::new(move |mut snapshot: DiagramSnapshot| {
            snapshot.name = name;
            Ok(TransformOutput { snapshot, changed: false })
        })
    }

    #[tokio::test]
    async fn concurrent_updates_advance_clock_once_per_change() {
        let (pipeline, store, _registry, diagram_id) = setup(Duration::from_secs(60)).await;

        let mut handles = Vec::new();
        for i in 0..40 {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                let transform = if i % 4 == 0 { add_cell() } else { rename(&format!("n{}", i)) };
                pipeline
                    .update_diagram(diagram_id, transform, UpdateSource::RestApi, "alice")
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = DiagramStore::get(store.as_ref(), diagram_id).await.unwrap().unwrap();
        assert_eq!(stored.update_vector, 10);
        assert_eq!(stored.cells.len(), 10);
    }

    #[tokio::test]
    async fn metadata_only_update_keeps_clock() {
        let (pipeline, _store, _registry, diagram_id) = setup(Duration::from_secs(60)).await;

        let outcome = pipeline
            .update_diagram(diagram_id, rename("renamed"), UpdateSource::RestApi, "alice")
            .await
            .unwrap();
        assert!(!outcome.event.changed);
        assert_eq!(outcome.snapshot.update_vector, 0);
        assert_eq!(outcome.snapshot.name, "renamed");
    }

    #[tokio::test]
    async fn transform_error_persists_nothing() {
        let (pipeline, store, _registry, diagram_id) = setup(Duration::from_secs(60)).await;
        pipeline
            .update_diagram(diagram_id, add_cell(), UpdateSource::RestApi, "alice")
            .await
            .unwrap();

        let failing: DiagramTransform =
            Box::new(|_: DiagramSnapshot| Err(TransformError::Invalid("nope".to_string())));
        let err = pipeline
            .update_diagram(diagram_id, failing, UpdateSource::RestApi, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ColabError::Transform(TransformError::Invalid(_))));

        let stored = DiagramStore::get(store.as_ref(), diagram_id).await.unwrap().unwrap();
        assert_eq!(stored.update_vector, 1);
        assert_eq!(stored.cells.len(), 1);
    }

    #[tokio::test]
    async fn transform_cannot_forge_identity_or_clock() {
        let (pipeline, _store, _registry, diagram_id) = setup(Duration::from_secs(60)).await;
        let forging: DiagramTransform = Box::new(|mut snapshot: DiagramSnapshot| {
            snapshot.id = Uuid::new_v4();
            snapshot.update_vector = 99;
            Ok(TransformOutput { snapshot, changed: true })
        });

        let outcome = pipeline
            .update_diagram(diagram_id, forging, UpdateSource::RestApi, "alice")
            .await
            .unwrap();
        assert_eq!(outcome.snapshot.id, diagram_id);
        assert_eq!(outcome.snapshot.update_vector, 1);
    }

    #[tokio::test]
    async fn missing_diagram_is_not_found() {
        let (pipeline, _store, _registry, _diagram_id) = setup(Duration::from_secs(60)).await;
        let err = pipeline
            .update_diagram(Uuid::new_v4(), add_cell(), UpdateSource::RestApi, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ColabError::NotFound(_)));
    }

    #[tokio::test]
    async fn broadcast_follows_persistence_and_skips_originator() {
        let (pipeline, store, registry, diagram_id) = setup(Duration::from_secs(60)).await;
        let session = registry.create(diagram_id, Uuid::new_v4(), "alice").await.session;

        let (origin_tx, mut origin_rx) = mpsc::channel(16);
        let origin = Participant::new("alice", origin_tx);
        let origin_conn = origin.connection_id;
        session.join(origin).await.unwrap();
        let (peer_tx, mut peer_rx) = mpsc::channel(16);
        session.join(Participant::new("bob", peer_tx)).await.unwrap();
        while origin_rx.try_recv().is_ok() {}
        while peer_rx.try_recv().is_ok() {}

        pipeline
            .update_diagram(
                diagram_id,
                add_cell(),
                UpdateSource::Live { connection_id: origin_conn },
                "alice",
            )
            .await
            .unwrap();

        let SendMessage::DiagramState { update_vector, cells } = peer_rx.try_recv().unwrap() else {
            panic!("expected diagram state");
        };
        let stored = DiagramStore::get(store.as_ref(), diagram_id).await.unwrap().unwrap();
        assert_eq!(update_vector, stored.update_vector);
        assert_eq!(cells, stored.cells);
        assert!(origin_rx.try_recv().is_err());

        // metadata only, nothing to broadcast
        pipeline
            .update_diagram(diagram_id, rename("x"), UpdateSource::RestApi, "alice")
            .await
            .unwrap();
        assert!(peer_rx.try_recv().is_err());
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Hold {
        Get,
        Update,
    }

    /// Holds one store call for one diagram until released
    struct GatedStore {
        inner: MemoryStore,
        blocked: Uuid,
        hold: Hold,
        entered: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new(blocked: Uuid, hold: Hold) -> Self {
            Self {
                inner: MemoryStore::new(),
                blocked,
                hold,
                entered: Notify::new(),
                release: Notify::new(),
            }
        }

        async fn pause(&self, diagram_id: Uuid, call: Hold) {
            if diagram_id == self.blocked && call == self.hold {
                self.entered.notify_one();
                self.release.notified().await;
            }
        }
    }

    #[async_trait]
    impl DiagramStore for GatedStore {
        async fn get(&self, diagram_id: Uuid) -> Result<Option<DiagramSnapshot>, StoreError> {
            self.pause(diagram_id, Hold::Get).await;
            DiagramStore::get(&self.inner, diagram_id).await
        }

        async fn create(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError> {
            self.inner.create(diagram).await
        }

        async fn update(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError> {
            self.pause(diagram.id, Hold::Update).await;
            self.inner.update(diagram).await
        }

        async fn delete(&self, diagram_id: Uuid) -> Result<bool, StoreError> {
            self.inner.delete(diagram_id).await
        }
    }

    async fn gated_setup(hold: Hold) -> (UpdatePipeline, Arc<GatedStore>, SessionRegistry, Uuid) {
        let diagram = DiagramSnapshot::new(Uuid::new_v4(), "d1");
        let store = Arc::new(GatedStore::new(diagram.id, hold));
        store.create(&diagram).await.unwrap();
        let registry = SessionRegistry::new();
        let pipeline = UpdatePipeline::new(store.clone(), registry.clone(), Duration::from_secs(60));
        (pipeline, store, registry, diagram.id)
    }

    async fn stored_vector(store: &GatedStore, diagram_id: Uuid) -> i64 {
        DiagramStore::get(&store.inner, diagram_id)
            .await
            .unwrap()
            .unwrap()
            .update_vector
    }

    #[tokio::test]
    async fn different_diagrams_do_not_wait_on_each_other() {
        let slow = DiagramSnapshot::new(Uuid::new_v4(), "slow");
        let fast = DiagramSnapshot::new(Uuid::new_v4(), "fast");
        let store = Arc::new(GatedStore::new(slow.id, Hold::Update));
        store.create(&slow).await.unwrap();
        store.create(&fast).await.unwrap();
        let pipeline = UpdatePipeline::new(store.clone(), SessionRegistry::new(), Duration::from_secs(60));

        let slow_id = slow.id;
        let slow_pipeline = pipeline.clone();
        let slow_write = tokio::spawn(async move {
            slow_pipeline
                .update_diagram(slow_id, add_cell(), UpdateSource::RestApi, "alice")
                .await
        });
        store.entered.notified().await;

        let fast_write = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.update_diagram(fast.id, add_cell(), UpdateSource::RestApi, "bob"),
        )
        .await
        .expect("fast diagram blocked behind slow one")
        .unwrap();
        assert_eq!(fast_write.snapshot.update_vector, 1);
        assert!(!slow_write.is_finished());

        store.release.notify_one();
        let slow_result = slow_write.await.unwrap().unwrap();
        assert_eq!(slow_result.snapshot.update_vector, 1);
    }

    #[tokio::test]
    async fn conventional_write_refused_when_session_starts_mid_flight() {
        let (pipeline, store, registry, diagram_id) = gated_setup(Hold::Get).await;

        let writer = pipeline.clone();
        let write = tokio::spawn(async move {
            writer
                .update_without_session(diagram_id, add_cell(), "bob")
                .await
        });
        store.entered.notified().await;
        registry.create(diagram_id, Uuid::new_v4(), "alice").await;
        store.release.notify_one();

        let err = write.await.unwrap().unwrap_err();
        assert!(matches!(&err, ColabError::Conflict(msg) if msg.starts_with("Cannot modify diagram")));
        assert_eq!(stored_vector(&store, diagram_id).await, 0);
        assert!(registry.has_active(diagram_id).await);
    }

    #[tokio::test]
    async fn session_create_waits_for_persisting_conventional_write() {
        let (pipeline, store, registry, diagram_id) = gated_setup(Hold::Update).await;

        let writer = pipeline.clone();
        let write = tokio::spawn(async move {
            writer
                .update_without_session(diagram_id, add_cell(), "bob")
                .await
        });
        store.entered.notified().await;

        let creator = registry.clone();
        let create = tokio::spawn(async move { creator.create(diagram_id, Uuid::new_v4(), "alice").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!create.is_finished());

        store.release.notify_one();
        assert_eq!(write.await.unwrap().unwrap().snapshot.update_vector, 1);
        assert!(create.await.unwrap().created);
        assert_eq!(stored_vector(&store, diagram_id).await, 1);
    }

    #[tokio::test]
    async fn delete_refused_while_session_active() {
        let (pipeline, store, registry, diagram_id) = setup(Duration::from_secs(60)).await;
        registry.create(diagram_id, Uuid::new_v4(), "alice").await;

        let err = pipeline.delete_diagram(diagram_id, "alice").await.unwrap_err();
        assert!(matches!(&err, ColabError::Conflict(msg) if msg.starts_with("Cannot delete diagram")));
        assert!(DiagramStore::get(store.as_ref(), diagram_id).await.unwrap().is_some());

        registry.close(diagram_id, "closed_by_host").await;
        pipeline.delete_diagram(diagram_id, "alice").await.unwrap();
        assert!(DiagramStore::get(store.as_ref(), diagram_id).await.unwrap().is_none());

        let err = pipeline.delete_diagram(diagram_id, "alice").await.unwrap_err();
        assert!(matches!(err, ColabError::NotFound(_)));
    }

    #[tokio::test]
    async fn write_in_flight_at_close_persists_without_broadcast() {
        let (pipeline, store, registry, diagram_id) = gated_setup(Hold::Update).await;
        let session = registry.create(diagram_id, Uuid::new_v4(), "alice").await.session;

        let (host_tx, _host_rx) = mpsc::channel(16);
        let host = Participant::new("alice", host_tx);
        let host_conn = host.connection_id;
        session.join(host).await.unwrap();
        let (peer_tx, mut peer_rx) = mpsc::channel(16);
        session.join(Participant::new("bob", peer_tx)).await.unwrap();
        while peer_rx.try_recv().is_ok() {}

        let writer = pipeline.clone();
        let write = tokio::spawn(async move {
            writer
                .update_diagram(
                    diagram_id,
                    add_cell(),
                    UpdateSource::Live { connection_id: host_conn },
                    "alice",
                )
                .await
        });
        store.entered.notified().await;
        registry.close(diagram_id, "closed_by_host").await;
        store.release.notify_one();

        let outcome = write.await.unwrap().unwrap();
        assert!(outcome.event.changed);
        assert_eq!(stored_vector(&store, diagram_id).await, 1);

        let mut frames = Vec::new();
        while let Some(frame) = peer_rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            vec![SendMessage::SessionEnded {
                reason: "closed_by_host".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn state_delivery_is_ordered_after_queued_writes() {
        let (pipeline, store, registry, diagram_id) = gated_setup(Hold::Update).await;
        let session = registry.create(diagram_id, Uuid::new_v4(), "alice").await.session;
        let (tx, mut rx) = mpsc::channel(16);
        let outbound = tx.downgrade();
        session.join(Participant::new("bob", tx)).await.unwrap();
        while rx.try_recv().is_ok() {}

        let writer = pipeline.clone();
        let write = tokio::spawn(async move {
            writer
                .update_diagram(diagram_id, add_cell(), UpdateSource::RestApi, "alice")
                .await
        });
        store.entered.notified().await;

        let reader = pipeline.clone();
        let delivery = tokio::spawn(async move { reader.send_state(diagram_id, outbound).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!delivery.is_finished());

        store.release.notify_one();
        write.await.unwrap().unwrap();
        assert_eq!(delivery.await.unwrap().unwrap(), 1);

        let mut vectors = Vec::new();
        while let Ok(SendMessage::DiagramState { update_vector, .. }) = rx.try_recv() {
            vectors.push(update_vector);
        }
        assert_eq!(vectors, vec![1, 1]);
    }

    #[tokio::test]
    async fn idle_worker_is_reaped_and_respawned() {
        let (pipeline, _store, _registry, diagram_id) = setup(Duration::from_millis(50)).await;
        pipeline
            .update_diagram(diagram_id, add_cell(), UpdateSource::RestApi, "alice")
            .await
            .unwrap();
        assert_eq!(pipeline.worker_count().await, 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pipeline.worker_count().await, 0);

        let outcome = pipeline
            .update_diagram(diagram_id, add_cell(), UpdateSource::RestApi, "alice")
            .await
            .unwrap();
        assert_eq!(outcome.snapshot.update_vector, 2);
    }
}
