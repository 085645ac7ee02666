//! The node event loop.
//!
//! [`VoteMeshNode`] owns every stateful layer (directory, replica,
//! template catalog, mesh, coordinator) and runs them on a single task.
//! Callers interact through a cloneable [`NodeHandle`]: commands go in
//! over an mpsc channel, notifications come back over a broadcast
//! channel. Nothing outside the loop touches node state directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};

use crate::coordinator::{SyncConfig, SyncCoordinator};
use crate::error::{SyncError, SyncResult};
use crate::manager::{MeshConfig, MeshEvent, MeshManager};
use crate::protocol::{Envelope, VoteMessage};
use crate::transport::LinkTransport;
use votemesh_directory::{DirectoryConfig, KeyValueDirectory, RouteInfo};
use votemesh_replica::{
    AnalyticsRecord, PollPersistence, PollReplicaStore, PollTemplate, ReplicaError,
    TemplateCatalog,
};
use votemesh_types::{NodeId, Poll, PollId, PollSettings, Tally};

/// Capacity of the command and event channels.
const CHANNEL_CAPACITY: usize = 64;

/// Overall connectivity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Joining the mesh; no link has opened yet.
    Connecting,
    /// At least one link is open.
    Online,
    /// No link is open. The node keeps working standalone and heals once
    /// connectivity returns.
    Degraded,
}

/// Requests a [`NodeHandle`] sends into the event loop.
#[derive(Debug)]
pub enum NodeCommand {
    CreatePoll {
        question: String,
        options: Vec<String>,
        settings: PollSettings,
        reply: oneshot::Sender<SyncResult<Poll>>,
    },
    CreatePollFromTemplate {
        template_id: String,
        reply: oneshot::Sender<SyncResult<Poll>>,
    },
    Vote {
        poll_id: PollId,
        option_index: usize,
        reply: oneshot::Sender<SyncResult<Poll>>,
    },
    FetchPoll {
        poll_id: PollId,
        reply: oneshot::Sender<SyncResult<Poll>>,
    },
    GetPoll {
        poll_id: PollId,
        reply: oneshot::Sender<Option<Poll>>,
    },
    ListPolls {
        reply: oneshot::Sender<Vec<Poll>>,
    },
    GetTally {
        poll_id: PollId,
        reply: oneshot::Sender<Option<Tally>>,
    },
    PeerCount {
        reply: oneshot::Sender<usize>,
    },
    GetStatus {
        reply: oneshot::Sender<SyncStatus>,
    },
    ListTemplates {
        reply: oneshot::Sender<Vec<PollTemplate>>,
    },
    SaveTemplate {
        template: PollTemplate,
        reply: oneshot::Sender<String>,
    },
    RemoveTemplate {
        template_id: String,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Notifications pushed to every subscriber.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A poll appeared or changed, whether locally or through a remote
    /// merge.
    PollChanged(Poll),
    /// The number of open links changed.
    PeerCountChanged(usize),
    /// Overall connectivity changed.
    SyncStatusChanged(SyncStatus),
    /// A fetch exhausted both peers and the directory. Worth retrying
    /// once more of the mesh is reachable.
    PollNotFound(PollId),
}

/// Node tuning, aggregating each layer's config.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub mesh: MeshConfig,
    pub sync: SyncConfig,
    pub directory: DirectoryConfig,
    /// A poll id learned out of band (e.g. from a share link), fetched
    /// right after joining.
    pub initial_poll: Option<PollId>,
}

/// Creates a node and its handle. The node does nothing until the caller
/// spawns [`VoteMeshNode::run`].
pub fn create_node(
    transport: Arc<dyn LinkTransport>,
    config: NodeConfig,
) -> (VoteMeshNode, NodeHandle) {
    build_node(transport, config, None)
}

/// Like [`create_node`], with a persistence backend that polls and vote
/// analytics are written through to.
pub fn create_node_with_persistence(
    transport: Arc<dyn LinkTransport>,
    config: NodeConfig,
    persistence: Arc<dyn PollPersistence>,
) -> (VoteMeshNode, NodeHandle) {
    build_node(transport, config, Some(persistence))
}

fn build_node(
    transport: Arc<dyn LinkTransport>,
    config: NodeConfig,
    persistence: Option<Arc<dyn PollPersistence>>,
) -> (VoteMeshNode, NodeHandle) {
    let local_id = transport.local_id();
    let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
    let node = VoteMeshNode {
        local_id,
        directory: KeyValueDirectory::new(local_id, config.directory),
        replica: PollReplicaStore::new(local_id),
        templates: TemplateCatalog::new(),
        coordinator: SyncCoordinator::new(config.sync.clone()),
        mesh: MeshManager::new(transport, config.mesh.clone()),
        config,
        persistence,
        commands: command_rx,
        events: event_tx.clone(),
        status: SyncStatus::Connecting,
    };
    let handle = NodeHandle {
        local_id,
        commands: command_tx,
        events: event_tx,
    };
    (node, handle)
}

/// A mesh node. Owns all state; see the module docs for the threading
/// model.
pub struct VoteMeshNode {
    local_id: NodeId,
    config: NodeConfig,
    mesh: MeshManager,
    directory: KeyValueDirectory,
    replica: PollReplicaStore,
    templates: TemplateCatalog,
    coordinator: SyncCoordinator,
    persistence: Option<Arc<dyn PollPersistence>>,
    commands: mpsc::Receiver<NodeCommand>,
    events: broadcast::Sender<NodeEvent>,
    status: SyncStatus,
}

impl VoteMeshNode {
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Runs the event loop until shutdown or transport loss.
    pub async fn run(mut self) {
        info!("Node {} joining the mesh", self.local_id);
        self.mesh.join(&mut self.directory);
        self.advertise();
        if let Some(poll_id) = self.config.initial_poll {
            self.fetch_poll(poll_id, None);
        }

        let mut sync_ticks = ticker(self.config.sync.sync_interval_ms);
        let mut discovery_ticks = ticker(self.config.mesh.discovery_interval_ms);
        let mut sweep_ticks = ticker(self.config.directory.sweep_interval_ms);

        loop {
            let fetch_deadline = self.coordinator.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(NodeCommand::Shutdown) => break,
                    Some(command) => {
                        self.handle_command(command);
                        self.flush_changes();
                    }
                },
                event = self.mesh.next_event() => match event {
                    Some(event) => {
                        self.handle_mesh_event(event);
                        self.flush_changes();
                    }
                    None => {
                        warn!("Transport stopped, shutting node {} down", self.local_id);
                        break;
                    }
                },
                _ = sync_ticks.tick() => self.sync_tick(),
                _ = discovery_ticks.tick() => self.mesh.discover(&self.directory),
                _ = sweep_ticks.tick() => {
                    self.directory.sweep();
                }
                _ = wait_until(fetch_deadline) => {
                    self.expire_fetches();
                    self.flush_changes();
                }
            }
        }

        self.mesh.shutdown();
        info!("Node {} stopped", self.local_id);
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::CreatePoll {
                question,
                options,
                settings,
                reply,
            } => {
                let _ = reply.send(self.create_poll(question, options, settings));
            }
            NodeCommand::CreatePollFromTemplate { template_id, reply } => {
                let _ = reply.send(self.create_poll_from_template(&template_id));
            }
            NodeCommand::Vote {
                poll_id,
                option_index,
                reply,
            } => {
                let _ = reply.send(self.vote(poll_id, option_index));
            }
            NodeCommand::FetchPoll { poll_id, reply } => self.fetch_poll(poll_id, Some(reply)),
            NodeCommand::GetPoll { poll_id, reply } => {
                let _ = reply.send(self.replica.snapshot(&poll_id));
            }
            NodeCommand::ListPolls { reply } => {
                let _ = reply.send(self.replica.snapshots());
            }
            NodeCommand::GetTally { poll_id, reply } => {
                let _ = reply.send(self.replica.tally(&poll_id).ok());
            }
            NodeCommand::PeerCount { reply } => {
                let _ = reply.send(self.mesh.open_count());
            }
            NodeCommand::GetStatus { reply } => {
                let _ = reply.send(self.status);
            }
            NodeCommand::ListTemplates { reply } => {
                let _ = reply.send(self.templates.list().into_iter().cloned().collect());
            }
            NodeCommand::SaveTemplate { template, reply } => {
                let _ = reply.send(self.templates.save(template));
            }
            NodeCommand::RemoveTemplate { template_id, reply } => {
                let _ = reply.send(self.templates.remove(&template_id));
            }
            // Handled by the run loop before dispatch.
            NodeCommand::Shutdown => {}
        }
    }

    fn create_poll(
        &mut self,
        question: String,
        options: Vec<String>,
        settings: PollSettings,
    ) -> SyncResult<Poll> {
        let poll = self
            .replica
            .create_poll_with_settings(question, options, settings)?;
        info!("Created poll {} ({})", poll.id, poll.question);
        if let Err(e) = self.mesh.broadcast(&Envelope::PollSnapshot(poll.clone())) {
            warn!("Failed to broadcast poll {}: {}", poll.id, e);
        }
        Ok(poll)
    }

    fn create_poll_from_template(&mut self, template_id: &str) -> SyncResult<Poll> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| ReplicaError::UnknownTemplate(template_id.to_string()))?;
        let poll = self.replica.create_poll_from_template(template)?;
        info!(
            "Created poll {} from template {}",
            poll.id, template_id
        );
        if let Err(e) = self.mesh.broadcast(&Envelope::PollSnapshot(poll.clone())) {
            warn!("Failed to broadcast poll {}: {}", poll.id, e);
        }
        Ok(poll)
    }

    fn vote(&mut self, poll_id: PollId, option_index: usize) -> SyncResult<Poll> {
        let voter = self.replica.voter_id();
        let record = self.replica.record_local_vote(poll_id, voter, option_index)?;
        if let Err(e) = self
            .mesh
            .broadcast(&Envelope::Vote(VoteMessage::from_record(&record)))
        {
            warn!("Failed to broadcast vote on {}: {}", poll_id, e);
        }
        let poll = self
            .replica
            .snapshot(&poll_id)
            .ok_or(SyncError::Replica(ReplicaError::UnknownPoll(poll_id)))?;
        self.capture_analytics(&poll);
        Ok(poll)
    }

    fn fetch_poll(&mut self, poll_id: PollId, waiter: Option<oneshot::Sender<SyncResult<Poll>>>) {
        let request = self
            .coordinator
            .begin_fetch(poll_id, waiter, &self.replica, Instant::now());
        if let Some(request) = request {
            if let Err(e) = self.mesh.broadcast(&request) {
                warn!("Failed to broadcast poll request for {}: {}", poll_id, e);
            }
        }
    }

    // ── Mesh events ──────────────────────────────────────────────────

    fn handle_mesh_event(&mut self, event: MeshEvent) {
        match event {
            MeshEvent::PeerConnected(peer) => {
                self.directory.record_peer(peer);
                self.emit(NodeEvent::PeerCountChanged(self.mesh.open_count()));
                self.set_status(SyncStatus::Online);
                // Reconcile right away so the new link heals whatever
                // either side missed.
                let request = self.coordinator.make_sync_request(&self.replica);
                if let Err(e) = self.mesh.broadcast(&request) {
                    warn!("Failed to broadcast sync request: {}", e);
                }
            }
            MeshEvent::PeerDisconnected(peer) => {
                debug!("Peer {} disconnected", peer);
                self.emit(NodeEvent::PeerCountChanged(self.mesh.open_count()));
                if self.mesh.open_count() == 0 && self.status == SyncStatus::Online {
                    self.set_status(SyncStatus::Degraded);
                }
            }
            MeshEvent::Message { from, envelope } => {
                self.directory.record_peer(from);
                self.handle_envelope(from, envelope);
            }
        }
    }

    fn handle_envelope(&mut self, from: NodeId, envelope: Envelope) {
        debug!("Received {} from {}", envelope.kind(), from);
        match envelope {
            Envelope::RequestPoll(request) => {
                let reply = self.coordinator.handle_request_poll(&request, &self.replica);
                if let Err(e) = self.mesh.unicast(&from, &reply) {
                    warn!("Failed to answer poll request from {}: {}", from, e);
                }
            }
            Envelope::PollSnapshot(poll) => {
                if let Err(e) = self.coordinator.handle_poll_snapshot(poll, &mut self.replica) {
                    warn!("Dropping invalid snapshot from {}: {}", from, e);
                }
            }
            Envelope::Vote(vote) => self.apply_vote(from, vote),
            Envelope::SyncRequest(request) => {
                for reply in self.coordinator.handle_sync_request(&request, &self.replica) {
                    if let Err(e) = self.mesh.unicast(&from, &reply) {
                        warn!("Failed to answer sync request from {}: {}", from, e);
                    }
                }
            }
            Envelope::SyncResponse(response) => {
                let changed = self
                    .coordinator
                    .handle_sync_response(response, &mut self.replica);
                if changed > 0 {
                    debug!("Sync response from {} changed {} polls", from, changed);
                }
            }
            Envelope::Error(error) => {
                debug!("Peer {} reported {}: {}", from, error.code, error.message);
            }
        }
    }

    fn apply_vote(&mut self, from: NodeId, vote: VoteMessage) {
        let record = vote.clone().into_record();
        let poll_id = record.poll_id;
        match self.replica.apply_remote_vote(record) {
            Ok(true) => {
                // Relay so votes cross a partially connected mesh; an
                // unchanged apply terminates the gossip.
                if let Err(e) = self.mesh.broadcast_except(&from, &Envelope::Vote(vote)) {
                    warn!("Failed to relay vote on {}: {}", poll_id, e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Dropping invalid vote from {}: {}", from, e),
        }
    }

    // ── Timers ───────────────────────────────────────────────────────

    fn sync_tick(&mut self) {
        self.advertise();
        let request = self.coordinator.make_sync_request(&self.replica);
        match self.mesh.broadcast(&request) {
            Ok(0) => {
                if self.status == SyncStatus::Connecting {
                    self.set_status(SyncStatus::Degraded);
                }
            }
            Ok(peers) => debug!("Sync round reached {} peers", peers),
            Err(e) => warn!("Failed to broadcast sync request: {}", e),
        }
    }

    /// Re-stores our route and our polls so directory entries outlive
    /// their TTL while we hold them.
    fn advertise(&mut self) {
        self.directory.publish_route(RouteInfo {
            node_id: self.local_id,
            address: self.mesh.local_addr(),
        });
        for poll in self.replica.local_polls() {
            self.directory.publish_poll(poll);
        }
    }

    fn expire_fetches(&mut self) {
        for poll_id in self.coordinator.expired_fetches(Instant::now()) {
            let Some(waiters) = self.coordinator.take_fetch(&poll_id) else {
                continue;
            };
            match self.directory.poll(&poll_id) {
                Some(snapshot) => self.adopt_directory_poll(poll_id, snapshot, waiters),
                None => {
                    info!("Poll {} not found via peers or directory", poll_id);
                    for waiter in waiters {
                        let _ = waiter.send(Err(SyncError::PollNotFound(poll_id)));
                    }
                    self.emit(NodeEvent::PollNotFound(poll_id));
                }
            }
        }
    }

    fn adopt_directory_poll(
        &mut self,
        poll_id: PollId,
        snapshot: Poll,
        waiters: Vec<oneshot::Sender<SyncResult<Poll>>>,
    ) {
        match self.replica.apply_remote_poll(snapshot) {
            Ok(_) => {
                info!("Fetch for {} resolved by the directory", poll_id);
                let poll = self.replica.snapshot(&poll_id);
                for waiter in waiters {
                    match poll.clone() {
                        Some(poll) => {
                            let _ = waiter.send(Ok(poll));
                        }
                        None => {
                            let _ = waiter.send(Err(SyncError::PollNotFound(poll_id)));
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Directory snapshot for {} is invalid: {}", poll_id, e);
                for waiter in waiters {
                    let _ = waiter.send(Err(SyncError::PollNotFound(poll_id)));
                }
                self.emit(NodeEvent::PollNotFound(poll_id));
            }
        }
    }

    // ── Notifications ────────────────────────────────────────────────

    /// Drains the replica's change log: every changed poll is emitted,
    /// persisted, and (when it is ours) re-published to the directory.
    fn flush_changes(&mut self) {
        for poll_id in self.replica.take_changes() {
            let Some(poll) = self.replica.snapshot(&poll_id) else {
                continue;
            };
            if poll.creator_id == self.local_id {
                self.directory.publish_poll(poll.clone());
            }
            self.persist_poll(&poll);
            self.emit(NodeEvent::PollChanged(poll));
        }
    }

    fn set_status(&mut self, status: SyncStatus) {
        if self.status != status {
            info!("Sync status: {:?} -> {:?}", self.status, status);
            self.status = status;
            self.emit(NodeEvent::SyncStatusChanged(status));
        }
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persist_poll(&self, poll: &Poll) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let persistence = persistence.clone();
        let poll = poll.clone();
        tokio::spawn(async move {
            if let Err(e) = persistence.save_poll(&poll).await {
                warn!("Poll persistence failed: {}", e);
            }
        });
    }

    fn capture_analytics(&self, poll: &Poll) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let record = AnalyticsRecord::capture(poll);
        let persistence = persistence.clone();
        tokio::spawn(async move {
            if let Err(e) = persistence.save_analytics(&record).await {
                warn!("Analytics persistence failed: {}", e);
            }
        });
    }
}

fn ticker(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms.max(1));
    // Starting one period out keeps the first tick from firing before
    // the join dials have resolved.
    interval_at(Instant::now() + period, period)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle for talking to a running node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    local_id: NodeId,
    commands: mpsc::Sender<NodeCommand>,
    events: broadcast::Sender<NodeEvent>,
}

impl NodeHandle {
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Subscribes to node events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Creates a poll with default settings and announces it to the
    /// mesh.
    pub async fn create_poll(
        &self,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> SyncResult<Poll> {
        self.create_poll_with_settings(question, options, PollSettings::default())
            .await
    }

    pub async fn create_poll_with_settings(
        &self,
        question: impl Into<String>,
        options: Vec<String>,
        settings: PollSettings,
    ) -> SyncResult<Poll> {
        let question = question.into();
        self.request(|reply| NodeCommand::CreatePoll {
            question,
            options,
            settings,
            reply,
        })
        .await?
    }

    /// Creates a poll from a catalog template.
    pub async fn create_poll_from_template(
        &self,
        template_id: impl Into<String>,
    ) -> SyncResult<Poll> {
        let template_id = template_id.into();
        self.request(|reply| NodeCommand::CreatePollFromTemplate { template_id, reply })
            .await?
    }

    /// Casts (or changes) this node's vote on a poll and returns the
    /// updated snapshot.
    pub async fn vote(&self, poll_id: PollId, option_index: usize) -> SyncResult<Poll> {
        self.request(|reply| NodeCommand::Vote {
            poll_id,
            option_index,
            reply,
        })
        .await?
    }

    /// Resolves a poll by id: locally, then from peers, then from the
    /// directory. [`SyncError::PollNotFound`] means all three missed.
    pub async fn fetch_poll(&self, poll_id: PollId) -> SyncResult<Poll> {
        self.request(|reply| NodeCommand::FetchPoll { poll_id, reply })
            .await?
    }

    /// The local snapshot of a poll, without touching the network.
    pub async fn poll(&self, poll_id: PollId) -> SyncResult<Option<Poll>> {
        self.request(|reply| NodeCommand::GetPoll { poll_id, reply })
            .await
    }

    /// Snapshots of every replicated poll.
    pub async fn polls(&self) -> SyncResult<Vec<Poll>> {
        self.request(|reply| NodeCommand::ListPolls { reply }).await
    }

    /// Current tally for a poll, if replicated here.
    pub async fn tally(&self, poll_id: PollId) -> SyncResult<Option<Tally>> {
        self.request(|reply| NodeCommand::GetTally { poll_id, reply })
            .await
    }

    /// Number of peers with an open link.
    pub async fn peer_count(&self) -> SyncResult<usize> {
        self.request(|reply| NodeCommand::PeerCount { reply }).await
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        self.request(|reply| NodeCommand::GetStatus { reply }).await
    }

    /// Every template in the catalog, builtins first.
    pub async fn templates(&self) -> SyncResult<Vec<PollTemplate>> {
        self.request(|reply| NodeCommand::ListTemplates { reply })
            .await
    }

    /// Stores a custom template and returns its assigned id.
    pub async fn save_template(&self, template: PollTemplate) -> SyncResult<String> {
        self.request(|reply| NodeCommand::SaveTemplate { template, reply })
            .await
    }

    /// Removes a custom template. Builtins stay; returns false for them
    /// and for unknown ids.
    pub async fn remove_template(&self, template_id: impl Into<String>) -> SyncResult<bool> {
        let template_id = template_id.into();
        self.request(|reply| NodeCommand::RemoveTemplate { template_id, reply })
            .await
    }

    /// Stops the event loop. A node that already stopped is fine.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(NodeCommand::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> SyncResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SyncError::NotRunning)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }
}
