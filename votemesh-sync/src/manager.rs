//! Mesh membership and message fan-out.
//!
//! [`MeshManager`] owns every [`PeerLink`], dials peers discovered through
//! the directory, enforces the peer cap and reconnect cooldowns, and
//! surfaces decoded inbound traffic as [`MeshEvent`]s. It carries no poll
//! logic; envelopes pass through it opaquely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SyncResult;
use crate::link::{LinkSignal, LinkState, PeerLink};
use crate::protocol::Envelope;
use crate::transport::{LinkChannels, LinkTransport};
use votemesh_directory::{KeyValueDirectory, RouteInfo};
use votemesh_types::NodeId;

/// Capacity of the shared signal channel all link tasks report into.
const SIGNAL_CAPACITY: usize = 256;

/// A well-known peer dialed when joining the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapNode {
    pub node_id: NodeId,
    pub address: String,
}

/// Mesh tuning. Defaults match the production mesh.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Upper bound on simultaneously open links.
    pub max_peers: usize,
    /// Well-known peers dialed at join.
    pub bootstrap: Vec<BootstrapNode>,
    /// How often the discovery round looks for new peers, in
    /// milliseconds.
    pub discovery_interval_ms: u64,
    /// How long a failed or closed peer waits before the next dial, in
    /// milliseconds.
    pub reconnect_cooldown_ms: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            max_peers: 10,
            bootstrap: Vec::new(),
            discovery_interval_ms: 30_000,
            reconnect_cooldown_ms: 5_000,
        }
    }
}

/// Events the mesh surfaces to its owner.
#[derive(Debug)]
pub enum MeshEvent {
    /// A link reached the open state.
    PeerConnected(NodeId),
    /// An open link closed.
    PeerDisconnected(NodeId),
    /// A decoded envelope arrived on an open link.
    Message { from: NodeId, envelope: Envelope },
}

/// Owns the set of active peer links.
pub struct MeshManager {
    local_id: NodeId,
    config: MeshConfig,
    transport: Arc<dyn LinkTransport>,
    links: HashMap<NodeId, PeerLink>,
    cooldowns: HashMap<NodeId, Instant>,
    signal_tx: mpsc::Sender<LinkSignal>,
    signal_rx: mpsc::Receiver<LinkSignal>,
}

impl MeshManager {
    /// Creates a manager with no links.
    pub fn new(transport: Arc<dyn LinkTransport>, config: MeshConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let local_id = transport.local_id();
        Self {
            local_id,
            config,
            transport,
            links: HashMap::new(),
            cooldowns: HashMap::new(),
            signal_tx,
            signal_rx,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// The address peers can dial this node at.
    pub fn local_addr(&self) -> String {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Number of open links, i.e. peers traffic currently reaches.
    pub fn open_count(&self) -> usize {
        self.links.values().filter(|link| link.is_open()).count()
    }

    /// Peers with an open link.
    pub fn open_peers(&self) -> Vec<NodeId> {
        self.links
            .values()
            .filter(|link| link.is_open())
            .map(PeerLink::remote_id)
            .collect()
    }

    /// True if the link to `peer` is open.
    pub fn is_open(&self, peer: &NodeId) -> bool {
        self.links.get(peer).is_some_and(|link| link.is_open())
    }

    /// Lifecycle state of the link to `peer`, if one exists.
    pub fn link_state(&self, peer: &NodeId) -> Option<LinkState> {
        self.links.get(peer).map(PeerLink::state)
    }

    // ── Membership ───────────────────────────────────────────────────

    /// Seeds the routing table from the bootstrap list and dials each
    /// entry. Further peers arrive through [`discover`](Self::discover).
    pub fn join(&mut self, directory: &mut KeyValueDirectory) {
        info!(
            "Joining mesh via {} bootstrap nodes",
            self.config.bootstrap.len()
        );
        let bootstrap = self.config.bootstrap.clone();
        for node in bootstrap {
            let route = RouteInfo {
                node_id: node.node_id,
                address: node.address,
            };
            directory.publish_route(route.clone());
            self.connect_to(&route);
        }
    }

    /// One discovery round: look up the peers closest to ourselves and
    /// dial any we can resolve a route for.
    pub fn discover(&mut self, directory: &KeyValueDirectory) {
        let candidates = directory.find_node(&self.local_id);
        debug!("Discovery round found {} candidates", candidates.len());
        for entry in candidates {
            if self.open_count() >= self.config.max_peers {
                break;
            }
            if let Some(route) = directory.route(&entry.node_id) {
                self.connect_to(&route);
            }
        }
    }

    /// Dials a peer unless a link already exists, the peer is cooling
    /// down, or the mesh is at capacity. The dial resolves through
    /// [`next_event`](Self::next_event).
    pub fn connect_to(&mut self, route: &RouteInfo) {
        let peer = route.node_id;
        if peer == self.local_id {
            return;
        }
        if let Some(link) = self.links.get(&peer) {
            if link.state() != LinkState::Closed {
                return;
            }
        }
        if self.cooling_down(&peer) {
            debug!("Peer {} is cooling down, skipping dial", peer);
            return;
        }
        if self.open_count() >= self.config.max_peers {
            debug!(
                "Mesh at capacity ({} peers), skipping dial to {}",
                self.config.max_peers, peer
            );
            return;
        }

        debug!("Dialing {} at {}", peer, route.address);
        self.links.insert(peer, PeerLink::connecting(peer));
        let transport = self.transport.clone();
        let signals = self.signal_tx.clone();
        let route = route.clone();
        tokio::spawn(async move {
            let result = transport.connect(&route).await;
            let _ = signals
                .send(LinkSignal::DialDone {
                    remote: route.node_id,
                    result,
                })
                .await;
        });
    }

    /// Closes the link to one peer without starting a cooldown.
    pub fn close_peer(&mut self, peer: &NodeId) {
        if let Some(mut link) = self.links.remove(peer) {
            link.close();
        }
    }

    /// Closes every link.
    pub fn shutdown(&mut self) {
        for (_, mut link) in self.links.drain() {
            link.close();
        }
    }

    // ── Traffic ──────────────────────────────────────────────────────

    /// Serializes once and sends to every open link. Returns how many
    /// links accepted the frame.
    pub fn broadcast(&mut self, envelope: &Envelope) -> SyncResult<usize> {
        self.fanout(envelope, None)
    }

    /// Like [`broadcast`](Self::broadcast) but skips one peer, used when
    /// relaying an envelope onward past its sender.
    pub fn broadcast_except(&mut self, skip: &NodeId, envelope: &Envelope) -> SyncResult<usize> {
        self.fanout(envelope, Some(skip))
    }

    /// Sends to exactly one peer if its link is open; otherwise a silent
    /// no-op.
    pub fn unicast(&mut self, peer: &NodeId, envelope: &Envelope) -> SyncResult<()> {
        let frame = serde_json::to_vec(envelope)?;
        if let Some(link) = self.links.get_mut(peer) {
            if link.is_open() {
                link.send(frame);
            }
        }
        Ok(())
    }

    fn fanout(&mut self, envelope: &Envelope, skip: Option<&NodeId>) -> SyncResult<usize> {
        let frame = serde_json::to_vec(envelope)?;
        let mut sent = 0;
        for link in self.links.values_mut() {
            if skip.is_some_and(|s| *s == link.remote_id()) {
                continue;
            }
            if link.is_open() && link.send(frame.clone()) {
                sent += 1;
            }
        }
        debug!("Fanned out {} to {} peers", envelope.kind(), sent);
        Ok(sent)
    }

    // ── Event pump ───────────────────────────────────────────────────

    /// Waits for the next mesh event, driving inbound accepts and dial
    /// completions underneath. Returns `None` once the transport stops
    /// accepting.
    pub async fn next_event(&mut self) -> Option<MeshEvent> {
        loop {
            tokio::select! {
                inbound = self.transport.accept() => {
                    match inbound {
                        Some(channels) => {
                            if let Some(event) = self.accept_inbound(channels) {
                                return Some(event);
                            }
                        }
                        None => return None,
                    }
                }
                signal = self.signal_rx.recv() => {
                    let signal = signal?;
                    if let Some(event) = self.apply_signal(signal) {
                        return Some(event);
                    }
                }
            }
        }
    }

    fn accept_inbound(&mut self, channels: LinkChannels) -> Option<MeshEvent> {
        let peer = channels.remote_id;
        if let Some(existing) = self.links.get(&peer) {
            if existing.state() != LinkState::Closed {
                debug!("Dropping duplicate inbound link from {}", peer);
                return None;
            }
        }
        if self.open_count() >= self.config.max_peers {
            debug!("Mesh at capacity, refusing inbound link from {}", peer);
            return None;
        }

        let mut link = PeerLink::connecting(peer);
        link.open(channels, self.signal_tx.clone());
        self.links.insert(peer, link);
        self.cooldowns.remove(&peer);
        info!("Peer {} connected (inbound)", peer);
        Some(MeshEvent::PeerConnected(peer))
    }

    fn apply_signal(&mut self, signal: LinkSignal) -> Option<MeshEvent> {
        match signal {
            LinkSignal::DialDone { remote, result } => self.finish_dial(remote, result),
            LinkSignal::Message { from, envelope } => Some(MeshEvent::Message { from, envelope }),
            LinkSignal::Closed { from } => self.finish_close(from),
        }
    }

    fn finish_dial(
        &mut self,
        remote: NodeId,
        result: SyncResult<LinkChannels>,
    ) -> Option<MeshEvent> {
        match result {
            Ok(channels) => {
                if self.open_count() >= self.config.max_peers {
                    debug!("Mesh reached capacity while dialing {}, dropping link", remote);
                    self.links.remove(&remote);
                    return None;
                }
                let link = self.links.get_mut(&remote)?;
                if !link.open(channels, self.signal_tx.clone()) {
                    // Superseded by an inbound link or a local close
                    // while the dial was in flight.
                    return None;
                }
                self.cooldowns.remove(&remote);
                info!("Peer {} connected", remote);
                Some(MeshEvent::PeerConnected(remote))
            }
            Err(e) => {
                debug!("Dial to {} failed: {}", remote, e);
                self.links.remove(&remote);
                self.start_cooldown(remote);
                None
            }
        }
    }

    fn finish_close(&mut self, peer: NodeId) -> Option<MeshEvent> {
        let link = self.links.get_mut(&peer)?;
        if !link.is_open() {
            return None;
        }
        link.close();
        self.links.remove(&peer);
        self.start_cooldown(peer);
        info!("Peer {} disconnected", peer);
        Some(MeshEvent::PeerDisconnected(peer))
    }

    // ── Cooldowns ────────────────────────────────────────────────────

    fn cooling_down(&mut self, peer: &NodeId) -> bool {
        match self.cooldowns.get(peer) {
            Some(until) if Instant::now() < *until => true,
            Some(_) => {
                self.cooldowns.remove(peer);
                false
            }
            None => false,
        }
    }

    fn start_cooldown(&mut self, peer: NodeId) {
        let base = self.config.reconnect_cooldown_ms;
        if base == 0 {
            return;
        }
        // Jitter spreads redials out after a mass disconnect.
        let jitter = rand::thread_rng().gen_range(0..=base / 5);
        self.cooldowns
            .insert(peer, Instant::now() + Duration::from_millis(base + jitter));
    }
}
