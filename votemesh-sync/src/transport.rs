//! Transport layer abstraction.
//!
//! The mesh needs very little from a transport: dial a route, accept
//! inbound dials, and move opaque frames both ways. Everything that makes
//! that real on a given network (ICE/SDP negotiation, relays) stays behind
//! this seam. Frames are whole envelopes; the transport never inspects
//! them.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use tokio::sync::mpsc;
use votemesh_directory::RouteInfo;
use votemesh_types::NodeId;

/// Frames buffered per direction before sends start dropping.
pub const FRAME_CAPACITY: usize = 64;

/// Both ends of an established link, as handed over by a transport.
///
/// Frames written to `tx` arrive at the remote's `rx` and vice versa.
/// Dropping both halves closes the link.
#[derive(Debug)]
pub struct LinkChannels {
    /// The peer on the other end.
    pub remote_id: NodeId,
    /// Outbound frames.
    pub tx: mpsc::Sender<Vec<u8>>,
    /// Inbound frames.
    pub rx: mpsc::Receiver<Vec<u8>>,
}

/// A transport that can dial peers and accept inbound links.
#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// The local node's id.
    fn local_id(&self) -> NodeId;

    /// The address other peers can dial this node at, in whatever format
    /// the transport understands.
    fn local_addr(&self) -> String;

    /// Dials a peer at the given route. Resolves once the channel is
    /// usable for traffic.
    async fn connect(&self, route: &RouteInfo) -> SyncResult<LinkChannels>;

    /// Waits for the next inbound link. Returns `None` once the transport
    /// has shut down.
    async fn accept(&self) -> Option<LinkChannels>;
}

/// In-memory transport for tests and single-process meshes.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Shared broker that routes dials between [`MemoryTransport`]
    /// instances registered on it.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryNetwork {
        peers: Arc<Mutex<HashMap<NodeId, mpsc::Sender<LinkChannels>>>>,
    }

    impl MemoryNetwork {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        async fn register(&self, id: NodeId, accept_tx: mpsc::Sender<LinkChannels>) {
            self.peers.lock().await.insert(id, accept_tx);
        }

        /// Drops a node from the broker so later dials to it fail, as if
        /// it left the network.
        pub async fn unregister(&self, id: &NodeId) {
            self.peers.lock().await.remove(id);
        }
    }

    /// A transport whose links are channel pairs through a
    /// [`MemoryNetwork`].
    #[derive(Debug)]
    pub struct MemoryTransport {
        local_id: NodeId,
        network: MemoryNetwork,
        accept_rx: Mutex<mpsc::Receiver<LinkChannels>>,
    }

    impl MemoryTransport {
        /// Creates a transport and registers it on the network.
        pub async fn new(local_id: NodeId, network: &MemoryNetwork) -> Self {
            let (accept_tx, accept_rx) = mpsc::channel(FRAME_CAPACITY);
            network.register(local_id, accept_tx).await;
            Self {
                local_id,
                network: network.clone(),
                accept_rx: Mutex::new(accept_rx),
            }
        }
    }

    #[async_trait]
    impl LinkTransport for MemoryTransport {
        fn local_id(&self) -> NodeId {
            self.local_id
        }

        fn local_addr(&self) -> String {
            format!("mem://{}", self.local_id)
        }

        async fn connect(&self, route: &RouteInfo) -> SyncResult<LinkChannels> {
            let accept_tx = {
                let peers = self.network.peers.lock().await;
                peers
                    .get(&route.node_id)
                    .cloned()
                    .ok_or(SyncError::PeerNotFound(route.node_id))?
            };

            // Two channels, one direction each, crosswired between the
            // halves.
            let (out_tx, out_rx) = mpsc::channel(FRAME_CAPACITY);
            let (back_tx, back_rx) = mpsc::channel(FRAME_CAPACITY);

            let remote_half = LinkChannels {
                remote_id: self.local_id,
                tx: back_tx,
                rx: out_rx,
            };
            accept_tx.send(remote_half).await.map_err(|_| {
                SyncError::Network(format!("peer {} stopped accepting", route.node_id))
            })?;

            Ok(LinkChannels {
                remote_id: route.node_id,
                tx: out_tx,
                rx: back_rx,
            })
        }

        async fn accept(&self) -> Option<LinkChannels> {
            self.accept_rx.lock().await.recv().await
        }
    }
}
