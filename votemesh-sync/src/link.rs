//! One logical channel to a single remote peer.
//!
//! A link's life is `connecting → open → closed`, with `closed` terminal:
//! reconnecting creates a fresh [`PeerLink`]. Once open, the link owns a
//! reader task that decodes inbound frames and reports them (and the
//! eventual hangup) to the mesh through a shared signal channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::protocol::Envelope;
use crate::transport::LinkChannels;
use votemesh_types::NodeId;

/// Lifecycle state of a peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Dial in flight; not yet usable for traffic.
    Connecting,
    /// Channel established; frames flow both ways.
    Open,
    /// Torn down. Terminal.
    Closed,
}

/// What link tasks report back to the mesh.
#[derive(Debug)]
pub(crate) enum LinkSignal {
    /// An outbound dial finished, successfully or not.
    DialDone {
        remote: NodeId,
        result: SyncResult<LinkChannels>,
    },
    /// A decoded envelope arrived on an open link.
    Message { from: NodeId, envelope: Envelope },
    /// The remote end hung up.
    Closed { from: NodeId },
}

/// A single bidirectional link to one remote peer.
#[derive(Debug)]
pub struct PeerLink {
    remote_id: NodeId,
    state: LinkState,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl PeerLink {
    /// Creates a link in the `Connecting` state, before the transport has
    /// produced channels.
    pub(crate) fn connecting(remote_id: NodeId) -> Self {
        Self {
            remote_id,
            state: LinkState::Connecting,
            outbound: None,
            reader: None,
        }
    }

    /// The peer on the other end.
    #[must_use]
    pub fn remote_id(&self) -> NodeId {
        self.remote_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// True once the link is usable for traffic.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Wires up an established channel pair and starts the reader pump.
    /// Returns false (and drops the channels) unless the link is still
    /// `Connecting`; a close may have raced the dial.
    pub(crate) fn open(
        &mut self,
        channels: LinkChannels,
        signals: mpsc::Sender<LinkSignal>,
    ) -> bool {
        if self.state != LinkState::Connecting {
            return false;
        }
        let mut rx = channels.rx;
        let remote = self.remote_id;
        let reader = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match serde_json::from_slice::<Envelope>(&frame) {
                    Ok(envelope) => {
                        let signal = LinkSignal::Message {
                            from: remote,
                            envelope,
                        };
                        if signals.send(signal).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping malformed frame from {}: {}", remote, e);
                    }
                }
            }
            let _ = signals.send(LinkSignal::Closed { from: remote }).await;
        });
        self.outbound = Some(channels.tx);
        self.reader = Some(reader);
        self.state = LinkState::Open;
        true
    }

    /// Queues a frame if the link is open. A full queue drops the frame;
    /// a dead queue closes the link.
    pub(crate) fn send(&mut self, frame: Vec<u8>) -> bool {
        if self.state != LinkState::Open {
            return false;
        }
        let Some(outbound) = &self.outbound else {
            return false;
        };
        match outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound queue to {} full, dropping frame", self.remote_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Link to {} is gone, closing", self.remote_id);
                self.close();
                false
            }
        }
    }

    /// Tears the link down, discarding unflushed sends. Idempotent.
    pub(crate) fn close(&mut self) {
        self.state = LinkState::Closed;
        self.outbound = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestPollMessage;
    use votemesh_types::PollId;

    // Local half of a link plus the far ends of its channels, so tests
    // can play the remote peer.
    fn channel_pair(
        remote: NodeId,
        capacity: usize,
    ) -> (LinkChannels, mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let local = LinkChannels {
            remote_id: remote,
            tx: out_tx,
            rx: in_rx,
        };
        (local, in_tx, out_rx)
    }

    fn request_frame() -> Vec<u8> {
        let envelope = Envelope::RequestPoll(RequestPollMessage {
            poll_id: PollId::new(),
        });
        serde_json::to_vec(&envelope).unwrap()
    }

    #[test]
    fn new_link_starts_connecting() {
        let link = PeerLink::connecting(NodeId::new());
        assert_eq!(link.state(), LinkState::Connecting);
        assert!(!link.is_open());
    }

    #[test]
    fn send_before_open_is_refused() {
        let mut link = PeerLink::connecting(NodeId::new());
        assert!(!link.send(request_frame()));
    }

    #[tokio::test]
    async fn open_pumps_decoded_envelopes() {
        let remote = NodeId::new();
        let (channels, in_tx, _out_rx) = channel_pair(remote, 8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);

        let mut link = PeerLink::connecting(remote);
        assert!(link.open(channels, signal_tx));
        assert!(link.is_open());

        in_tx.send(request_frame()).await.unwrap();
        match signal_rx.recv().await.unwrap() {
            LinkSignal::Message { from, envelope } => {
                assert_eq!(from, remote);
                assert_eq!(envelope.kind(), "REQUEST_POLL");
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_without_killing_the_link() {
        let remote = NodeId::new();
        let (channels, in_tx, _out_rx) = channel_pair(remote, 8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);

        let mut link = PeerLink::connecting(remote);
        link.open(channels, signal_tx);

        in_tx.send(b"not json at all".to_vec()).await.unwrap();
        in_tx.send(request_frame()).await.unwrap();

        // Only the valid frame comes through.
        match signal_rx.recv().await.unwrap() {
            LinkSignal::Message { envelope, .. } => {
                assert_eq!(envelope.kind(), "REQUEST_POLL");
            }
            other => panic!("unexpected signal: {other:?}"),
        }
        assert!(link.is_open());
    }

    #[tokio::test]
    async fn remote_hangup_signals_closed() {
        let remote = NodeId::new();
        let (channels, in_tx, _out_rx) = channel_pair(remote, 8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);

        let mut link = PeerLink::connecting(remote);
        link.open(channels, signal_tx);
        drop(in_tx);

        match signal_rx.recv().await.unwrap() {
            LinkSignal::Closed { from } => assert_eq!(from, remote),
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_reach_the_remote_side() {
        let remote = NodeId::new();
        let (channels, _in_tx, mut out_rx) = channel_pair(remote, 8);
        let (signal_tx, _signal_rx) = mpsc::channel(8);

        let mut link = PeerLink::connecting(remote);
        link.open(channels, signal_tx);

        let frame = request_frame();
        assert!(link.send(frame.clone()));
        assert_eq!(out_rx.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn full_outbound_queue_drops_the_frame_but_stays_open() {
        let remote = NodeId::new();
        let (channels, _in_tx, _out_rx) = channel_pair(remote, 1);
        let (signal_tx, _signal_rx) = mpsc::channel(8);

        let mut link = PeerLink::connecting(remote);
        link.open(channels, signal_tx);

        assert!(link.send(request_frame()));
        assert!(!link.send(request_frame()));
        assert!(link.is_open());
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let remote = NodeId::new();
        let (channels, _in_tx, _out_rx) = channel_pair(remote, 8);
        let (signal_tx, _signal_rx) = mpsc::channel(8);

        let mut link = PeerLink::connecting(remote);
        link.open(channels, signal_tx.clone());
        link.close();
        assert_eq!(link.state(), LinkState::Closed);
        assert!(!link.send(request_frame()));

        // A closed link cannot reopen; reconnection means a new link.
        let (channels, _in_tx, _out_rx) = channel_pair(remote, 8);
        assert!(!link.open(channels, signal_tx));
        assert_eq!(link.state(), LinkState::Closed);

        link.close();
        assert_eq!(link.state(), LinkState::Closed);
    }
}
