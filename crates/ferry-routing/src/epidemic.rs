//! Epidemic routing
//!
//! Epidemic routing maximizes delivery probability by flooding messages to
//! every peer that does not already hold them. It is effective in networks
//! with intermittent connectivity but uses the most bandwidth and storage.

use ferry_core::{Message, NodeId, RoutingResult, SimTime};
use tracing::trace;

use crate::decision::{DecisionEngine, PeerMut, PeerRef};

/// Flooding decision engine
#[derive(Debug, Clone, Default)]
pub struct EpidemicEngine {
    /// Offers skipped because the peer already held the message
    suppressed: u64,
}

impl EpidemicEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of duplicate offers suppressed so far
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

impl DecisionEngine for EpidemicEngine {
    const NAME: &'static str = "epidemic";

    fn exchange_on_new_connection(
        &mut self,
        _this_host: NodeId,
        _peer: PeerMut<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<()> {
        Ok(())
    }

    fn new_message(&mut self, _msg: &mut Message, _now: SimTime) -> RoutingResult<bool> {
        Ok(true)
    }

    fn should_save_received_message(
        &mut self,
        msg: &mut Message,
        this_host: NodeId,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(!self.is_final_dest(msg, this_host))
    }

    fn should_send_message_to_host(
        &mut self,
        msg: &Message,
        peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        if peer.has_message(&msg.id) {
            self.suppressed += 1;
            trace!(msg = %msg.id, peer = %peer.id(), "peer already holds message");
            return Ok(false);
        }
        Ok(true)
    }

    fn should_delete_sent_message(
        &mut self,
        _msg: &mut Message,
        _peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(false)
    }

    fn should_delete_old_message(
        &mut self,
        _msg: &Message,
        _reporter: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(false)
    }

    fn clone_for_replication(&self) -> Self {
        Self::new()
    }
}
