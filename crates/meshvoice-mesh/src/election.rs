//! Initiator election for a pair of participants.

/// Outcome of the initiator election from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Election {
    pub initiator: bool,
}

/// Decide whether `self_id` initiates the connection to `peer_id`.
///
/// The side whose id sorts greater (plain byte-wise string comparison)
/// sends the offer. Both sides evaluate this independently and always get
/// complementary answers for distinct ids, so no round-trip is needed to
/// agree on roles.
pub fn decide(self_id: &str, peer_id: &str) -> Election {
    Election {
        initiator: self_id > peer_id,
    }
}
