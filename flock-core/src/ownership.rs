//! Ownership/target table.
//!
//! External actors claim agents by integer id. The first claim on an agent
//! wins and holds until the agent is explicitly released. Every frame the
//! target of each owned agent is refreshed from the owner's current
//! position, looked up through [`ActorLookup`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytemuck::{Pod, Zeroable};

use crate::device::{ComputeDevice, DeviceBuffer};
use crate::error::{FlockError, Result};
use crate::store::AgentData;
use crate::Vector3;

/// Identifier of an external actor that may own agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(i32);

impl OwnerId {
    pub fn new(id: i32) -> Result<Self> {
        if id < 0 {
            return Err(FlockError::InvalidOwner(id));
        }
        Ok(Self(id))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for OwnerId {
    type Error = FlockError;

    fn try_from(id: i32) -> Result<Self> {
        Self::new(id)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device-side ownership record; `owner_id == -1` means unowned
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OwnerRecord {
    pub owner_id: i32,
    pub target: Vector3,
}

impl OwnerRecord {
    pub const UNOWNED_ID: i32 = -1;

    pub const fn unowned() -> Self {
        Self {
            owner_id: Self::UNOWNED_ID,
            target: Vector3::zero(),
        }
    }

    pub fn owner(&self) -> Option<OwnerId> {
        (self.owner_id >= 0).then_some(OwnerId(self.owner_id))
    }

    pub fn is_owned(&self) -> bool {
        self.owner_id >= 0
    }
}

impl Default for OwnerRecord {
    fn default() -> Self {
        Self::unowned()
    }
}

/// Number of agents held by each owner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerTally {
    counts: BTreeMap<OwnerId, usize>,
}

impl OwnerTally {
    pub fn count(&self, owner: OwnerId) -> usize {
        self.counts.get(&owner).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OwnerId, usize)> + '_ {
        self.counts.iter().map(|(&owner, &n)| (owner, n))
    }

    fn increment(&mut self, owner: OwnerId) {
        *self.counts.entry(owner).or_insert(0) += 1;
    }

    fn decrement(&mut self, owner: OwnerId) {
        if let Some(n) = self.counts.get_mut(&owner) {
            *n -= 1;
            if *n == 0 {
                self.counts.remove(&owner);
            }
        }
    }
}

/// Resolves an owner id to that actor's current position.
pub trait ActorLookup {
    fn actor_position(&self, owner: OwnerId) -> Option<Vector3>;
}

/// A request by an actor to own an agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Claim {
    pub agent: usize,
    pub owner: OwnerId,
    pub claimant_position: Vector3,
}

/// Per-frame source of ownership changes and owner positions.
pub trait AssignmentSource: ActorLookup {
    /// Claims raised this frame, given the agents as pulled from the host.
    fn claims(&mut self, agents: &[AgentData]) -> Vec<Claim>;

    /// Claims returned by [`claims`](Self::claims) for a frame that was
    /// skipped. None of them took effect.
    fn rejected(&mut self, _claims: &[Claim]) {}
}

/// An assignment source that never claims and knows no actors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssignments;

impl ActorLookup for NoAssignments {
    fn actor_position(&self, _owner: OwnerId) -> Option<Vector3> {
        None
    }
}

impl AssignmentSource for NoAssignments {
    fn claims(&mut self, _agents: &[AgentData]) -> Vec<Claim> {
        Vec::new()
    }
}

/// Actor id to position lookup with a queue of pending claims.
#[derive(Debug, Clone, Default)]
pub struct ActorTable {
    positions: HashMap<OwnerId, Vector3>,
    pending: VecDeque<Claim>,
}

impl ActorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, owner: OwnerId, position: Vector3) {
        self.positions.insert(owner, position);
    }

    pub fn remove(&mut self, owner: OwnerId) -> Option<Vector3> {
        self.positions.remove(&owner)
    }

    pub fn actors(&self) -> impl Iterator<Item = (OwnerId, Vector3)> + '_ {
        self.positions.iter().map(|(&id, &p)| (id, p))
    }

    /// Queue a claim of `agent` by `owner` at the owner's current position.
    pub fn claim(&mut self, agent: usize, owner: OwnerId) {
        let claimant_position = self.positions.get(&owner).copied().unwrap_or_default();
        self.pending.push_back(Claim {
            agent,
            owner,
            claimant_position,
        });
    }
}

impl ActorLookup for ActorTable {
    fn actor_position(&self, owner: OwnerId) -> Option<Vector3> {
        self.positions.get(&owner).copied()
    }
}

impl AssignmentSource for ActorTable {
    fn claims(&mut self, _agents: &[AgentData]) -> Vec<Claim> {
        self.pending.drain(..).collect()
    }

    fn rejected(&mut self, claims: &[Claim]) {
        for claim in claims.iter().rev() {
            self.pending.push_front(*claim);
        }
    }
}

/// Host-side ownership state captured before a frame, restored if the frame
/// is skipped.
#[derive(Debug, Clone)]
pub struct OwnershipCheckpoint {
    records: Vec<OwnerRecord>,
    tally: OwnerTally,
}

pub struct OwnershipTable {
    records: Vec<OwnerRecord>,
    buffer: DeviceBuffer<OwnerRecord>,
    tally: OwnerTally,
}

impl OwnershipTable {
    /// A table with every agent unowned.
    pub fn new(device: &ComputeDevice, len: usize) -> Self {
        Self {
            records: vec![OwnerRecord::unowned(); len],
            buffer: device.allocate("ownership", len),
            tally: OwnerTally::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.records.len() {
            return Err(FlockError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        Ok(())
    }

    pub fn record(&self, index: usize) -> Result<OwnerRecord> {
        self.check_index(index)?;
        Ok(self.records[index])
    }

    pub fn records(&self) -> &[OwnerRecord] {
        &self.records
    }

    /// Give `index` to `owner`. Returns `false` if the agent already has an
    /// owner, in which case nothing changes.
    pub fn assign(&mut self, index: usize, owner: OwnerId, initial_target: Vector3) -> Result<bool> {
        self.check_index(index)?;
        let record = &mut self.records[index];
        if record.is_owned() {
            return Ok(false);
        }
        record.owner_id = owner.get();
        record.target = initial_target;
        self.tally.increment(owner);
        log::debug!("Agent {} claimed by owner {}", index, owner);
        Ok(true)
    }

    /// Clear the owner of `index`, returning the previous owner.
    pub fn release(&mut self, index: usize) -> Result<Option<OwnerId>> {
        self.check_index(index)?;
        let previous = self.records[index].owner();
        if let Some(owner) = previous {
            self.tally.decrement(owner);
            self.records[index] = OwnerRecord::unowned();
        }
        Ok(previous)
    }

    /// Apply a batch of claims, returning how many took effect. A claim
    /// with an out-of-range agent rejects the whole batch.
    pub fn apply_claims(&mut self, claims: &[Claim]) -> Result<usize> {
        for claim in claims {
            self.check_index(claim.agent)?;
        }
        let mut assigned = 0;
        for claim in claims {
            if self.assign(claim.agent, claim.owner, claim.claimant_position)? {
                assigned += 1;
            }
        }
        Ok(assigned)
    }

    /// Point every owned agent at its owner's current position. Owners the
    /// lookup does not know keep their previous target.
    pub fn refresh_targets<L: ActorLookup + ?Sized>(&mut self, actors: &L) -> usize {
        let mut refreshed = 0;
        for (index, record) in self.records.iter_mut().enumerate() {
            let Some(owner) = record.owner() else {
                continue;
            };
            match actors.actor_position(owner) {
                Some(position) => {
                    record.target = position;
                    refreshed += 1;
                }
                None => log::trace!("Owner {} of agent {} not found", owner, index),
            }
        }
        refreshed
    }

    pub fn tally(&self) -> &OwnerTally {
        &self.tally
    }

    pub fn checkpoint(&self) -> OwnershipCheckpoint {
        OwnershipCheckpoint {
            records: self.records.clone(),
            tally: self.tally.clone(),
        }
    }

    /// Roll the host records and tally back to `checkpoint`.
    pub fn restore(&mut self, checkpoint: OwnershipCheckpoint) -> Result<()> {
        if checkpoint.records.len() != self.records.len() {
            return Err(FlockError::SizeMismatch {
                what: "ownership checkpoint",
                expected: self.records.len(),
                actual: checkpoint.records.len(),
            });
        }
        self.records = checkpoint.records;
        self.tally = checkpoint.tally;
        Ok(())
    }

    /// Upload the host records to the device.
    pub fn flush(&mut self, device: &ComputeDevice) -> Result<()> {
        device.upload(&mut self.buffer, &self.records)
    }

    /// Records as last uploaded.
    pub fn device_records(&self) -> &[OwnerRecord] {
        self.buffer.as_slice()
    }

    pub fn release_buffers(&mut self, device: &ComputeDevice) {
        device.free(&mut self.buffer);
    }
}
