//! A headless scene: spawn points, players walking scripted paths, and
//! agents claimed by whichever player touches them first.

use std::collections::{BTreeMap, HashSet};
use std::f32::consts::TAU;

use flock_core::{
    ActorLookup, AgentData, AssignmentSource, Claim, OwnerId, Simulation, SimulationConfig,
    TickOutcome, Vector3,
};
use flock_shared::StatusReport;

use crate::settings::to_point;

/// Spawn points, cycled when there are fewer points than agents.
#[derive(Debug, Clone)]
pub struct Spawner {
    points: Vec<Vector3>,
}

impl Spawner {
    pub fn new(points: Vec<Vector3>) -> Self {
        Self { points }
    }

    /// `count` points evenly spaced on a horizontal circle.
    pub fn ring(center: Vector3, radius: f32, count: usize) -> Self {
        let points = (0..count)
            .map(|i| {
                let angle = TAU * i as f32 / count as f32;
                center + Vector3::new(radius * angle.cos(), 0.0, radius * angle.sin())
            })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[Vector3] {
        &self.points
    }

    /// Initial entity positions for `population` agents.
    pub fn positions(&self, population: usize) -> Vec<Vector3> {
        self.points.iter().copied().cycle().take(population).collect()
    }
}

/// A player walking a circle at constant angular speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedPlayer {
    pub id: OwnerId,
    pub center: Vector3,
    pub radius: f32,
    /// Radians per second; negative walks clockwise.
    pub angular_speed: f32,
    pub phase: f32,
}

impl ScriptedPlayer {
    pub fn position_at(&self, time: f32) -> Vector3 {
        let angle = self.phase + self.angular_speed * time;
        self.center + Vector3::new(self.radius * angle.cos(), 0.0, self.radius * angle.sin())
    }
}

/// Assignment source that claims an unowned agent for the first player
/// within `contact_radius` of it on the ground plane.
#[derive(Debug, Clone)]
pub struct ProximityClaims {
    players: Vec<ScriptedPlayer>,
    positions: BTreeMap<OwnerId, Vector3>,
    claimed: HashSet<usize>,
    contact_radius: f32,
    time: f32,
}

impl ProximityClaims {
    pub fn new(players: Vec<ScriptedPlayer>, contact_radius: f32) -> Self {
        let positions = players.iter().map(|p| (p.id, p.position_at(0.0))).collect();
        Self {
            players,
            positions,
            claimed: HashSet::new(),
            contact_radius,
            time: 0.0,
        }
    }

    /// Players spread evenly around `center`, alternating walking direction.
    pub fn circling(
        count: usize,
        center: Vector3,
        radius: f32,
        contact_radius: f32,
    ) -> flock_core::error::Result<Self> {
        let players = (0..count)
            .map(|i| {
                Ok(ScriptedPlayer {
                    id: OwnerId::new(i as i32)?,
                    center,
                    radius,
                    angular_speed: if i % 2 == 0 { 0.5 } else { -0.5 },
                    phase: TAU * i as f32 / count as f32,
                })
            })
            .collect::<flock_core::error::Result<Vec<_>>>()?;
        Ok(Self::new(players, contact_radius))
    }

    pub fn players(&self) -> &[ScriptedPlayer] {
        &self.players
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Move every player along its path.
    pub fn advance(&mut self, delta_time: f32) {
        self.time += delta_time;
        for player in &self.players {
            self.positions.insert(player.id, player.position_at(self.time));
        }
    }

    /// Agents claimed so far through contact.
    pub fn claimed_count(&self) -> usize {
        self.claimed.len()
    }
}

impl ActorLookup for ProximityClaims {
    fn actor_position(&self, owner: OwnerId) -> Option<Vector3> {
        self.positions.get(&owner).copied()
    }
}

impl AssignmentSource for ProximityClaims {
    fn claims(&mut self, agents: &[AgentData]) -> Vec<Claim> {
        let mut claims = Vec::new();
        for (index, agent) in agents.iter().enumerate() {
            if self.claimed.contains(&index) {
                continue;
            }
            let touching = self.players.iter().find_map(|player| {
                let at = self.positions.get(&player.id).copied()?;
                let distance = to_point(at).planar_distance_to(&to_point(agent.position));
                (distance <= self.contact_radius).then_some((player.id, at))
            });
            if let Some((owner, claimant_position)) = touching {
                log::debug!("Player {} touched agent {}", owner, index);
                self.claimed.insert(index);
                claims.push(Claim {
                    agent: index,
                    owner,
                    claimant_position,
                });
            }
        }
        claims
    }

    fn rejected(&mut self, claims: &[Claim]) {
        for claim in claims {
            self.claimed.remove(&claim.agent);
        }
    }
}

/// A simulation plus the host entities and players driving it.
pub struct Scene {
    simulation: Simulation,
    entities: Vec<Vector3>,
    players: ProximityClaims,
    tick: u64,
}

impl Scene {
    pub fn new(
        config: SimulationConfig,
        spawner: &Spawner,
        players: ProximityClaims,
    ) -> flock_core::error::Result<Self> {
        let entities = spawner.positions(config.population_size);
        let simulation = Simulation::initialize(config, spawner.points())?;
        Ok(Self {
            simulation,
            entities,
            players,
            tick: 0,
        })
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn entities(&self) -> &[Vector3] {
        &self.entities
    }

    pub fn players(&self) -> &ProximityClaims {
        &self.players
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Advance players, then run one simulation frame.
    pub fn step(&mut self, delta_time: f32) -> flock_core::error::Result<TickOutcome> {
        self.players.advance(delta_time);
        let outcome = self
            .simulation
            .tick(delta_time, &mut self.entities, &mut self.players)?;
        self.tick += 1;
        Ok(outcome)
    }

    pub fn report(&self) -> flock_core::error::Result<StatusReport> {
        let agents = self.simulation.read_agents()?;
        let n = agents.len().max(1) as f32;
        let centroid = agents
            .iter()
            .fold(Vector3::zero(), |acc, a| acc + a.position)
            / n;
        let mean_speed = agents.iter().map(|a| a.direction.magnitude()).sum::<f32>() / n;

        Ok(StatusReport {
            tick: self.tick,
            agent_count: agents.len(),
            owned_agents: self.simulation.ownership().tally().total(),
            skipped_frames: self.simulation.skipped_ticks(),
            centroid: to_point(centroid),
            mean_speed,
        })
    }

    pub fn shutdown(&mut self) {
        self.simulation.shutdown();
    }
}
