use flock_core::{
    ActorTable, AgentData, AssignmentSource, Bounds, DispatchError, FlockError, FlockingForce,
    HostEntity, IntegrateKernel, KernelRegistry, NoAssignments, OwnerId, OwnerRecord, Phase,
    SimParams, Simulation, SimulationConfig, SteeringParams, TickOutcome, Vector3,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Stand-in for a scene object owned by the host
#[derive(Debug, Clone, PartialEq)]
struct Transform {
    name: String,
    position: Vector3,
}

impl Transform {
    fn at(name: &str, position: Vector3) -> Self {
        Self {
            name: name.to_string(),
            position,
        }
    }
}

impl HostEntity for Transform {
    fn position(&self) -> Vector3 {
        self.position
    }

    fn set_position(&mut self, position: Vector3) {
        self.position = position;
    }
}

/// A 3D configuration with still agents, so each test controls every force.
fn still_config(n: usize, steering: SteeringParams) -> SimulationConfig {
    SimulationConfig {
        population_size: n,
        steering,
        ground_height: None,
        initial_speed: 0.0,
        seed: Some(42),
        worker_threads: Some(2),
        ..SimulationConfig::default()
    }
}

fn entities(positions: &[Vector3]) -> Vec<Transform> {
    positions
        .iter()
        .enumerate()
        .map(|(i, &p)| Transform::at(&format!("boid{i}"), p))
        .collect()
}

#[test]
fn test_initialize_sizes_and_ownership() {
    for n in [1, 7, 256, 600] {
        let config = SimulationConfig {
            population_size: n,
            seed: Some(n as u64),
            ..SimulationConfig::default()
        };
        let sim = Simulation::initialize(config, &[Vector3::new(0.0, 1.2, 0.0)]).unwrap();

        assert_eq!(sim.read_agents().unwrap().len(), n);
        assert_eq!(sim.ownership().len(), n);
        assert!(sim.ownership().records().iter().all(|r| r.owner_id == -1));
        assert_eq!(sim.render_view().instance_count(), n);
    }
}

#[test]
fn test_speed_never_exceeds_max_speed() {
    let mut rng = StdRng::seed_from_u64(2024);
    for round in 0..4 {
        let n = rng.gen_range(1..300);
        let config = SimulationConfig {
            population_size: n,
            seed: Some(round),
            initial_speed: 3.0,
            worker_threads: Some(2),
            ..SimulationConfig::default()
        };
        let max_speed = config.steering.max_speed;
        let seeds: Vec<Vector3> = (0..n)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-20.0..20.0),
                    0.0,
                    rng.gen_range(-20.0..20.0),
                )
            })
            .collect();
        let mut sim = Simulation::initialize(config, &seeds).unwrap();
        let mut hosts = seeds.clone();

        for _ in 0..30 {
            let dt = rng.gen_range(0.0..0.5);
            assert!(sim.tick(dt, &mut hosts, &mut NoAssignments).unwrap().is_completed());
            for agent in sim.read_agents().unwrap() {
                assert!(agent.direction.magnitude() <= max_speed + 1e-4);
            }
        }
    }
}

#[test]
fn test_separation_increases_distance() {
    let steering = SteeringParams {
        cohesion_weight: 0.0,
        alignment_weight: 0.0,
        ..SteeringParams::default()
    };
    let d = 0.5;
    assert!(d < steering.separate_radius);

    let mut hosts = entities(&[Vector3::zero(), Vector3::new(d, 0.0, 0.0)]);
    let mut sim = Simulation::initialize(still_config(2, steering), &[Vector3::zero()]).unwrap();
    sim.tick(0.1, &mut hosts, &mut NoAssignments).unwrap();

    let after = hosts[0].position.distance(&hosts[1].position);
    assert!(
        after > d,
        "{} and {} did not separate: {after}",
        hosts[0].name, hosts[1].name
    );
}

#[test]
fn test_cohesion_converges_with_stable_centroid() {
    let steering = SteeringParams {
        separate_weight: 0.0,
        alignment_weight: 0.0,
        ..SteeringParams::default()
    };
    let start = [
        Vector3::zero(),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, 1.0),
    ];
    fn centroid(ps: &[Vector3]) -> Vector3 {
        ps.iter().fold(Vector3::zero(), |acc, &p| acc + p) / ps.len() as f32
    }
    let before = centroid(&start);

    let mut hosts = start.to_vec();
    let mut sim = Simulation::initialize(still_config(3, steering), &start).unwrap();
    sim.tick(0.1, &mut hosts, &mut NoAssignments).unwrap();

    let centroid_shift = centroid(&hosts).distance(&before);
    for (old, new) in start.iter().zip(&hosts) {
        let toward = (before - *old).normalize();
        let progress = (*new - *old).dot(&toward);
        assert!(progress > 0.0);
        assert!(
            centroid_shift < progress,
            "centroid moved {centroid_shift}, agent progressed {progress}"
        );
    }
}

#[test]
fn test_owned_agent_moves_toward_target() {
    let target = Vector3::new(10.0, 0.0, 10.0);
    let steering = SteeringParams::default().without_flocking();
    let mut sim = Simulation::initialize(still_config(1, steering), &[Vector3::zero()]).unwrap();
    let owner = OwnerId::new(1).unwrap();
    assert!(sim.assign(0, owner, target).unwrap());

    let mut hosts = entities(&[Vector3::zero()]);
    let before = hosts[0].position.distance(&target);
    sim.tick(0.1, &mut hosts, &mut NoAssignments).unwrap();

    assert!(hosts[0].position.distance(&target) < before);
    assert_eq!(sim.ownership().tally().count(owner), 1);
}

#[test]
fn test_owned_agent_follows_moving_owner() {
    let steering = SteeringParams::default().without_flocking();
    let mut sim =
        Simulation::initialize(still_config(2, steering), &[Vector3::zero()]).unwrap();
    let owner = OwnerId::new(0).unwrap();

    let mut actors = ActorTable::new();
    actors.set_position(owner, Vector3::new(0.0, 0.0, 12.0));
    actors.claim(1, owner);

    let mut hosts = entities(&[Vector3::zero(), Vector3::zero()]);
    sim.tick(0.1, &mut hosts, &mut actors).unwrap();
    assert_eq!(sim.ownership().record(1).unwrap().owner(), Some(owner));
    assert_eq!(sim.ownership().record(0).unwrap().owner(), None);

    actors.set_position(owner, Vector3::new(-12.0, 0.0, 0.0));
    sim.tick(0.1, &mut hosts, &mut actors).unwrap();
    assert_eq!(
        sim.ownership().record(1).unwrap().target,
        Vector3::new(-12.0, 0.0, 0.0)
    );
    // the unowned agent had no force at all
    assert_eq!(hosts[0].position, Vector3::zero());
}

#[test]
fn test_agent_outside_volume_returns() {
    let steering = SteeringParams::default().without_flocking();
    let bounds = Bounds {
        center: steering.wall_center,
        size: steering.wall_size,
    };
    let start = Vector3::new(20.0, 0.0, 0.0);
    assert!(!bounds.contains(start));

    let mut hosts = entities(&[start]);
    let mut sim = Simulation::initialize(still_config(1, steering), &[start]).unwrap();

    let mut entered = None;
    for tick in 0..300 {
        sim.tick(0.1, &mut hosts, &mut NoAssignments).unwrap();
        assert!(hosts[0].position.x <= start.x);
        if bounds.contains(hosts[0].position) {
            entered = Some(tick);
            break;
        }
    }
    assert!(entered.is_some(), "agent never re-entered the volume");
}

#[test]
fn test_pull_then_push_round_trip() {
    let config = SimulationConfig {
        population_size: 3,
        seed: Some(1),
        ..SimulationConfig::default()
    };
    let original = entities(&[
        Vector3::new(1.5, 1.2, -3.0),
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(-8.25, 4.0, 2.0),
    ]);
    let mut hosts = original.clone();
    let mut sim = Simulation::initialize(config, &[Vector3::zero()]).unwrap();

    sim.pull_from_host(&hosts).unwrap();
    sim.push_to_host(&mut hosts).unwrap();

    assert_eq!(hosts, original);
}

#[test]
fn test_zero_delta_time_keeps_positions() {
    let mut sim = Simulation::initialize(
        still_config(4, SteeringParams::default()),
        &[Vector3::zero()],
    )
    .unwrap();
    let start = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.3, 0.0, 0.0),
        Vector3::new(0.0, 0.3, 0.0),
        Vector3::new(0.0, 0.0, 0.3),
    ];
    let mut hosts = start.to_vec();
    assert!(sim.tick(0.0, &mut hosts, &mut NoAssignments).unwrap().is_completed());
    assert_eq!(hosts, start.to_vec());
}

#[test]
fn test_write_agents_rejects_wrong_size() {
    let mut sim =
        Simulation::initialize(still_config(2, SteeringParams::default()), &[Vector3::zero()])
            .unwrap();
    assert!(sim.write_agents(&[AgentData::default()]).is_err());
    assert!(sim.write_agents(&[AgentData::default(); 2]).is_ok());
}

#[test]
fn test_owned_agent_closes_in_under_default_config() {
    let target = Vector3::new(10.0, 0.0, 10.0);
    let owner = OwnerId::new(1).unwrap();
    for seed in 0..50 {
        let config = SimulationConfig {
            population_size: 1,
            steering: SteeringParams::default().without_flocking(),
            seed: Some(seed),
            worker_threads: Some(1),
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::initialize(config, &[Vector3::zero()]).unwrap();
        sim.assign(0, owner, target).unwrap();

        let mut hosts = vec![Vector3::zero()];
        let before = hosts[0].distance(&target);
        assert!(sim
            .tick(1.0 / 60.0, &mut hosts, &mut NoAssignments)
            .unwrap()
            .is_completed());
        assert!(
            hosts[0].distance(&target) < before,
            "seed {seed}: {:?} is not closer to {:?}",
            hosts[0],
            target
        );
    }
}

#[test]
fn test_agent_inside_stay_box_gets_no_pull() {
    let steering = SteeringParams::default().without_flocking();
    let mut sim = Simulation::initialize(still_config(1, steering), &[Vector3::zero()]).unwrap();
    let owner = OwnerId::new(2).unwrap();
    let mut actors = ActorTable::new();
    actors.set_position(owner, Vector3::new(2.0, 0.5, -2.0));
    actors.claim(0, owner);

    let mut hosts = vec![Vector3::zero()];
    for _ in 0..10 {
        sim.tick(0.1, &mut hosts, &mut actors).unwrap();
    }

    assert_eq!(sim.ownership().record(0).unwrap().owner(), Some(owner));
    assert_eq!(hosts[0], Vector3::zero());
}

#[test]
fn test_skipped_frame_keeps_claims_pending() {
    let steering = SteeringParams::default().without_flocking();
    let mut sim = Simulation::initialize(still_config(2, steering), &[Vector3::zero()]).unwrap();
    let owner = OwnerId::new(0).unwrap();
    let mut actors = ActorTable::new();
    actors.set_position(owner, Vector3::new(9.0, 0.0, 0.0));
    actors.claim(1, owner);

    let mut hosts = vec![Vector3::zero(); 2];
    let outcome = sim.tick(-1.0, &mut hosts, &mut actors).unwrap();
    assert_eq!(outcome, TickOutcome::Skipped(DispatchError::InvalidDeltaTime(-1.0)));
    assert_eq!(sim.ownership().record(1).unwrap().owner(), None);
    assert_eq!(sim.ownership().tally().total(), 0);

    assert!(sim.tick(0.1, &mut hosts, &mut actors).unwrap().is_completed());
    assert_eq!(sim.ownership().record(1).unwrap().owner(), Some(owner));
    assert_eq!(sim.ownership().tally().count(owner), 1);
}

/// Integration that blows up for every agent
struct Diverging;

impl IntegrateKernel for Diverging {
    fn integrate(
        &self,
        agent: &AgentData,
        _force: Vector3,
        _owner: &OwnerRecord,
        _params: &SimParams,
    ) -> AgentData {
        AgentData::new(Vector3::new(f32::INFINITY, 0.0, 0.0), agent.direction)
    }
}

#[test]
fn test_failed_dispatch_rolls_back_ownership() {
    let kernels = KernelRegistry::new()
        .with_force(FlockingForce)
        .with_integrate(Diverging);
    let mut sim = Simulation::initialize_with_kernels(
        still_config(2, SteeringParams::default()),
        &[Vector3::zero()],
        kernels,
    )
    .unwrap();
    let owner = OwnerId::new(3).unwrap();
    let mut actors = ActorTable::new();
    actors.set_position(owner, Vector3::new(6.0, 0.0, 0.0));
    actors.claim(0, owner);

    let mut hosts = vec![Vector3::zero(), Vector3::new(1.0, 0.0, 0.0)];
    let outcome = sim.tick(0.1, &mut hosts, &mut actors).unwrap();

    assert!(matches!(
        outcome,
        TickOutcome::Skipped(DispatchError::NonFinite {
            phase: Phase::Integrate,
            ..
        })
    ));
    assert_eq!(sim.ownership().record(0).unwrap().owner(), None);
    assert_eq!(sim.ownership().tally().total(), 0);
    assert_eq!(hosts, vec![Vector3::zero(), Vector3::new(1.0, 0.0, 0.0)]);
    // the claim is queued again for the next frame
    assert_eq!(actors.claims(&[]).len(), 1);
}

#[test]
fn test_disabled_ownership_drains_claims() {
    let steering = SteeringParams {
        ownership_enabled: false,
        ..SteeringParams::default().without_flocking()
    };
    let mut sim = Simulation::initialize(still_config(1, steering), &[Vector3::zero()]).unwrap();
    let owner = OwnerId::new(0).unwrap();
    let mut actors = ActorTable::new();
    actors.claim(0, owner);

    let mut hosts = vec![Vector3::zero()];
    sim.tick(0.1, &mut hosts, &mut actors).unwrap();

    assert_eq!(sim.ownership().record(0).unwrap().owner(), None);
    assert!(actors.claims(&[]).is_empty());
}

#[test]
fn test_initialize_requires_every_kernel() {
    let incomplete = KernelRegistry::new().with_force(FlockingForce);
    assert!(matches!(
        Simulation::initialize_with_kernels(
            still_config(4, SteeringParams::default()),
            &[Vector3::zero()],
            incomplete,
        ),
        Err(FlockError::MissingKernel(Phase::Integrate))
    ));
}
