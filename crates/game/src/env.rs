//! The environment: owns the physics world, all entities and the host
//! buffers, and advances everything one action frame at a time.

use engine_core::{scale_value, Arena, EntityHandle, EntityKind, Vec2, Xorshift64};
use log::debug;
use physics::{PhysicsEvents, PhysicsWorld};

use crate::config::SimConfig;
use crate::drone::{Drone, DroneStepInfo};
use crate::entity::{Wall, WeaponPickup};
use crate::logging::{DroneStats, LogBuffer, LogEntry, LOG_BUFFER_CAPACITY, NO_WINNER};
use crate::map::{pos_to_cell_index, MapBounds, MapCell, MAPS};
use crate::obs::{MAX_SPEED, OBS_SIZE};
use crate::projectile::Projectile;
use crate::weapons::{WeaponKind, NUM_WEAPONS};
use crate::MAX_DRONES;

pub const FRAME_RATE: f32 = 60.0;
pub const DELTA_TIME: f32 = 1.0 / FRAME_RATE;
/// Physics frames per action frame; 10 agent decisions per second.
pub const DEFAULT_FRAMESKIP: u32 = 6;
pub const TRAINING_SUBSTEPS: u32 = 1;
pub const EVAL_SUBSTEPS: u32 = 4;

/// Physics frames until sudden death starts.
pub const ROUND_STEPS: u32 = 5400;
/// Physics frames between sudden-death rings.
pub const SUDDEN_DEATH_STEPS: u32 = 5;

pub const CONTINUOUS_ACTION_SIZE: usize = 7;
pub const DISCRETE_ACTION_SIZE: usize = 5;
/// Stick inputs below this magnitude are treated as no-ops.
pub const ACTION_NOOP_MAGNITUDE: f32 = 0.1;

pub const WIN_REWARD: f32 = 2.0;
pub const DEATH_REWARD: f32 = -1.5;
pub const WEAPON_PICKUP_REWARD: f32 = 0.5;
pub const SHOT_HIT_REWARD_COEF: f32 = 0.000013333;

const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

// eight unit directions, counter-clockwise from +x; index 8 is the no-op
const DISC_TO_CONT_ACTION: [[f32; 8]; 2] = [
    [1.0, FRAC_1_SQRT_2, 0.0, -FRAC_1_SQRT_2, -1.0, -FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2],
    [0.0, FRAC_1_SQRT_2, 1.0, FRAC_1_SQRT_2, 0.0, -FRAC_1_SQRT_2, -1.0, -FRAC_1_SQRT_2],
];

#[derive(Debug, Clone, Copy, Default)]
struct AgentActions {
    move_dir: Vec2,
    aim: Vec2,
    shoot: bool,
    brake: bool,
    burst: bool,
}

/// One simulation instance. Strictly single-threaded; the host writes
/// actions, calls [`Env::step`], and reads observations, rewards and
/// terminals back.
pub struct Env {
    pub(crate) num_drones: usize,
    pub(crate) num_agents: usize,
    pub(crate) discrete_actions: bool,
    pub(crate) training_mode: bool,
    pub(crate) frameskip: u32,
    pub(crate) substeps: u32,

    /// Seed the current episode was (or will be) built from; consecutive
    /// resets replay the identical episode.
    pub(crate) episode_seed: u64,
    pub(crate) rng: Xorshift64,
    pub(crate) physics: PhysicsWorld,

    pub(crate) map_index: usize,
    pub(crate) columns: usize,
    pub(crate) rows: usize,
    pub(crate) default_weapon: WeaponKind,
    pub(crate) bounds: MapBounds,
    pub(crate) spawn_quads: [MapBounds; 4],
    pub(crate) last_spawn_quad: i8,
    pub(crate) cells: Vec<MapCell>,
    pub(crate) drone_spawns: Vec<bool>,

    pub(crate) walls: Vec<Wall>,
    pub(crate) floating_walls: Arena<Wall>,
    pub(crate) drones: Vec<Drone>,
    pub(crate) pickups: Arena<WeaponPickup>,
    pub(crate) projectiles: Arena<Projectile>,
    /// Work queue for chained detonations.
    pub(crate) exploding_projectiles: Vec<(u32, u32)>,
    pub(crate) spawned_weapon_pickups: [u16; NUM_WEAPONS],

    pub(crate) steps_left: u32,
    pub(crate) sudden_death_steps: u32,
    pub(crate) sudden_death_wall_counter: u32,
    pub(crate) sudden_death_walls_placed: bool,
    pub(crate) needs_reset: bool,
    pub(crate) episode_length: u32,

    pub(crate) stats: [DroneStats; MAX_DRONES],
    pub(crate) obs: Vec<u8>,
    pub(crate) rewards: Vec<f32>,
    pub(crate) terminals: Vec<u8>,
    pub(crate) cont_actions: Vec<f32>,
    pub(crate) disc_actions: Vec<i32>,
    pub(crate) logs: LogBuffer,
}

impl Env {
    /// Build an environment and its first episode.
    pub fn new(config: SimConfig) -> Self {
        assert!(
            (1..=MAX_DRONES).contains(&config.num_drones),
            "num_drones out of range"
        );
        assert!(
            (1..=config.num_drones).contains(&config.num_agents),
            "num_agents out of range"
        );
        assert!(config.map_index < MAPS.len(), "map index out of range");

        let mut env = Env {
            num_drones: config.num_drones,
            num_agents: config.num_agents,
            discrete_actions: config.discrete_actions,
            training_mode: config.training_mode,
            frameskip: config.frameskip.max(1),
            substeps: if config.eval_mode {
                EVAL_SUBSTEPS
            } else {
                TRAINING_SUBSTEPS
            },
            episode_seed: config.seed,
            rng: Xorshift64::new(config.seed),
            physics: PhysicsWorld::new(),
            map_index: config.map_index,
            columns: 0,
            rows: 0,
            default_weapon: WeaponKind::Standard,
            bounds: MapBounds::default(),
            spawn_quads: [MapBounds::default(); 4],
            last_spawn_quad: -1,
            cells: Vec::new(),
            drone_spawns: Vec::new(),
            walls: Vec::new(),
            floating_walls: Arena::new(),
            drones: Vec::new(),
            pickups: Arena::new(),
            projectiles: Arena::new(),
            exploding_projectiles: Vec::new(),
            spawned_weapon_pickups: [0; NUM_WEAPONS],
            steps_left: ROUND_STEPS,
            sudden_death_steps: SUDDEN_DEATH_STEPS,
            sudden_death_wall_counter: 0,
            sudden_death_walls_placed: false,
            needs_reset: false,
            episode_length: 0,
            stats: [DroneStats::default(); MAX_DRONES],
            obs: vec![0; OBS_SIZE * config.num_agents],
            rewards: vec![0.0; config.num_agents],
            terminals: vec![0; config.num_agents],
            cont_actions: vec![0.0; CONTINUOUS_ACTION_SIZE * config.num_agents],
            disc_actions: vec![0; DISCRETE_ACTION_SIZE * config.num_agents],
            logs: LogBuffer::new(LOG_BUFFER_CAPACITY),
        };
        env.setup();
        env
    }

    pub(crate) fn delta_time(&self) -> f32 {
        DELTA_TIME
    }

    /// Build the world for a new episode.
    fn setup(&mut self) {
        self.needs_reset = false;
        self.physics = PhysicsWorld::new();
        self.steps_left = ROUND_STEPS;
        self.sudden_death_steps = SUDDEN_DEATH_STEPS;
        self.sudden_death_wall_counter = 0;
        self.sudden_death_walls_placed = false;
        self.last_spawn_quad = -1;

        debug!("creating map {}", MAPS[self.map_index].name);
        self.setup_map();

        debug!("creating drones");
        for idx in 0..self.num_drones {
            self.create_drone(idx);
        }

        debug!("placing floating walls");
        self.place_rand_floating_walls();

        debug!("creating weapon pickups");
        for _ in 0..MAPS[self.map_index].weapon_pickups {
            self.create_weapon_pickup();
        }

        self.compute_obs();
    }

    /// Tear the episode down. The whole physics world is dropped, but
    /// sudden-death walls come off the tail of the wall list first since
    /// they were appended last.
    fn clear(&mut self) {
        self.terminals.fill(0);
        self.episode_length = 0;
        self.stats = [DroneStats::default(); MAX_DRONES];

        while let Some(wall) = self.walls.last() {
            if !wall.sudden_death {
                break;
            }
            let wall = self.walls.pop().unwrap();
            self.physics.remove_body(wall.body);
        }

        self.walls.clear();
        self.floating_walls.clear();
        self.drones.clear();
        self.pickups.clear();
        self.projectiles.clear();
        self.exploding_projectiles.clear();
        self.cells.clear();
        self.drone_spawns.clear();
        self.spawned_weapon_pickups = [0; NUM_WEAPONS];
        self.physics = PhysicsWorld::new();
    }

    /// Restart the current episode. Until a round finishes, repeated calls
    /// rebuild the identical world.
    pub fn reset(&mut self) {
        debug!("resetting environment");
        self.rng = Xorshift64::new(self.episode_seed);
        self.clear();
        self.setup();
    }

    /// True once any drone has died.
    pub fn terminated(&self) -> bool {
        self.drones.iter().any(|drone| drone.dead)
    }

    pub fn num_drones(&self) -> usize {
        self.num_drones
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn observations(&self) -> &[u8] {
        &self.obs
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn terminals(&self) -> &[u8] {
        &self.terminals
    }

    pub fn cont_actions_mut(&mut self) -> &mut [f32] {
        &mut self.cont_actions
    }

    pub fn disc_actions_mut(&mut self) -> &mut [i32] {
        &mut self.disc_actions
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn logs_mut(&mut self) -> &mut LogBuffer {
        &mut self.logs
    }

    pub fn episode_stats(&self) -> &[DroneStats] {
        &self.stats[..self.num_drones]
    }

    pub fn drone_position(&self, idx: usize) -> Vec2 {
        self.drones[idx].position
    }

    /// Drop the held weapon for the default one; available to drivers and
    /// scripted policies.
    pub fn discard_weapon(&mut self, idx: usize) {
        self.drone_discard_weapon(idx);
    }

    fn decode_actions(&self, drone_idx: usize) -> AgentActions {
        let mut actions = AgentActions::default();

        if self.discrete_actions {
            let offset = drone_idx * DISCRETE_ACTION_SIZE;
            let raw = &self.disc_actions[offset..offset + DISCRETE_ACTION_SIZE];

            let move_dir = raw[0];
            assert!((0..=8).contains(&move_dir), "invalid move action");
            if move_dir != 8 {
                actions.move_dir = Vec2::new(
                    DISC_TO_CONT_ACTION[0][move_dir as usize],
                    DISC_TO_CONT_ACTION[1][move_dir as usize],
                );
            }
            let aim = raw[1];
            assert!((0..=8).contains(&aim), "invalid aim action");
            if aim != 8 {
                actions.aim = Vec2::new(
                    DISC_TO_CONT_ACTION[0][aim as usize],
                    DISC_TO_CONT_ACTION[1][aim as usize],
                );
            }
            actions.shoot = raw[2] != 0;
            actions.brake = raw[3] != 0;
            actions.burst = raw[4] != 0;
            return actions;
        }

        let offset = drone_idx * CONTINUOUS_ACTION_SIZE;
        let raw = &self.cont_actions[offset..offset + CONTINUOUS_ACTION_SIZE];

        let mut move_dir = Vec2::new(raw[0].tanh(), raw[1].tanh());
        if move_dir.length() > 1.0 {
            move_dir = move_dir.normalize();
        } else if move_dir.length() < ACTION_NOOP_MAGNITUDE {
            move_dir = Vec2::ZERO;
        }
        actions.move_dir = move_dir;

        let raw_aim = Vec2::new(raw[2].tanh(), raw[3].tanh());
        actions.aim = if raw_aim.length() < ACTION_NOOP_MAGNITUDE {
            Vec2::ZERO
        } else {
            raw_aim.normalize()
        };
        actions.shoot = raw[4] > 0.0;
        actions.brake = raw[5] > 0.0;
        actions.burst = raw[6] > 0.0;
        actions
    }

    /// Advance one action frame: decode actions, run `frameskip` physics
    /// frames with event handling and rewards, then refresh observations.
    pub fn step(&mut self) {
        if self.needs_reset {
            self.reset();
        }

        let mut step_actions = [AgentActions::default(); MAX_DRONES];
        for idx in 0..self.num_agents {
            let actions = self.decode_actions(idx);
            step_actions[idx] = actions;
            let drone = &mut self.drones[idx];
            drone.last_move = actions.move_dir;
            // aim no-ops keep the previous heading
            if actions.aim != Vec2::ZERO {
                drone.last_aim = actions.aim;
            }
        }

        self.rewards.fill(0.0);

        for _ in 0..self.frameskip {
            self.episode_length += 1;

            for idx in 0..self.num_drones {
                let velocity = self.physics.body_velocity(self.drones[idx].body);
                let drone = &mut self.drones[idx];
                drone.last_velocity = velocity;
                drone.step_info = DroneStepInfo::default();
                drone.died_this_step = false;
                if idx >= self.num_agents {
                    continue;
                }

                let actions = step_actions[idx];
                self.drone_brake(idx, actions.brake);
                if actions.move_dir != Vec2::ZERO {
                    self.drone_move(idx, actions.move_dir);
                }
                if actions.shoot || self.drones[idx].charging_weapon {
                    self.drone_shoot(idx, actions.aim, actions.shoot);
                }
                if actions.burst {
                    self.drone_charge_burst(idx);
                } else if self.drones[idx].charging_burst {
                    self.drone_burst(idx);
                }
            }

            self.physics.step(DELTA_TIME, self.substeps);

            if !self.refresh_dynamic_state() {
                log::warn!("dynamic body left the grid, scheduling reset");
                self.needs_reset = true;
                break;
            }

            self.steps_left = self.steps_left.saturating_sub(1);
            if self.steps_left == 0 {
                self.sudden_death_steps = self.sudden_death_steps.saturating_sub(1);
                if self.sudden_death_steps == 0 {
                    debug!("placing sudden death walls");
                    self.handle_sudden_death();
                    self.sudden_death_steps = SUDDEN_DEATH_STEPS;
                }
            }

            self.projectiles_step();

            let events = self.physics.drain_events();
            self.handle_contact_events(&events);
            self.handle_sensor_events(&events);

            let mut dead_drones = 0;
            let mut last_alive = 0;
            for idx in 0..self.num_drones {
                self.drone_step(idx);
                if self.drones[idx].dead {
                    dead_drones += 1;
                    if idx < self.num_agents {
                        self.terminals[idx] = 1;
                    }
                } else {
                    last_alive = idx;
                }
            }

            self.weapon_pickups_step(DELTA_TIME);

            let round_over =
                dead_drones >= self.num_drones.saturating_sub(1) || self.steps_left == 0;
            let winner = (round_over && self.num_drones - dead_drones == 1).then_some(last_alive);
            self.compute_rewards(round_over, winner);

            if round_over {
                self.finish_round(winner);
                break;
            }
        }

        self.compute_obs();
    }

    fn finish_round(&mut self, winner: Option<usize>) {
        self.terminals.fill(1);
        if let Some(winner) = winner {
            self.stats[winner].wins = 1.0;
        }

        for idx in 0..self.num_drones {
            let drone = &self.drones[idx];
            self.stats[idx].abs_distance_traveled = drone.initial_pos.distance(drone.position);
        }
        // projectiles still in flight count toward shot distances
        for (_, projectile) in self.projectiles.iter() {
            self.stats[projectile.drone_idx as usize].shot_distances
                [projectile.weapon.index()] += projectile.distance_traveled;
        }

        self.logs.push(LogEntry {
            length: self.episode_length as f32,
            winner: winner.map_or(NO_WINNER, |w| w as u32),
            stats: self.stats,
        });

        self.episode_seed = self.rng.next_u64();
        self.needs_reset = true;
    }

    /// Pull positions and velocities of every dynamic entity out of the
    /// physics world and rediscretize them onto the grid. A body off the
    /// grid means the solver blew up; the episode is scrapped.
    fn refresh_dynamic_state(&mut self) -> bool {
        let mut ok = true;

        for idx in 0..self.drones.len() {
            let body = self.drones[idx].body;
            let position = self.physics.body_position(body);
            let velocity = self.physics.body_velocity(body);
            self.physics.clear_force(body);
            let cell = pos_to_cell_index(self.columns, self.rows, position);
            if cell.is_none() {
                debug!("invalid position for drone {idx}: {position:?}");
                ok = false;
            }
            let drone = &mut self.drones[idx];
            drone.last_pos = drone.position;
            drone.position = position;
            drone.last_velocity = drone.velocity;
            drone.velocity = velocity;
            drone.cell_index = cell;
        }

        for index in 0..self.floating_walls.slot_count() {
            let Some(wall) = self.floating_walls.at(index) else {
                continue;
            };
            let body = wall.body;
            let position = self.physics.body_position(body);
            let rotation = self.physics.body_rotation(body);
            let velocity = self.physics.body_velocity(body);
            let cell = pos_to_cell_index(self.columns, self.rows, position);
            if cell.is_none() {
                debug!("invalid position for floating wall: {position:?}");
                ok = false;
            }
            let wall = self.floating_walls.at_mut(index).unwrap();
            wall.position = position;
            wall.rotation = rotation;
            wall.velocity = velocity;
            wall.cell_index = cell;
        }

        for index in 0..self.projectiles.slot_count() {
            let Some(projectile) = self.projectiles.at(index) else {
                continue;
            };
            let body = projectile.body;
            let damping = projectile.weapon.info().damping;
            let in_contact = projectile.in_contact;
            let position = self.physics.body_position(body);
            let velocity = self.physics.body_velocity(body);
            let cell = pos_to_cell_index(self.columns, self.rows, position);
            if cell.is_none() {
                debug!("invalid position for projectile: {position:?}");
                ok = false;
            }
            let projectile = self.projectiles.at_mut(index).unwrap();
            projectile.last_pos = projectile.position;
            projectile.position = position;
            projectile.velocity = velocity;
            projectile.cell_index = cell;
            if damping != 0.0 && !in_contact {
                projectile.last_speed = projectile.speed;
                projectile.speed = velocity.length();
            }
        }

        ok
    }

    fn resolve(&self, collider: physics::ColliderHandle) -> Option<EntityHandle> {
        self.physics
            .collider_user_data(collider)
            .and_then(EntityHandle::unpack)
    }

    fn handle_contact_events(&mut self, events: &PhysicsEvents) {
        for touch in &events.contact_begin {
            let first = self.resolve(touch.a);
            let second = self.resolve(touch.b);

            if let Some(handle) = first {
                match handle.kind {
                    EntityKind::Projectile => {
                        self.handle_projectile_begin_contact(handle, second, touch.a, touch.b);
                    }
                    EntityKind::DeathWall => {
                        if let Some(other) = second {
                            if other.kind == EntityKind::Drone {
                                self.kill_drone(other.index as usize);
                            }
                        }
                    }
                    _ => {}
                }
            }

            // the first handler may have destroyed either shape
            let first = self.resolve(touch.a);
            let second = self.resolve(touch.b);
            if let Some(handle) = second {
                match handle.kind {
                    EntityKind::Projectile => {
                        self.handle_projectile_begin_contact(handle, first, touch.b, touch.a);
                    }
                    EntityKind::DeathWall => {
                        if let Some(other) = first {
                            if other.kind == EntityKind::Drone {
                                self.kill_drone(other.index as usize);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        for touch in &events.contact_end {
            let first = self.resolve(touch.a);
            let second = self.resolve(touch.b);
            if let Some(handle) = first {
                if handle.kind == EntityKind::Projectile {
                    self.handle_projectile_end_contact(handle, second);
                }
            }
            let first = self.resolve(touch.a);
            if let Some(handle) = second {
                if handle.kind == EntityKind::Projectile {
                    self.handle_projectile_end_contact(handle, first);
                }
            }
        }
    }

    fn handle_sensor_events(&mut self, events: &PhysicsEvents) {
        for touch in &events.sensor_begin {
            let Some(sensor) = self.resolve(touch.sensor) else {
                continue;
            };
            match sensor.kind {
                EntityKind::Pickup => {
                    let Some(visitor) = self.resolve(touch.visitor) else {
                        continue;
                    };
                    self.handle_pickup_begin_touch(sensor.index, sensor.generation, visitor);
                }
                EntityKind::Projectile => self.handle_projectile_sensor_begin(sensor),
                other => unreachable!("sensor begin touch on entity kind {other:?}"),
            }
        }

        for touch in &events.sensor_end {
            let Some(sensor) = self.resolve(touch.sensor) else {
                continue;
            };
            if sensor.kind != EntityKind::Pickup {
                continue;
            }
            let Some(visitor) = self.resolve(touch.visitor) else {
                continue;
            };
            self.handle_pickup_end_touch(sensor.index, sensor.generation, visitor);
        }
    }

    /// Reward for striking an enemy, proportional to how hard the hit
    /// shoved them.
    fn compute_shot_hit_reward(&self, enemy_idx: usize) -> f32 {
        let enemy = &self.drones[enemy_idx];
        let prev_speed = enemy.last_velocity.length();
        let current_speed = self.physics.body_velocity(enemy.body).length();
        scale_value((current_speed - prev_speed).abs(), MAX_SPEED, true) * SHOT_HIT_REWARD_COEF
    }

    fn compute_reward(&self, idx: usize) -> f32 {
        let drone = &self.drones[idx];
        let mut reward = 0.0;
        if drone.died_this_step {
            reward += DEATH_REWARD;
        }
        if drone.step_info.picked_up_weapon {
            reward += WEAPON_PICKUP_REWARD;
        }
        for enemy in 0..self.num_drones {
            if enemy == idx {
                continue;
            }
            if drone.step_info.shot_hit[enemy] != 0 {
                reward += self.compute_shot_hit_reward(enemy);
            }
            if drone.step_info.explosion_hit[enemy] {
                reward += self.compute_shot_hit_reward(enemy);
            }
        }
        reward
    }

    fn compute_rewards(&mut self, round_over: bool, winner: Option<usize>) {
        if round_over {
            if let Some(winner) = winner {
                if winner < self.num_agents {
                    self.rewards[winner] += WIN_REWARD;
                }
                self.stats[winner].reward += WIN_REWARD;
            }
        }

        for idx in 0..self.num_drones {
            let reward = self.compute_reward(idx);
            if idx < self.num_agents {
                self.rewards[idx] += reward;
            }
            self.stats[idx].reward += reward;
            if reward != 0.0 {
                debug!("reward[{idx}]: {reward}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::WEAPON_DISCARD_COST;
    use crate::entity::PICKUP_RESPAWN_WAIT;
    use crate::map::PICKUP_SPAWN_DISTANCE_SQUARED;
    use crate::projectile::ExplosionDef;
    use crate::weapons;
    use physics::ShapeCategory;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn test_config(map_index: usize, seed: u64) -> SimConfig {
        SimConfig {
            num_drones: 2,
            num_agents: 2,
            map_index,
            seed,
            discrete_actions: false,
            eval_mode: false,
            // keep the configured default weapon deterministic
            training_mode: false,
            frameskip: DEFAULT_FRAMESKIP,
        }
    }

    fn check_invariants(env: &Env) {
        // cell occupants and entity back-references agree
        for (idx, cell) in env.cells.iter().enumerate() {
            if let Some(occupant) = cell.occupant {
                match occupant.kind {
                    EntityKind::Pickup => {
                        let pickup = env
                            .pickups
                            .get(occupant.index, occupant.generation)
                            .expect("cell references a dead pickup");
                        assert_eq!(pickup.cell_index, idx);
                        assert_eq!(pickup.respawn_wait, 0.0);
                    }
                    kind if kind.is_wall() => {
                        let wall = &env.walls[occupant.index as usize];
                        assert!(!wall.floating);
                        assert_eq!(wall.cell_index, Some(idx));
                    }
                    other => panic!("unexpected cell occupant {other:?}"),
                }
            }
        }
        // pickup counters match the live pickups
        let mut live = [0u16; NUM_WEAPONS];
        for (_, pickup) in env.pickups.iter() {
            if pickup.respawn_wait == 0.0 {
                live[pickup.weapon.index()] += 1;
            }
        }
        assert_eq!(live, env.spawned_weapon_pickups);
        // drone state ranges
        for drone in &env.drones {
            assert!((0.0..=1.0).contains(&drone.energy_left));
            assert!((0.0..=1.0).contains(&drone.burst_charge));
            assert!(drone.weapon_cooldown >= 0.0);
            assert!(drone.weapon_cooldown <= drone.weapon.info().cooldown + DELTA_TIME);
            assert!(drone.weapon_charge <= drone.weapon.info().charge_time.max(0.0) + DELTA_TIME);
        }
    }

    /// atanh per component, so the tanh in the decoder reproduces `v`.
    fn encode_stick(v: Vec2) -> [f32; 2] {
        [v.x.atanh(), v.y.atanh()]
    }

    #[test]
    fn setup_satisfies_invariants() {
        let env = Env::new(test_config(1, 3));
        assert_eq!(env.drones.len(), 2);
        assert_eq!(env.pickups.len() as u16, MAPS[1].weapon_pickups);
        assert_eq!(env.observations().len(), OBS_SIZE * 2);
        check_invariants(&env);
    }

    #[test]
    fn setup_every_map() {
        for map_index in 0..MAPS.len() {
            let env = Env::new(test_config(map_index, 11));
            check_invariants(&env);
        }
    }

    #[test]
    fn same_seed_same_trace() {
        let mut a = Env::new(test_config(0, 7));
        let mut b = Env::new(test_config(0, 7));
        assert_eq!(a.observations(), b.observations());

        let mut action_rng = StdRng::seed_from_u64(99);
        for step in 0..40 {
            let actions: Vec<f32> = (0..a.cont_actions.len())
                .map(|_| action_rng.gen_range(-1.0..1.0))
                .collect();
            a.cont_actions_mut().copy_from_slice(&actions);
            b.cont_actions_mut().copy_from_slice(&actions);
            a.step();
            b.step();
            assert_eq!(a.observations(), b.observations(), "diverged at step {step}");
            assert_eq!(a.rewards(), b.rewards());
            assert_eq!(a.terminals(), b.terminals());
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut env = Env::new(test_config(1, 13));
        let initial = env.observations().to_vec();
        env.reset();
        assert_eq!(env.observations(), &initial[..]);
        env.reset();
        env.reset();
        assert_eq!(env.observations(), &initial[..]);
    }

    #[test]
    fn noop_standoff_times_out() {
        let mut env = Env::new(test_config(1, 1));
        let mut steps = 0;
        while env.terminals().iter().any(|&t| t == 0) {
            env.step();
            steps += 1;
            assert!(steps <= 2 * ROUND_STEPS, "round never ended");
        }
        assert_eq!(env.steps_left, 0);
        assert!(env.drones.iter().all(|d| !d.dead));
        assert_eq!(env.terminals(), &[1, 1]);
        for stats in env.episode_stats() {
            assert_eq!(stats.reward, 0.0);
            assert_eq!(stats.wins, 0.0);
        }
        assert_eq!(env.logs().entries().last().unwrap().winner, NO_WINNER);
    }

    #[test]
    fn heat_rises_even_while_the_shot_is_gated() {
        let mut env = Env::new(test_config(0, 5));
        // hold the trigger; the standard weapon's cooldown gates most of
        // the frames but heat counts every attempt
        env.cont_actions_mut()[4] = 1.0;
        env.step();
        assert!(env.drones[0].step_info.fired_shot || env.drones[0].weapon_cooldown > 0.0);
        assert!(env.drones[0].heat >= DEFAULT_FRAMESKIP as u16);
        assert_eq!(env.episode_stats()[0].shots_fired[WeaponKind::Standard.index()], 1.0);
    }

    #[test]
    fn aimed_fire_eventually_hits() {
        let mut env = Env::new(test_config(0, 2));
        let mut hit = false;
        for _ in 0..600 {
            let to_enemy = (env.drone_position(1) - env.drone_position(0)).normalize();
            let stick = encode_stick(to_enemy * 0.9);
            let actions = env.cont_actions_mut();
            actions[0] = stick[0];
            actions[1] = stick[1];
            actions[2] = stick[0];
            actions[3] = stick[1];
            actions[4] = 1.0;
            env.step();
            let hits: f32 = env.episode_stats()[0].shots_hit.iter().sum();
            if hits > 0.0 {
                hit = true;
                break;
            }
            if env.terminals().iter().all(|&t| t == 1) {
                break;
            }
        }
        assert!(hit, "drone 0 never landed a shot on drone 1");
        check_invariants(&env);
    }

    #[test]
    fn sudden_death_places_an_inset_ring() {
        let mut env = Env::new(test_config(0, 4));
        let walls_before = env.walls.len();
        env.steps_left = 0;
        env.sudden_death_steps = 1;
        env.step();

        assert_eq!(env.sudden_death_wall_counter, 1);
        let columns = MAPS[0].columns;
        let rows = MAPS[0].rows;
        let expected = 2 * (columns - 3) + 2 * (rows - 4);
        let placed: Vec<_> = env.walls[walls_before..].iter().collect();
        assert_eq!(placed.len(), expected);
        for wall in placed {
            assert!(wall.sudden_death);
            assert_eq!(wall.kind, EntityKind::DeathWall);
        }
        // pickups in the ring's path were taken out of play
        for (_, pickup) in env.pickups.iter() {
            if env.cell_holds_static_wall(pickup.cell_index) {
                assert!(pickup.respawn_wait > 0.0);
            }
        }
        // the timer ran out, so the round is over
        assert_eq!(env.terminals(), &[1, 1]);
    }

    #[test]
    fn sudden_death_sweeps_projectiles_and_floating_walls() {
        let mut env = Env::new(test_config(0, 19));

        // park a live mine on a cell the first ring will claim
        env.drone_change_weapon(0, WeaponKind::MineLauncher);
        env.drone_shoot(0, Vec2::new(0.0, -1.0), true);
        let (proj_index, _) = env.projectiles.iter().next().unwrap();
        let ring_cell = crate::map::cell_index(env.columns, 1, 1);
        let ring_pos = env.cells[ring_cell].position;
        {
            let projectile = env.projectiles.at_mut(proj_index).unwrap();
            projectile.position = ring_pos;
            projectile.cell_index = Some(ring_cell);
        }

        // and a floating wall on another ring cell
        let wall_cell = crate::map::cell_index(env.columns, 1, 2);
        let wall_pos = env.cells[wall_cell].position;
        let wall_handle = env.create_wall(wall_pos, Vec2::splat(1.5), EntityKind::BouncyWall, true);

        env.sudden_death_steps = 0;
        env.handle_sudden_death();

        // both are swept even in a two-drone match, and the mine goes
        // without detonating
        assert!(
            env.projectiles.at(proj_index).is_none(),
            "projectile inside the ring must be destroyed"
        );
        assert!(
            env.floating_walls
                .get(wall_handle.index, wall_handle.generation)
                .is_none(),
            "floating wall inside the ring must be destroyed"
        );
        assert_eq!(
            env.episode_stats()[0].own_shots_taken[WeaponKind::MineLauncher.index()],
            0.0
        );
        assert!(!env.drones[0].step_info.explosion_hit[0]);
    }

    #[test]
    fn pickup_disable_and_respawn_cycle() {
        let mut env = Env::new(test_config(0, 6));
        let index = env.pickups.iter().next().unwrap().0;
        let old_cell = env.pickups.at(index).unwrap().cell_index;

        env.disable_weapon_pickup(index);
        {
            let pickup = env.pickups.at(index).unwrap();
            assert_eq!(pickup.respawn_wait, PICKUP_RESPAWN_WAIT);
            assert!(pickup.body.is_none());
        }
        assert!(env.cells[old_cell].occupant.is_none());

        // 3 s at 60 Hz: latent for 179 ticks, back within a tick or two of
        // the 180th (the timer accumulates rounding)
        for _ in 0..179 {
            env.weapon_pickups_step(DELTA_TIME);
            assert!(env.pickups.at(index).unwrap().respawn_wait > 0.0);
        }
        for _ in 0..3 {
            env.weapon_pickups_step(DELTA_TIME);
            if env.pickups.at(index).unwrap().respawn_wait == 0.0 {
                break;
            }
        }

        let pickup = env.pickups.at(index).unwrap();
        assert_eq!(pickup.respawn_wait, 0.0);
        assert!(pickup.body.is_some());
        let new_cell = pickup.cell_index;
        let new_pos = pickup.position;
        assert!(env.cells[new_cell].occupant.is_some());
        for (other, p) in env.pickups.iter() {
            if other != index && p.respawn_wait == 0.0 {
                assert!(p.position.distance_squared(new_pos) >= PICKUP_SPAWN_DISTANCE_SQUARED);
            }
        }
        check_invariants(&env);
    }

    #[test]
    fn imploder_blast_pulls_the_shooter_inward() {
        let mut env = Env::new(test_config(0, 8));
        let params = weapons::explosion_params(WeaponKind::Imploder);
        let center = env.drone_position(0) + Vec2::new(3.0, 0.0);
        let def = ExplosionDef {
            position: center,
            radius: params.radius,
            falloff: params.falloff,
            impulse_per_length: params.impulse_per_length,
            mask: ShapeCategory::FloatingWall.bit()
                | ShapeCategory::Projectile.bit()
                | ShapeCategory::Drone.bit(),
        };
        env.create_explosion(0, Some(WeaponKind::Imploder), &def);

        assert!(env.drones[0].step_info.own_shot_taken);
        assert!(env.drones[0].step_info.explosion_hit[0]);
        assert_eq!(
            env.episode_stats()[0].own_shots_taken[WeaponKind::Imploder.index()],
            1.0
        );
        let velocity = env.physics.body_velocity(env.drones[0].body);
        assert!(velocity.x > 0.0, "drone was not pulled toward the implosion");
    }

    #[test]
    fn accelerator_gains_speed_on_each_bounce() {
        let mut env = Env::new(test_config(0, 9));
        env.drone_change_weapon(0, WeaponKind::Accelerator);
        env.drone_shoot(0, Vec2::new(0.0, -1.0), true);
        let (index, projectile) = env.projectiles.iter().next().unwrap();
        let generation = env.projectiles.generation(index).unwrap();
        let handle = EntityHandle::new(EntityKind::Projectile, index, generation);
        assert_eq!(projectile.weapon, WeaponKind::Accelerator);

        env.projectiles.at_mut(index).unwrap().last_speed = 100.0;
        env.handle_projectile_end_contact(handle, None);
        let speed = env.projectiles.at(index).unwrap().speed;
        assert!((speed - 105.0).abs() < 1.0, "expected ~105, got {speed}");

        env.projectiles.at_mut(index).unwrap().last_speed = 499.0;
        env.handle_projectile_end_contact(handle, None);
        let speed = env.projectiles.at(index).unwrap().last_speed;
        assert_eq!(speed, weapons::ACCELERATOR_MAX_SPEED);
    }

    #[test]
    fn dead_drone_keeps_its_body_in_duels() {
        let mut env = Env::new(test_config(0, 10));
        env.kill_drone(0);
        assert!(env.drones[0].dead);
        assert!(env.physics.rigid_body_set[env.drones[0].body].is_enabled());

        let mut trio = Env::new(SimConfig {
            num_drones: 3,
            num_agents: 2,
            ..test_config(0, 10)
        });
        trio.kill_drone(2);
        assert!(!trio.physics.rigid_body_set[trio.drones[2].body].is_enabled());
    }

    #[test]
    fn discarding_a_weapon_costs_energy() {
        let mut env = Env::new(test_config(0, 12));
        env.drone_change_weapon(0, WeaponKind::Sniper);
        env.discard_weapon(0);
        assert_eq!(env.drones[0].weapon, env.default_weapon);
        assert!((env.drones[0].energy_left - (1.0 - WEAPON_DISCARD_COST)).abs() < 1e-6);

        // discarding the default weapon is a no-op
        let energy = env.drones[0].energy_left;
        env.discard_weapon(0);
        assert_eq!(env.drones[0].energy_left, energy);
    }

    #[test]
    fn braking_drains_and_refills_energy() {
        let mut env = Env::new(test_config(0, 14));
        env.cont_actions_mut()[5] = 1.0;
        env.step();
        let drained = env.drones[0].energy_left;
        let expected = 1.0 - 0.5 * DEFAULT_FRAMESKIP as f32 * DELTA_TIME;
        assert!((drained - expected).abs() < 1e-4, "drained to {drained}");
        assert!(env.drones[0].braking);

        // release and wait out the refill delay
        env.cont_actions_mut()[5] = 0.0;
        env.step();
        assert!(!env.drones[0].braking);
        for _ in 0..20 {
            env.step();
        }
        assert!(env.drones[0].energy_left > drained);
        check_invariants(&env);
    }

    #[test]
    fn burst_fires_on_release() {
        let mut env = Env::new(test_config(0, 15));
        env.cont_actions_mut()[6] = 1.0;
        env.step();
        env.step();
        assert!(env.drones[0].charging_burst);
        assert!(env.drones[0].burst_charge > 0.0);

        env.cont_actions_mut()[6] = 0.0;
        env.step();
        assert!(!env.drones[0].charging_burst);
        assert_eq!(env.drones[0].burst_charge, 0.0);
        assert_eq!(env.episode_stats()[0].total_bursts, 1.0);
        check_invariants(&env);
    }

    #[test]
    fn expired_shot_distance_is_recorded_per_weapon() {
        let mut env = Env::new(test_config(0, 16));
        env.cont_actions_mut()[4] = 1.0;
        env.step();
        env.cont_actions_mut()[4] = 0.0;
        // the standard round travels its 80-unit budget and expires
        for _ in 0..200 {
            env.step();
            if env.projectiles.is_empty() {
                break;
            }
        }
        assert!(env.projectiles.is_empty(), "projectile never expired");
        let distance = env.episode_stats()[0].shot_distances[WeaponKind::Standard.index()];
        assert!(distance >= 79.0, "recorded distance {distance}");
    }

    #[test]
    fn observation_self_block_is_well_formed() {
        let env = Env::new(test_config(0, 17));
        let base = 0;
        let scalar_base = base + crate::obs::MAP_OBS_SIZE;
        // full round timer
        assert_eq!(env.observations()[scalar_base], 255);
        // exactly one weapon is hot
        let one_hot = &env.observations()[scalar_base + 10..scalar_base + 10 + NUM_WEAPONS];
        assert_eq!(one_hot.iter().filter(|&&b| b == 255).count(), 1);
        assert_eq!(one_hot[env.drones[0].weapon.index()], 255);
        // the corner of the boring map is a death wall
        assert_eq!(
            env.observations()[crate::obs::CELL_WALL_OBS_OFFSET],
            EntityKind::DeathWall as u8 + 1
        );
    }

    #[test]
    fn discrete_actions_decode_to_unit_directions() {
        let mut env = Env::new(SimConfig {
            discrete_actions: true,
            ..test_config(0, 18)
        });
        {
            let actions = env.disc_actions_mut();
            actions[0] = 2; // move +y
            actions[1] = 8; // aim no-op
            actions[2] = 0;
            actions[3] = 0;
            actions[4] = 0;
        }
        let initial_aim = env.drones[0].last_aim;
        env.step();
        assert_eq!(env.drones[0].last_move, Vec2::new(0.0, 1.0));
        // aim no-op preserves the previous heading
        assert_eq!(env.drones[0].last_aim, initial_aim);
    }
}
