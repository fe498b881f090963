//! Drones: agent-controlled dynamic circles with energy, weapons and
//! bursts.

use engine_core::{clamp_unit, EntityHandle, EntityKind, Vec2};
use log::debug;
use physics::{BodyDef, ColliderHandle, RigidBodyHandle, ShapeCategory, ShapeDef};

use crate::env::Env;
use crate::map::pos_to_cell_index;
use crate::projectile::ExplosionDef;
use crate::weapons::{self, WeaponKind};
use crate::MAX_DRONES;

pub const DRONE_RADIUS: f32 = 1.0;
pub const DRONE_DENSITY: f32 = 1.25;
pub const DRONE_RESTITUTION: f32 = 0.3;
pub const DRONE_FRICTION: f32 = 0.1;
pub const DRONE_MOVE_MAGNITUDE: f32 = 35.0;
pub const DRONE_LINEAR_DAMPING: f32 = 1.0;
/// Divisor on inherited lateral velocity when launching projectiles.
pub const DRONE_MOVE_AIM_DIVISOR: f32 = 10.0;

pub const DRONE_ENERGY_MAX: f32 = 1.0;
pub const DRONE_BRAKE_COEF: f32 = 2.5;
pub const DRONE_BRAKE_DRAIN_RATE: f32 = 0.5;
pub const DRONE_ENERGY_REFILL_WAIT: f32 = 1.0;
/// Longer refill delay after running the tank completely dry.
pub const DRONE_ENERGY_REFILL_EMPTY_WAIT: f32 = 3.0;
pub const DRONE_ENERGY_REFILL_RATE: f32 = 0.03;

pub const DRONE_BURST_BASE_COST: f32 = 0.1;
pub const DRONE_BURST_CHARGE_RATE: f32 = 0.6;
pub const DRONE_BURST_RADIUS_BASE: f32 = 4.0;
pub const DRONE_BURST_RADIUS_MIN: f32 = 3.0;
pub const DRONE_BURST_IMPACT_BASE: f32 = 125.0;
pub const DRONE_BURST_IMPACT_MIN: f32 = 25.0;
pub const DRONE_BURST_COOLDOWN: f32 = 0.5;

pub const WEAPON_DISCARD_COST: f32 = 0.2;

/// Per-frame hit/pickup flags, zeroed at the start of every physics frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct DroneStepInfo {
    pub picked_up_weapon: bool,
    pub prev_weapon: Option<WeaponKind>,
    pub fired_shot: bool,
    /// Weapon kind + 1 per struck enemy; 0 means no hit.
    pub shot_hit: [u8; MAX_DRONES],
    /// Weapon kind + 1 per striking enemy; 0 means untouched.
    pub shot_taken: [u8; MAX_DRONES],
    pub own_shot_taken: bool,
    pub explosion_hit: [bool; MAX_DRONES],
    pub explosion_taken: [bool; MAX_DRONES],
}

#[derive(Debug)]
pub struct Drone {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub weapon: WeaponKind,
    /// -1 is unlimited.
    pub ammo: i32,
    pub weapon_cooldown: f32,
    /// Monotone while the trigger is held; degrades machine-gun aim.
    pub heat: u16,
    pub charging_weapon: bool,
    pub weapon_charge: f32,
    pub energy_left: f32,
    pub braking: bool,
    pub charging_burst: bool,
    pub burst_charge: f32,
    pub burst_cooldown: f32,
    pub energy_fully_depleted: bool,
    pub energy_fully_depleted_this_step: bool,
    pub energy_refill_wait: f32,
    pub shot_this_step: bool,
    pub died_this_step: bool,
    pub idx: u8,
    pub initial_pos: Vec2,
    pub position: Vec2,
    pub last_pos: Vec2,
    pub last_move: Vec2,
    /// Unit aim direction; persists through aim no-ops. Starts pointing
    /// down.
    pub last_aim: Vec2,
    pub velocity: Vec2,
    pub last_velocity: Vec2,
    pub cell_index: Option<usize>,
    pub dead: bool,
    pub step_info: DroneStepInfo,
}

impl Env {
    /// Spawn drone `idx`. Drones 0 and 1 take diagonally opposite spawn
    /// quadrants; later drones pick one at random.
    pub(crate) fn create_drone(&mut self, idx: usize) {
        let quad = if idx == 0 {
            let quad = self.rng.random_i32(0, 3) as i8;
            self.last_spawn_quad = quad;
            quad
        } else if idx == 1 {
            3 - self.last_spawn_quad
        } else {
            self.rng.random_i32(0, 3) as i8
        };
        let position = self
            .find_open_pos(ShapeCategory::Drone, quad)
            .unwrap_or_else(|err| panic!("no open position for drone {idx}: {err}"));

        let body = self.physics.add_body(&BodyDef {
            position,
            dynamic: true,
            fixed_rotation: true,
            linear_damping: DRONE_LINEAR_DAMPING,
            ..Default::default()
        });
        let handle = EntityHandle::fixed(EntityKind::Drone, idx as u32);
        let collider = self.physics.add_circle_shape(
            body,
            DRONE_RADIUS,
            &ShapeDef {
                density: DRONE_DENSITY,
                restitution: DRONE_RESTITUTION,
                friction: DRONE_FRICTION,
                category: ShapeCategory::Drone.bit(),
                mask: ShapeCategory::Wall.bit()
                    | ShapeCategory::FloatingWall.bit()
                    | ShapeCategory::WeaponPickup.bit()
                    | ShapeCategory::Projectile.bit()
                    | ShapeCategory::Drone.bit(),
                contact_events: true,
                user_data: handle.pack(),
                ..Default::default()
            },
        );

        self.drones.push(Drone {
            body,
            collider,
            weapon: self.default_weapon,
            ammo: weapons::max_ammo(self.default_weapon, self.default_weapon),
            weapon_cooldown: 0.0,
            heat: 0,
            charging_weapon: false,
            weapon_charge: 0.0,
            energy_left: DRONE_ENERGY_MAX,
            braking: false,
            charging_burst: false,
            burst_charge: 0.0,
            burst_cooldown: 0.0,
            energy_fully_depleted: false,
            energy_fully_depleted_this_step: false,
            energy_refill_wait: 0.0,
            shot_this_step: false,
            died_this_step: false,
            idx: idx as u8,
            initial_pos: position,
            position,
            last_pos: position,
            last_move: Vec2::ZERO,
            last_aim: Vec2::new(0.0, -1.0),
            velocity: Vec2::ZERO,
            last_velocity: Vec2::ZERO,
            cell_index: pos_to_cell_index(self.columns, self.rows, position),
            dead: false,
            step_info: DroneStepInfo::default(),
        });
    }

    pub(crate) fn kill_drone(&mut self, idx: usize) {
        let two_drones = self.num_drones == 2;
        let drone = &mut self.drones[idx];
        if drone.dead {
            return;
        }
        debug!("drone {idx} died");
        drone.dead = true;
        drone.died_this_step = true;
        // with two drones the round ends this frame; keep the body enabled
        // so the final frame still reports its collisions
        if two_drones {
            return;
        }

        drone.braking = false;
        drone.charging_burst = false;
        drone.energy_fully_depleted = false;
        drone.shot_this_step = false;
        let body = drone.body;
        self.physics.set_body_enabled(body, false);
    }

    /// Apply the movement force; halved while the tank is dry and waiting
    /// to refill.
    pub(crate) fn drone_move(&mut self, idx: usize, direction: Vec2) {
        let drone = &mut self.drones[idx];
        let mut direction = direction;
        if drone.energy_fully_depleted && drone.energy_refill_wait != 0.0 {
            direction *= 0.5;
            drone.last_move = direction;
        }
        let body = drone.body;
        self.physics.apply_force(body, direction * DRONE_MOVE_MAGNITUDE);
    }

    pub(crate) fn drone_change_weapon(&mut self, idx: usize, new_weapon: WeaponKind) {
        let default_weapon = self.default_weapon;
        let drone = &mut self.drones[idx];
        // only top up ammo if the weapon stays the same
        if drone.weapon != new_weapon {
            drone.weapon_cooldown = 0.0;
            drone.weapon_charge = 0.0;
            drone.heat = 0;
        }
        drone.weapon = new_weapon;
        drone.ammo = weapons::max_ammo(default_weapon, new_weapon);
    }

    /// Handle one shoot command. `trigger_held` distinguishes holding from
    /// releasing for charge-up weapons, which fire on release.
    pub(crate) fn drone_shoot(&mut self, idx: usize, aim: Vec2, trigger_held: bool) {
        let dt = self.delta_time();
        let norm_aim;
        {
            let drone = &mut self.drones[idx];
            debug_assert_ne!(drone.ammo, 0);

            drone.shot_this_step = true;
            drone.heat += 1;
            if drone.weapon_cooldown != 0.0 {
                return;
            }

            let charge_time = drone.weapon.info().charge_time;
            let needs_charge = charge_time != 0.0;
            if needs_charge {
                if trigger_held {
                    drone.charging_weapon = true;
                    drone.weapon_charge = (drone.weapon_charge + dt).min(charge_time);
                } else if drone.weapon_charge < charge_time {
                    drone.charging_weapon = false;
                    drone.weapon_charge = (drone.weapon_charge - dt).max(0.0);
                }
            }
            // charge-up weapons only fire once fully charged and released
            if needs_charge && (trigger_held || drone.weapon_charge < charge_time) {
                return;
            }

            if drone.ammo != weapons::INFINITE_AMMO {
                drone.ammo -= 1;
            }
            drone.weapon_cooldown = drone.weapon.info().cooldown;
            drone.charging_weapon = false;
            drone.weapon_charge = 0.0;

            norm_aim = if aim == Vec2::ZERO {
                drone.last_aim
            } else {
                aim.normalize()
            };
        }

        let (body, weapon) = {
            let drone = &self.drones[idx];
            (drone.body, drone.weapon)
        };
        self.physics
            .apply_impulse(body, norm_aim * -weapon.info().recoil_magnitude);

        for _ in 0..weapon.info().projectiles_per_shot {
            self.create_projectile(idx, norm_aim);
            self.stats[idx].shots_fired[weapon.index()] += 1.0;
            debug!("drone {idx} fired {weapon:?}");
        }
        self.drones[idx].step_info.fired_shot = true;

        if self.drones[idx].ammo == 0 {
            let default_weapon = self.default_weapon;
            self.drone_change_weapon(idx, default_weapon);
            let drone = &mut self.drones[idx];
            drone.weapon_cooldown = drone.weapon.info().cooldown;
        }
    }

    /// Brake while the command is held, draining energy; releasing restores
    /// damping and schedules the energy refill.
    pub(crate) fn drone_brake(&mut self, idx: usize, brake: bool) {
        let dt = self.delta_time();
        let drone = &mut self.drones[idx];

        if !brake || drone.energy_fully_depleted {
            if drone.braking {
                drone.braking = false;
                if drone.energy_refill_wait == 0.0 && !drone.charging_burst {
                    drone.energy_refill_wait = DRONE_ENERGY_REFILL_WAIT;
                }
                let body = drone.body;
                self.physics.set_linear_damping(body, DRONE_LINEAR_DAMPING);
            }
            return;
        }

        if !drone.braking {
            drone.braking = true;
            let body = drone.body;
            self.physics
                .set_linear_damping(body, DRONE_LINEAR_DAMPING * DRONE_BRAKE_COEF);
        }
        let drone = &mut self.drones[idx];
        drone.energy_left = (drone.energy_left - DRONE_BRAKE_DRAIN_RATE * dt).max(0.0);
        self.stats[idx].brake_time += dt;

        let drone = &mut self.drones[idx];
        // a charging burst owns the energy bookkeeping until it releases
        if drone.energy_left == 0.0 && !drone.charging_burst {
            drone.energy_fully_depleted = true;
            drone.energy_fully_depleted_this_step = true;
            drone.energy_refill_wait = DRONE_ENERGY_REFILL_EMPTY_WAIT;
            self.stats[idx].energy_emptied += 1.0;
        }
    }

    /// Transfer energy into the burst charge while the command is held.
    pub(crate) fn drone_charge_burst(&mut self, idx: usize) {
        let dt = self.delta_time();
        let drone = &mut self.drones[idx];
        if drone.energy_fully_depleted
            || drone.burst_cooldown != 0.0
            || (!drone.charging_burst && drone.energy_left < DRONE_BURST_BASE_COST)
        {
            return;
        }

        if drone.charging_burst {
            drone.burst_charge =
                (drone.burst_charge + DRONE_BURST_CHARGE_RATE * dt).min(DRONE_ENERGY_MAX);
            drone.energy_left =
                (drone.energy_left - DRONE_BURST_CHARGE_RATE * dt).max(0.0);
        } else {
            drone.burst_charge = (drone.burst_charge + DRONE_BURST_BASE_COST).min(DRONE_ENERGY_MAX);
            drone.energy_left = (drone.energy_left - DRONE_BURST_BASE_COST).max(0.0);
            drone.charging_burst = true;
        }

        if drone.energy_left == 0.0 {
            drone.energy_fully_depleted = true;
            self.stats[idx].energy_emptied += 1.0;
        }
    }

    /// Release the burst: a radial explosion scaled by the stored charge.
    pub(crate) fn drone_burst(&mut self, idx: usize) {
        let (position, burst_charge) = {
            let drone = &self.drones[idx];
            if !drone.charging_burst {
                return;
            }
            (drone.position, drone.burst_charge)
        };

        let radius = DRONE_BURST_RADIUS_BASE * burst_charge + DRONE_BURST_RADIUS_MIN;
        let explosion = ExplosionDef {
            position,
            radius,
            falloff: radius / 2.0,
            impulse_per_length: DRONE_BURST_IMPACT_BASE * burst_charge + DRONE_BURST_IMPACT_MIN,
            mask: ShapeCategory::Wall.bit()
                | ShapeCategory::FloatingWall.bit()
                | ShapeCategory::Projectile.bit()
                | ShapeCategory::Drone.bit(),
        };
        self.create_explosion(idx, None, &explosion);

        let drone = &mut self.drones[idx];
        drone.charging_burst = false;
        drone.burst_charge = 0.0;
        drone.burst_cooldown = DRONE_BURST_COOLDOWN;
        if drone.energy_left == 0.0 {
            drone.energy_fully_depleted_this_step = true;
            drone.energy_refill_wait = DRONE_ENERGY_REFILL_EMPTY_WAIT;
        } else {
            drone.energy_refill_wait = DRONE_ENERGY_REFILL_WAIT;
        }
        self.stats[idx].total_bursts += 1.0;
    }

    /// Refill energy, or feed the burst charge while one is charging.
    pub(crate) fn drone_add_energy(&mut self, idx: usize, energy: f32) {
        let drone = &mut self.drones[idx];
        if drone.charging_burst {
            drone.burst_charge = clamp_unit(drone.burst_charge + energy);
        } else {
            drone.energy_left = clamp_unit(drone.energy_left + energy);
        }
    }

    /// Swap back to the default weapon for an energy fee. Ignored for the
    /// default weapon itself or with a dry tank.
    pub(crate) fn drone_discard_weapon(&mut self, idx: usize) {
        {
            let drone = &self.drones[idx];
            if drone.weapon == self.default_weapon
                || (drone.energy_fully_depleted && !drone.charging_burst)
            {
                return;
            }
        }

        let default_weapon = self.default_weapon;
        self.drone_change_weapon(idx, default_weapon);
        self.drone_add_energy(idx, -WEAPON_DISCARD_COST);

        let drone = &mut self.drones[idx];
        if drone.charging_burst {
            return;
        }
        if drone.energy_left == 0.0 {
            drone.energy_fully_depleted = true;
            drone.energy_fully_depleted_this_step = true;
            drone.energy_refill_wait = DRONE_ENERGY_REFILL_EMPTY_WAIT;
            self.stats[idx].energy_emptied += 1.0;
        } else {
            drone.energy_refill_wait = DRONE_ENERGY_REFILL_WAIT;
        }
    }

    /// Per-frame decay of cooldowns, charge, heat and energy.
    pub(crate) fn drone_step(&mut self, idx: usize) {
        let dt = self.delta_time();
        let drone = &mut self.drones[idx];

        if drone.weapon_cooldown != 0.0 {
            drone.weapon_cooldown = (drone.weapon_cooldown - dt).max(0.0);
        }
        if !drone.shot_this_step {
            drone.weapon_charge = (drone.weapon_charge - dt).max(0.0);
            drone.heat = drone.heat.saturating_sub(1);
        } else {
            drone.shot_this_step = false;
        }

        if drone.burst_cooldown != 0.0 {
            drone.burst_cooldown = (drone.burst_cooldown - dt).max(0.0);
        }
        if drone.energy_fully_depleted_this_step {
            drone.energy_fully_depleted_this_step = false;
        } else if drone.energy_refill_wait != 0.0 {
            drone.energy_refill_wait = (drone.energy_refill_wait - dt).max(0.0);
        } else if drone.energy_left != DRONE_ENERGY_MAX && !drone.charging_burst {
            // refills stay on hold until the stored burst charge is spent
            drone.energy_left =
                (drone.energy_left + DRONE_ENERGY_REFILL_RATE * dt).min(DRONE_ENERGY_MAX);
        }
        if drone.energy_left == DRONE_ENERGY_MAX {
            drone.energy_fully_depleted = false;
        }

        let distance = drone.last_pos.distance(drone.position);
        self.stats[idx].distance_traveled += distance;
    }
}
