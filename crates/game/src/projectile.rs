//! Projectiles: creation, travel, bouncing, mines, and explosions.

use engine_core::{clamp_unit, EntityHandle, EntityKind, Vec2};
use log::debug;
use physics::{BodyDef, ColliderHandle, RigidBodyHandle, ShapeCategory, ShapeDef};

use crate::drone::DRONE_MOVE_AIM_DIVISOR;
use crate::env::Env;
use crate::map::pos_to_cell_index;
use crate::weapons::{
    self, WeaponKind, ACCELERATOR_BOUNCE_SPEED_COEF, ACCELERATOR_MAX_SPEED,
    FLAK_CANNON_SAFE_DISTANCE,
};

#[derive(Debug)]
pub struct Projectile {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    /// Proximity sensor, for weapons that detonate near drones.
    pub sensor: Option<ColliderHandle>,
    pub weapon: WeaponKind,
    /// Owning drone; stays valid even after that drone dies.
    pub drone_idx: u8,
    pub position: Vec2,
    pub last_pos: Vec2,
    pub velocity: Vec2,
    pub speed: f32,
    pub last_speed: f32,
    pub distance_traveled: f32,
    pub bounces: u8,
    pub in_contact: bool,
    /// Mine welded to a wall, armed.
    pub set_mine: bool,
    pub cell_index: Option<usize>,
}

/// One radial impulse event: a weapon detonation or a drone burst.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExplosionDef {
    pub position: Vec2,
    pub radius: f32,
    pub falloff: f32,
    /// Negative pulls bodies toward the center.
    pub impulse_per_length: f32,
    pub mask: u32,
}

fn left_perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

impl Env {
    /// Launch one projectile from a drone along `norm_aim`, inheriting a
    /// share of the drone's lateral velocity.
    pub(crate) fn create_projectile(&mut self, drone_idx: usize, norm_aim: Vec2) {
        let (drone_pos, drone_vel, weapon, heat) = {
            let drone = &self.drones[drone_idx];
            (drone.position, drone.velocity, drone.weapon, drone.heat)
        };
        let info = weapon.info();

        let position = drone_pos + (1.0 + info.radius * 1.5) * norm_aim;
        let body = self.physics.add_body(&BodyDef {
            position,
            dynamic: true,
            fixed_rotation: true,
            bullet: info.is_physics_bullet,
            linear_damping: info.damping,
            can_sleep: info.can_sleep,
            ..Default::default()
        });

        let (index, generation) = self.projectiles.insert(Projectile {
            body,
            collider: ColliderHandle::invalid(),
            sensor: None,
            weapon,
            drone_idx: drone_idx as u8,
            position,
            last_pos: position,
            velocity: Vec2::ZERO,
            speed: 0.0,
            last_speed: 0.0,
            distance_traveled: 0.0,
            bounces: 0,
            in_contact: false,
            set_mine: false,
            cell_index: pos_to_cell_index(self.columns, self.rows, position),
        });
        let handle = EntityHandle::new(EntityKind::Projectile, index, generation);

        let collider = self.physics.add_circle_shape(
            body,
            info.radius,
            &ShapeDef {
                density: info.density,
                restitution: 1.0,
                friction: 0.0,
                max_restitution: true,
                category: ShapeCategory::Projectile.bit(),
                mask: ShapeCategory::Wall.bit()
                    | ShapeCategory::FloatingWall.bit()
                    | ShapeCategory::Projectile.bit()
                    | ShapeCategory::Drone.bit(),
                contact_events: true,
                user_data: handle.pack(),
                ..Default::default()
            },
        );

        // carry the drone's sideways motion into the shot, then launch
        let forward = norm_aim * drone_vel.dot(norm_aim);
        let lateral = (drone_vel - forward) * (info.density / DRONE_MOVE_AIM_DIVISOR);
        let aim = weapons::adjust_aim(&mut self.rng, weapon, heat, norm_aim);
        let fire = lateral + weapons::fire_magnitude(&mut self.rng, weapon) * aim;
        self.physics.apply_impulse(body, fire);

        let velocity = self.physics.body_velocity(body);
        {
            let projectile = self.projectiles.at_mut(index).unwrap();
            projectile.collider = collider;
            projectile.velocity = velocity;
            projectile.speed = velocity.length();
            projectile.last_speed = projectile.speed;
        }

        if info.proximity_detonates {
            let sensor = self.physics.add_circle_shape(
                body,
                weapons::proximity_radius(weapon),
                &ShapeDef {
                    density: 0.0,
                    sensor: true,
                    category: ShapeCategory::Projectile.bit(),
                    mask: ShapeCategory::Drone.bit(),
                    user_data: handle.pack(),
                    ..Default::default()
                },
            );
            self.projectiles.at_mut(index).unwrap().sensor = Some(sensor);
        }
    }

    /// Accumulate travel distances and expire projectiles that have used up
    /// their range.
    pub(crate) fn projectiles_step(&mut self) {
        for index in 0..self.projectiles.slot_count() {
            let Some(projectile) = self.projectiles.at(index) else {
                continue;
            };
            let generation = self.projectiles.generation(index).unwrap();
            let max_distance = projectile.weapon.info().max_distance;
            let step = projectile.last_pos.distance(projectile.position);

            let projectile = self.projectiles.at_mut(index).unwrap();
            projectile.distance_traveled += step;
            if projectile.distance_traveled >= max_distance {
                self.destroy_projectile(index, generation, true);
            }
        }
    }

    /// Destroy a projectile; explosive ones detonate first when
    /// `process_explosion` is set.
    pub(crate) fn destroy_projectile(&mut self, index: u32, generation: u32, process_explosion: bool) {
        let Some(projectile) = self.projectiles.get(index, generation) else {
            return;
        };
        if process_explosion && projectile.weapon.info().explosive {
            self.explode_projectile_chain(index, generation);
        } else {
            self.remove_projectile(index, generation);
        }
    }

    fn remove_projectile(&mut self, index: u32, generation: u32) {
        if let Some(projectile) = self.projectiles.remove(index, generation) {
            self.physics.remove_body(projectile.body);
            self.stats[projectile.drone_idx as usize].shot_distances
                [projectile.weapon.index()] += projectile.distance_traveled;
        }
    }

    /// Detonate a projectile and every mine its blast (transitively)
    /// reaches. The chain runs as a work queue; each member detonates and
    /// is destroyed exactly once, the initiator last.
    fn explode_projectile_chain(&mut self, index: u32, generation: u32) {
        self.exploding_projectiles.clear();
        self.exploding_projectiles.push((index, generation));

        let mut next = 0;
        while next < self.exploding_projectiles.len() {
            let (i, g) = self.exploding_projectiles[next];
            next += 1;
            let Some(projectile) = self.projectiles.get(i, g) else {
                continue;
            };
            let weapon = projectile.weapon;
            let owner = projectile.drone_idx as usize;
            let position = projectile.position;

            let params = weapons::explosion_params(weapon);
            let def = ExplosionDef {
                position,
                radius: params.radius,
                falloff: params.falloff,
                impulse_per_length: params.impulse_per_length,
                mask: ShapeCategory::FloatingWall.bit()
                    | ShapeCategory::Projectile.bit()
                    | ShapeCategory::Drone.bit(),
            };
            self.create_explosion(owner, Some(weapon), &def);
        }

        let queued = std::mem::take(&mut self.exploding_projectiles);
        for &(i, g) in queued.iter().skip(1) {
            self.remove_projectile(i, g);
        }
        let (i, g) = queued[0];
        self.remove_projectile(i, g);
    }

    /// Apply a radial impulse to everything the blast reaches. `weapon` is
    /// `None` for drone bursts, which push static walls back onto the
    /// bursting drone and never hurt it.
    pub(crate) fn create_explosion(
        &mut self,
        parent_idx: usize,
        weapon: Option<WeaponKind>,
        def: &ExplosionDef,
    ) {
        let full_radius = def.radius + def.falloff;
        let mut hits: Vec<(ColliderHandle, EntityHandle)> = Vec::new();
        self.physics.overlap_aabb(
            def.position,
            full_radius,
            ShapeCategory::Projectile.bit(),
            def.mask,
            |collider, user_data| {
                if let Some(handle) = EntityHandle::unpack(user_data) {
                    hits.push((collider, handle));
                }
                true
            },
        );

        let parent_last_speed = self.drones[parent_idx].last_velocity.length();
        for (collider, handle) in hits {
            self.explosion_impact(parent_idx, weapon, parent_last_speed, def, collider, handle);
        }
    }

    fn explosion_impact(
        &mut self,
        parent_idx: usize,
        weapon: Option<WeaponKind>,
        parent_last_speed: f32,
        def: &ExplosionDef,
        collider: ColliderHandle,
        handle: EntityHandle,
    ) {
        // an earlier impact in this blast may have destroyed the shape
        if self.physics.collider_user_data(collider).is_none() {
            return;
        }
        let is_burst = weapon.is_none();

        let mut is_static_wall = false;
        let mut is_floating_wall = false;
        match handle.kind {
            EntityKind::Drone => {
                let victim = handle.index as usize;
                if victim == parent_idx {
                    if is_burst {
                        return;
                    }
                    let kind = weapon.unwrap();
                    self.drones[victim].step_info.own_shot_taken = true;
                    self.stats[victim].own_shots_taken[kind.index()] += 1.0;
                    debug!("drone {victim} hit itself with a {kind:?} explosion");
                }
                self.drones[parent_idx].step_info.explosion_hit[victim] = true;
                if is_burst {
                    self.stats[parent_idx].bursts_hit += 1.0;
                    debug!("drone {parent_idx} hit drone {victim} with a burst");
                } else {
                    let kind = weapon.unwrap();
                    self.stats[parent_idx].shots_hit[kind.index()] += 1.0;
                    debug!("drone {parent_idx} hit drone {victim} with a {kind:?} explosion");
                }
                self.drones[victim].step_info.explosion_taken[parent_idx] = true;
            }
            kind if kind.is_wall() => {
                is_static_wall = !handle.floating;
                is_floating_wall = handle.floating;
            }
            _ => {}
        }
        // weapon explosions never move static walls; bursts use them as a
        // surface to push the bursting drone off of
        if !is_burst && is_static_wall {
            return;
        }

        let (distance, witness) = self.physics.closest_point(collider, def.position);
        if distance > def.radius + def.falloff || (is_static_wall && distance > def.radius) {
            return;
        }

        let direction = if is_static_wall {
            (def.position - witness).normalize_or_zero()
        } else {
            (witness - def.position).normalize_or_zero()
        };
        let perimeter = self.physics.projected_extent(collider, left_perp(direction));
        let mut scale = 1.0;
        // no falloff for projectiles, they'd slow to a crawl
        if distance > def.radius && handle.kind != EntityKind::Projectile {
            scale = clamp_unit((def.radius + def.falloff - distance) / def.falloff);
        }

        let mut magnitude = (def.impulse_per_length + parent_last_speed) * perimeter * scale;
        if is_static_wall {
            // soften the pushback a drone gets off a wall
            magnitude = magnitude.log2() * 7.5;
        }
        let impulse = direction * magnitude;

        if is_static_wall {
            let body = self.drones[parent_idx].body;
            self.physics.apply_impulse(body, impulse);
            return;
        }

        let Some(body) = self.physics.collider_body(collider) else {
            return;
        };
        self.physics.apply_impulse(body, impulse);

        match handle.kind {
            kind if kind.is_wall() => {
                if is_floating_wall {
                    // floating walls are the only bodies that can spin
                    self.physics.apply_angular_impulse(body, magnitude);
                    if let Some(wall) = self.floating_walls.get_mut(handle.index, handle.generation)
                    {
                        wall.velocity = self.physics.body_velocity(body);
                    }
                }
            }
            EntityKind::Projectile => {
                let key = (handle.index, handle.generation);
                let caught = self.projectiles.get(handle.index, handle.generation);
                let Some(caught) = caught else { return };
                // a mine caught in a concussive blast goes off too, once
                if caught.weapon == WeaponKind::MineLauncher && def.impulse_per_length > 0.0 {
                    if !self.exploding_projectiles.contains(&key) {
                        self.exploding_projectiles.push(key);
                    }
                    return;
                }
                let velocity = self.physics.body_velocity(body);
                let projectile = self.projectiles.get_mut(handle.index, handle.generation).unwrap();
                projectile.velocity = velocity;
                projectile.last_speed = projectile.speed;
                projectile.speed = velocity.length();
            }
            EntityKind::Drone => {
                let velocity = self.physics.body_velocity(body);
                let drone = &mut self.drones[handle.index as usize];
                drone.last_velocity = drone.velocity;
                drone.velocity = velocity;
            }
            _ => {}
        }
    }

    /// A projectile began touching something solid.
    pub(crate) fn handle_projectile_begin_contact(
        &mut self,
        proj: EntityHandle,
        other: Option<EntityHandle>,
        proj_collider: ColliderHandle,
        other_collider: ColliderHandle,
    ) {
        let (index, generation) = (proj.index, proj.generation);
        let weapon;
        let speed;
        let position;
        {
            let Some(projectile) = self.projectiles.get_mut(index, generation) else {
                return;
            };
            projectile.in_contact = true;
            weapon = projectile.weapon;
            speed = projectile.speed;
            position = projectile.position;
        }

        let other = match other {
            // the other shape is a projectile (possibly already destroyed
            // this frame): mines detonate, everything else keeps bouncing
            None => {
                if weapon == WeaponKind::MineLauncher {
                    self.destroy_projectile(index, generation, true);
                }
                return;
            }
            Some(o) if o.kind == EntityKind::Projectile => {
                if weapon == WeaponKind::MineLauncher {
                    self.destroy_projectile(index, generation, true);
                }
                return;
            }
            // bouncy walls don't consume the bounce budget
            Some(o) if o.kind == EntityKind::BouncyWall => return,
            Some(o) => o,
        };

        {
            let projectile = self.projectiles.get_mut(index, generation).unwrap();
            projectile.bounces += 1;
        }

        if other.kind == EntityKind::Drone {
            let hit_idx = other.index as usize;
            let shooter_idx = self.projectiles.get(index, generation).unwrap().drone_idx as usize;
            if shooter_idx != hit_idx {
                self.drone_add_energy(shooter_idx, weapon.info().energy_refill);
                // weapon kind + 1, so 0 can mean "no hit"
                self.drones[shooter_idx].step_info.shot_hit[hit_idx] = weapon as u8 + 1;
                self.stats[shooter_idx].shots_hit[weapon.index()] += 1.0;
                debug!("drone {shooter_idx} hit drone {hit_idx} with {weapon:?}");
                self.drones[hit_idx].step_info.shot_taken[shooter_idx] = weapon as u8 + 1;
                self.stats[hit_idx].shots_taken[weapon.index()] += 1.0;
            } else {
                self.drones[hit_idx].step_info.own_shot_taken = true;
                self.stats[hit_idx].own_shots_taken[weapon.index()] += 1.0;
                debug!("drone {hit_idx} hit by its own {weapon:?}");
            }

            if weapon.info().destroyed_on_drone_hit {
                self.destroy_projectile(index, generation, weapon.info().explodes_on_drone_hit);
                return;
            }
        } else if weapon == WeaponKind::MineLauncher && speed != 0.0 {
            // a moving mine hit a wall: detonate if a drone is already in
            // range, otherwise arm it and weld it in place
            if self.is_overlapping_circle(
                position,
                weapons::proximity_radius(WeaponKind::MineLauncher),
                ShapeCategory::Projectile.bit(),
                ShapeCategory::Drone.bit(),
                None,
            ) {
                self.destroy_projectile(index, generation, true);
                return;
            }

            debug_assert!(other.kind.is_wall());
            if let Some(wall_body) = self.physics.collider_body(other_collider) {
                let world_point = self
                    .physics
                    .contact_point(proj_collider, other_collider)
                    .unwrap_or(position);
                let body = self.projectiles.get(index, generation).unwrap().body;
                // let mines on floating walls rotate with their wall
                self.physics.set_rotation_locked(body, false);
                self.physics.weld_bodies(body, wall_body, world_point);
                self.projectiles.get_mut(index, generation).unwrap().set_mine = true;
            }
        }

        let max_bounces = weapon.info().max_bounces;
        if max_bounces != 0 {
            if let Some(projectile) = self.projectiles.get(index, generation) {
                if projectile.bounces == max_bounces {
                    self.destroy_projectile(index, generation, true);
                }
            }
        }
    }

    /// A projectile stopped touching something: restore its pre-bounce
    /// speed so bounces don't bleed energy (the accelerator gains some
    /// instead).
    pub(crate) fn handle_projectile_end_contact(
        &mut self,
        proj: EntityHandle,
        other: Option<EntityHandle>,
    ) {
        let (index, generation) = (proj.index, proj.generation);
        let (weapon, last_speed, body);
        {
            let Some(projectile) = self.projectiles.get_mut(index, generation) else {
                return;
            };
            projectile.in_contact = false;
            weapon = projectile.weapon;
            last_speed = projectile.last_speed;
            body = projectile.body;
        }

        if let Some(other) = other {
            if other.kind == EntityKind::Projectile {
                let other_weapon = self
                    .projectiles
                    .get(other.index, other.generation)
                    .map(|p| p.weapon);
                // projectiles of different weapons trade momentum for real
                if other_weapon.is_some() && other_weapon != Some(weapon) {
                    let velocity = self.physics.body_velocity(body);
                    let projectile = self.projectiles.get_mut(index, generation).unwrap();
                    projectile.velocity = velocity;
                    projectile.speed = velocity.length();
                    projectile.last_speed = projectile.speed;
                    return;
                }
            }
        }

        let mut speed = last_speed;
        if weapon == WeaponKind::Accelerator {
            speed = (last_speed * ACCELERATOR_BOUNCE_SPEED_COEF).min(ACCELERATOR_MAX_SPEED);
        }

        let velocity = self.physics.body_velocity(body);
        let new_velocity = velocity.normalize_or_zero() * speed;
        self.physics.set_body_velocity(body, new_velocity);
        let projectile = self.projectiles.get_mut(index, generation).unwrap();
        projectile.velocity = new_velocity;
        projectile.speed = new_velocity.length();
        projectile.last_speed = speed;
    }

    /// A drone entered a projectile's proximity sensor.
    pub(crate) fn handle_projectile_sensor_begin(&mut self, proj: EntityHandle) {
        let (index, generation) = (proj.index, proj.generation);
        let Some(projectile) = self.projectiles.get(index, generation) else {
            return;
        };
        match projectile.weapon {
            WeaponKind::FlakCannon => {
                if projectile.distance_traveled < FLAK_CANNON_SAFE_DISTANCE {
                    return;
                }
                self.destroy_projectile(index, generation, true);
            }
            WeaponKind::MineLauncher => {
                if !projectile.set_mine {
                    return;
                }
                self.destroy_projectile(index, generation, true);
            }
            WeaponKind::BlackHole => {
                self.destroy_projectile(index, generation, true);
            }
            other => unreachable!("projectile {other:?} has no proximity sensor"),
        }
    }
}
