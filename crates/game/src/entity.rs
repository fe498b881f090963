//! Walls and weapon pickups: records, physics bodies, and lifecycle.

use engine_core::{EntityHandle, EntityKind, Vec2};
use log::debug;
use physics::{BodyDef, ColliderHandle, RigidBodyHandle, ShapeCategory, ShapeDef};

use crate::env::Env;
use crate::map::pos_to_cell_index;
use crate::weapons::{WeaponKind, NUM_WEAPONS};

pub const FLOATING_WALL_DAMPING: f32 = 0.75;
pub const STANDARD_WALL_RESTITUTION: f32 = 0.01;
pub const STANDARD_WALL_FRICTION: f32 = 0.3;
pub const BOUNCY_WALL_RESTITUTION: f32 = 1.0;
pub const WALL_DENSITY: f32 = 4.0;

pub const PICKUP_THICKNESS: f32 = 3.0;
pub const PICKUP_RESPAWN_WAIT: f32 = 3.0;
/// Pickups cycle faster once the arena starts closing in.
pub const SUDDEN_DEATH_PICKUP_RESPAWN_WAIT: f32 = 2.0;

/// A static or floating wall segment.
#[derive(Debug)]
pub struct Wall {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub position: Vec2,
    pub rotation: f32,
    pub velocity: Vec2,
    pub half_extents: Vec2,
    pub cell_index: Option<usize>,
    pub floating: bool,
    pub kind: EntityKind,
    pub sudden_death: bool,
}

/// A weapon pickup sensor. While waiting to respawn its body is destroyed
/// (`body == None`) so it produces no sensor churn.
#[derive(Debug)]
pub struct WeaponPickup {
    pub body: Option<RigidBodyHandle>,
    pub collider: Option<ColliderHandle>,
    pub weapon: WeaponKind,
    pub position: Vec2,
    pub cell_index: usize,
    pub respawn_wait: f32,
    pub floating_walls_touching: u8,
}

impl Env {
    /// Create a wall body and record; static walls are appended to the wall
    /// list, floating walls go into their arena. The caller registers static
    /// walls as cell occupants.
    pub(crate) fn create_wall(
        &mut self,
        position: Vec2,
        half_extents: Vec2,
        kind: EntityKind,
        floating: bool,
    ) -> EntityHandle {
        assert!(kind.is_wall(), "create_wall with non-wall kind {kind:?}");

        let body = self.physics.add_body(&BodyDef {
            position,
            dynamic: floating,
            linear_damping: if floating { FLOATING_WALL_DAMPING } else { 0.0 },
            angular_damping: if floating { FLOATING_WALL_DAMPING } else { 0.0 },
            start_asleep: floating,
            ..Default::default()
        });

        let mut shape = ShapeDef {
            density: WALL_DENSITY,
            restitution: STANDARD_WALL_RESTITUTION,
            friction: STANDARD_WALL_FRICTION,
            category: ShapeCategory::Wall.bit(),
            mask: ShapeCategory::FloatingWall.bit()
                | ShapeCategory::Projectile.bit()
                | ShapeCategory::Drone.bit(),
            ..Default::default()
        };
        if floating {
            shape.category = ShapeCategory::FloatingWall.bit();
            shape.mask |= ShapeCategory::Wall.bit() | ShapeCategory::WeaponPickup.bit();
        }
        match kind {
            EntityKind::BouncyWall => {
                shape.restitution = BOUNCY_WALL_RESTITUTION;
                shape.friction = 0.0;
                shape.max_restitution = true;
            }
            EntityKind::DeathWall => shape.contact_events = true,
            _ => {}
        }

        let wall = Wall {
            body,
            collider: ColliderHandle::invalid(),
            position,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            half_extents,
            cell_index: pos_to_cell_index(self.columns, self.rows, position),
            floating,
            kind,
            sudden_death: self.sudden_death_walls_placed,
        };

        let handle = if floating {
            let (index, generation) = self.floating_walls.insert(wall);
            EntityHandle::new(kind, index, generation).with_floating(true)
        } else {
            let index = self.walls.len() as u32;
            self.walls.push(wall);
            EntityHandle::fixed(kind, index)
        };

        shape.user_data = handle.pack();
        let collider = self.physics.add_box_shape(body, half_extents, &shape);
        if floating {
            self.floating_walls.at_mut(handle.index).unwrap().collider = collider;
        } else {
            self.walls[handle.index as usize].collider = collider;
        }

        handle
    }

    /// Remove a floating wall and its body.
    pub(crate) fn destroy_floating_wall(&mut self, index: u32, generation: u32) {
        if let Some(wall) = self.floating_walls.remove(index, generation) {
            self.physics.remove_body(wall.body);
        }
    }

    /// Create a pickup on the next spawn quadrant in rotation. Placement
    /// failure at setup is fatal.
    pub(crate) fn create_weapon_pickup(&mut self) {
        self.last_spawn_quad = (self.last_spawn_quad + 1) % 4;
        let quad = self.last_spawn_quad;
        let position = self
            .find_open_pos(ShapeCategory::WeaponPickup, quad)
            .unwrap_or_else(|err| panic!("no open position for weapon pickup: {err}"));
        let weapon = self.random_pickup_kind();
        let cell_index = pos_to_cell_index(self.columns, self.rows, position)
            .unwrap_or_else(|| panic!("invalid position for weapon pickup spawn: {position:?}"));

        let (index, generation) = self.pickups.insert(WeaponPickup {
            body: None,
            collider: None,
            weapon,
            position,
            cell_index,
            respawn_wait: 0.0,
            floating_walls_touching: 0,
        });
        let handle = EntityHandle::new(EntityKind::Pickup, index, generation);
        self.create_pickup_body(index, handle);
        self.cells[cell_index].occupant = Some(handle);
    }

    pub(crate) fn create_pickup_body(&mut self, index: u32, handle: EntityHandle) {
        let position = self.pickups.at(index).unwrap().position;
        let body = self.physics.add_body(&BodyDef {
            position,
            ..Default::default()
        });
        let collider = self.physics.add_box_shape(
            body,
            Vec2::splat(PICKUP_THICKNESS / 2.0),
            &ShapeDef {
                density: 0.0,
                sensor: true,
                category: ShapeCategory::WeaponPickup.bit(),
                mask: ShapeCategory::FloatingWall.bit() | ShapeCategory::Drone.bit(),
                user_data: handle.pack(),
                ..Default::default()
            },
        );
        let pickup = self.pickups.at_mut(index).unwrap();
        pickup.body = Some(body);
        pickup.collider = Some(collider);
    }

    /// Take a pickup out of play until its respawn timer elapses.
    pub(crate) fn disable_weapon_pickup(&mut self, index: u32) {
        let wait = if self.sudden_death_walls_placed {
            SUDDEN_DEATH_PICKUP_RESPAWN_WAIT
        } else {
            PICKUP_RESPAWN_WAIT
        };
        let pickup = self.pickups.at_mut(index).unwrap();
        pickup.respawn_wait = wait;
        let body = pickup.body.take();
        pickup.collider = None;
        let cell_index = pickup.cell_index;
        let weapon = pickup.weapon;
        debug!(
            "disabling weapon pickup at cell {cell_index} ({:?})",
            pickup.position
        );

        // destroy the body to avoid sensor overlap churn while latent
        if let Some(body) = body {
            self.physics.remove_body(body);
        }
        self.cells[cell_index].occupant = None;
        self.spawned_weapon_pickups[weapon.index()] -= 1;
    }

    /// Tick respawn timers; pickups whose timer elapses are re-placed on a
    /// random open cell with a re-rolled weapon, or retired when the map has
    /// no room left.
    pub(crate) fn weapon_pickups_step(&mut self, dt: f32) {
        let mut ready = Vec::new();
        for index in 0..self.pickups.slot_count() {
            let Some(pickup) = self.pickups.at_mut(index) else {
                continue;
            };
            if pickup.respawn_wait == 0.0 {
                continue;
            }
            pickup.respawn_wait = (pickup.respawn_wait - dt).max(0.0);
            if pickup.respawn_wait == 0.0 {
                ready.push(index);
            }
        }

        for index in ready {
            match self.find_open_pos(ShapeCategory::WeaponPickup, -1) {
                Err(err) => {
                    debug!("retiring weapon pickup: {err}");
                    let generation = self.pickups.generation(index).unwrap();
                    self.pickups.remove(index, generation);
                }
                Ok(position) => {
                    let weapon = self.random_pickup_kind();
                    let cell_index = pos_to_cell_index(self.columns, self.rows, position)
                        .unwrap_or_else(|| {
                            panic!("invalid position for weapon pickup respawn: {position:?}")
                        });
                    debug!("respawning weapon pickup at cell {cell_index} ({position:?})");
                    let generation = self.pickups.generation(index).unwrap();
                    {
                        let pickup = self.pickups.at_mut(index).unwrap();
                        pickup.position = position;
                        pickup.weapon = weapon;
                        pickup.cell_index = cell_index;
                        pickup.floating_walls_touching = 0;
                    }
                    let handle = EntityHandle::new(EntityKind::Pickup, index, generation);
                    self.create_pickup_body(index, handle);
                    self.cells[cell_index].occupant = Some(handle);
                }
            }
        }
    }

    /// Weighted weapon roll for a new pickup. Weights shrink as more
    /// pickups of the same weapon are already on the map; the map default
    /// (and the standard weapon) never spawn.
    pub(crate) fn random_pickup_kind(&mut self) -> WeaponKind {
        let mut weights = [0.0f32; NUM_WEAPONS];
        let mut total = 0.0;
        for kind in WeaponKind::ALL {
            if kind == WeaponKind::Standard || kind == self.default_weapon {
                continue;
            }
            let weight = kind.info().spawn_weight
                / ((self.spawned_weapon_pickups[kind.index()] as f32 + 1.0) * 2.0);
            weights[kind.index()] = weight;
            total += weight;
        }

        let pick = self.rng.random_f32(0.0, total);
        let mut cumulative = 0.0;
        let mut chosen = None;
        for kind in WeaponKind::ALL {
            let weight = weights[kind.index()];
            if weight == 0.0 {
                continue;
            }
            cumulative += weight;
            chosen = Some(kind);
            if pick < cumulative {
                break;
            }
        }
        let kind = chosen.expect("no weapon eligible for pickup spawn");
        self.spawned_weapon_pickups[kind.index()] += 1;
        kind
    }

    /// A drone grabs the pickup; an overlapping floating wall blocks
    /// acquisition until it drifts off.
    pub(crate) fn handle_pickup_begin_touch(
        &mut self,
        index: u32,
        generation: u32,
        visitor: EntityHandle,
    ) {
        let Some(pickup) = self.pickups.get(index, generation) else {
            return;
        };
        match visitor.kind {
            EntityKind::Drone => {
                if pickup.floating_walls_touching != 0 {
                    return;
                }
                let weapon = pickup.weapon;
                self.disable_weapon_pickup(index);

                let drone_idx = visitor.index as usize;
                {
                    let drone = &mut self.drones[drone_idx];
                    drone.step_info.picked_up_weapon = true;
                    drone.step_info.prev_weapon = Some(drone.weapon);
                }
                self.drone_change_weapon(drone_idx, weapon);
                self.stats[drone_idx].weapons_picked_up[weapon.index()] += 1.0;
                debug!("drone {drone_idx} picked up weapon {weapon:?}");
            }
            kind if kind.is_wall() => {
                if visitor.floating {
                    let pickup = self.pickups.at_mut(index).unwrap();
                    pickup.floating_walls_touching += 1;
                }
            }
            other => log::warn!("unexpected pickup sensor visitor {other:?}"),
        }
    }

    pub(crate) fn handle_pickup_end_touch(
        &mut self,
        index: u32,
        generation: u32,
        visitor: EntityHandle,
    ) {
        let Some(pickup) = self.pickups.get_mut(index, generation) else {
            return;
        };
        if pickup.respawn_wait != 0.0 {
            return;
        }
        if visitor.kind.is_wall() && visitor.floating {
            pickup.floating_walls_touching = pickup.floating_walls_touching.saturating_sub(1);
        }
    }

    /// True when a box of the given half extent around `pos` overlaps any
    /// collider matching the mask (optionally narrowed to one entity kind).
    pub(crate) fn is_overlapping_aabb(
        &self,
        pos: Vec2,
        half_extent: f32,
        category: u32,
        mask: u32,
        kind: Option<EntityKind>,
    ) -> bool {
        let mut overlaps = false;
        self.physics
            .overlap_aabb(pos, half_extent, category, mask, |_, user_data| {
                match (kind, EntityHandle::unpack(user_data)) {
                    (None, _) => {
                        overlaps = true;
                        false
                    }
                    (Some(want), Some(handle)) if handle.kind == want => {
                        overlaps = true;
                        false
                    }
                    _ => true,
                }
            });
        overlaps
    }

    /// Circle variant of [`Self::is_overlapping_aabb`].
    pub(crate) fn is_overlapping_circle(
        &self,
        pos: Vec2,
        radius: f32,
        category: u32,
        mask: u32,
        kind: Option<EntityKind>,
    ) -> bool {
        let mut overlaps = false;
        self.physics
            .overlap_circle(pos, radius, category, mask, |_, user_data| {
                match (kind, EntityHandle::unpack(user_data)) {
                    (None, _) => {
                        overlaps = true;
                        false
                    }
                    (Some(want), Some(handle)) if handle.kind == want => {
                        overlaps = true;
                        false
                    }
                    _ => true,
                }
            });
        overlaps
    }
}
