//! Physics world management with Rapier2D.

use std::num::NonZeroUsize;

use engine_core::Vec2;
use rapier2d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier2d::parry::query::PointQuery;
use rapier2d::prelude::*;

use crate::collision::{groups_pass, interaction_groups};
use crate::events::{EventCollector, PhysicsEvents};

/// How a body is created.
#[derive(Debug, Clone, Copy)]
pub struct BodyDef {
    pub position: Vec2,
    pub dynamic: bool,
    pub fixed_rotation: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Enable continuous collision detection for fast movers.
    pub bullet: bool,
    pub can_sleep: bool,
    pub start_asleep: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            dynamic: false,
            fixed_rotation: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            bullet: false,
            can_sleep: true,
            start_asleep: false,
        }
    }
}

/// How a collider is created.
#[derive(Debug, Clone, Copy)]
pub struct ShapeDef {
    pub density: f32,
    pub restitution: f32,
    pub friction: f32,
    /// Resolve restitution with the max of the two shapes, the way Box2D
    /// mixes it; bouncy surfaces stay bouncy against dull ones.
    pub max_restitution: bool,
    pub category: u32,
    pub mask: u32,
    pub sensor: bool,
    pub contact_events: bool,
    pub user_data: u128,
}

impl Default for ShapeDef {
    fn default() -> Self {
        Self {
            density: 1.0,
            restitution: 0.0,
            friction: 0.6,
            max_restitution: false,
            category: u32::MAX,
            mask: u32::MAX,
            sensor: false,
            contact_events: false,
            user_data: 0,
        }
    }
}

/// Main physics world containing all simulation state.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    events: EventCollector,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    /// Create a new world. The arena is top-down, so gravity is zero.
    pub fn new() -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vector![0.0, 0.0],
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            events: EventCollector::default(),
        }
    }

    /// Advance the world by `dt`, with `substeps` solver iterations.
    pub fn step(&mut self, dt: f32, substeps: u32) {
        self.integration_parameters.dt = dt;
        if let Some(iterations) = NonZeroUsize::new(substeps as usize) {
            self.integration_parameters.num_solver_iterations = iterations;
        }
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &self.events,
        );
    }

    /// Drain the collision events produced by the last `step`.
    pub fn drain_events(&self) -> PhysicsEvents {
        self.events.drain(&self.collider_set)
    }

    /// Create a body from a [`BodyDef`] and return its handle.
    pub fn add_body(&mut self, def: &BodyDef) -> RigidBodyHandle {
        let mut builder = if def.dynamic {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::fixed()
        };
        builder = builder
            .translation(vector![def.position.x, def.position.y])
            .linear_damping(def.linear_damping)
            .angular_damping(def.angular_damping)
            .ccd_enabled(def.bullet)
            .can_sleep(def.can_sleep)
            .sleeping(def.start_asleep);
        if def.fixed_rotation {
            builder = builder.lock_rotations();
        }
        self.rigid_body_set.insert(builder)
    }

    /// Attach a circle collider to a body.
    pub fn add_circle_shape(
        &mut self,
        body: RigidBodyHandle,
        radius: f32,
        def: &ShapeDef,
    ) -> ColliderHandle {
        let builder = ColliderBuilder::ball(radius);
        self.add_shape(body, builder, def)
    }

    /// Attach a box collider (given half extents) to a body.
    pub fn add_box_shape(
        &mut self,
        body: RigidBodyHandle,
        half_extents: Vec2,
        def: &ShapeDef,
    ) -> ColliderHandle {
        let builder = ColliderBuilder::cuboid(half_extents.x, half_extents.y);
        self.add_shape(body, builder, def)
    }

    fn add_shape(
        &mut self,
        body: RigidBodyHandle,
        builder: ColliderBuilder,
        def: &ShapeDef,
    ) -> ColliderHandle {
        let mut builder = builder
            .density(def.density)
            .restitution(def.restitution)
            .friction(def.friction)
            .collision_groups(interaction_groups(def.category, def.mask))
            .sensor(def.sensor)
            .user_data(def.user_data);
        if def.max_restitution {
            builder = builder.restitution_combine_rule(CoefficientCombineRule::Max);
        }
        if def.contact_events || def.sensor {
            builder = builder.active_events(ActiveEvents::COLLISION_EVENTS);
        }
        self.collider_set
            .insert_with_parent(builder, body, &mut self.rigid_body_set)
    }

    /// Remove a body together with its colliders and joints.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    pub fn body_position(&self, handle: RigidBodyHandle) -> Vec2 {
        let pos = self.rigid_body_set[handle].translation();
        Vec2::new(pos.x, pos.y)
    }

    pub fn body_rotation(&self, handle: RigidBodyHandle) -> f32 {
        self.rigid_body_set[handle].rotation().angle()
    }

    pub fn body_velocity(&self, handle: RigidBodyHandle) -> Vec2 {
        let vel = self.rigid_body_set[handle].linvel();
        Vec2::new(vel.x, vel.y)
    }

    pub fn set_body_velocity(&mut self, handle: RigidBodyHandle, velocity: Vec2) {
        self.rigid_body_set[handle].set_linvel(vector![velocity.x, velocity.y], true);
    }

    pub fn set_linear_damping(&mut self, handle: RigidBodyHandle, damping: f32) {
        self.rigid_body_set[handle].set_linear_damping(damping);
    }

    pub fn set_body_enabled(&mut self, handle: RigidBodyHandle, enabled: bool) {
        self.rigid_body_set[handle].set_enabled(enabled);
    }

    pub fn set_rotation_locked(&mut self, handle: RigidBodyHandle, locked: bool) {
        self.rigid_body_set[handle].lock_rotations(locked, true);
    }

    /// Apply a force for the current step; cleared again by `clear_force`.
    pub fn apply_force(&mut self, handle: RigidBodyHandle, force: Vec2) {
        self.rigid_body_set[handle].add_force(vector![force.x, force.y], true);
    }

    pub fn clear_force(&mut self, handle: RigidBodyHandle) {
        self.rigid_body_set[handle].reset_forces(true);
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec2) {
        self.rigid_body_set[handle].apply_impulse(vector![impulse.x, impulse.y], true);
    }

    pub fn apply_angular_impulse(&mut self, handle: RigidBodyHandle, impulse: f32) {
        self.rigid_body_set[handle].apply_torque_impulse(impulse, true);
    }

    pub fn collider_user_data(&self, handle: ColliderHandle) -> Option<u128> {
        self.collider_set.get(handle).map(|c| c.user_data)
    }

    pub fn collider_body(&self, handle: ColliderHandle) -> Option<RigidBodyHandle> {
        self.collider_set.get(handle).and_then(|c| c.parent())
    }

    /// Visit every collider whose AABB intersects the square of half extent
    /// `half_extent` around `pos` and whose groups pass the category/mask
    /// test. The walk is in collider-set order, so it is deterministic.
    /// Return `false` from the visitor to stop early.
    pub fn overlap_aabb(
        &self,
        pos: Vec2,
        half_extent: f32,
        category: u32,
        mask: u32,
        mut visit: impl FnMut(ColliderHandle, u128) -> bool,
    ) {
        let query = interaction_groups(category, mask);
        let bounds = Aabb::new(
            point![pos.x - half_extent, pos.y - half_extent],
            point![pos.x + half_extent, pos.y + half_extent],
        );
        for (handle, collider) in self.collider_set.iter() {
            if !groups_pass(query, collider.collision_groups()) {
                continue;
            }
            if !collider.compute_aabb().intersects(&bounds) {
                continue;
            }
            if !visit(handle, collider.user_data) {
                return;
            }
        }
    }

    /// Visit every collider overlapping the circle at `pos`; same filter and
    /// ordering rules as [`Self::overlap_aabb`].
    pub fn overlap_circle(
        &self,
        pos: Vec2,
        radius: f32,
        category: u32,
        mask: u32,
        mut visit: impl FnMut(ColliderHandle, u128) -> bool,
    ) {
        let query = interaction_groups(category, mask);
        let center = point![pos.x, pos.y];
        for (handle, collider) in self.collider_set.iter() {
            if !groups_pass(query, collider.collision_groups()) {
                continue;
            }
            let projection = collider
                .shape()
                .project_point(collider.position(), &center, true);
            let distance = if projection.is_inside {
                0.0
            } else {
                (Vec2::new(projection.point.x, projection.point.y) - pos).length()
            };
            if distance > radius {
                continue;
            }
            if !visit(handle, collider.user_data) {
                return;
            }
        }
    }

    /// Distance from `point` to a collider's shape, with the closest point
    /// on the shape's surface. Distance is zero when `point` is inside.
    pub fn closest_point(&self, handle: ColliderHandle, point: Vec2) -> (f32, Vec2) {
        let collider = &self.collider_set[handle];
        let projection = collider
            .shape()
            .project_point(collider.position(), &point![point.x, point.y], true);
        let witness = Vec2::new(projection.point.x, projection.point.y);
        let distance = if projection.is_inside {
            0.0
        } else {
            (witness - point).length()
        };
        (distance, witness)
    }

    /// Extent of a collider's shape projected onto a world-space line
    /// direction; the "perimeter" an explosion pushes against.
    pub fn projected_extent(&self, handle: ColliderHandle, line: Vec2) -> f32 {
        let collider = &self.collider_set[handle];
        if let Some(ball) = collider.shape().as_ball() {
            return ball.radius * 2.0;
        }
        if let Some(cuboid) = collider.shape().as_cuboid() {
            let local = collider
                .position()
                .rotation
                .inverse_transform_vector(&vector![line.x, line.y]);
            let he = cuboid.half_extents;
            return 2.0 * (he.x * local.x.abs() + he.y * local.y.abs());
        }
        unreachable!("projected extent of unsupported shape");
    }

    /// World-space contact point between two touching colliders, if the
    /// narrow phase still tracks the pair.
    pub fn contact_point(&self, a: ColliderHandle, b: ColliderHandle) -> Option<Vec2> {
        let pair = self.narrow_phase.contact_pair(a, b)?;
        let manifold = pair.manifolds.first()?;
        let contact = manifold.points.first()?;
        let first = self.collider_set.get(pair.collider1)?;
        let world = first.position() * contact.local_p1;
        Some(Vec2::new(world.x, world.y))
    }

    /// Rigidly join two bodies at a shared world-space point (mine attach).
    pub fn weld_bodies(&mut self, a: RigidBodyHandle, b: RigidBodyHandle, world_point: Vec2) {
        let point = point![world_point.x, world_point.y];
        let anchor_a = self.rigid_body_set[a].position().inverse_transform_point(&point);
        let anchor_b = self.rigid_body_set[b].position().inverse_transform_point(&point);
        let joint = FixedJointBuilder::new()
            .local_anchor1(anchor_a)
            .local_anchor2(anchor_b);
        self.impulse_joint_set.insert(a, b, joint, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::ShapeCategory;

    fn dynamic_ball(world: &mut PhysicsWorld, pos: Vec2, user_data: u128) -> RigidBodyHandle {
        let body = world.add_body(&BodyDef {
            position: pos,
            dynamic: true,
            can_sleep: false,
            ..Default::default()
        });
        world.add_circle_shape(
            body,
            0.5,
            &ShapeDef {
                category: ShapeCategory::Drone.bit(),
                mask: u32::MAX,
                contact_events: true,
                user_data,
                ..Default::default()
            },
        );
        body
    }

    #[test]
    fn bodies_collide_and_report_contact_events() {
        let mut world = PhysicsWorld::new();
        let a = dynamic_ball(&mut world, Vec2::new(-3.0, 0.0), 1);
        let _b = dynamic_ball(&mut world, Vec2::new(3.0, 0.0), 2);
        world.set_body_velocity(a, Vec2::new(20.0, 0.0));

        let mut began = false;
        for _ in 0..120 {
            world.step(1.0 / 60.0, 4);
            let events = world.drain_events();
            if !events.contact_begin.is_empty() {
                began = true;
                break;
            }
        }
        assert!(began, "approaching bodies never began contact");
    }

    #[test]
    fn overlap_aabb_respects_masks() {
        let mut world = PhysicsWorld::new();
        dynamic_ball(&mut world, Vec2::ZERO, 7);

        let mut hits = Vec::new();
        world.overlap_aabb(
            Vec2::ZERO,
            2.0,
            ShapeCategory::Projectile.bit(),
            ShapeCategory::Drone.bit(),
            |_, user_data| {
                hits.push(user_data);
                true
            },
        );
        assert_eq!(hits, vec![7]);

        hits.clear();
        world.overlap_aabb(
            Vec2::ZERO,
            2.0,
            ShapeCategory::Projectile.bit(),
            ShapeCategory::Wall.bit(),
            |_, user_data| {
                hits.push(user_data);
                true
            },
        );
        assert!(hits.is_empty(), "mask excluding drones must not match one");
    }

    #[test]
    fn closest_point_and_projected_extent() {
        let mut world = PhysicsWorld::new();
        let body = world.add_body(&BodyDef::default());
        let collider = world.add_box_shape(
            body,
            Vec2::new(2.0, 1.0),
            &ShapeDef {
                category: ShapeCategory::Wall.bit(),
                ..Default::default()
            },
        );

        let (distance, witness) = world.closest_point(collider, Vec2::new(5.0, 0.0));
        assert!((distance - 3.0).abs() < 1e-5);
        assert!((witness.x - 2.0).abs() < 1e-5);

        let along_x = world.projected_extent(collider, Vec2::new(1.0, 0.0));
        let along_y = world.projected_extent(collider, Vec2::new(0.0, 1.0));
        assert!((along_x - 4.0).abs() < 1e-5);
        assert!((along_y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn sensor_begin_touch_is_classified() {
        let mut world = PhysicsWorld::new();
        let sensor_body = world.add_body(&BodyDef::default());
        world.add_box_shape(
            sensor_body,
            Vec2::new(1.5, 1.5),
            &ShapeDef {
                density: 0.0,
                sensor: true,
                category: ShapeCategory::WeaponPickup.bit(),
                mask: ShapeCategory::Drone.bit(),
                ..Default::default()
            },
        );
        let visitor = dynamic_ball(&mut world, Vec2::new(-4.0, 0.0), 3);
        world.set_body_velocity(visitor, Vec2::new(15.0, 0.0));

        let mut touched = false;
        for _ in 0..120 {
            world.step(1.0 / 60.0, 4);
            let events = world.drain_events();
            if let Some(touch) = events.sensor_begin.first() {
                assert_eq!(world.collider_user_data(touch.visitor), Some(3));
                touched = true;
                break;
            }
        }
        assert!(touched, "drone never entered the sensor");
    }
}
