//! Sudden death: once the round timer runs out, rings of death walls close
//! in on the arena center until somebody dies.

use engine_core::{EntityKind, Vec2};
use log::debug;
use physics::ShapeCategory;

use crate::drone::DRONE_RADIUS;
use crate::env::Env;
use crate::map::{cell_index, WALL_THICKNESS};

impl Env {
    /// Place the next ring of death walls, one cell further in than the
    /// last, and cull everything the new walls crush.
    pub(crate) fn handle_sudden_death(&mut self) {
        debug_assert_eq!(self.sudden_death_steps, 0);

        self.sudden_death_wall_counter += 1;
        self.sudden_death_walls_placed = true;
        let inset = self.sudden_death_wall_counter as usize;
        let columns = self.columns;
        let rows = self.rows;

        // a picture frame inset `inset` cells from the outer wall: top and
        // bottom bands, then the left and right columns between them
        let band_width = columns.saturating_sub(2 * inset + 1);
        let band_height = rows.saturating_sub(2 * inset + 2);
        let mut ring = Vec::with_capacity(2 * (band_width + band_height));
        for i in 0..band_width {
            ring.push((inset + i, inset));
            ring.push((inset + i, rows - 1 - inset));
        }
        for i in 0..band_height {
            ring.push((inset, inset + 1 + i));
            ring.push((columns - 1 - inset, inset + 1 + i));
        }

        for (col, row) in ring {
            if col >= columns || row >= rows {
                continue;
            }
            self.place_sudden_death_wall(cell_index(columns, col, row));
        }

        // drones overlapping a newly placed wall die on the spot
        for idx in 0..self.num_drones {
            let position = self.drones[idx].position;
            let crushed = self.is_overlapping_aabb(
                position,
                DRONE_RADIUS,
                ShapeCategory::Drone.bit(),
                ShapeCategory::Wall.bit(),
                None,
            );
            if crushed {
                self.kill_drone(idx);
            }
        }

        // floating walls swallowed by the ring vanish
        for index in 0..self.floating_walls.slot_count() {
            let Some(wall) = self.floating_walls.at(index) else {
                continue;
            };
            let Some(cell) = wall.cell_index else {
                continue;
            };
            if self.cell_holds_static_wall(cell) {
                let generation = self.floating_walls.generation(index).unwrap();
                let position = wall.position;
                self.destroy_floating_wall(index, generation);
                debug!("destroyed floating wall at {position:?}");
            }
        }

        // so do projectiles, without detonating
        for index in 0..self.projectiles.slot_count() {
            let Some(projectile) = self.projectiles.at(index) else {
                continue;
            };
            let Some(cell) = projectile.cell_index else {
                continue;
            };
            if self.cell_holds_static_wall(cell) {
                let generation = self.projectiles.generation(index).unwrap();
                self.destroy_projectile(index, generation, false);
            }
        }
    }

    fn place_sudden_death_wall(&mut self, idx: usize) {
        if let Some(occupant) = self.cells[idx].occupant {
            if occupant.kind == EntityKind::Pickup {
                self.disable_weapon_pickup(occupant.index);
            } else {
                return;
            }
        }
        let position = self.cells[idx].position;
        let handle = self.create_wall(
            position,
            Vec2::splat(WALL_THICKNESS / 2.0),
            EntityKind::DeathWall,
            false,
        );
        self.cells[idx].occupant = Some(handle);
    }

    pub(crate) fn cell_holds_static_wall(&self, idx: usize) -> bool {
        matches!(
            self.cells[idx].occupant,
            Some(handle) if handle.kind.is_wall() && !handle.floating
        )
    }
}
