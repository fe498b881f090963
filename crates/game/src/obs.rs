//! Flat observation encoding: one `OBS_SIZE` block of bytes per agent.

use engine_core::{one_hot, scale_value, EntityKind};

use crate::env::{Env, ROUND_STEPS};
use crate::map::{pos_to_cell_index, MAX_CELLS};
use crate::weapons::{self, NUM_WEAPONS};

/// Bytes per map cell. The first two carry the static occupant (wall kind,
/// pickup weapon); the next three are overlays for projectiles, floating
/// walls and drones discretized into the cell; the last byte is reserved.
pub const MAP_CELL_OBS_SIZE: usize = 6;
pub const CELL_WALL_OBS_OFFSET: usize = 0;
pub const CELL_PICKUP_OBS_OFFSET: usize = 1;
pub const CELL_PROJECTILE_OBS_OFFSET: usize = MAP_CELL_OBS_SIZE - 4;
pub const CELL_FLOATING_WALL_OBS_OFFSET: usize = MAP_CELL_OBS_SIZE - 3;
pub const CELL_DRONE_OBS_OFFSET: usize = MAP_CELL_OBS_SIZE - 2;

/// The cell grid is encoded at maximum map size; smaller maps leave the
/// tail zero.
pub const MAP_OBS_SIZE: usize = MAX_CELLS * MAP_CELL_OBS_SIZE;

/// Self block: ten scaled scalars plus the weapon one-hot.
pub const SCALAR_OBS_SIZE: usize = 10 + NUM_WEAPONS;
pub const OBS_SIZE: usize = MAP_OBS_SIZE + SCALAR_OBS_SIZE;

pub const MAX_X_POS: f32 = 150.0;
pub const MAX_Y_POS: f32 = 150.0;
pub const MAX_SPEED: f32 = 500.0;

fn scaled_byte(x: f32, max: f32, positive_only: bool) -> u8 {
    (scale_value(x, max, positive_only) * 255.0) as u8
}

impl Env {
    /// Encode one observation block per agent into the flat buffer.
    pub(crate) fn compute_obs(&mut self) {
        self.obs.fill(0);

        for agent in 0..self.num_agents {
            let base = OBS_SIZE * agent;

            // static occupants, one slot per map cell
            for (idx, cell) in self.cells.iter().enumerate() {
                let Some(occupant) = cell.occupant else {
                    continue;
                };
                let offset = base + idx * MAP_CELL_OBS_SIZE;
                debug_assert!(offset + MAP_CELL_OBS_SIZE <= base + MAP_OBS_SIZE);
                if occupant.kind.is_wall() {
                    self.obs[offset + CELL_WALL_OBS_OFFSET] = occupant.kind as u8 + 1;
                } else if occupant.kind == EntityKind::Pickup {
                    if let Some(pickup) = self.pickups.get(occupant.index, occupant.generation) {
                        self.obs[offset + CELL_PICKUP_OBS_OFFSET] = pickup.weapon as u8 + 1;
                    }
                }
            }

            // overlays skip cells already filled by a static wall
            for (_, projectile) in self.projectiles.iter() {
                let Some(cell) =
                    pos_to_cell_index(self.columns, self.rows, projectile.last_pos)
                else {
                    continue;
                };
                if self.cell_holds_static_wall(cell) {
                    continue;
                }
                let offset = base + cell * MAP_CELL_OBS_SIZE + CELL_PROJECTILE_OBS_OFFSET;
                self.obs[offset] = projectile.weapon as u8 + 1;
            }

            for (_, wall) in self.floating_walls.iter() {
                let Some(cell) = wall.cell_index else {
                    continue;
                };
                if self.cell_holds_static_wall(cell) {
                    continue;
                }
                let offset = base + cell * MAP_CELL_OBS_SIZE + CELL_FLOATING_WALL_OBS_OFFSET;
                self.obs[offset] = wall.kind as u8 + 1;
            }

            for drone in &self.drones {
                let Some(cell) = drone.cell_index else {
                    continue;
                };
                if self.cell_holds_static_wall(cell) {
                    continue;
                }
                let offset = base + cell * MAP_CELL_OBS_SIZE + CELL_DRONE_OBS_OFFSET;
                self.obs[offset] = drone.weapon as u8 + 1;
            }

            // the agent's own state
            let drone = &self.drones[agent];
            let info = drone.weapon.info();
            let max_ammo = weapons::max_ammo(self.default_weapon, drone.weapon);
            let ammo_byte = if drone.ammo == weapons::INFINITE_AMMO {
                0
            } else {
                scaled_byte(drone.ammo as f32, max_ammo as f32, true)
            };
            let cooldown_byte = if info.cooldown > 0.0 {
                scaled_byte(drone.weapon_cooldown, info.cooldown, true)
            } else {
                0
            };
            let charge_byte = if info.charge_time > 0.0 {
                scaled_byte(drone.weapon_charge, info.charge_time, true)
            } else {
                0
            };

            let mut offset = base + MAP_OBS_SIZE;
            let scalars = [
                scaled_byte(self.steps_left as f32, ROUND_STEPS as f32, true),
                scaled_byte(drone.position.x, MAX_X_POS, false),
                scaled_byte(drone.position.y, MAX_Y_POS, false),
                scaled_byte(drone.velocity.x, MAX_SPEED, false),
                scaled_byte(drone.velocity.y, MAX_SPEED, false),
                scaled_byte(drone.last_aim.x, 1.0, false),
                scaled_byte(drone.last_aim.y, 1.0, false),
                ammo_byte,
                cooldown_byte,
                charge_byte,
            ];
            for byte in scalars {
                self.obs[offset] = byte;
                offset += 1;
            }
            let weapon_index = drone.weapon.index();
            one_hot(&mut self.obs[offset..offset + NUM_WEAPONS], weapon_index);
            debug_assert_eq!(offset + NUM_WEAPONS, base + OBS_SIZE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_are_consistent() {
        assert_eq!(OBS_SIZE, MAP_OBS_SIZE + SCALAR_OBS_SIZE);
        assert!(CELL_PROJECTILE_OBS_OFFSET > CELL_PICKUP_OBS_OFFSET);
        assert!(CELL_DRONE_OBS_OFFSET < MAP_CELL_OBS_SIZE);
    }

    #[test]
    fn scaled_byte_saturates() {
        assert_eq!(scaled_byte(2.0, 1.0, true), 255);
        assert_eq!(scaled_byte(-5.0, 1.0, true), 0);
        assert_eq!(scaled_byte(0.0, 1.0, false), 127);
    }
}
