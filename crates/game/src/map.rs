//! Arena maps: embedded layouts, the cell grid, and spawn placement.
//!
//! Layout alphabet: `O` empty, `W`/`w` standard wall (static/floating),
//! `B`/`b` bouncy wall, `D`/`d` death wall. Static walls fill exactly one
//! grid cell; floating walls start on a cell but are free dynamic bodies.

use engine_core::{EntityHandle, EntityKind, Vec2};
use physics::ShapeCategory;
use thiserror::Error;

use crate::env::Env;
use crate::weapons::{WeaponKind, NUM_WEAPONS};

/// Grid pitch; a static wall fills one cell exactly.
pub const WALL_THICKNESS: f32 = 4.0;
pub const FLOATING_WALL_THICKNESS: f32 = 3.0;

/// Half extent of the clearance box checked around spawn candidates.
pub const MIN_SPAWN_DISTANCE: f32 = 6.0;
pub const PICKUP_SPAWN_DISTANCE_SQUARED: f32 = 10.0 * 10.0;
pub const DRONE_DRONE_SPAWN_DISTANCE_SQUARED: f32 = 10.0 * 10.0;
/// Cells closer than this to a standard or bouncy wall never host drone
/// spawns; death walls push spawns out further still.
pub const DRONE_WALL_SPAWN_DISTANCE: f32 = 5.0;
pub const DRONE_DEATH_WALL_SPAWN_DISTANCE: f32 = 7.5;

/// Upper bounds over every embedded map; observation buffers are sized
/// against these so all maps share one layout.
pub const MAX_MAP_COLUMNS: usize = 25;
pub const MAX_MAP_ROWS: usize = 25;
pub const MAX_CELLS: usize = MAX_MAP_COLUMNS * MAX_MAP_ROWS;

/// One square of the map grid.
#[derive(Debug, Clone, Copy)]
pub struct MapCell {
    pub position: Vec2,
    pub occupant: Option<EntityHandle>,
}

/// Axis-aligned rectangle; arena bounds and spawn quadrants.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapBounds {
    pub min: Vec2,
    pub max: Vec2,
}

/// A compiled-in arena layout.
#[derive(Debug)]
pub struct MapEntry {
    pub name: &'static str,
    pub layout: &'static str,
    pub columns: usize,
    pub rows: usize,
    pub rand_floating_standard_walls: u8,
    pub rand_floating_bouncy_walls: u8,
    pub rand_floating_death_walls: u8,
    pub has_set_floating_walls: bool,
    pub weapon_pickups: u16,
    pub default_weapon: WeaponKind,
}

pub const NUM_MAPS: usize = 9;

#[rustfmt::skip]
pub static MAPS: [MapEntry; NUM_MAPS] = [
    MapEntry {
        name: "boring",
        layout: concat!(
            "DDDDDDDDDDDDDDDDDDDDD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DDDDDDDDDDDDDDDDDDDDD",
        ),
        columns: 21,
        rows: 21,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: false,
        weapon_pickups: 8,
        default_weapon: WeaponKind::Standard,
    },
    MapEntry {
        name: "prototype_arena",
        layout: concat!(
            "DDDDDDDDDDDDDDDDDDDD",
            "DOOOOOOOdOOOOOOOOOOD",
            "DOwOOOOOOOOOOOOOOdOD",
            "DOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOwOOOOD",
            "DOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOWWOOOOOOOOD",
            "DOOOOOODDWWDOOOOOOOD",
            "DOOOOdODDDDDOOOOOOOD",
            "DOwOOOODDDDDOOOOwOOD",
            "DOOOOOODDDDDOOOOOOOD",
            "DOOOOOOOWWOOOdOOOOOD",
            "DOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOwOOD",
            "DOOOwOOOOOOOOOOOOOOD",
            "DOdOOOOOOOOOOOOOOOdD",
            "DDDDDDDDDDDDDDDDDDDD",
        ),
        columns: 20,
        rows: 20,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: true,
        weapon_pickups: 6,
        default_weapon: WeaponKind::Standard,
    },
    MapEntry {
        name: "snipers",
        layout: concat!(
            "BBBBBBBBBBBBBBBBBBBBB",
            "BDDOOOOOOOOOOOOOOODDB",
            "BDDOOOOOOOOOOOOOOODDB",
            "BOOOOOOOOOOOOOOOOOOOB",
            "BOOOOOOOOOOOOOOOOOOOB",
            "BOOOOOOOOOOOOOOOOOOOB",
            "BOOOOOODDBOBDDOOOOOOB",
            "BOOOOODDDBOBDDDOOOOOB",
            "BOOOOODDDBOBDDDOOOOOB",
            "BOOOOOBBBBOBBBBOOOOOB",
            "BOOOOOOOOOOOOOOOOOOOB",
            "BOOOOOBBBBOBBBBOOOOOB",
            "BOOOOODDDBOBDDDOOOOOB",
            "BOOOOODDDBOBDDDOOOOOB",
            "BOOOOOODDBOBDDOOOOOOB",
            "BOOOOOOOOOOOOOOOOOOOB",
            "BOOOOOOOOOOOOOOOOOOOB",
            "BOOOOOOOOOOOOOOOOOOOB",
            "BDDOOOOOOOOOOOOOOODDB",
            "BDDOOOOOOOOOOOOOOODDB",
            "BBBBBBBBBBBBBBBBBBBBB",
        ),
        columns: 21,
        rows: 21,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: false,
        weapon_pickups: 6,
        default_weapon: WeaponKind::Sniper,
    },
    MapEntry {
        name: "rooms",
        layout: concat!(
            "DDDDDDDDDDDDDDDDDDDDD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DOOOOOOOOOWOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOWOOOOOOOOOD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DDDWOOOWDDDDDWOOOWDDD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DOOOOOOOOOWOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOWOOOOOOOOOD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DOOOOOOOOODOOOOOOOOOD",
            "DDDDDDDDDDDDDDDDDDDDD",
        ),
        columns: 21,
        rows: 21,
        rand_floating_standard_walls: 3,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 3,
        has_set_floating_walls: false,
        weapon_pickups: 10,
        default_weapon: WeaponKind::Shotgun,
    },
    MapEntry {
        name: "x_arena",
        layout: concat!(
            "DDDDDDDDDDDDDDDDDDDDDDD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOdOOOOOOOOOdOD",
            "DOwOOOOOOOOOOOOOOOOOOOD",
            "DOOdOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOWWOOOOOOOOOOD",
            "DOOOOOOOODWWDDOOOOOOOOD",
            "DOOOOOOOOODDDOOOOOOOOOD",
            "DOOOOOOOOOODOOOOOOOOOOD",
            "DOOOOODOOOOOOOOODOOOOOD",
            "DOOOOODDOOwOOOODWWOOOOD",
            "DOOOOWWDDOOOOODDWWOOwOD",
            "DOwOOWWDOOOOdOODDOOOOOD",
            "DOOOOODOOOOOOOOODOOOOOD",
            "DOOOOOOOOOODOOOOOOOOOOD",
            "DOOOOOOOOODDDOOOOOOOOOD",
            "DOOOOOOOODDWWDOOOOOOOOD",
            "DOOOOOOOOOOWWOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOwOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOwOOOOOOOOOOOOOOOOdD",
            "DOdOOOOOOOOOOOOOOOOOOOD",
            "DDDDDDDDDDDDDDDDDDDDDDD",
        ),
        columns: 23,
        rows: 23,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: true,
        weapon_pickups: 8,
        default_weapon: WeaponKind::Standard,
    },
    MapEntry {
        name: "cross_bounce",
        layout: concat!(
            "DDDDDDDDDDDDDDDDDDDDDDDD",
            "DBBBBOOOOBDDDDBOOOOBBBBD",
            "DBOOOOOOOOOOOOOOOOOOOOBD",
            "DBOOOOOOOOOOOOOOOOOOOOBD",
            "DBOOBBOOOOOwdOOOOOBBOOBD",
            "DOOOBDDOOOOOOOOOODDBOOOD",
            "DOOOODOOOOOOOOOOOODOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOODBOOBDOOOOOOOOD",
            "DBOOOOOODDBOOBDDOOOOOOBD",
            "DDOOOOOOBBBOOBBBOOOOOODD",
            "DDOOdOOOOOOOOOOOOOOwOODD",
            "DDOOwOOOOOOOOOOOOOOdOODD",
            "DDOOOOOOBBBOOBBBOOOOOODD",
            "DBOOOOOODDBOOBDDOOOOOOBD",
            "DOOOOOOOODBOOBDOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOODOOOOOOOOOOOODOOOOD",
            "DOOOBDDOOOOOOOOOODDBOOOD",
            "DBOOBBOOOOOdwOOOOOBBOOBD",
            "DBOOOOOOOOOOOOOOOOOOOOBD",
            "DBOOOOOOOOOOOOOOOOOOOOBD",
            "DBBBBOOOOBDDDDBOOOOBBBBD",
            "DDDDDDDDDDDDDDDDDDDDDDDD",
        ),
        columns: 24,
        rows: 24,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: true,
        weapon_pickups: 8,
        default_weapon: WeaponKind::Standard,
    },
    MapEntry {
        name: "asterisk_arena",
        layout: concat!(
            "DDDDDDDDDDDDDDDDDDDDDDD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOODWOOOWDOOOOOOOD",
            "DOOOOOOOODOOODOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOODDOOOOOOOOODDOOOOD",
            "DOOOOWWDOOOOOOODWWOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOODOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOWWDOOOOOOODWWOOOOD",
            "DOOOODDOOOOOOOOODDOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOODOOODOOOOOOOOD",
            "DOOOOOOODWOOOWDOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOD",
            "DDDDDDDDDDDDDDDDDDDDDDD",
        ),
        columns: 23,
        rows: 23,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: false,
        weapon_pickups: 8,
        default_weapon: WeaponKind::Standard,
    },
    MapEntry {
        name: "foam_pit",
        layout: concat!(
            "BBBWWWDDDBBDDDWWWBBB",
            "BOOOOOOODBBDOOOOOOOB",
            "BOOOOOOOOBBOOOOOOOOB",
            "WOOdOOOOOOOOOOOOdOOW",
            "WOOOOOOOOOOOOOOOOOOW",
            "WOOOOOOOOOOOOOOOOOOW",
            "DOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOdOOOOdOOOOOOD",
            "DDOOOOOOOOOOOOOOOODD",
            "BBBOOOOOOddOOOOOOBBB",
            "BBBOOOOOOddOOOOOOBBB",
            "DDOOOOOOOOOOOOOOOODD",
            "DOOOOOOdOOOOdOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOD",
            "WOOOOOOOOOOOOOOOOOOW",
            "WOOOOOOOOOOOOOOOOOOW",
            "WOOdOOOOOOOOOOOOdOOW",
            "BOOOOOOOOBBOOOOOOOOB",
            "BOOOOOOODBBDOOOOOOOB",
            "BBBWWWDDDBBDDDWWWBBB",
        ),
        columns: 20,
        rows: 20,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: true,
        weapon_pickups: 6,
        default_weapon: WeaponKind::Standard,
    },
    MapEntry {
        name: "siege",
        layout: concat!(
            "BBBWWWWWDDDDDDDDDWWWWWBBB",
            "BOOOOOOOOOOOOOOOOOOOOOOOB",
            "BOdOOOOOOOOOOOOOOOOOOOdOB",
            "WOOOOOOOOOOOOOOOOOOOOOOOW",
            "WWOOOWDDWWOOOOOWWDDWOOOWW",
            "WOOOOODOOOOOOOOOOODOOOOOW",
            "WOOObOWObOOOOOOObOWObOOOW",
            "WObOOOWOOOOOOOOOOOWOOObOW",
            "WOOOOOWOOOOBBBOOOOWOOOOOW",
            "WWOOOWWOOOOOOOOOOOWWOOOWW",
            "DOOOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOObOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOOOD",
            "DOOOOOOOOOOOOOOOOOOOOOOOD",
            "WWOOOWWOOOOOOOOOOOWWOOOWW",
            "WOOOOOWOOOOBBBOOOOWOOOOOW",
            "WObOOOWOOOOOOOOOOOWOOObOW",
            "WOOObOWObOOOOOOObOWObOOOW",
            "WOOOOODOOOOOOOOOOODOOOOOW",
            "WWOOOWDDWWOOOOOWWDDWOOOWW",
            "WOOOOOOOOOOOOOOOOOOOOOOOW",
            "BOdOOOOOOOOOOOOOOOOOOOdOB",
            "BOOOOOOOOOOOOOOOOOOOOOOOB",
            "BBBWWWWWDDDDDDDDDWWWWWBBB",
        ),
        columns: 25,
        rows: 24,
        rand_floating_standard_walls: 0,
        rand_floating_bouncy_walls: 0,
        rand_floating_death_walls: 0,
        has_set_floating_walls: true,
        weapon_pickups: 5,
        default_weapon: WeaponKind::Standard,
    },
];

/// Decoded layout character.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LayoutCell {
    Empty,
    Wall { kind: EntityKind, floating: bool },
}

pub(crate) fn parse_layout_cell(c: u8) -> LayoutCell {
    match c {
        b'O' => LayoutCell::Empty,
        b'W' => LayoutCell::Wall {
            kind: EntityKind::StandardWall,
            floating: false,
        },
        b'w' => LayoutCell::Wall {
            kind: EntityKind::StandardWall,
            floating: true,
        },
        b'B' => LayoutCell::Wall {
            kind: EntityKind::BouncyWall,
            floating: false,
        },
        b'b' => LayoutCell::Wall {
            kind: EntityKind::BouncyWall,
            floating: true,
        },
        b'D' => LayoutCell::Wall {
            kind: EntityKind::DeathWall,
            floating: false,
        },
        b'd' => LayoutCell::Wall {
            kind: EntityKind::DeathWall,
            floating: true,
        },
        _ => panic!("unknown map layout cell {:?}", c as char),
    }
}

pub fn cell_index(columns: usize, col: usize, row: usize) -> usize {
    col + row * columns
}

/// World-space center of cell `(col, row)`; the grid is centered on the
/// origin.
pub fn cell_position(columns: usize, rows: usize, col: usize, row: usize) -> Vec2 {
    Vec2::new(
        (col as f32 - (columns as f32 - 1.0) / 2.0) * WALL_THICKNESS,
        (row as f32 - (rows as f32 - 1.0) / 2.0) * WALL_THICKNESS,
    )
}

/// Discretize a position into a cell index; `None` when off the grid.
pub fn pos_to_cell_index(columns: usize, rows: usize, pos: Vec2) -> Option<usize> {
    let cell_x = pos.x + columns as f32 * WALL_THICKNESS / 2.0;
    let cell_y = pos.y + rows as f32 * WALL_THICKNESS / 2.0;
    let col = (cell_x / WALL_THICKNESS).floor();
    let row = (cell_y / WALL_THICKNESS).floor();
    if col < 0.0 || row < 0.0 || col >= columns as f32 || row >= rows as f32 {
        return None;
    }
    Some(cell_index(columns, col as usize, row as usize))
}

/// Partition the interior bounds into four equal spawn quadrants:
/// 0 bottom-left, 1 bottom-right, 2 top-left, 3 top-right. Quads 0/3 and
/// 1/2 are diagonal pairs.
pub fn spawn_quads(bounds: &MapBounds) -> [MapBounds; 4] {
    let center = (bounds.min + bounds.max) / 2.0;
    [
        MapBounds {
            min: bounds.min,
            max: center,
        },
        MapBounds {
            min: Vec2::new(center.x, bounds.min.y),
            max: Vec2::new(bounds.max.x, center.y),
        },
        MapBounds {
            min: Vec2::new(bounds.min.x, center.y),
            max: Vec2::new(center.x, bounds.max.y),
        },
        MapBounds {
            min: center,
            max: bounds.max,
        },
    ]
}

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("no open position available after checking every cell")]
    NoOpenPosition,
}

impl Env {
    /// Build the cell grid and walls for the configured map.
    pub(crate) fn setup_map(&mut self) {
        let map = &MAPS[self.map_index];
        self.columns = map.columns;
        self.rows = map.rows;
        self.default_weapon = map.default_weapon;
        // a quarter of training episodes use a random default weapon so
        // agents see every weapon as a fallback
        if self.training_mode && self.rng.random_f32(0.0, 1.0) < 0.25 {
            let roll = self.rng.random_i32(0, NUM_WEAPONS as i32 - 1);
            self.default_weapon = WeaponKind::from_index(roll as usize);
        }

        let layout = map.layout.as_bytes();
        assert_eq!(
            layout.len(),
            map.columns * map.rows,
            "map {} layout does not match its dimensions",
            map.name
        );

        for row in 0..map.rows {
            for col in 0..map.columns {
                let idx = cell_index(map.columns, col, row);
                let pos = cell_position(map.columns, map.rows, col, row);
                self.cells.push(MapCell {
                    position: pos,
                    occupant: None,
                });

                if let LayoutCell::Wall { kind, floating } = parse_layout_cell(layout[idx]) {
                    let thickness = if floating {
                        FLOATING_WALL_THICKNESS
                    } else {
                        WALL_THICKNESS
                    };
                    let handle = self.create_wall(pos, Vec2::splat(thickness / 2.0), kind, floating);
                    if !floating {
                        self.cells[idx].occupant = Some(handle);
                    }
                }
            }
        }

        // interior bounds: the faces of the outermost static walls
        let mut bounds = MapBounds {
            min: Vec2::splat(f32::MAX),
            max: Vec2::splat(f32::MIN),
        };
        for wall in &self.walls {
            bounds.min = bounds
                .min
                .min(wall.position - wall.half_extents + Vec2::splat(WALL_THICKNESS));
            bounds.max = bounds
                .max
                .max(wall.position + wall.half_extents - Vec2::splat(WALL_THICKNESS));
        }
        self.bounds = bounds;
        self.spawn_quads = spawn_quads(&bounds);

        self.compute_drone_spawns();
    }

    /// Mark which cells may host drone spawns: far enough from every static
    /// wall, with death walls demanding extra clearance.
    fn compute_drone_spawns(&mut self) {
        self.drone_spawns = vec![true; self.cells.len()];
        for (idx, cell) in self.cells.iter().enumerate() {
            for wall in &self.walls {
                let limit = if wall.kind == EntityKind::DeathWall {
                    DRONE_DEATH_WALL_SPAWN_DISTANCE
                } else {
                    DRONE_WALL_SPAWN_DISTANCE
                };
                if wall.position.distance_squared(cell.position) < limit * limit {
                    self.drone_spawns[idx] = false;
                    break;
                }
            }
        }
    }

    /// Scatter the map's random floating walls over open cells.
    pub(crate) fn place_rand_floating_walls(&mut self) {
        let map = &MAPS[self.map_index];
        let batches = [
            (map.rand_floating_standard_walls, EntityKind::StandardWall),
            (map.rand_floating_bouncy_walls, EntityKind::BouncyWall),
            (map.rand_floating_death_walls, EntityKind::DeathWall),
        ];
        for (count, kind) in batches {
            for _ in 0..count {
                let pos = self
                    .find_open_pos(ShapeCategory::FloatingWall, -1)
                    .unwrap_or_else(|err| {
                        panic!("floating wall placement failed during setup: {err}")
                    });
                self.create_wall(pos, Vec2::splat(FLOATING_WALL_THICKNESS / 2.0), kind, true);
            }
        }
    }

    /// Find an unoccupied spawn cell for the given entity category, either
    /// anywhere on the map (`quad == -1`) or inside one spawn quadrant.
    ///
    /// Duplicate cell picks don't count as attempts; the trial cap bounds
    /// the quad-restricted search, which can't reach cells outside its
    /// quadrant.
    pub(crate) fn find_open_pos(
        &mut self,
        category: ShapeCategory,
        quad: i8,
    ) -> Result<Vec2, PlacementError> {
        let n_cells = self.cells.len();
        let mut checked = vec![false; n_cells];
        let mut attempts = 0usize;
        let mut trials = 0usize;

        while attempts < n_cells {
            trials += 1;
            if trials > n_cells * 64 {
                return Err(PlacementError::NoOpenPosition);
            }

            let cell_idx = if quad < 0 {
                self.rng.random_i32(0, n_cells as i32 - 1) as usize
            } else {
                let q = &self.spawn_quads[quad as usize];
                let pos = Vec2::new(
                    self.rng.random_f32(q.min.x, q.max.x),
                    self.rng.random_f32(q.min.y, q.max.y),
                );
                match pos_to_cell_index(self.columns, self.rows, pos) {
                    Some(idx) => idx,
                    None => continue,
                }
            };
            if checked[cell_idx] {
                continue;
            }
            checked[cell_idx] = true;
            attempts += 1;

            if self.cells[cell_idx].occupant.is_some() {
                continue;
            }
            let cell_pos = self.cells[cell_idx].position;

            match category {
                ShapeCategory::WeaponPickup => {
                    let too_close = self.pickups.iter().any(|(_, pickup)| {
                        pickup.position.distance_squared(cell_pos) < PICKUP_SPAWN_DISTANCE_SQUARED
                    });
                    if too_close {
                        continue;
                    }
                }
                ShapeCategory::Drone => {
                    if !self.drone_spawns[cell_idx] {
                        continue;
                    }
                    let too_close = self.drones.iter().any(|drone| {
                        drone.position.distance_squared(cell_pos)
                            < DRONE_DRONE_SPAWN_DISTANCE_SQUARED
                    });
                    if too_close {
                        continue;
                    }
                }
                _ => {}
            }

            let blocked = self.is_overlapping_aabb(
                cell_pos,
                MIN_SPAWN_DISTANCE,
                category.bit(),
                ShapeCategory::FloatingWall.bit() | ShapeCategory::Drone.bit(),
                None,
            );
            if !blocked {
                return Ok(cell_pos);
            }
        }

        Err(PlacementError::NoOpenPosition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_layout_matches_its_dimensions() {
        for map in &MAPS {
            assert_eq!(
                map.layout.len(),
                map.columns * map.rows,
                "map {}",
                map.name
            );
            assert!(map.columns <= MAX_MAP_COLUMNS);
            assert!(map.rows <= MAX_MAP_ROWS);
            for &c in map.layout.as_bytes() {
                parse_layout_cell(c);
            }
        }
    }

    #[test]
    fn cell_position_roundtrips_through_index() {
        let (columns, rows) = (21, 21);
        for row in 0..rows {
            for col in 0..columns {
                let pos = cell_position(columns, rows, col, row);
                assert_eq!(
                    pos_to_cell_index(columns, rows, pos),
                    Some(cell_index(columns, col, row))
                );
            }
        }
    }

    #[test]
    fn positions_off_the_grid_have_no_cell() {
        assert_eq!(pos_to_cell_index(21, 21, Vec2::new(1000.0, 0.0)), None);
        assert_eq!(pos_to_cell_index(21, 21, Vec2::new(0.0, -1000.0)), None);
    }

    #[test]
    fn spawn_quads_partition_the_bounds() {
        let bounds = MapBounds {
            min: Vec2::new(-38.0, -38.0),
            max: Vec2::new(38.0, 38.0),
        };
        let quads = spawn_quads(&bounds);
        assert_eq!(quads[0].min, bounds.min);
        assert_eq!(quads[3].max, bounds.max);
        // diagonal pairs share only the center point
        assert_eq!(quads[0].max, quads[3].min);
        assert_eq!(quads[1].min.x, quads[2].max.x);
        assert_eq!(quads[1].max.y, quads[2].min.y);
    }
}
