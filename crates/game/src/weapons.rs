//! Weapon catalog: static per-weapon parameters and firing helpers.

use engine_core::{log_base, Vec2, Xorshift64};

pub const NUM_WEAPONS: usize = 9;

/// Ammo sentinel for unlimited shots.
pub const INFINITE_AMMO: i32 = -1;

/// Projectile hits refill the shooter's energy proportionally to the
/// projectile's muzzle speed.
pub const PROJECTILE_ENERGY_REFILL_COEF: f32 = 0.001;

pub const ACCELERATOR_BOUNCE_SPEED_COEF: f32 = 1.05;
pub const ACCELERATOR_MAX_SPEED: f32 = 500.0;

/// Flak shells arm only after traveling this far.
pub const FLAK_CANNON_SAFE_DISTANCE: f32 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WeaponKind {
    Standard = 0,
    MachineGun = 1,
    Sniper = 2,
    Shotgun = 3,
    Imploder = 4,
    Accelerator = 5,
    FlakCannon = 6,
    MineLauncher = 7,
    BlackHole = 8,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; NUM_WEAPONS] = [
        WeaponKind::Standard,
        WeaponKind::MachineGun,
        WeaponKind::Sniper,
        WeaponKind::Shotgun,
        WeaponKind::Imploder,
        WeaponKind::Accelerator,
        WeaponKind::FlakCannon,
        WeaponKind::MineLauncher,
        WeaponKind::BlackHole,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> WeaponKind {
        Self::ALL[index]
    }

    pub fn info(self) -> &'static WeaponInfo {
        &WEAPON_INFOS[self as usize]
    }
}

/// Static parameters for one weapon kind.
#[derive(Debug)]
pub struct WeaponInfo {
    pub kind: WeaponKind,
    /// Continuous collision detection for fast projectiles.
    pub is_physics_bullet: bool,
    pub can_sleep: bool,
    pub projectiles_per_shot: u8,
    pub fire_magnitude: f32,
    pub recoil_magnitude: f32,
    pub damping: f32,
    /// Seconds the trigger must be held before the shot releases; 0 fires
    /// immediately.
    pub charge_time: f32,
    pub cooldown: f32,
    /// Travel budget before the projectile expires; `f32::INFINITY`
    /// disables expiry.
    pub max_distance: f32,
    pub radius: f32,
    pub density: f32,
    pub inv_mass: f32,
    /// Contacts allowed before destruction; 0 disables the limit.
    pub max_bounces: u8,
    pub explosive: bool,
    pub destroyed_on_drone_hit: bool,
    pub explodes_on_drone_hit: bool,
    pub proximity_detonates: bool,
    pub energy_refill: f32,
    pub spawn_weight: f32,
}

const fn inv_mass(density: f32, radius: f32) -> f32 {
    1.0 / (std::f32::consts::PI * radius * radius * density)
}

const STANDARD_FIRE_MAGNITUDE: f32 = 17.0;
const STANDARD_INV_MASS: f32 = inv_mass(3.25, 0.2);
const MACHINEGUN_FIRE_MAGNITUDE: f32 = 25.0;
const MACHINEGUN_INV_MASS: f32 = inv_mass(3.0, 0.15);
const SNIPER_FIRE_MAGNITUDE: f32 = 300.0;
const SNIPER_INV_MASS: f32 = inv_mass(2.0, 0.5);
const SHOTGUN_FIRE_MAGNITUDE: f32 = 22.5;
const SHOTGUN_INV_MASS: f32 = inv_mass(2.5, 0.15);
const IMPLODER_FIRE_MAGNITUDE: f32 = 60.0;
const IMPLODER_INV_MASS: f32 = inv_mass(1.0, 0.8);
const ACCELERATOR_FIRE_MAGNITUDE: f32 = 35.0;
const ACCELERATOR_INV_MASS: f32 = inv_mass(2.0, 0.5);
const FLAK_CANNON_FIRE_MAGNITUDE: f32 = 14.0;
const FLAK_CANNON_INV_MASS: f32 = inv_mass(1.0, 0.3);
const MINE_LAUNCHER_FIRE_MAGNITUDE: f32 = 25.0;
const MINE_LAUNCHER_INV_MASS: f32 = inv_mass(0.5, 0.5);
const BLACK_HOLE_FIRE_MAGNITUDE: f32 = 18.0;
const BLACK_HOLE_INV_MASS: f32 = inv_mass(1.0, 0.6);

static WEAPON_INFOS: [WeaponInfo; NUM_WEAPONS] = [
    WeaponInfo {
        kind: WeaponKind::Standard,
        is_physics_bullet: true,
        can_sleep: false,
        projectiles_per_shot: 1,
        fire_magnitude: STANDARD_FIRE_MAGNITUDE,
        recoil_magnitude: 20.0,
        damping: 0.0,
        charge_time: 0.0,
        cooldown: 0.37,
        max_distance: 80.0,
        radius: 0.2,
        density: 3.25,
        inv_mass: STANDARD_INV_MASS,
        max_bounces: 2 + 1,
        explosive: false,
        destroyed_on_drone_hit: false,
        explodes_on_drone_hit: false,
        proximity_detonates: false,
        energy_refill: STANDARD_FIRE_MAGNITUDE * STANDARD_INV_MASS * PROJECTILE_ENERGY_REFILL_COEF,
        spawn_weight: 0.0,
    },
    WeaponInfo {
        kind: WeaponKind::MachineGun,
        is_physics_bullet: true,
        can_sleep: false,
        projectiles_per_shot: 1,
        fire_magnitude: MACHINEGUN_FIRE_MAGNITUDE,
        recoil_magnitude: 12.8,
        damping: 0.1,
        charge_time: 0.0,
        cooldown: 0.07,
        max_distance: 225.0,
        radius: 0.15,
        density: 3.0,
        inv_mass: MACHINEGUN_INV_MASS,
        max_bounces: 1 + 1,
        explosive: false,
        destroyed_on_drone_hit: false,
        explodes_on_drone_hit: false,
        proximity_detonates: false,
        energy_refill: MACHINEGUN_FIRE_MAGNITUDE
            * MACHINEGUN_INV_MASS
            * PROJECTILE_ENERGY_REFILL_COEF
            * 0.2,
        spawn_weight: 3.0,
    },
    WeaponInfo {
        kind: WeaponKind::Sniper,
        is_physics_bullet: true,
        can_sleep: false,
        projectiles_per_shot: 1,
        fire_magnitude: SNIPER_FIRE_MAGNITUDE,
        recoil_magnitude: 96.0,
        damping: 0.05,
        charge_time: 1.0,
        cooldown: 1.5,
        max_distance: f32::INFINITY,
        radius: 0.5,
        density: 2.0,
        inv_mass: SNIPER_INV_MASS,
        max_bounces: 0 + 1,
        explosive: false,
        destroyed_on_drone_hit: true,
        explodes_on_drone_hit: false,
        proximity_detonates: false,
        energy_refill: SNIPER_FIRE_MAGNITUDE * SNIPER_INV_MASS * PROJECTILE_ENERGY_REFILL_COEF * 1.2,
        spawn_weight: 3.0,
    },
    WeaponInfo {
        kind: WeaponKind::Shotgun,
        is_physics_bullet: true,
        can_sleep: false,
        projectiles_per_shot: 8,
        fire_magnitude: SHOTGUN_FIRE_MAGNITUDE,
        recoil_magnitude: 100.0,
        damping: 0.3,
        charge_time: 0.0,
        cooldown: 1.0,
        max_distance: 100.0,
        radius: 0.15,
        density: 2.5,
        inv_mass: SHOTGUN_INV_MASS,
        max_bounces: 1 + 1,
        explosive: false,
        destroyed_on_drone_hit: false,
        explodes_on_drone_hit: false,
        proximity_detonates: false,
        energy_refill: SHOTGUN_FIRE_MAGNITUDE * SHOTGUN_INV_MASS * PROJECTILE_ENERGY_REFILL_COEF * 0.5,
        spawn_weight: 3.0,
    },
    WeaponInfo {
        kind: WeaponKind::Imploder,
        is_physics_bullet: false,
        can_sleep: false,
        projectiles_per_shot: 1,
        fire_magnitude: IMPLODER_FIRE_MAGNITUDE,
        recoil_magnitude: 65.0,
        damping: 0.0,
        charge_time: 2.0,
        cooldown: 0.0,
        max_distance: f32::INFINITY,
        radius: 0.8,
        density: 1.0,
        inv_mass: IMPLODER_INV_MASS,
        max_bounces: 0 + 1,
        explosive: true,
        destroyed_on_drone_hit: true,
        explodes_on_drone_hit: true,
        proximity_detonates: false,
        energy_refill: IMPLODER_FIRE_MAGNITUDE * IMPLODER_INV_MASS * PROJECTILE_ENERGY_REFILL_COEF,
        spawn_weight: 1.0,
    },
    WeaponInfo {
        kind: WeaponKind::Accelerator,
        is_physics_bullet: true,
        can_sleep: false,
        projectiles_per_shot: 1,
        fire_magnitude: ACCELERATOR_FIRE_MAGNITUDE,
        recoil_magnitude: 100.0,
        damping: 0.0,
        charge_time: 0.0,
        cooldown: 0.0,
        max_distance: f32::INFINITY,
        radius: 0.5,
        density: 2.0,
        inv_mass: ACCELERATOR_INV_MASS,
        max_bounces: 100 + 1,
        explosive: false,
        destroyed_on_drone_hit: true,
        explodes_on_drone_hit: false,
        proximity_detonates: false,
        energy_refill: ACCELERATOR_FIRE_MAGNITUDE
            * ACCELERATOR_INV_MASS
            * PROJECTILE_ENERGY_REFILL_COEF
            * ACCELERATOR_BOUNCE_SPEED_COEF,
        spawn_weight: 1.0,
    },
    WeaponInfo {
        kind: WeaponKind::FlakCannon,
        is_physics_bullet: false,
        can_sleep: false,
        projectiles_per_shot: 1,
        fire_magnitude: FLAK_CANNON_FIRE_MAGNITUDE,
        recoil_magnitude: 30.0,
        damping: 0.15,
        charge_time: 0.0,
        cooldown: 0.4,
        max_distance: 100.0,
        radius: 0.3,
        density: 1.0,
        inv_mass: FLAK_CANNON_INV_MASS,
        max_bounces: 0,
        explosive: true,
        destroyed_on_drone_hit: false,
        explodes_on_drone_hit: false,
        proximity_detonates: true,
        energy_refill: FLAK_CANNON_FIRE_MAGNITUDE
            * FLAK_CANNON_INV_MASS
            * PROJECTILE_ENERGY_REFILL_COEF,
        spawn_weight: 2.0,
    },
    WeaponInfo {
        kind: WeaponKind::MineLauncher,
        is_physics_bullet: false,
        can_sleep: true,
        projectiles_per_shot: 1,
        fire_magnitude: MINE_LAUNCHER_FIRE_MAGNITUDE,
        recoil_magnitude: 20.0,
        damping: 0.25,
        charge_time: 0.0,
        cooldown: 0.6,
        max_distance: f32::INFINITY,
        radius: 0.5,
        density: 0.5,
        inv_mass: MINE_LAUNCHER_INV_MASS,
        // mines must never pop from wall contacts
        max_bounces: 0,
        explosive: true,
        destroyed_on_drone_hit: true,
        explodes_on_drone_hit: false,
        proximity_detonates: true,
        energy_refill: MINE_LAUNCHER_FIRE_MAGNITUDE
            * MINE_LAUNCHER_INV_MASS
            * PROJECTILE_ENERGY_REFILL_COEF,
        spawn_weight: 2.0,
    },
    WeaponInfo {
        kind: WeaponKind::BlackHole,
        is_physics_bullet: false,
        can_sleep: false,
        projectiles_per_shot: 1,
        fire_magnitude: BLACK_HOLE_FIRE_MAGNITUDE,
        recoil_magnitude: 50.0,
        damping: 0.1,
        charge_time: 1.5,
        cooldown: 0.0,
        max_distance: f32::INFINITY,
        radius: 0.6,
        density: 1.0,
        inv_mass: BLACK_HOLE_INV_MASS,
        max_bounces: 0,
        explosive: true,
        destroyed_on_drone_hit: true,
        explodes_on_drone_hit: true,
        proximity_detonates: true,
        energy_refill: BLACK_HOLE_FIRE_MAGNITUDE * BLACK_HOLE_INV_MASS * PROJECTILE_ENERGY_REFILL_COEF,
        spawn_weight: 1.0,
    },
];

/// Ammo granted when a drone acquires `kind`; the map's default weapon is
/// always unlimited.
pub fn max_ammo(default_weapon: WeaponKind, kind: WeaponKind) -> i32 {
    if kind == default_weapon {
        return INFINITE_AMMO;
    }
    match kind {
        WeaponKind::Standard => INFINITE_AMMO,
        WeaponKind::MachineGun => 35,
        WeaponKind::Sniper => 3,
        WeaponKind::Shotgun => 8,
        WeaponKind::Imploder => 1,
        WeaponKind::Accelerator => 1,
        WeaponKind::FlakCannon => 12,
        WeaponKind::MineLauncher => 3,
        WeaponKind::BlackHole => 1,
    }
}

/// Magnitude of the launch impulse; the shotgun jitters per pellet.
pub fn fire_magnitude(rng: &mut Xorshift64, kind: WeaponKind) -> f32 {
    match kind {
        WeaponKind::Shotgun => {
            let offset = rng.random_i32(-3, 3);
            SHOTGUN_FIRE_MAGNITUDE + offset as f32
        }
        _ => kind.info().fire_magnitude,
    }
}

/// Per-weapon aim jitter applied at launch.
pub fn adjust_aim(rng: &mut Xorshift64, kind: WeaponKind, heat: u16, norm_aim: Vec2) -> Vec2 {
    match kind {
        WeaponKind::MachineGun => {
            let sway_coef = log_base(heat as f32 / 5.0 + 1.0, 180.0);
            let max_sway = 0.11;
            let sway_x = rng.random_f32(max_sway * -sway_coef, max_sway * sway_coef);
            let sway_y = rng.random_f32(max_sway * -sway_coef, max_sway * sway_coef);
            (norm_aim + Vec2::new(sway_x, sway_y)).normalize_or_zero()
        }
        WeaponKind::Shotgun => {
            let max_offset = 0.1;
            let offset_x = rng.random_f32(-max_offset, max_offset);
            let offset_y = rng.random_f32(-max_offset, max_offset);
            (norm_aim + Vec2::new(offset_x, offset_y)).normalize_or_zero()
        }
        _ => norm_aim,
    }
}

/// Radius, falloff and impulse of a weapon's detonation.
#[derive(Debug, Clone, Copy)]
pub struct WeaponExplosion {
    pub radius: f32,
    pub falloff: f32,
    /// Negative pulls bodies toward the blast center.
    pub impulse_per_length: f32,
}

pub fn explosion_params(kind: WeaponKind) -> WeaponExplosion {
    match kind {
        WeaponKind::Imploder => WeaponExplosion {
            radius: 10.0,
            falloff: 5.0,
            impulse_per_length: -150.0,
        },
        WeaponKind::FlakCannon => WeaponExplosion {
            radius: 5.0,
            falloff: 2.5,
            impulse_per_length: 45.0,
        },
        WeaponKind::MineLauncher => WeaponExplosion {
            radius: 12.5,
            falloff: 2.5,
            impulse_per_length: 100.0,
        },
        WeaponKind::BlackHole => WeaponExplosion {
            radius: 15.0,
            falloff: 7.5,
            impulse_per_length: -200.0,
        },
        _ => unreachable!("weapon {kind:?} has no explosion"),
    }
}

/// Radius of the proximity sensor on detonate-near-drones projectiles.
pub fn proximity_radius(kind: WeaponKind) -> f32 {
    match kind {
        WeaponKind::FlakCannon => 2.0,
        WeaponKind::MineLauncher => 7.5,
        WeaponKind::BlackHole => 5.0,
        _ => unreachable!("weapon {kind:?} has no proximity sensor"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_kind() {
        for (i, kind) in WeaponKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(kind.info().kind, *kind);
        }
    }

    #[test]
    fn non_default_weapons_have_positive_spawn_weight() {
        for kind in WeaponKind::ALL {
            if kind == WeaponKind::Standard {
                assert_eq!(kind.info().spawn_weight, 0.0);
            } else {
                assert!(kind.info().spawn_weight > 0.0);
            }
        }
    }

    #[test]
    fn explosive_weapons_have_explosion_params() {
        for kind in WeaponKind::ALL {
            if kind.info().explosive {
                let params = explosion_params(kind);
                assert!(params.radius > 0.0);
                assert!(params.falloff > 0.0);
            }
        }
    }

    #[test]
    fn proximity_weapons_have_sensor_radii() {
        for kind in WeaponKind::ALL {
            if kind.info().proximity_detonates {
                assert!(proximity_radius(kind) > 0.0);
            }
        }
    }

    #[test]
    fn imploder_and_black_hole_pull_inward() {
        assert!(explosion_params(WeaponKind::Imploder).impulse_per_length < 0.0);
        assert!(explosion_params(WeaponKind::BlackHole).impulse_per_length < 0.0);
    }

    #[test]
    fn aim_jitter_stays_normalized() {
        let mut rng = Xorshift64::new(3);
        let aim = Vec2::new(0.0, 1.0);
        for heat in [0u16, 10, 100] {
            let adjusted = adjust_aim(&mut rng, WeaponKind::MachineGun, heat, aim);
            assert!((adjusted.length() - 1.0).abs() < 1e-5);
        }
        let spread = adjust_aim(&mut rng, WeaponKind::Shotgun, 0, aim);
        assert!((spread.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_heat_machinegun_aim_is_exact() {
        let mut rng = Xorshift64::new(3);
        let aim = Vec2::new(1.0, 0.0);
        let adjusted = adjust_aim(&mut rng, WeaponKind::MachineGun, 0, aim);
        assert!((adjusted - aim).length() < 1e-6, "sway at zero heat must vanish");
    }

    #[test]
    fn default_weapon_ammo_is_infinite() {
        assert_eq!(max_ammo(WeaponKind::Sniper, WeaponKind::Sniper), INFINITE_AMMO);
        assert_eq!(max_ammo(WeaponKind::Standard, WeaponKind::Sniper), 3);
    }

    #[test]
    fn shotgun_fire_magnitude_jitters_within_three() {
        let mut rng = Xorshift64::new(11);
        for _ in 0..100 {
            let magnitude = fire_magnitude(&mut rng, WeaponKind::Shotgun);
            assert!((SHOTGUN_FIRE_MAGNITUDE - 3.0..=SHOTGUN_FIRE_MAGNITUDE + 3.0).contains(&magnitude));
        }
    }
}
