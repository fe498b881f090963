//! Headless benchmark driver: one environment, random actions, steps/s.

use std::time::Instant;

use anyhow::Result;
use engine_core::Xorshift64;
use game::env::{CONTINUOUS_ACTION_SIZE, DISCRETE_ACTION_SIZE};
use game::{Env, SimConfig};

const BENCH_STEPS: u32 = 10_000;

fn main() -> Result<()> {
    env_logger::init();

    let config = SimConfig::load();
    let discrete = config.discrete_actions;
    let num_agents = config.num_agents;
    let num_drones = config.num_drones;
    let mut action_rng = Xorshift64::new(config.seed ^ 0xbe5e_11ed);
    let mut env = Env::new(config);

    let start = Instant::now();
    for _ in 0..BENCH_STEPS {
        if discrete {
            let actions = env.disc_actions_mut();
            for agent in 0..num_agents {
                let offset = agent * DISCRETE_ACTION_SIZE;
                actions[offset] = action_rng.random_i32(0, 8);
                actions[offset + 1] = action_rng.random_i32(0, 8);
                actions[offset + 2] = action_rng.random_i32(0, 1);
                actions[offset + 3] = action_rng.random_i32(0, 1);
                actions[offset + 4] = action_rng.random_i32(0, 1);
            }
        } else {
            let actions = env.cont_actions_mut();
            for agent in 0..num_agents {
                let offset = agent * CONTINUOUS_ACTION_SIZE;
                for value in &mut actions[offset..offset + CONTINUOUS_ACTION_SIZE] {
                    *value = action_rng.random_f32(-1.0, 1.0);
                }
            }
        }
        env.step();
    }
    let elapsed = start.elapsed();

    let steps_per_second = f64::from(BENCH_STEPS) / elapsed.as_secs_f64();
    println!("{BENCH_STEPS} action frames in {elapsed:.2?} ({steps_per_second:.0} frames/s)");

    let aggregated = env.logs_mut().aggregate_and_clear(num_drones);
    println!("mean episode length: {:.1} physics frames", aggregated.length);
    for drone in 0..num_drones {
        let stats = &aggregated.stats[drone];
        println!(
            "drone {drone}: reward {:.3}, win rate {:.2}, distance {:.1}",
            stats.reward, stats.wins, stats.distance_traveled
        );
    }

    Ok(())
}
