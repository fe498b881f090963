//! Collision event collection.
//!
//! Rapier reports contacts and sensor intersections through an
//! [`EventHandler`] while the pipeline steps. The collector buffers the raw
//! events so the simulation can drain them afterwards in a fixed order:
//! contact begin, contact end, sensor begin, sensor end.

use std::sync::Mutex;

use rapier2d::prelude::*;

/// A begin or end touch between two solid shapes.
#[derive(Debug, Clone, Copy)]
pub struct ContactTouch {
    pub a: ColliderHandle,
    pub b: ColliderHandle,
}

/// A begin or end touch between a sensor shape and a solid visitor.
#[derive(Debug, Clone, Copy)]
pub struct SensorTouch {
    pub sensor: ColliderHandle,
    pub visitor: ColliderHandle,
}

/// Events drained after one physics step.
#[derive(Debug, Default)]
pub struct PhysicsEvents {
    pub contact_begin: Vec<ContactTouch>,
    pub contact_end: Vec<ContactTouch>,
    pub sensor_begin: Vec<SensorTouch>,
    pub sensor_end: Vec<SensorTouch>,
}

/// Buffers rapier collision events during a step.
///
/// `EventHandler` methods take `&self`, so the buffer sits behind a mutex;
/// the simulation itself is single-threaded and never contends on it.
#[derive(Default)]
pub struct EventCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl EventCollector {
    /// Drain buffered events into begin/end contact and sensor batches.
    ///
    /// Events whose colliders have since been removed and can no longer be
    /// classified are skipped, mirroring the validity checks the original
    /// event loops perform.
    pub fn drain(&self, colliders: &ColliderSet) -> PhysicsEvents {
        let mut out = PhysicsEvents::default();
        let mut buffer = self.events.lock().unwrap();
        for event in buffer.drain(..) {
            match event {
                CollisionEvent::Started(h1, h2, flags) => {
                    if flags.contains(CollisionEventFlags::SENSOR) {
                        if let Some(touch) = classify_sensor(colliders, h1, h2) {
                            out.sensor_begin.push(touch);
                        }
                    } else {
                        out.contact_begin.push(ContactTouch { a: h1, b: h2 });
                    }
                }
                CollisionEvent::Stopped(h1, h2, flags) => {
                    if flags.contains(CollisionEventFlags::SENSOR) {
                        if let Some(touch) = classify_sensor(colliders, h1, h2) {
                            out.sensor_end.push(touch);
                        }
                    } else {
                        out.contact_end.push(ContactTouch { a: h1, b: h2 });
                    }
                }
            }
        }
        out
    }
}

fn classify_sensor(
    colliders: &ColliderSet,
    h1: ColliderHandle,
    h2: ColliderHandle,
) -> Option<SensorTouch> {
    let c1 = colliders.get(h1);
    let c2 = colliders.get(h2);
    match (c1.map(|c| c.is_sensor()), c2.map(|c| c.is_sensor())) {
        (Some(true), _) => Some(SensorTouch {
            sensor: h1,
            visitor: h2,
        }),
        (_, Some(true)) => Some(SensorTouch {
            sensor: h2,
            visitor: h1,
        }),
        _ => {
            log::debug!("sensor event with no resolvable sensor shape, skipping");
            None
        }
    }
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events.lock().unwrap().push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: f32,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: f32,
    ) {
    }
}
