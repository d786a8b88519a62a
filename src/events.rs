use std::fmt;

use crate::config::Vec3;

/// Notifications for the host application.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    /// A model finished loading and is attached to the scene.
    Load {
        camera_position: Vec3,
        orbit_target: Vec3,
        triangle_count: usize,
    },
    /// The user finished an orbit gesture.
    Update {
        camera_position: Vec3,
        orbit_target: Vec3,
    },
    /// Loading progress in percent.
    Progress(u8),
}

impl fmt::Display for ViewerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = |v: &Vec3| format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z);
        match self {
            ViewerEvent::Load {
                camera_position,
                orbit_target,
                triangle_count,
            } => write!(
                f,
                "Load camera={} target={} triangles={}",
                v(camera_position),
                v(orbit_target),
                triangle_count
            ),
            ViewerEvent::Update {
                camera_position,
                orbit_target,
            } => write!(f, "Update camera={} target={}", v(camera_position), v(orbit_target)),
            ViewerEvent::Progress(percent) => write!(f, "Progress {percent}%"),
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<ViewerEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: ViewerEvent) {
        log::trace!("{}", event);
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<ViewerEvent> {
        self.events.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
