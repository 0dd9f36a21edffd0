use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Notice;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation lifecycle notices.
///
/// Subscribers either follow one vehicle or the whole fleet. The fleet feed is
/// where a member-points collaborator listens for completions.
pub struct NotifyHub {
    vehicles: DashMap<Ulid, broadcast::Sender<Notice>>,
    fleet: broadcast::Sender<Notice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            vehicles: DashMap::new(),
            fleet: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Notices for one vehicle. Creates the channel if needed.
    pub fn subscribe(&self, vehicle_id: Ulid) -> broadcast::Receiver<Notice> {
        self.vehicles
            .entry(vehicle_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Notices for every vehicle.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Notice> {
        self.fleet.subscribe()
    }

    /// Publish a notice. No-op for channels nobody listens on.
    pub fn send(&self, notice: Notice) {
        if let Some(sender) = self.vehicles.get(&notice.vehicle_id()) {
            let _ = sender.send(notice.clone());
        }
        let _ = self.fleet.send(notice);
    }
}
