//! Known devices in the user's session and who "this" device is.

use crate::protocol::{Device, DeviceId};

/// Device registry.
///
/// The set is only ever replaced wholesale from a relay broadcast; this device
/// never edits another device's record.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    my_id: Option<DeviceId>,
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the id assigned by `welcome`.
    ///
    /// The id is fixed for the connection's lifetime. A repeated `welcome`
    /// (answering a retried `hello`) keeps the first id.
    pub fn assign_identity(&mut self, id: DeviceId) {
        match self.my_id {
            None => self.my_id = Some(id),
            Some(current) if current != id => {
                log::warn!(
                    "[Registry] Ignoring second device id {} (already {} on this connection)",
                    id,
                    current
                );
            }
            Some(_) => {}
        }
    }

    pub fn my_id(&self) -> Option<DeviceId> {
        self.my_id
    }

    /// Replaces the full device set.
    ///
    /// More than one device flagged as output breaks the session invariant.
    /// The registry then keeps a single flag, preferring another device over
    /// this one (the relay decides roles, not us) and, among those, the most
    /// recently connected.
    pub fn apply_device_list(&mut self, mut devices: Vec<Device>) {
        let flagged: Vec<&Device> = devices.iter().filter(|d| d.is_output_device).collect();
        if flagged.len() > 1 {
            let my_id = self.my_id;
            let winner = flagged
                .iter()
                .filter(|d| Some(d.id) != my_id)
                .max_by_key(|d| d.connected_at)
                .or_else(|| flagged.first())
                .map(|d| d.id);
            log::warn!(
                "[Registry] {} devices flagged as output, keeping {:?}",
                flagged.len(),
                winner
            );
            for device in &mut devices {
                device.is_output_device = Some(device.id) == winner;
            }
        }
        self.devices = devices;
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn output_device(&self) -> Option<&Device> {
        self.devices.iter().find(|d| d.is_output_device)
    }

    pub fn output_device_id(&self) -> Option<DeviceId> {
        self.output_device().map(|d| d.id)
    }

    pub fn is_this_device_output(&self) -> bool {
        match (self.my_id, self.output_device_id()) {
            (Some(me), Some(output)) => me == output,
            _ => false,
        }
    }

    pub fn other_devices(&self) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| Some(d.id) != self.my_id)
            .collect()
    }

    pub fn output_count(&self) -> usize {
        self.devices.iter().filter(|d| d.is_output_device).count()
    }

    /// Forgets identity and devices (connection lost).
    pub fn clear(&mut self) {
        self.my_id = None;
        self.devices.clear();
    }
}
