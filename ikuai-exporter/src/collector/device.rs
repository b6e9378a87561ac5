use std::collections::{HashMap, hash_map::Entry};

use ikuai_proto::{LanDevice, StreamStat};

#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub info: LanDevice,
}

pub fn device_id(mac: &str) -> String {
    format!("device/{mac}")
}

/// Merge records sharing a MAC address into one device per MAC.
///
/// Counters are summed. Hostname, address and comment stay those of the first
/// record seen, and devices keep the order of their first appearance.
pub fn merge(records: Vec<LanDevice>) -> Vec<Device> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut devices: Vec<Device> = Vec::with_capacity(records.len());

    for record in records {
        match index.entry(device_id(&record.mac)) {
            Entry::Occupied(e) => accumulate(&mut devices[*e.get()].info.stream, &record.stream),
            Entry::Vacant(e) => {
                let id = e.key().clone();
                e.insert(devices.len());
                devices.push(Device { id, info: record });
            }
        }
    }

    devices
}

fn accumulate(into: &mut StreamStat, other: &StreamStat) {
    into.total_up = into.total_up.saturating_add(other.total_up);
    into.total_down = into.total_down.saturating_add(other.total_down);
    into.upload = into.upload.saturating_add(other.upload);
    into.download = into.download.saturating_add(other.download);
    into.connect_num = into.connect_num.saturating_add(other.connect_num);
}
