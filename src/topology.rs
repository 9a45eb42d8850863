//! Physical topology: a rooted tree of devices.
//!
//! The root (level 0) is normally the cloud; children sit one level deeper
//! toward the edge. Each device owns the link to its parent, described by the
//! device's uplink latency and its uplink/downlink bandwidth.
//!
//! # Example
//!
//! ```
//! use kiri::topology::{DeviceSpec, Topology};
//!
//! let mut topo = Topology::new();
//! let cloud = topo.add_device(DeviceSpec::new("cloud", 44800.0)).unwrap();
//! let gw = topo.add_device(DeviceSpec::new("gateway", 2800.0)).unwrap();
//! topo.set_parent(gw, cloud, 30.0).unwrap();
//!
//! assert_eq!(topo.path_to_root(gw), vec![gw, cloud]);
//! assert_eq!(topo.level(gw), 1);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::power::{PowerSpec, ProvisionerSpec};
use crate::types::{DeviceId, SimTime};

/// Resource capacities of a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    /// Processing rate in MIPS
    pub mips: f64,
    /// Memory available to module instances
    #[serde(default = "default_ram")]
    pub ram: u64,
    /// Bandwidth of the link toward the parent (bytes per time unit)
    #[serde(default = "default_bandwidth")]
    pub uplink_bandwidth: f64,
    /// Bandwidth of the link from the parent (bytes per time unit)
    #[serde(default = "default_bandwidth")]
    pub downlink_bandwidth: f64,
}

fn default_bandwidth() -> f64 {
    f64::INFINITY
}

fn default_ram() -> u64 {
    u64::MAX
}

impl ResourceCapacity {
    /// Creates a capacity record with unbounded links and no RAM limit.
    pub fn new(mips: f64) -> Self {
        Self {
            mips,
            ram: default_ram(),
            uplink_bandwidth: default_bandwidth(),
            downlink_bandwidth: default_bandwidth(),
        }
    }

    /// Processing rate and bandwidths must be positive; infinite
    /// bandwidth means an unbounded link.
    fn check(&self) -> Result<(), String> {
        if !(self.mips > 0.0 && self.mips.is_finite()) {
            return Err(format!("mips must be positive, got {}", self.mips));
        }
        if !(self.uplink_bandwidth > 0.0) || !(self.downlink_bandwidth > 0.0) {
            return Err(format!(
                "bandwidth must be positive, got {}/{}",
                self.uplink_bandwidth, self.downlink_bandwidth
            ));
        }
        Ok(())
    }
}

/// Everything needed to declare a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Unique device name
    pub name: String,
    /// Resource capacities
    pub capacity: ResourceCapacity,
    /// Cost per million instructions executed
    #[serde(default)]
    pub rate_per_mips: f64,
    /// Power model
    #[serde(default)]
    pub power: PowerSpec,
    /// Provisioning policy used by placement
    #[serde(default)]
    pub provisioner: ProvisionerSpec,
}

impl DeviceSpec {
    /// Creates a device spec with the given processing rate.
    pub fn new(name: impl Into<String>, mips: f64) -> Self {
        Self {
            name: name.into(),
            capacity: ResourceCapacity::new(mips),
            rate_per_mips: 0.0,
            power: PowerSpec::default(),
            provisioner: ProvisionerSpec::default(),
        }
    }

    /// Sets the RAM capacity.
    pub fn with_ram(mut self, ram: u64) -> Self {
        self.capacity.ram = ram;
        self
    }

    /// Sets uplink and downlink bandwidth.
    pub fn with_bandwidth(mut self, uplink: f64, downlink: f64) -> Self {
        self.capacity.uplink_bandwidth = uplink;
        self.capacity.downlink_bandwidth = downlink;
        self
    }

    /// Sets the cost per million instructions.
    pub fn with_rate_per_mips(mut self, rate: f64) -> Self {
        self.rate_per_mips = rate;
        self
    }

    /// Sets the power model.
    pub fn with_power(mut self, power: PowerSpec) -> Self {
        self.power = power;
        self
    }

    /// Sets the provisioning policy.
    pub fn with_provisioner(mut self, provisioner: ProvisionerSpec) -> Self {
        self.provisioner = provisioner;
        self
    }
}

/// A device in the topology.
#[derive(Clone, Debug)]
pub struct Device {
    /// Dense identifier
    pub id: DeviceId,
    /// Declared properties
    pub spec: DeviceSpec,
    /// Parent device, `None` for the root
    pub parent: Option<DeviceId>,
    /// Latency of the link to the parent
    pub uplink_latency: SimTime,
    /// Child devices in attachment order
    pub children: Vec<DeviceId>,
}

impl Device {
    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// The device tree.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    devices: Vec<Device>,
    by_name: HashMap<String, DeviceId>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device and returns its id.
    ///
    /// The device starts detached (no parent); use [`Topology::set_parent`]
    /// to link it into the tree.
    pub fn add_device(&mut self, spec: DeviceSpec) -> Result<DeviceId, TopologyError> {
        if self.by_name.contains_key(&spec.name) {
            return Err(TopologyError::DuplicateId(spec.name));
        }
        spec.capacity
            .check()
            .map_err(|reason| TopologyError::InvalidDevice {
                name: spec.name.clone(),
                reason,
            })?;

        let id = self.devices.len();
        self.by_name.insert(spec.name.clone(), id);
        self.devices.push(Device {
            id,
            spec,
            parent: None,
            uplink_latency: 0.0,
            children: Vec::new(),
        });
        Ok(id)
    }

    /// Attaches `child` under `parent` with the given link latency.
    ///
    /// Re-parenting replaces the previous link. Fails with
    /// [`TopologyError::Cycle`] if `parent` is `child` itself or one of its
    /// descendants.
    pub fn set_parent(
        &mut self,
        child: DeviceId,
        parent: DeviceId,
        link_latency: SimTime,
    ) -> Result<(), TopologyError> {
        self.check(child)?;
        self.check(parent)?;
        if !(link_latency >= 0.0 && link_latency.is_finite()) {
            return Err(TopologyError::InvalidDevice {
                name: self.devices[child].spec.name.clone(),
                reason: format!("uplink latency must be non-negative, got {}", link_latency),
            });
        }

        if self.path_to_root(parent).contains(&child) {
            return Err(TopologyError::Cycle {
                child: self.devices[child].spec.name.clone(),
                parent: self.devices[parent].spec.name.clone(),
            });
        }

        if let Some(old) = self.devices[child].parent {
            self.devices[old].children.retain(|&c| c != child);
        }
        self.devices[child].parent = Some(parent);
        self.devices[child].uplink_latency = link_latency;
        self.devices[parent].children.push(child);
        Ok(())
    }

    /// Checks that the topology is a single rooted tree.
    pub fn validate(&self) -> Result<DeviceId, TopologyError> {
        let mut roots = self.devices.iter().filter(|d| d.parent.is_none());
        let root = roots.next().ok_or(TopologyError::Empty)?;
        if let Some(extra) = roots.next() {
            return Err(TopologyError::MissingParent(extra.spec.name.clone()));
        }
        Ok(root.id)
    }

    /// Returns the root device, if the tree has exactly one.
    pub fn root(&self) -> Option<DeviceId> {
        self.validate().ok()
    }

    /// Returns the device ids from `id` up to and including the root.
    pub fn path_to_root(&self, id: DeviceId) -> Vec<DeviceId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(d) = current {
            if d >= self.devices.len() {
                break;
            }
            path.push(d);
            current = self.devices[d].parent;
        }
        path
    }

    /// Depth of the device; the root is level 0.
    pub fn level(&self, id: DeviceId) -> usize {
        self.path_to_root(id).len().saturating_sub(1)
    }

    /// Returns true if `ancestor` lies on the path from `id` to the root
    /// (a device is its own ancestor).
    pub fn is_ancestor(&self, ancestor: DeviceId, id: DeviceId) -> bool {
        self.path_to_root(id).contains(&ancestor)
    }

    /// Number of links on the tree path between two devices.
    ///
    /// Returns `None` when the devices are not connected.
    pub fn hops(&self, a: DeviceId, b: DeviceId) -> Option<usize> {
        let path_a = self.path_to_root(a);
        let path_b = self.path_to_root(b);
        path_a
            .iter()
            .enumerate()
            .find_map(|(ia, d)| path_b.iter().position(|x| x == d).map(|ib| ia + ib))
    }

    /// The next device on the tree path from `from` toward `to`.
    pub fn next_hop(&self, from: DeviceId, to: DeviceId) -> Option<DeviceId> {
        if from == to {
            return None;
        }
        let path_to = self.path_to_root(to);
        match path_to.iter().position(|&d| d == from) {
            // `from` is an ancestor of `to`: descend one step
            Some(pos) => Some(path_to[pos - 1]),
            None => self.parent(from),
        }
    }

    /// Returns the capacity record of a device.
    pub fn resource_capacity(&self, id: DeviceId) -> Option<&ResourceCapacity> {
        self.devices.get(id).map(|d| &d.spec.capacity)
    }

    /// Returns the latency of the link from `id` to its parent.
    pub fn uplink_latency(&self, id: DeviceId) -> Option<SimTime> {
        self.devices.get(id).map(|d| d.uplink_latency)
    }

    /// Returns the parent of a device.
    pub fn parent(&self, id: DeviceId) -> Option<DeviceId> {
        self.devices.get(id).and_then(|d| d.parent)
    }

    /// Returns the children of a device.
    pub fn children(&self, id: DeviceId) -> &[DeviceId] {
        self.devices
            .get(id)
            .map(|d| d.children.as_slice())
            .unwrap_or(&[])
    }

    /// Returns a device by id.
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Looks a device up by name.
    pub fn device_by_name(&self, name: &str) -> Option<DeviceId> {
        self.by_name.get(name).copied()
    }

    /// Returns all devices in id order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Returns the number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if the topology has no devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn check(&self, id: DeviceId) -> Result<(), TopologyError> {
        if id < self.devices.len() {
            Ok(())
        } else {
            Err(TopologyError::UnknownDevice(format!("#{}", id)))
        }
    }
}
