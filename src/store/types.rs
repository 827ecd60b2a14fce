//! Value store type definitions

use serde::Serialize;
use std::collections::BTreeMap;

/// controller number -> last value
pub type ControllerMap = BTreeMap<u8, u8>;

/// channel -> controller number -> last value
pub type ChannelMap = BTreeMap<u8, ControllerMap>;

/// Last value written for a (device, channel, controller) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerValue {
    pub device_id: String,
    pub channel: u8,
    pub controller: u8,
    pub value: u8,
}

/// Copy of both store indexes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Last writer wins across devices
    pub by_channel: ChannelMap,
    pub by_device: BTreeMap<String, ChannelMap>,
}

/// Lookup shapes accepted by [`ValueStore::get`](super::ValueStore::get)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueQuery {
    All,
    Channel(u8),
    Controller { channel: u8, controller: u8 },
    /// Records of one device, optionally narrowed by channel and controller
    Device {
        id: String,
        channel: Option<u8>,
        controller: Option<u8>,
    },
}

impl ValueQuery {
    pub fn device(id: impl Into<String>) -> Self {
        ValueQuery::Device {
            id: id.into(),
            channel: None,
            controller: None,
        }
    }

    pub fn device_channel(id: impl Into<String>, channel: u8) -> Self {
        ValueQuery::Device {
            id: id.into(),
            channel: Some(channel),
            controller: None,
        }
    }
}

/// Result of a [`ValueQuery`], one variant per query shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ValueLookup {
    Snapshot(StoreSnapshot),
    Channel(ControllerMap),
    Value(Option<u8>),
    Device(Vec<ControllerValue>),
}

impl ValueLookup {
    pub fn as_value(&self) -> Option<u8> {
        match self {
            ValueLookup::Value(v) => *v,
            _ => None,
        }
    }

    pub fn as_records(&self) -> &[ControllerValue] {
        match self {
            ValueLookup::Device(records) => records,
            _ => &[],
        }
    }
}
