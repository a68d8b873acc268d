//! The point registry (spec §4.C): a hierarchical address space of typed
//! points with a 16-priority BACnet-style override stack, auto-expiry, and
//! atomic per-point read/write.
//!
//! Concurrency discipline follows spec §5: `present_value` and
//! `priority_array` are guarded per-point behind their own `RwLock`
//! (generalizing the teacher's single `Arc<RwLock<HashMap<_, PlantData>>>`
//! into one lock per point so an unrelated point's write never serializes
//! behind this one), and reads never block on the tick loop.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{BasimError, BasimResult};

pub const MAX_PRIORITY: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Analog,
    Binary,
    MultiState,
    String,
}

/// A point value, typed per `PointKind`.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Value {
    Analog(f64),
    Binary(bool),
    MultiState(u32),
    Text(String),
}

impl Value {
    fn matches_kind(&self, kind: PointKind) -> bool {
        matches!(
            (self, kind),
            (Value::Analog(_), PointKind::Analog)
                | (Value::Binary(_), PointKind::Binary)
                | (Value::MultiState(_), PointKind::MultiState)
                | (Value::Text(_), PointKind::String)
        )
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Analog(v) => Some(*v),
            Value::MultiState(v) => Some(*v as f64),
            Value::Binary(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(_) => None,
        }
    }
}

/// Opaque, interned handle to a registered point. Cheap to copy and to use
/// as a `HashMap`/`Vec` key — paths are resolved to ids once at assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(pub u32);

/// Equipment identity, used to enforce single-writer ownership of
/// `present_value` (spec §3, "Ownership is exclusive").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EquipmentId(pub u32);

#[derive(Debug, Clone)]
pub struct PointMeta {
    pub path: String,
    pub kind: PointKind,
    pub units: &'static str,
    pub writable: bool,
    pub owner: EquipmentId,
}

#[derive(Debug, Clone)]
struct PrioritySlot {
    value: Value,
    source: String,
    expires_at: Option<f64>,
}

#[derive(Debug)]
struct PointCell {
    present_value: Value,
    priority_array: [Option<PrioritySlot>; MAX_PRIORITY as usize],
}

impl PointCell {
    fn effective(&self) -> &Value {
        for slot in self.priority_array.iter() {
            if let Some(s) = slot {
                return &s.value;
            }
        }
        &self.present_value
    }

    fn overridden(&self) -> bool {
        self.priority_array.iter().any(Option::is_some)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OverrideSlot {
    pub priority: u8,
    pub value: Value,
    pub source: String,
    pub expires_at: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Reading {
    pub path: String,
    pub effective_value: Value,
    pub units: &'static str,
    pub overridden: bool,
    pub writable: bool,
    pub kind: PointKind,
}

/// A point-in-time copy of a subtree, used for API responses (spec §4.C
/// `snapshot`). Taking one here is still only consistent per-point, not a
/// cross-point transaction — `CampusShared` is what turns a full `snapshot`
/// into a cross-point-consistent view, by building one once per tick and
/// publishing it behind an atomically-swapped pointer (spec §4.F).
pub type Snapshot = HashMap<String, Reading>;

struct Entry {
    meta: PointMeta,
    cell: RwLock<PointCell>,
}

pub struct Registry {
    by_path: HashMap<String, PointId>,
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            by_path: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Register a point at assembly time (spec §4.E). Called only by the
    /// campus assembler, before any server accepts connections.
    pub fn register(
        &mut self,
        path: impl Into<String>,
        kind: PointKind,
        units: &'static str,
        writable: bool,
        owner: EquipmentId,
        initial: Value,
    ) -> PointId {
        let path = path.into();
        let id = PointId(self.entries.len() as u32);
        self.entries.push(Entry {
            meta: PointMeta {
                path: path.clone(),
                kind,
                units,
                writable,
                owner,
            },
            cell: RwLock::new(PointCell {
                present_value: initial,
                priority_array: std::array::from_fn(|_| None),
            }),
        });
        self.by_path.insert(path, id);
        id
    }

    pub fn resolve(&self, path: &str) -> Option<PointId> {
        self.by_path.get(path).copied()
    }

    pub fn meta(&self, id: PointId) -> &PointMeta {
        &self.entries[id.0 as usize].meta
    }

    fn entry(&self, id: PointId) -> &Entry {
        &self.entries[id.0 as usize]
    }

    pub fn read_by_id(&self, id: PointId) -> Reading {
        let entry = self.entry(id);
        let cell = entry.cell.read().unwrap();
        Reading {
            path: entry.meta.path.clone(),
            effective_value: cell.effective().clone(),
            units: entry.meta.units,
            overridden: cell.overridden(),
            writable: entry.meta.writable,
            kind: entry.meta.kind,
        }
    }

    pub fn read(&self, path: &str) -> BasimResult<Reading> {
        let id = self
            .resolve(path)
            .ok_or_else(|| BasimError::UnknownPoint(path.to_string()))?;
        Ok(self.read_by_id(id))
    }

    /// Only the owning equipment model may call this (spec §4.C).
    pub fn write_present(&self, id: PointId, owner: EquipmentId, value: Value) -> BasimResult<()> {
        let entry = self.entry(id);
        if entry.meta.owner != owner {
            return Err(BasimError::NotOwner(entry.meta.path.clone()));
        }
        if !value.matches_kind(entry.meta.kind) {
            return Err(BasimError::BadType {
                path: entry.meta.path.clone(),
                detail: "present_value kind mismatch".to_string(),
            });
        }
        entry.cell.write().unwrap().present_value = value;
        Ok(())
    }

    pub fn override_point(
        &self,
        path: &str,
        value: Value,
        priority: u8,
        source: impl Into<String>,
        now: f64,
        duration_s: Option<f64>,
    ) -> BasimResult<()> {
        let id = self
            .resolve(path)
            .ok_or_else(|| BasimError::UnknownPoint(path.to_string()))?;
        self.override_by_id(id, value, priority, source, now, duration_s)
    }

    pub fn override_by_id(
        &self,
        id: PointId,
        value: Value,
        priority: u8,
        source: impl Into<String>,
        now: f64,
        duration_s: Option<f64>,
    ) -> BasimResult<()> {
        let entry = self.entry(id);
        if !entry.meta.writable {
            return Err(BasimError::NotWritable(entry.meta.path.clone()));
        }
        if priority < 1 || priority > MAX_PRIORITY {
            return Err(BasimError::BadPriority(priority));
        }
        if !value.matches_kind(entry.meta.kind) {
            return Err(BasimError::BadType {
                path: entry.meta.path.clone(),
                detail: "override value kind mismatch".to_string(),
            });
        }
        let expires_at = duration_s.map(|d| now + d);
        let mut cell = entry.cell.write().unwrap();
        cell.priority_array[(priority - 1) as usize] = Some(PrioritySlot {
            value,
            source: source.into(),
            expires_at,
        });
        Ok(())
    }

    pub fn release(&self, path: &str, priority: Option<u8>) -> BasimResult<()> {
        let id = self
            .resolve(path)
            .ok_or_else(|| BasimError::UnknownPoint(path.to_string()))?;
        self.release_by_id(id, priority)
    }

    pub fn release_by_id(&self, id: PointId, priority: Option<u8>) -> BasimResult<()> {
        let entry = self.entry(id);
        let mut cell = entry.cell.write().unwrap();
        match priority {
            Some(p) => {
                if p < 1 || p > MAX_PRIORITY {
                    return Err(BasimError::BadPriority(p));
                }
                cell.priority_array[(p - 1) as usize] = None;
            }
            None => cell.priority_array = std::array::from_fn(|_| None),
        }
        Ok(())
    }

    /// Clear any slot whose `expires_at <= now`. Called once per tick,
    /// before equipment updates (spec §4.F step 1).
    pub fn expire(&self, now: f64) {
        for entry in &self.entries {
            let mut cell = entry.cell.write().unwrap();
            for slot in cell.priority_array.iter_mut() {
                if let Some(s) = slot {
                    if s.expires_at.is_some_and(|e| e <= now) {
                        *slot = None;
                    }
                }
            }
        }
    }

    pub fn overrides(&self, path: &str) -> BasimResult<Vec<OverrideSlot>> {
        let id = self
            .resolve(path)
            .ok_or_else(|| BasimError::UnknownPoint(path.to_string()))?;
        let cell = self.entry(id).cell.read().unwrap();
        Ok(cell
            .priority_array
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref().map(|s| OverrideSlot {
                    priority: (i + 1) as u8,
                    value: s.value.clone(),
                    source: s.source.clone(),
                    expires_at: s.expires_at,
                })
            })
            .collect())
    }

    pub fn all_overrides(&self) -> HashMap<String, Vec<OverrideSlot>> {
        let mut out = HashMap::new();
        for entry in &self.entries {
            let cell = entry.cell.read().unwrap();
            if cell.overridden() {
                let slots: Vec<OverrideSlot> = cell
                    .priority_array
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| {
                        s.as_ref().map(|s| OverrideSlot {
                            priority: (i + 1) as u8,
                            value: s.value.clone(),
                            source: s.source.clone(),
                            expires_at: s.expires_at,
                        })
                    })
                    .collect();
                out.insert(entry.meta.path.clone(), slots);
            }
        }
        out
    }

    /// Point-in-time copy of every point whose path starts with `prefix`
    /// (or all points if `prefix` is `None`).
    pub fn snapshot(&self, prefix: Option<&str>) -> Snapshot {
        self.entries
            .iter()
            .filter(|e| prefix.is_none_or(|p| e.meta.path.starts_with(p)))
            .map(|e| {
                let cell = e.cell.read().unwrap();
                (
                    e.meta.path.clone(),
                    Reading {
                        path: e.meta.path.clone(),
                        effective_value: cell.effective().clone(),
                        units: e.meta.units,
                        overridden: cell.overridden(),
                        writable: e.meta.writable,
                        kind: e.meta.kind,
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle, cloned into every equipment model, protocol server and
/// the tick driver — mirrors the teacher's `AppState::clone()`-into-task
/// pattern in `main.rs`.
pub type SharedRegistry = Arc<Registry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(n: u32) -> EquipmentId {
        EquipmentId(n)
    }

    #[test]
    fn effective_value_is_lowest_priority_non_empty_slot() {
        let mut reg = Registry::new();
        let owner = eq(1);
        reg.register("Zone.temp", PointKind::Analog, "°F", true, owner, Value::Analog(72.0));
        reg.override_point("Zone.temp", Value::Analog(68.0), 10, "test", 0.0, None)
            .unwrap();
        reg.override_point("Zone.temp", Value::Analog(65.0), 4, "test", 0.0, None)
            .unwrap();
        assert_eq!(reg.read("Zone.temp").unwrap().effective_value, Value::Analog(65.0));
        reg.release("Zone.temp", Some(4)).unwrap();
        assert_eq!(reg.read("Zone.temp").unwrap().effective_value, Value::Analog(68.0));
        reg.release("Zone.temp", None).unwrap();
        assert_eq!(reg.read("Zone.temp").unwrap().effective_value, Value::Analog(72.0));
    }

    #[test]
    fn override_expires() {
        let mut reg = Registry::new();
        let owner = eq(1);
        reg.register("Zone.damper", PointKind::Analog, "%", true, owner, Value::Analog(0.0));
        reg.override_point("Zone.damper", Value::Analog(100.0), 4, "test", 0.0, Some(60.0))
            .unwrap();
        assert_eq!(reg.read("Zone.damper").unwrap().effective_value, Value::Analog(100.0));
        reg.expire(30.0);
        assert_eq!(reg.read("Zone.damper").unwrap().effective_value, Value::Analog(100.0));
        reg.expire(61.0);
        assert_eq!(reg.read("Zone.damper").unwrap().effective_value, Value::Analog(0.0));
        assert!(reg.overrides("Zone.damper").unwrap().is_empty());
    }

    #[test]
    fn ownership_is_enforced() {
        let mut reg = Registry::new();
        let owner = eq(1);
        let intruder = eq(2);
        let id = reg.register("Chiller.status", PointKind::MultiState, "", true, owner, Value::MultiState(0));
        assert!(reg.write_present(id, owner, Value::MultiState(1)).is_ok());
        assert!(matches!(
            reg.write_present(id, intruder, Value::MultiState(0)),
            Err(BasimError::NotOwner(_))
        ));
    }

    #[test]
    fn bad_priority_rejected() {
        let mut reg = Registry::new();
        reg.register("X.y", PointKind::Analog, "", true, eq(1), Value::Analog(0.0));
        assert!(matches!(
            reg.override_point("X.y", Value::Analog(1.0), 0, "t", 0.0, None),
            Err(BasimError::BadPriority(0))
        ));
        assert!(matches!(
            reg.override_point("X.y", Value::Analog(1.0), 17, "t", 0.0, None),
            Err(BasimError::BadPriority(17))
        ));
    }

    #[test]
    fn not_writable_rejected() {
        let mut reg = Registry::new();
        reg.register("X.ro", PointKind::Analog, "", false, eq(1), Value::Analog(1.0));
        assert!(matches!(
            reg.override_point("X.ro", Value::Analog(2.0), 5, "t", 0.0, None),
            Err(BasimError::NotWritable(_))
        ));
    }

    #[test]
    fn unknown_point_rejected() {
        let reg = Registry::new();
        assert!(matches!(reg.read("nope"), Err(BasimError::UnknownPoint(_))));
    }

    #[test]
    fn snapshot_filters_by_prefix() {
        let mut reg = Registry::new();
        reg.register("A.x", PointKind::Analog, "", false, eq(1), Value::Analog(1.0));
        reg.register("B.y", PointKind::Analog, "", false, eq(1), Value::Analog(2.0));
        let snap = reg.snapshot(Some("A."));
        assert_eq!(snap.len(), 1);
        assert!(snap.contains_key("A.x"));
    }
}
