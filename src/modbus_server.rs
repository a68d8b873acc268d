//! Modbus/TCP gateway (spec §4.H): a static register map generated at
//! assembly time from the point registry, answering function codes
//! 03/04 (read) and 06/16 (write). Grounded in the teacher's
//! `tokio_modbus::server::Service` implementation and its float-over-two-
//! registers codec, generalized from a fixed plant-metric map to every
//! point the registry exposes.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio_modbus::prelude::*;
use tokio_modbus::server::Service;
use tokio_modbus::ExceptionCode;

use crate::campus::CampusShared;
use crate::registry::{PointId, PointKind, SharedRegistry, Snapshot, Value};

const MODBUS_OVERRIDE_PRIORITY: u8 = 8;
const MODBUS_OVERRIDE_SOURCE: &str = "modbus";

/// Encode a raw f32 value into two u16 big-endian words (IEEE 754).
/// high = bits 31..16, low = bits 15..0.
fn float_to_words(v: f32) -> (u16, u16) {
    let bits = v.to_bits();
    ((bits >> 16) as u16, (bits & 0xFFFF) as u16)
}

fn words_to_float(hi: u16, lo: u16) -> f32 {
    f32::from_bits(((hi as u32) << 16) | lo as u32)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WordHalf {
    High,
    Low,
    Whole,
}

/// One holding-register address's mapping back to a point. Analog points
/// occupy two consecutive addresses (big-endian float32); binary and
/// multi-state points occupy one (`Whole`).
#[derive(Clone, Copy)]
struct RegisterMapping {
    point: PointId,
    kind: PointKind,
    word: WordHalf,
}

pub type RegisterMap = HashMap<u16, RegisterMappingEntry>;

/// Public shape the campus assembler builds without reaching into this
/// module's private word-half encoding.
#[derive(Clone, Copy)]
pub struct RegisterMappingEntry {
    pub point: PointId,
    pub kind: PointKind,
    pub high_word: bool,
}

fn resolve(entry: &RegisterMappingEntry) -> RegisterMapping {
    RegisterMapping {
        point: entry.point,
        kind: entry.kind,
        word: match entry.kind {
            PointKind::Analog => {
                if entry.high_word {
                    WordHalf::High
                } else {
                    WordHalf::Low
                }
            }
            _ => WordHalf::Whole,
        },
    }
}

/// Build the static register map (spec §4.H): one entry per scalar word,
/// assigned in registry order starting at address 0. Text points have no
/// Modbus wire representation and are skipped.
pub fn build_register_map(registry: &SharedRegistry) -> RegisterMap {
    let mut map = HashMap::new();
    let mut addr: u16 = 0;
    for raw in 0..registry.len() as u32 {
        let point = PointId(raw);
        let meta = registry.meta(point);
        match meta.kind {
            PointKind::Analog => {
                map.insert(addr, RegisterMappingEntry { point, kind: meta.kind, high_word: true });
                map.insert(addr + 1, RegisterMappingEntry { point, kind: meta.kind, high_word: false });
                addr += 2;
            }
            PointKind::Binary | PointKind::MultiState => {
                map.insert(addr, RegisterMappingEntry { point, kind: meta.kind, high_word: false });
                addr += 1;
            }
            PointKind::String => {}
        }
    }
    map
}

struct MbService {
    shared: std::sync::Arc<CampusShared>,
    map: RegisterMap,
}

impl MbService {
    /// Reads one word out of `snapshot` — the single cross-point-consistent
    /// view (spec §4.F) taken once per request in [`Self::read_block`], so a
    /// multi-register read never straddles a tick boundary.
    fn read_word(&self, addr: u16, snapshot: &Snapshot) -> Option<u16> {
        let mapping = resolve(self.map.get(&addr)?);
        let path = &self.shared.registry.meta(mapping.point).path;
        let effective_value = snapshot.get(path)?.effective_value.clone();
        Some(match mapping.word {
            WordHalf::High | WordHalf::Low => {
                let f = effective_value.as_f64().unwrap_or(0.0) as f32;
                let (hi, lo) = float_to_words(f);
                if mapping.word == WordHalf::High { hi } else { lo }
            }
            WordHalf::Whole => match effective_value {
                Value::Binary(b) => b as u16,
                Value::MultiState(n) => n as u16,
                other => other.as_f64().unwrap_or(0.0) as u16,
            },
        })
    }

    /// `06`/`16` write = `override(path, v, priority=8, source="modbus")`
    /// (spec §4.H). A 32-bit analog write must arrive as a high/low pair in
    /// the same request (real masters always send function code 16 for
    /// 32-bit types); a lone write to one half of a pair is rejected.
    fn write_word(&self, addr: u16, value: u16, pending_high: &mut Option<(u16, u16)>) -> Result<(), ExceptionCode> {
        let entry = self.map.get(&addr).ok_or(ExceptionCode::IllegalDataAddress)?;
        let mapping = resolve(entry);
        let now = self.shared.clock.sim_now();
        let path = self.shared.registry.meta(mapping.point).path.clone();

        let value_to_write = match mapping.word {
            WordHalf::High => {
                *pending_high = Some((addr, value));
                return Ok(());
            }
            WordHalf::Low => {
                let (hi_addr, hi) = pending_high.take().ok_or(ExceptionCode::IllegalDataValue)?;
                if hi_addr != addr.wrapping_sub(1) {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Value::Analog(words_to_float(hi, value) as f64)
            }
            WordHalf::Whole => match mapping.kind {
                PointKind::Binary => Value::Binary(value != 0),
                PointKind::MultiState => Value::MultiState(value as u32),
                _ => return Err(ExceptionCode::IllegalDataValue),
            },
        };

        self.shared
            .registry
            .override_point(&path, value_to_write, MODBUS_OVERRIDE_PRIORITY, MODBUS_OVERRIDE_SOURCE, now, None)
            .map_err(|e| e.modbus_exception())
    }
}

impl Service for MbService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Exception>> + Send + Sync>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let result = match req {
            Request::ReadInputRegisters(addr, cnt) => self.read_block(addr, cnt).map(Response::ReadInputRegisters),
            Request::ReadHoldingRegisters(addr, cnt) => self.read_block(addr, cnt).map(Response::ReadHoldingRegisters),
            Request::WriteSingleRegister(addr, value) => {
                let mut pending = None;
                self.write_word(addr, value, &mut pending).map(|_| Response::WriteSingleRegister(addr, value))
            }
            Request::WriteMultipleRegisters(addr, ref values) => {
                let mut pending = None;
                values
                    .iter()
                    .enumerate()
                    .try_for_each(|(i, &v)| self.write_word(addr + i as u16, v, &mut pending))
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            _ => Err(ExceptionCode::IllegalFunction),
        };
        Box::pin(async move { result })
    }
}

impl MbService {
    fn read_block(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        let snapshot = self.shared.published_snapshot();
        (0..cnt).map(|i| self.read_word(addr + i, &snapshot).ok_or(ExceptionCode::IllegalDataAddress)).collect()
    }
}

pub async fn run_server(addr: SocketAddr, shared: std::sync::Arc<CampusShared>, map: RegisterMap) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(%addr, registers = map.len(), "modbus/tcp gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = tokio_modbus::server::tcp::Server::new(listener);

    let on_connected = move |socket, peer: SocketAddr| {
        let shared = shared.clone();
        let map = map.clone();
        tracing::debug!(%peer, "modbus client connected");
        async move { Ok::<_, std::io::Error>(Some((MbService { shared, map }, socket))) }
    };

    server.serve(&on_connected, |err| tracing::warn!(?err, "modbus server error")).await?;

    Ok(())
}
