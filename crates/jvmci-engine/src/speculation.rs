//! Speculation log
//!
//! A compilation records every assumption it bakes into code as a
//! [`SpeculationReason`]. Each reason is encoded to bytes and appended to the
//! log once; the (offset, length) of the encoding is the id embedded in the
//! emitted code. When the host deoptimizes on a failed speculation it adds
//! the encoding to the method's failed-speculations list, and later logs for
//! that method refuse to speculate on it again.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::bridge::CompilerToVm;
use crate::error::{JvmciError, JvmciResult};
use crate::meta::{Cleanable, HandleKind, JavaConstant, KlassPointer, MetadataContext, MethodPointer};

/// Encodings longer than this are replaced by their SHA-256 digest
pub const MAX_RAW_ENCODING: usize = 256;

const RAW_ENCODING: u8 = 0;
const DIGEST_ENCODING: u8 = 1;

/// One component of a speculation reason
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReasonPart {
    /// `int` value
    Int(i32),
    /// `long` value
    Long(i64),
    /// String, encoded as UTF-8 with a length prefix
    String(String),
    /// Method, encoded as its native handle
    Method(MethodPointer),
    /// Type, encoded as its native handle
    Type(KlassPointer),
}

/// A speculation made by the compiler, identified by group and parts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpeculationReason {
    group_id: u32,
    group_name: String,
    parts: Vec<ReasonPart>,
}

impl SpeculationReason {
    /// Empty reason in a group
    pub fn new(group_id: u32, group_name: impl Into<String>) -> Self {
        SpeculationReason { group_id, group_name: group_name.into(), parts: Vec::new() }
    }

    /// Append a part
    pub fn with(mut self, part: ReasonPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Group id
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    /// Group name, for diagnostics only
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Parts in order
    pub fn parts(&self) -> &[ReasonPart] {
        &self.parts
    }

    /// Byte encoding used for deduplication and failure matching
    ///
    /// The group name is not encoded; reasons with equal id and parts are the
    /// same speculation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![RAW_ENCODING];
        out.extend_from_slice(&self.group_id.to_be_bytes());
        for part in &self.parts {
            match part {
                ReasonPart::Int(v) => {
                    out.push(b'I');
                    out.extend_from_slice(&v.to_be_bytes());
                }
                ReasonPart::Long(v) => {
                    out.push(b'J');
                    out.extend_from_slice(&v.to_be_bytes());
                }
                ReasonPart::String(s) => {
                    out.push(b'S');
                    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                ReasonPart::Method(m) => {
                    out.push(b'M');
                    out.extend_from_slice(&m.raw().to_be_bytes());
                }
                ReasonPart::Type(t) => {
                    out.push(b'T');
                    out.extend_from_slice(&t.raw().to_be_bytes());
                }
            }
        }
        if out.len() > MAX_RAW_ENCODING {
            let mut digest = vec![DIGEST_ENCODING];
            digest.extend_from_slice(&Sha256::digest(&out));
            return digest;
        }
        out
    }
}

/// Position of an encoding in a log's flattened buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SpeculationId {
    /// Byte offset
    pub offset: u32,
    /// Encoding length
    pub length: u32,
}

impl SpeculationId {
    /// Pack into the `long` constant embedded in code
    pub fn to_constant(self) -> JavaConstant {
        JavaConstant::Long(((self.offset as i64) << 32) | self.length as i64)
    }

    /// Unpack from an embedded constant
    pub fn from_constant(constant: &JavaConstant) -> Option<SpeculationId> {
        match constant {
            JavaConstant::Long(v) => Some(SpeculationId { offset: (*v >> 32) as u32, length: *v as u32 }),
            _ => None,
        }
    }
}

/// A recorded speculation
#[derive(Debug, Clone, PartialEq)]
pub struct Speculation {
    /// Where the encoding lives in the log
    pub id: SpeculationId,
    /// What was assumed
    pub reason: SpeculationReason,
}

impl Speculation {
    /// Constant to embed in code
    pub fn constant(&self) -> JavaConstant {
        self.id.to_constant()
    }
}

#[derive(Default)]
struct LogState {
    buffer: Vec<u8>,
    ids: FxHashMap<Vec<u8>, SpeculationId>,
    reasons: FxHashMap<SpeculationId, SpeculationReason>,
    closed: bool,
}

/// Per-compilation speculation log
pub struct HotSpotSpeculationLog {
    c2v: Arc<CompilerToVm>,
    failed_list: u64,
    /// Present when this log allocated the failed-speculations list
    _owned_list: Option<Cleanable>,
    /// Failed encodings as of construction
    failed: FxHashSet<Vec<u8>>,
    state: Mutex<LogState>,
}

impl HotSpotSpeculationLog {
    /// Log owning a fresh failed-speculations list, freed after the log is dropped and swept
    pub fn new(ctx: &MetadataContext) -> Self {
        let c2v = ctx.compiler_to_vm().clone();
        let list = c2v.allocate_failed_speculations_list();
        let pin = ctx.cleaner().register(HandleKind::FailedSpeculations, list);
        Self::build(c2v, list, Some(pin))
    }

    /// Log observing a list owned elsewhere, typically by a method in the host
    pub fn observing(ctx: &MetadataContext, failed_list: u64) -> Self {
        Self::build(ctx.compiler_to_vm().clone(), failed_list, None)
    }

    fn build(c2v: Arc<CompilerToVm>, failed_list: u64, owned: Option<Cleanable>) -> Self {
        let failed: FxHashSet<Vec<u8>> = c2v.get_failed_speculations(failed_list).into_iter().collect();
        debug!(list = failed_list, failed = failed.len(), "speculation log created");
        HotSpotSpeculationLog { c2v, failed_list, _owned_list: owned, failed, state: Mutex::new(LogState::default()) }
    }

    /// Address of the failed-speculations list passed to code installation
    pub fn failed_speculations_address(&self) -> u64 {
        self.failed_list
    }

    /// Whether `reason` has not already failed
    pub fn may_speculate(&self, reason: &SpeculationReason) -> bool {
        !self.failed.contains(&reason.encode())
    }

    /// Record `reason`, returning the id to embed
    ///
    /// Reasons with identical encodings share one id and the reason recorded
    /// first. Fails if the reason is
    /// known to have failed or the log is closed.
    pub fn speculate(&self, reason: SpeculationReason) -> JvmciResult<Speculation> {
        let encoding = reason.encode();
        if self.failed.contains(&encoding) {
            return Err(JvmciError::InvalidState(format!("speculation in group {} already failed", reason.group_name)));
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(JvmciError::InvalidState("speculation log is closed".into()));
        }
        if let Some(&id) = state.ids.get(&encoding) {
            let recorded = state.reasons.get(&id).cloned().unwrap_or(reason);
            return Ok(Speculation { id, reason: recorded });
        }

        let id = SpeculationId { offset: state.buffer.len() as u32, length: encoding.len() as u32 };
        state.buffer.extend_from_slice(&encoding);
        state.ids.insert(encoding, id);
        state.reasons.insert(id, reason.clone());
        Ok(Speculation { id, reason })
    }

    /// Speculation for an embedded id constant
    pub fn lookup_speculation(&self, constant: &JavaConstant) -> Option<Speculation> {
        let id = SpeculationId::from_constant(constant)?;
        let state = self.state.lock();
        state.reasons.get(&id).map(|reason| Speculation { id, reason: reason.clone() })
    }

    /// Whether anything was recorded
    pub fn has_speculations(&self) -> bool {
        !self.state.lock().buffer.is_empty()
    }

    /// Unique encodings, concatenated in the order first recorded
    pub fn flattened_encodings(&self) -> Vec<u8> {
        self.state.lock().buffer.clone()
    }

    /// Stop accepting speculations; lookups keep working
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Whether [`HotSpotSpeculationLog::close`] was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Record a speculation as failed in the host list, as deoptimization does
    ///
    /// Returns false if the encoding was already listed. This log's own view
    /// of failures does not change.
    pub fn add_failed_speculation(&self, speculation: &Speculation) -> JvmciResult<bool> {
        let encoding = {
            let state = self.state.lock();
            let start = speculation.id.offset as usize;
            let end = start + speculation.id.length as usize;
            state
                .buffer
                .get(start..end)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| JvmciError::InvalidState("speculation not recorded in this log".into()))?
        };
        self.c2v.add_failed_speculation(self.failed_list, &encoding)
    }

    /// Number of failures known when the log was created
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

impl fmt::Debug for HotSpotSpeculationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let mut ids: Vec<_> = state.ids.values().collect();
        ids.sort_by_key(|id| id.offset);
        let encodings: Vec<String> = ids
            .iter()
            .map(|id| hex::encode(&state.buffer[id.offset as usize..(id.offset + id.length) as usize]))
            .collect();
        f.debug_struct("HotSpotSpeculationLog")
            .field("failed_list", &format_args!("{:#x}", self.failed_list))
            .field("failed", &self.failed.len())
            .field("encodings", &encodings)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_is_tagged() {
        let reason = SpeculationReason::new(3, "NullCheck")
            .with(ReasonPart::Method(MethodPointer::new(0x1000)))
            .with(ReasonPart::Int(42));
        let bytes = reason.encode();
        assert_eq!(bytes[0], RAW_ENCODING);
        assert_eq!(&bytes[1..5], &3u32.to_be_bytes());
        assert_eq!(bytes[5], b'M');
        assert_eq!(&bytes[6..14], &0x1000u64.to_be_bytes());
        assert_eq!(bytes[14], b'I');
        assert_eq!(&bytes[15..19], &42i32.to_be_bytes());
        assert_eq!(bytes.len(), 19);
    }

    #[test]
    fn test_group_name_not_encoded() {
        let a = SpeculationReason::new(1, "a").with(ReasonPart::Long(7));
        let b = SpeculationReason::new(1, "b").with(ReasonPart::Long(7));
        assert_eq!(a.encode(), b.encode());
        assert_ne!(a.encode(), SpeculationReason::new(2, "a").with(ReasonPart::Long(7)).encode());
    }

    #[test]
    fn test_long_reason_is_digested() {
        let reason = SpeculationReason::new(1, "big").with(ReasonPart::String("x".repeat(400)));
        let bytes = reason.encode();
        assert_eq!(bytes.len(), 1 + 32);
        assert_eq!(bytes[0], DIGEST_ENCODING);
        assert_eq!(bytes, reason.clone().encode());
        let other = SpeculationReason::new(1, "big").with(ReasonPart::String("y".repeat(400)));
        assert_ne!(bytes, other.encode());
    }

    #[test]
    fn test_id_constant_round_trip() {
        let id = SpeculationId { offset: 123, length: 19 };
        assert_eq!(SpeculationId::from_constant(&id.to_constant()), Some(id));
        assert_eq!(SpeculationId::from_constant(&JavaConstant::Int(1)), None);
    }
}
