//! Reference maps: which machine locations hold live references at a safepoint

use std::fmt;

use crate::codegen::{AllocatableValue, Register};
use crate::error::{JvmciError, JvmciResult};

/// A machine location, possibly a sub-word of a register or slot
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Part of a register starting at byte `offset`
    Register {
        /// The register
        register: Register,
        /// Byte offset into the register
        offset: u32,
    },
    /// Stack slot at a byte offset from the stack pointer (frame size applied)
    Stack {
        /// Byte offset from the stack pointer
        offset: i32,
    },
}

impl Location {
    /// Whether this is a register location
    pub fn is_register(&self) -> bool {
        matches!(self, Location::Register { .. })
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register { register, offset: 0 } => write!(f, "{register}"),
            Location::Register { register, offset } => write!(f, "{register}+{offset}"),
            Location::Stack { offset } => write!(f, "stack:{offset}"),
        }
    }
}

/// Live references at one safepoint; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotSpotReferenceMap {
    objects: Vec<Location>,
    derived_base: Vec<Option<Location>>,
    size_in_bytes: Vec<u8>,
    max_register_size: u32,
}

impl HotSpotReferenceMap {
    /// Locations of live references
    pub fn objects(&self) -> &[Location] {
        &self.objects
    }

    /// Base of each derived reference, `None` for plain references
    pub fn derived_base(&self) -> &[Option<Location>] {
        &self.derived_base
    }

    /// Size in bytes of each reference (4 when compressed)
    pub fn size_in_bytes(&self) -> &[u8] {
        &self.size_in_bytes
    }

    /// Largest register value live at this point, in bytes
    pub fn max_register_size(&self) -> u32 {
        self.max_register_size
    }

    /// Number of live references
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no references are live
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct LiveValue {
    value: AllocatableValue,
    base: Option<AllocatableValue>,
}

/// Accumulates live values between safepoints: `reset`, `add_live_value`*, `finish`
#[derive(Debug)]
pub struct ReferenceMapBuilder {
    total_frame_size: i32,
    values: Vec<LiveValue>,
    object_count: usize,
    max_register_size: u32,
    finished: bool,
}

impl ReferenceMapBuilder {
    /// Create a builder for a frame of `total_frame_size` bytes
    pub fn new(total_frame_size: i32) -> Self {
        ReferenceMapBuilder {
            total_frame_size,
            values: Vec::new(),
            object_count: 0,
            max_register_size: 0,
            finished: false,
        }
    }

    /// Forget all live values and start a new map
    pub fn reset(&mut self) {
        self.values.clear();
        self.object_count = 0;
        self.max_register_size = 0;
        self.finished = false;
    }

    /// Record a value live at the next safepoint
    pub fn add_live_value(&mut self, value: AllocatableValue) -> JvmciResult<()> {
        self.add(value, None)
    }

    /// Record a derived pointer together with the location of its base
    pub fn add_derived_value(&mut self, value: AllocatableValue, base: AllocatableValue) -> JvmciResult<()> {
        self.add(value, Some(base))
    }

    fn add(&mut self, value: AllocatableValue, base: Option<AllocatableValue>) -> JvmciResult<()> {
        if self.finished {
            return Err(JvmciError::InvalidState("reference map already finished; reset first".into()));
        }
        if matches!(base, Some(AllocatableValue::Illegal)) {
            return Err(JvmciError::InvalidState(format!("derived reference with an illegal base: {value:?}")));
        }
        let Some(kind) = value.kind() else {
            return Ok(());
        };

        if !kind.is_value() {
            self.object_count += if kind.unknown_reference {
                1
            } else {
                kind.reference_mask.count_ones() as usize
            };
            self.values.push(LiveValue { value, base });
        }
        if value.as_register().is_some() {
            self.max_register_size = self.max_register_size.max(kind.size_in_bytes as u32);
        }
        Ok(())
    }

    /// Build the immutable map for the values added since the last reset
    pub fn finish(&mut self) -> JvmciResult<HotSpotReferenceMap> {
        if self.finished {
            return Err(JvmciError::InvalidState("reference map already finished; reset first".into()));
        }

        let mut objects = Vec::with_capacity(self.object_count);
        let mut derived_base = Vec::with_capacity(self.object_count);
        let mut size_in_bytes = Vec::with_capacity(self.object_count);

        for live in &self.values {
            let Some(kind) = live.value.kind() else {
                continue;
            };
            if kind.unknown_reference {
                return Err(JvmciError::InvalidState(format!(
                    "unknown reference alive across safepoint: {:?}",
                    live.value
                )));
            }
            let base = match (kind.derived, live.base) {
                (true, Some(b)) => Some(self.location(&b, 0)?),
                (true, None) => {
                    return Err(JvmciError::InvalidState(format!("derived reference without base: {:?}", live.value)))
                }
                (false, _) => None,
            };
            let bytes = kind.bytes_per_element();
            for i in 0..kind.vector_length as u32 {
                if kind.is_reference(i) {
                    objects.push(self.location(&live.value, i * bytes as u32)?);
                    derived_base.push(base);
                    size_in_bytes.push(bytes as u8);
                }
            }
        }

        self.finished = true;
        Ok(HotSpotReferenceMap { objects, derived_base, size_in_bytes, max_register_size: self.max_register_size })
    }

    fn location(&self, value: &AllocatableValue, offset: u32) -> JvmciResult<Location> {
        match value {
            AllocatableValue::Register(r) => Ok(Location::Register { register: r.register, offset }),
            AllocatableValue::Stack(s) => {
                Ok(Location::Stack { offset: s.offset(self.total_frame_size) + offset as i32 })
            }
            AllocatableValue::Illegal => Err(JvmciError::InvalidState("illegal value has no location".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::amd64::{RAX, RBX, XMM0};
    use crate::codegen::LirKind;

    #[test]
    fn test_only_references_recorded() {
        let mut builder = ReferenceMapBuilder::new(64);
        builder.add_live_value(AllocatableValue::register(RAX, LirKind::reference(8))).unwrap();
        builder.add_live_value(AllocatableValue::register(RBX, LirKind::value(8))).unwrap();
        builder.add_live_value(AllocatableValue::stack(LirKind::compressed_reference(), 16, false)).unwrap();
        let map = builder.finish().unwrap();

        assert_eq!(map.objects(), &[Location::Register { register: RAX, offset: 0 }, Location::Stack { offset: 16 }]);
        assert_eq!(map.size_in_bytes(), &[8, 4]);
        assert_eq!(map.max_register_size(), 8);
    }

    #[test]
    fn test_incoming_slot_adds_frame_size() {
        let mut builder = ReferenceMapBuilder::new(96);
        builder.add_live_value(AllocatableValue::stack(LirKind::reference(8), 8, true)).unwrap();
        let map = builder.finish().unwrap();
        assert_eq!(map.objects(), &[Location::Stack { offset: 104 }]);
    }

    #[test]
    fn test_vector_elements_split() {
        let mut builder = ReferenceMapBuilder::new(0);
        builder.add_live_value(AllocatableValue::register(XMM0, LirKind::vector(8, 2, 0b11))).unwrap();
        let map = builder.finish().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.objects()[1], Location::Register { register: XMM0, offset: 8 });
        assert_eq!(map.max_register_size(), 16);
    }

    #[test]
    fn test_derived_reference_needs_base() {
        let mut builder = ReferenceMapBuilder::new(0);
        let derived = AllocatableValue::register(RBX, LirKind::derived_reference(8));
        builder.add_live_value(derived).unwrap();
        assert!(matches!(builder.finish(), Err(JvmciError::InvalidState(_))));

        builder.reset();
        builder.add_derived_value(derived, AllocatableValue::register(RAX, LirKind::reference(8))).unwrap();
        let map = builder.finish().unwrap();
        assert_eq!(map.derived_base(), &[Some(Location::Register { register: RAX, offset: 0 })]);
    }

    #[test]
    fn test_illegal_base_rejected() {
        let mut builder = ReferenceMapBuilder::new(0);
        let derived = AllocatableValue::register(RAX, LirKind::derived_reference(8));
        let result = builder.add_derived_value(derived, AllocatableValue::Illegal);
        assert!(matches!(result, Err(JvmciError::InvalidState(_))));

        let map = builder.finish().unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut builder = ReferenceMapBuilder::new(0);
        builder.add_live_value(AllocatableValue::register(RAX, LirKind::unknown_reference(8))).unwrap();
        assert!(builder.finish().is_err());
    }

    #[test]
    fn test_finished_builder_requires_reset() {
        let mut builder = ReferenceMapBuilder::new(0);
        builder.finish().unwrap();
        assert!(builder.add_live_value(AllocatableValue::register(RAX, LirKind::reference(8))).is_err());
        builder.reset();
        assert!(builder.add_live_value(AllocatableValue::register(RAX, LirKind::reference(8))).is_ok());
        assert_eq!(builder.finish().unwrap().len(), 1);
    }
}
