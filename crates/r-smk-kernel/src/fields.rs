//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Published fields and the publication registry."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::{KernelError, Result};
use crate::services::{StorageReader, StorageWriter};

/// Scalar kinds a published field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum FieldKind {
    /// `bool`, encoded as one byte (0 or 1).
    Bool,
    /// `i8`.
    I8,
    /// `i16`.
    I16,
    /// `i32`.
    I32,
    /// `i64`.
    I64,
    /// `u8`.
    U8,
    /// `u16`.
    U16,
    /// `u32`.
    U32,
    /// `u64`.
    U64,
    /// `f32`.
    F32,
    /// `f64`.
    F64,
}

impl FieldKind {
    /// Width of the encoded value in bytes.
    pub fn width(&self) -> usize {
        match self {
            FieldKind::Bool | FieldKind::I8 | FieldKind::U8 => 1,
            FieldKind::I16 | FieldKind::U16 => 2,
            FieldKind::I32 | FieldKind::U32 | FieldKind::F32 => 4,
            FieldKind::I64 | FieldKind::U64 | FieldKind::F64 => 8,
        }
    }
}

/// A scalar value read from or written to a published field.
///
/// Values carry a fixed little-endian byte encoding so Store/Restore passes
/// replay exactly the spans they wrote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Boolean value.
    Bool(bool),
    /// Signed 8-bit value.
    I8(i8),
    /// Signed 16-bit value.
    I16(i16),
    /// Signed 32-bit value.
    I32(i32),
    /// Signed 64-bit value.
    I64(i64),
    /// Unsigned 8-bit value.
    U8(u8),
    /// Unsigned 16-bit value.
    U16(u16),
    /// Unsigned 32-bit value.
    U32(u32),
    /// Unsigned 64-bit value.
    U64(u64),
    /// 32-bit float value.
    F32(f32),
    /// 64-bit float value.
    F64(f64),
}

impl FieldValue {
    /// The kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::I8(_) => FieldKind::I8,
            FieldValue::I16(_) => FieldKind::I16,
            FieldValue::I32(_) => FieldKind::I32,
            FieldValue::I64(_) => FieldKind::I64,
            FieldValue::U8(_) => FieldKind::U8,
            FieldValue::U16(_) => FieldKind::U16,
            FieldValue::U32(_) => FieldKind::U32,
            FieldValue::U64(_) => FieldKind::U64,
            FieldValue::F32(_) => FieldKind::F32,
            FieldValue::F64(_) => FieldKind::F64,
        }
    }

    /// Encode the value as little-endian bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            FieldValue::Bool(v) => vec![u8::from(*v)],
            FieldValue::I8(v) => v.to_le_bytes().to_vec(),
            FieldValue::I16(v) => v.to_le_bytes().to_vec(),
            FieldValue::I32(v) => v.to_le_bytes().to_vec(),
            FieldValue::I64(v) => v.to_le_bytes().to_vec(),
            FieldValue::U8(v) => v.to_le_bytes().to_vec(),
            FieldValue::U16(v) => v.to_le_bytes().to_vec(),
            FieldValue::U32(v) => v.to_le_bytes().to_vec(),
            FieldValue::U64(v) => v.to_le_bytes().to_vec(),
            FieldValue::F32(v) => v.to_le_bytes().to_vec(),
            FieldValue::F64(v) => v.to_le_bytes().to_vec(),
        }
    }

    /// Decode a value of `kind` from little-endian bytes.
    ///
    /// Returns `None` when the span length does not match the kind's width.
    pub fn decode(kind: FieldKind, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != kind.width() {
            return None;
        }
        Some(match kind {
            FieldKind::Bool => FieldValue::Bool(bytes[0] != 0),
            FieldKind::I8 => FieldValue::I8(i8::from_le_bytes([bytes[0]])),
            FieldKind::I16 => FieldValue::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
            FieldKind::I32 => {
                FieldValue::I32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldKind::I64 => FieldValue::I64(i64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            FieldKind::U8 => FieldValue::U8(bytes[0]),
            FieldKind::U16 => FieldValue::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            FieldKind::U32 => {
                FieldValue::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldKind::U64 => FieldValue::U64(u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            FieldKind::F32 => {
                FieldValue::F32(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldKind::F64 => FieldValue::F64(f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
        })
    }
}

/// Flags describing how a published field participates in the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    /// Part of persistable simulation state, included in Store/Restore.
    pub state: bool,
    /// Written by the environment.
    pub input: bool,
    /// Read by the environment.
    pub output: bool,
}

impl FieldFlags {
    /// A state-tagged output field, the common case for model telemetry.
    pub fn state_output() -> Self {
        Self {
            state: true,
            input: false,
            output: true,
        }
    }
}

/// Shared access to a published scalar.
///
/// Models keep a clone of the accessor and mutate through it from their
/// entry-point closures; the kernel reads and writes through the same handle
/// during Store/Restore.
pub trait FieldAccess: Send + Sync {
    /// Kind of the value behind this accessor.
    fn kind(&self) -> FieldKind;
    /// Read the current value.
    fn read(&self) -> FieldValue;
    /// Replace the current value; fails when the kind does not match.
    fn write(&self, value: FieldValue) -> Result<()>;
}

/// Rust scalars publishable through a [`ScalarField`].
pub trait Scalar: Copy + Send + 'static {
    /// The field kind corresponding to `Self`.
    const KIND: FieldKind;
    /// Wrap into a [`FieldValue`].
    fn to_value(self) -> FieldValue;
    /// Unwrap from a [`FieldValue`] of the matching kind.
    fn from_value(value: FieldValue) -> Option<Self>;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(impl Scalar for $ty {
            const KIND: FieldKind = FieldKind::$variant;

            fn to_value(self) -> FieldValue {
                FieldValue::$variant(self)
            }

            fn from_value(value: FieldValue) -> Option<Self> {
                match value {
                    FieldValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        })+
    };
}

impl_scalar!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

/// The ready-made [`FieldAccess`] implementation for a single scalar.
pub struct ScalarField<T: Scalar> {
    value: Mutex<T>,
}

impl<T: Scalar> ScalarField<T> {
    /// Create a shared field handle with an initial value.
    pub fn new(initial: T) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(initial),
        })
    }

    /// Current value.
    pub fn get(&self) -> T {
        *self.value.lock()
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        *self.value.lock() = value;
    }

    /// Apply `f` to the value under the lock, returning the new value.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        let mut guard = self.value.lock();
        *guard = f(*guard);
        *guard
    }
}

impl<T: Scalar> FieldAccess for ScalarField<T> {
    fn kind(&self) -> FieldKind {
        T::KIND
    }

    fn read(&self) -> FieldValue {
        self.get().to_value()
    }

    fn write(&self, value: FieldValue) -> Result<()> {
        let actual = value.kind();
        match T::from_value(value) {
            Some(v) => {
                self.set(v);
                Ok(())
            }
            None => Err(KernelError::FieldTypeMismatch {
                expected: T::KIND,
                actual,
            }),
        }
    }
}

impl<T: Scalar + fmt::Debug> fmt::Debug for ScalarField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarField")
            .field("value", &self.get())
            .finish()
    }
}

/// A field published by a model.
#[derive(Clone)]
pub struct Field {
    owner: String,
    name: String,
    description: String,
    flags: FieldFlags,
    access: Arc<dyn FieldAccess>,
}

impl Field {
    /// Describe a published field backed by `access`.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        flags: FieldFlags,
        access: Arc<dyn FieldAccess>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            description: description.into(),
            flags,
            access,
        }
    }

    /// Owning component.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Field name within the owner.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Participation flags.
    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    /// Kind of the published value.
    pub fn kind(&self) -> FieldKind {
        self.access.kind()
    }

    /// `owner.name`, unique across the registry.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Read the current value through the accessor.
    pub fn read(&self) -> FieldValue {
        self.access.read()
    }

    /// Write a value through the accessor.
    pub fn write(&self, value: FieldValue) -> Result<()> {
        self.access.write(value)
    }

    /// Write this field's encoded span to a storage writer.
    pub(crate) fn store(&self, writer: &mut dyn StorageWriter) -> Result<()> {
        writer.store(&self.read().encode())
    }

    /// Read back exactly the span this field stores and apply it.
    pub(crate) fn restore(&self, reader: &mut dyn StorageReader) -> Result<()> {
        let kind = self.kind();
        let mut buf = vec![0u8; kind.width()];
        reader.restore(&mut buf)?;
        let value =
            FieldValue::decode(kind, &buf).ok_or_else(|| KernelError::InvalidFieldSpan {
                field: self.qualified_name(),
                expected: kind.width(),
                actual: buf.len(),
            })?;
        self.access.write(value)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Receiver models publish their fields against during the Publishing phase.
pub trait Publication {
    /// Register a field; fails with [`KernelError::DuplicateField`] when the
    /// qualified name is already taken.
    fn publish_field(&mut self, field: Field) -> Result<()>;
}

/// The kernel's field registry: publication order preserved, qualified names
/// unique.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    fields: IndexMap<String, Field>,
}

impl FieldRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of published fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field has been published yet.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields in publication order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// State-tagged fields in publication order; this is the Store/Restore
    /// traversal.
    pub fn state_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| f.flags().state)
    }

    /// Look up a field by owner and name.
    pub fn field(&self, owner: &str, name: &str) -> Option<&Field> {
        self.fields.get(&format!("{owner}.{name}"))
    }
}

impl Publication for FieldRegistry {
    fn publish_field(&mut self, field: Field) -> Result<()> {
        let key = field.qualified_name();
        if self.fields.contains_key(&key) {
            return Err(KernelError::DuplicateField {
                owner: field.owner().to_owned(),
                name: field.name().to_owned(),
            });
        }
        tracing::debug!(field = %key, kind = %field.kind(), "field published");
        self.fields.insert(key, field);
        Ok(())
    }
}
