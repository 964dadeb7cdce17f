//! Schema model (§3, §4.5): units, field types, and record layout math.

use crate::error::{Error, Result};
use crate::ids::{DataId, DeviceId};

/// SI-ish units a schema field may carry.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    None = 0,
    Degree = 1,
    Kelvin = 2,
    KilogramPerSecond = 3,
    Meter = 4,
    MeterPerSecond = 5,
    MeterPerSecondSquared = 6,
    Pascal = 7,
    Percent = 8,
    Radian = 9,
    RadianPerSecond = 10,
    Nanosecond = 11,
}

impl Unit {
    pub const fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::None,
            1 => Self::Degree,
            2 => Self::Kelvin,
            3 => Self::KilogramPerSecond,
            4 => Self::Meter,
            5 => Self::MeterPerSecond,
            6 => Self::MeterPerSecondSquared,
            7 => Self::Pascal,
            8 => Self::Percent,
            9 => Self::Radian,
            10 => Self::RadianPerSecond,
            11 => Self::Nanosecond,
            _ => return Err(Error::UnknownUnit),
        })
    }
}

/// Field value type. `Bytes` is the only variable-length type, sized 0 in
/// the descriptor (actual size determined at parse time).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Float,
    Double,
    Bytes,
}

impl FieldType {
    /// Fixed size in bytes for all types except `Bytes`, which is
    /// variable-length and always reported as size `0` in the descriptor.
    pub const fn fixed_size(self) -> u32 {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::Float => 4,
            Self::I64 | Self::U64 | Self::Double => 8,
            Self::Bytes => 0,
        }
    }

    pub const fn is_bytes(self) -> bool {
        matches!(self, Self::Bytes)
    }
}

/// One field within a schema's record layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub unit: Unit,
    pub ty: FieldType,
    /// Size in bytes; `0` for `Bytes` (variable length).
    pub size: u32,
    /// Byte offset within the record payload.
    pub offset: u32,
}

/// `{ data_id, name, fmts }` as produced by the schema source (§4.5).
///
/// Invariant (§3): at most one `Bytes` field, and if present it is last;
/// `size` of non-`Bytes` fields is fixed by type; `offset[i] = offset[i-1] +
/// size[i-1]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub data_id: DataId,
    pub name: String,
    pub fmts: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    /// Validate the bytes-field-is-last invariant, fill in implicit sizes
    /// for non-`Bytes` fields, and compute offsets. Called once by the
    /// registry during `register_driver` step 4.
    pub fn finalize(mut self) -> Result<Self> {
        let mut seen_bytes = false;
        for (i, field) in self.fmts.iter().enumerate() {
            if seen_bytes {
                return Err(Error::InvalidVal);
            }
            if field.ty.is_bytes() {
                seen_bytes = true;
                if i != self.fmts.len() - 1 {
                    return Err(Error::InvalidVal);
                }
            }
        }

        let mut offset = 0u32;
        for field in self.fmts.iter_mut() {
            if !field.ty.is_bytes() {
                field.size = field.ty.fixed_size();
            }
            field.offset = offset;
            offset = offset.saturating_add(field.size);
        }
        Ok(self)
    }

    /// Fixed-portion size in bytes (sum of all field sizes, `0` contributed
    /// by a trailing `Bytes` field).
    pub fn fixed_payload_len(&self) -> u32 {
        self.fmts.iter().map(|f| f.size).sum()
    }
}

/// Public view of a schema descriptor, as returned by `get_datadesc` (§6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataDescriptor {
    pub data_id: DataId,
    pub dev_id: DeviceId,
    pub name: String,
    pub fmts: Vec<FieldDescriptor>,
    /// Supported periods in nanoseconds; empty means "any period accepted".
    pub avail_periods: Vec<u64>,
    /// Set by the driver in `ops.datadesc` (§4.2 step 5).
    pub enabled: bool,
}

impl DataDescriptor {
    pub fn period_supported(&self, period_ns: u64) -> bool {
        self.avail_periods.is_empty() || self.avail_periods.contains(&period_ns)
    }
}
