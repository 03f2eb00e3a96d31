//! Strict typed access to positional records.
//!
//! A slot is read only through a [`FieldSpec`]; the spec's declared type is the
//! only accepted representation. Nothing is coerced.

use lenta_core::{DecodeError, EntityKind, FieldType};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    /// Absent index or `null` both mean "not provided".
    Optional,
}

/// One slot of a positional layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub index: usize,
    pub name: &'static str,
    pub ty: FieldType,
    pub presence: Presence,
}

impl FieldSpec {
    pub const fn required(index: usize, name: &'static str, ty: FieldType) -> Self {
        Self { index, name, ty, presence: Presence::Required }
    }

    pub const fn optional(index: usize, name: &'static str, ty: FieldType) -> Self {
        Self { index, name, ty, presence: Presence::Optional }
    }
}

/// Positional layout of one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct IndexMap {
    pub kind: EntityKind,
    pub fields: &'static [FieldSpec],
}

impl IndexMap {
    /// Validate every declared slot, reporting the lowest offending index.
    pub fn check(&self, rec: &RawRecord<'_>) -> Result<(), DecodeError> {
        let mut fields: Vec<&FieldSpec> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.index);
        for spec in fields {
            rec.slot(spec)?;
        }
        Ok(())
    }

    /// Highest index this layout reads, plus one.
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.index + 1).max().unwrap_or(0)
    }
}

fn matches_type(ty: FieldType, v: &Value) -> bool {
    match ty {
        FieldType::Int | FieldType::Flags => v.as_u64().is_some(),
        FieldType::SignedInt => v.as_i64().is_some(),
        FieldType::Str => v.is_string(),
        FieldType::List => v.is_array(),
    }
}

/// Borrowed view over one upstream record. Never leaves the decode/assemble
/// boundary.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    kind: EntityKind,
    values: &'a [Value],
}

impl<'a> RawRecord<'a> {
    pub fn new(kind: EntityKind, raw: &'a Value) -> Result<Self, DecodeError> {
        match raw.as_array() {
            Some(values) => Ok(Self { kind, values }),
            None => Err(DecodeError::NotARecord { kind }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn mismatch(&self, spec: &FieldSpec) -> DecodeError {
        DecodeError::SchemaMismatch {
            kind: self.kind,
            index: spec.index,
            field: spec.name,
            expected: spec.ty,
        }
    }

    /// Presence- and type-checked slot access.
    pub fn slot(&self, spec: &FieldSpec) -> Result<Option<&'a Value>, DecodeError> {
        match self.values.get(spec.index) {
            None | Some(Value::Null) => match spec.presence {
                Presence::Required => Err(self.mismatch(spec)),
                Presence::Optional => Ok(None),
            },
            Some(v) if matches_type(spec.ty, v) => Ok(Some(v)),
            Some(_) => Err(self.mismatch(spec)),
        }
    }

    fn read<T>(&self, spec: &FieldSpec, conv: impl FnOnce(&'a Value) -> Option<T>) -> Result<Option<T>, DecodeError> {
        match self.slot(spec)? {
            None => Ok(None),
            Some(v) => conv(v).map(Some).ok_or_else(|| self.mismatch(spec)),
        }
    }

    fn need<T>(&self, spec: &FieldSpec, v: Option<T>) -> Result<T, DecodeError> {
        v.ok_or_else(|| self.mismatch(spec))
    }

    pub fn opt_uint(&self, spec: &FieldSpec) -> Result<Option<u64>, DecodeError> {
        self.read(spec, Value::as_u64)
    }

    pub fn uint(&self, spec: &FieldSpec) -> Result<u64, DecodeError> {
        let v = self.opt_uint(spec)?;
        self.need(spec, v)
    }

    pub fn opt_int(&self, spec: &FieldSpec) -> Result<Option<i64>, DecodeError> {
        self.read(spec, Value::as_i64)
    }

    pub fn int(&self, spec: &FieldSpec) -> Result<i64, DecodeError> {
        let v = self.opt_int(spec)?;
        self.need(spec, v)
    }

    pub fn opt_str(&self, spec: &FieldSpec) -> Result<Option<&'a str>, DecodeError> {
        self.read(spec, Value::as_str)
    }

    pub fn str(&self, spec: &FieldSpec) -> Result<&'a str, DecodeError> {
        let v = self.opt_str(spec)?;
        self.need(spec, v)
    }

    pub fn flags(&self, spec: &FieldSpec) -> Result<u64, DecodeError> {
        self.uint(spec)
    }

    pub fn opt_list(&self, spec: &FieldSpec) -> Result<Option<&'a [Value]>, DecodeError> {
        self.read(spec, |v| v.as_array().map(Vec::as_slice))
    }

    pub fn list(&self, spec: &FieldSpec) -> Result<&'a [Value], DecodeError> {
        let v = self.opt_list(spec)?;
        self.need(spec, v)
    }
}
