//! Type rules: which types may be keys, which take parameters, and how
//! defaults are coerced.

use crate::{ColumnType, PgType};

impl PgType {
    /// Types whose values have no usable equality for a primary key.
    fn is_unkeyable(&self) -> bool {
        matches!(
            self,
            PgType::Point
                | PgType::Line
                | PgType::Lseg
                | PgType::Box
                | PgType::Path
                | PgType::Polygon
                | PgType::Circle
                | PgType::Json
                | PgType::Jsonb
                | PgType::Xml
                | PgType::TxidSnapshot
                | PgType::PgSnapshot
        )
    }

    pub fn can_be_primary(&self) -> bool {
        !self.is_unkeyable()
    }

    /// Serial types are always primary, so they can't be unique on their own.
    pub fn can_be_unique(&self) -> bool {
        !self.is_unkeyable() && !self.is_serial()
    }

    pub fn is_serial(&self) -> bool {
        matches!(
            self,
            PgType::SmallSerial | PgType::Serial | PgType::BigSerial
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_serial() || matches!(self, PgType::SmallInt | PgType::Integer | PgType::BigInt)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            PgType::Real | PgType::DoublePrecision | PgType::Numeric
        )
    }

    pub fn is_json(&self) -> bool {
        matches!(self, PgType::Json | PgType::Jsonb)
    }

    pub fn requires_length(&self) -> bool {
        matches!(
            self,
            PgType::Varchar | PgType::Char | PgType::Bit | PgType::Varbit
        )
    }

    pub fn requires_precision(&self) -> bool {
        matches!(self, PgType::Numeric)
    }

    pub fn requires_scale(&self) -> bool {
        matches!(self, PgType::Numeric)
    }

    /// The serial variant backing an integer type with a sequence default.
    pub fn to_serial(&self) -> Option<PgType> {
        match self {
            PgType::SmallInt | PgType::SmallSerial => Some(PgType::SmallSerial),
            PgType::Integer | PgType::Serial => Some(PgType::Serial),
            PgType::BigInt | PgType::BigSerial => Some(PgType::BigSerial),
            _ => None,
        }
    }
}

impl ColumnType {
    pub fn can_be_primary(&self) -> bool {
        self.pg_type().is_none_or(|t| t.can_be_primary())
    }

    pub fn can_be_unique(&self) -> bool {
        self.pg_type().is_none_or(|t| t.can_be_unique())
    }

    pub fn is_serial(&self) -> bool {
        self.pg_type().is_some_and(|t| t.is_serial())
    }

    /// Length/precision parameters only appear on types that take them.
    pub fn has_valid_parameters(&self) -> bool {
        match self {
            ColumnType::Basic { .. } | ColumnType::Enum { .. } => true,
            ColumnType::Scalable { name, .. } => name.requires_precision(),
            ColumnType::VariableLength { name, .. } => name.requires_length(),
        }
    }
}
