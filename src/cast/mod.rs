//! Type casters: serialize attribute values for the database and classify
//! column types.
//!
//! The compiler never constructs casters on its own except for the array
//! caster used by typed-array membership. Everything else is resolved up front
//! through a [`TypeMap`] and shared as [`SharedCaster`].
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub mod array;
pub mod scalar;
pub mod special;
pub mod value;

pub use array::{encode_array, ArrayCaster};
pub use scalar::{BooleanCaster, DateCaster, FloatCaster, IntegerCaster, TextCaster, TimestampCaster};
pub use special::{ByteaCaster, JsonbCaster};
pub use value::{json_to_value, Value};

/// Coarse classification of a caster's underlying type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Numbers, text, booleans, dates and the like.
    Scalar,
    /// Binary blobs (`bytea`).
    Binary,
    /// Semi-structured documents (`json`, `jsonb`).
    Json,
    /// Array types.
    Array,
}

/// Failure to serialize a value for its target type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    #[error("{value} is out of range for {sql_type}")]
    OutOfRange { value: String, sql_type: String },
    #[error("cannot cast {found} value {value:?} to {sql_type}")]
    Invalid {
        value: String,
        found: &'static str,
        sql_type: String,
    },
    #[error("unknown column type {0:?}")]
    UnknownType(String),
}

impl CastError {
    pub(crate) fn invalid(value: &Value, sql_type: &str) -> Self {
        Self::Invalid {
            value: value.to_text().unwrap_or_else(|| format!("{:?}", value)),
            found: value.type_name(),
            sql_type: sql_type.to_string(),
        }
    }
}

/// Serializes values of one column type into their database representation.
pub trait TypeCaster: fmt::Debug + Send + Sync {
    /// PostgreSQL name of the type, e.g. `integer` or `text[]`.
    fn sql_type(&self) -> &str;

    fn kind(&self) -> TypeKind {
        TypeKind::Scalar
    }

    /// Whether `value` can be stored in this type at all. Values that fail
    /// here can never match a row and may be dropped from membership lists.
    fn is_serializable(&self, value: &Value) -> bool {
        !matches!(self.serialize(value), Err(CastError::OutOfRange { .. }))
    }

    /// Convert `value` into the form sent to the database.
    fn serialize(&self, value: &Value) -> Result<Value, CastError>;
}

pub type SharedCaster = Arc<dyn TypeCaster>;

/// Registry of casters keyed by PostgreSQL type name.
///
/// Lookups of `name[]` produce an [`ArrayCaster`] over the element caster.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    casters: HashMap<String, SharedCaster>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Casters for the built-in PostgreSQL types understood by this crate.
    pub fn postgres() -> Self {
        let mut map = Self::new();
        map.register_alias(&["smallint", "int2"], Arc::new(IntegerCaster::new(2)));
        map.register_alias(&["integer", "int", "int4"], Arc::new(IntegerCaster::new(4)));
        map.register_alias(&["bigint", "int8"], Arc::new(IntegerCaster::new(8)));
        map.register_alias(
            &["float8", "float", "double precision", "real", "float4", "numeric"],
            Arc::new(FloatCaster),
        );
        map.register_alias(&["boolean", "bool"], Arc::new(BooleanCaster));
        map.register_alias(
            &["text", "varchar", "character varying", "citext", "uuid"],
            Arc::new(TextCaster),
        );
        map.register_alias(&["date"], Arc::new(DateCaster));
        map.register_alias(
            &["timestamp", "timestamp without time zone", "datetime"],
            Arc::new(TimestampCaster),
        );
        map.register_alias(&["bytea"], Arc::new(ByteaCaster));
        map.register_alias(&["jsonb"], Arc::new(JsonbCaster::jsonb()));
        map.register_alias(&["json"], Arc::new(JsonbCaster::json()));
        map
    }

    pub fn register(&mut self, name: &str, caster: SharedCaster) {
        self.casters.insert(normalize(name), caster);
    }

    fn register_alias(&mut self, names: &[&str], caster: SharedCaster) {
        for name in names {
            self.register(name, Arc::clone(&caster));
        }
    }

    pub fn lookup(&self, name: &str) -> Result<SharedCaster, CastError> {
        let name = normalize(name);
        if let Some(element) = name.strip_suffix("[]") {
            let element = self.lookup(element)?;
            return Ok(Arc::new(ArrayCaster::new(element, ',')));
        }
        self.casters
            .get(&name)
            .cloned()
            .ok_or(CastError::UnknownType(name))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
