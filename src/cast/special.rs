//! Casters whose values have no faithful text array encoding.
use super::{CastError, TypeCaster, TypeKind, Value};

/// Binary blobs.
#[derive(Debug, Clone, Copy)]
pub struct ByteaCaster;

impl TypeCaster for ByteaCaster {
    fn sql_type(&self) -> &str {
        "bytea"
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Binary
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bytes(bytes) => Ok(Value::Bytes(bytes.clone())),
            Value::Text(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
            other => Err(CastError::invalid(other, self.sql_type())),
        }
    }
}

/// `json` / `jsonb`. Values are sent as their encoded JSON text.
#[derive(Debug, Clone, Copy)]
pub struct JsonbCaster {
    sql_type: &'static str,
}

impl JsonbCaster {
    pub fn jsonb() -> Self {
        Self { sql_type: "jsonb" }
    }

    pub fn json() -> Self {
        Self { sql_type: "json" }
    }
}

impl TypeCaster for JsonbCaster {
    fn sql_type(&self) -> &str {
        self.sql_type
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Json
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bytes(_) => Err(CastError::invalid(value, self.sql_type)),
            other => Ok(Value::Text(other.to_json().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonb_encodes_documents() {
        let caster = JsonbCaster::jsonb();
        let doc = Value::Json(serde_json::json!({"tags": ["a", "b"]}));
        assert_eq!(
            caster.serialize(&doc).unwrap(),
            Value::Text(r#"{"tags":["a","b"]}"#.into())
        );
        assert_eq!(
            caster.serialize(&Value::Text("plain".into())).unwrap(),
            Value::Text("\"plain\"".into())
        );
    }

    #[test]
    fn test_bytea_from_text() {
        assert_eq!(
            ByteaCaster.serialize(&Value::Text("ab".into())).unwrap(),
            Value::Bytes(vec![b'a', b'b'])
        );
        assert!(ByteaCaster.serialize(&Value::Integer(1)).is_err());
    }
}
