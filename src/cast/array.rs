//! PostgreSQL array type and text array literal encoding.
use super::{CastError, SharedCaster, TypeCaster, TypeKind, Value};

/// Array of `element`, encoded as one `{a,b,c}` literal.
#[derive(Debug, Clone)]
pub struct ArrayCaster {
    element: SharedCaster,
    delimiter: char,
    sql_type: String,
}

impl ArrayCaster {
    pub fn new(element: SharedCaster, delimiter: char) -> Self {
        let sql_type = format!("{}[]", element.sql_type());
        Self {
            element,
            delimiter,
            sql_type,
        }
    }

    pub fn element(&self) -> &SharedCaster {
        &self.element
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Serialize every item through the element caster and encode the result.
    pub fn serialize_items(&self, items: &[Value]) -> Result<String, CastError> {
        let cast = items
            .iter()
            .map(|item| match item {
                Value::Array(inner) => self.serialize_nested(inner),
                other => self.element.serialize(other),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(encode_array(&cast, self.delimiter))
    }

    fn serialize_nested(&self, items: &[Value]) -> Result<Value, CastError> {
        items
            .iter()
            .map(|item| match item {
                Value::Array(inner) => self.serialize_nested(inner),
                other => self.element.serialize(other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

impl TypeCaster for ArrayCaster {
    fn sql_type(&self) -> &str {
        &self.sql_type
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Array
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => self.serialize_items(items).map(Value::Text),
            // already an encoded literal
            Value::Text(literal) => Ok(Value::Text(literal.clone())),
            other => Err(CastError::invalid(other, &self.sql_type)),
        }
    }
}

/// Encode already-serialized values as a PostgreSQL text array literal.
pub fn encode_array(items: &[Value], delimiter: char) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        match item {
            Value::Null => out.push_str("NULL"),
            Value::Array(inner) => out.push_str(&encode_array(inner, delimiter)),
            other => push_element(&mut out, &other.to_text().unwrap_or_default(), delimiter),
        }
    }
    out.push('}');
    out
}

fn push_element(out: &mut String, text: &str, delimiter: char) {
    if !needs_quotes(text, delimiter) {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn needs_quotes(text: &str, delimiter: char) -> bool {
    text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| c == delimiter || matches!(c, '{' | '}' | '"' | '\\') || c.is_whitespace())
}
