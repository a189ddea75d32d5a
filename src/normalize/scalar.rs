//! Scalar BSON value conversion
//!
//! Turns a single non-structured BSON value into the text that lands in an
//! output cell. Structured values (documents, arrays) are resolved by the
//! normalizer before they get here.

use bson::{Binary, Bson, DateTime, Decimal128, Regex, Timestamp, oid::ObjectId};

/// Core trait for BSON value conversion
pub trait BsonConverter {
    /// Output type of the conversion
    type Output;

    /// Convert a BSON value to the output type
    fn convert(&self, value: &Bson) -> Self::Output;

    /// Convert an optional BSON value
    ///
    /// Absent values convert to the output's default.
    fn convert_optional(&self, value: Option<&Bson>) -> Self::Output
    where
        Self::Output: Default,
    {
        value.map(|v| self.convert(v)).unwrap_or_default()
    }
}

/// Plain text converter for exported cells
///
/// Falsy values (`null`, `undefined`, `false`, empty string) become empty
/// cells. Numbers keep their digits, zero included.
pub struct PlainTextConverter;

impl PlainTextConverter {
    /// Create a new plain text converter
    pub fn new() -> Self {
        Self
    }

    fn format_double(&self, f: f64) -> String {
        if f.is_nan() {
            return String::new();
        }
        if f.fract() == 0.0 && f.abs() < 1e15 {
            format!("{:.0}", f)
        } else {
            f.to_string()
        }
    }

    fn format_object_id(&self, oid: &ObjectId) -> String {
        oid.to_hex()
    }

    fn format_datetime(&self, dt: &DateTime) -> String {
        dt.try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string())
    }

    fn format_decimal128(&self, d: &Decimal128) -> String {
        d.to_string()
    }

    fn format_binary(&self, bin: &Binary) -> String {
        hex::encode(&bin.bytes)
    }

    fn format_regex(&self, regex: &Regex) -> String {
        format!("/{}/{}", regex.pattern, regex.options)
    }

    fn format_timestamp(&self, ts: &Timestamp) -> String {
        format!("Timestamp({}, {})", ts.time, ts.increment)
    }
}

impl Default for PlainTextConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl BsonConverter for PlainTextConverter {
    type Output = String;

    fn convert(&self, value: &Bson) -> String {
        match value {
            Bson::String(s) => s.clone(),
            Bson::Int32(n) => n.to_string(),
            Bson::Int64(n) => n.to_string(),
            Bson::Double(f) => self.format_double(*f),
            Bson::Boolean(true) => "true".to_string(),
            Bson::Boolean(false) | Bson::Null | Bson::Undefined => String::new(),
            Bson::ObjectId(oid) => self.format_object_id(oid),
            Bson::DateTime(dt) => self.format_datetime(dt),
            Bson::Decimal128(d) => self.format_decimal128(d),
            Bson::Binary(bin) => self.format_binary(bin),
            Bson::RegularExpression(regex) => self.format_regex(regex),
            Bson::Timestamp(ts) => self.format_timestamp(ts),
            Bson::Symbol(s) => s.clone(),
            // Documents, arrays and code blocks have no scalar form.
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::spec::BinarySubtype;

    #[test]
    fn test_scalars_stringify_verbatim() {
        let converter = PlainTextConverter::new();
        assert_eq!(converter.convert(&Bson::String("article #00001".into())), "article #00001");
        assert_eq!(converter.convert(&Bson::Int32(42)), "42");
        assert_eq!(converter.convert(&Bson::Int64(-7)), "-7");
        assert_eq!(converter.convert(&Bson::Double(2.5)), "2.5");
        assert_eq!(converter.convert(&Bson::Double(3.0)), "3");
        assert_eq!(converter.convert(&Bson::Boolean(true)), "true");
    }

    #[test]
    fn test_falsy_values_are_empty() {
        let converter = PlainTextConverter::new();
        assert_eq!(converter.convert(&Bson::Null), "");
        assert_eq!(converter.convert(&Bson::Undefined), "");
        assert_eq!(converter.convert(&Bson::Boolean(false)), "");
        assert_eq!(converter.convert(&Bson::String(String::new())), "");
        assert_eq!(converter.convert_optional(None), "");
        // Zero is data, not absence.
        assert_eq!(converter.convert(&Bson::Int32(0)), "0");
    }

    #[test]
    fn test_typed_scalars() {
        let converter = PlainTextConverter::new();

        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        assert_eq!(converter.convert(&Bson::ObjectId(oid)), "65a1b2c3d4e5f60718293a4b");

        let dt = DateTime::from_millis(0);
        assert_eq!(converter.convert(&Bson::DateTime(dt)), "1970-01-01T00:00:00Z");

        let bin = Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![0x01, 0x02, 0xff],
        };
        assert_eq!(converter.convert(&Bson::Binary(bin)), "0102ff");
    }

    #[test]
    fn test_structured_values_have_no_scalar_form() {
        let converter = PlainTextConverter::new();
        assert_eq!(converter.convert(&Bson::Array(vec![Bson::Int32(1)])), "");
        assert_eq!(converter.convert(&Bson::Document(bson::doc! { "a": 1 })), "");
    }
}
