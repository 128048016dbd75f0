//! JSON-MARC encoding and decoding.
//!
//! The schema is a thin object form of the binary layout:
//!
//! ```json
//! {
//!   "leader": "00259nam a22001213u 4500",
//!   "fields": [
//!     {"001": "12345"},
//!     {"245": {"ind1": "1", "ind2": "0", "subfields": [{"a": "Piano /"}]}}
//!   ]
//! }
//! ```
//!
//! A data field may also map straight to a string, which lands in
//! subfield "a".

use crate::record::{Field, Record};

use serde_json::{json, Map, Value};

const LEADER_SIZE: usize = 24;

/// Parse a JSON-MARC byte payload.
pub fn from_json_bytes(bytes: &[u8]) -> Result<Record, String> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| format!("Invalid JSON-MARC: {e}"))?;
    from_json(&value)
}

fn first_char(value: Option<&Value>) -> char {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| s.chars().next())
        .unwrap_or(' ')
}

/// Parse a JSON-MARC value.
pub fn from_json(value: &Value) -> Result<Record, String> {
    let mut record = Record::new();

    if let Some(leader) = value["leader"].as_str() {
        // Tolerate sloppy leader lengths; the frame is rebuilt on
        // binary output anyway.  A leader that cannot be squared up
        // to 24 bytes is ignored in favor of the default.
        let mut leader: String = leader.chars().take(LEADER_SIZE).collect();
        while leader.len() < LEADER_SIZE {
            leader.push(' ');
        }
        if leader.len() == LEADER_SIZE {
            record.set_leader(leader)?;
        }
    }

    let Some(fields) = value["fields"].as_array() else {
        return Ok(record);
    };

    for entry in fields {
        let Some(map) = entry.as_object() else {
            return Err(format!("Invalid JSON-MARC field entry: {entry}"));
        };

        for (tag, content) in map {
            if tag.as_str() < "010" {
                let text = content.as_str().unwrap_or_default();
                record.push_field(Field::control(tag, text)?);
                continue;
            }

            let mut field = Field::data(tag)?;

            match content {
                Value::String(text) => field.push_subfield('a', text.as_str())?,
                Value::Object(complex) => {
                    field.set_indicators(
                        first_char(complex.get("ind1")),
                        first_char(complex.get("ind2")),
                    )?;

                    if let Some(subfields) = complex.get("subfields").and_then(|v| v.as_array()) {
                        for sf in subfields {
                            let Some(sf_map) = sf.as_object() else {
                                return Err(format!("Invalid JSON-MARC subfield: {sf}"));
                            };
                            for (code, sf_value) in sf_map {
                                field.push_subfield(
                                    code.chars().next().unwrap_or(' '),
                                    sf_value.as_str().unwrap_or_default(),
                                )?;
                            }
                        }
                    }
                }
                _ => return Err(format!("Invalid JSON-MARC field content: {content}")),
            }

            record.push_field(field);
        }
    }

    Ok(record)
}

impl Record {
    /// Render as a JSON-MARC value.
    pub fn to_json(&self) -> Value {
        let mut fields: Vec<Value> = Vec::new();

        for field in self.fields() {
            if let Some(content) = field.control_content() {
                fields.push(json!({ field.tag(): content }));
                continue;
            }

            let subfields: Vec<Value> = field
                .subfields()
                .iter()
                .map(|sf| json!({ sf.code().to_string(): sf.value() }))
                .collect();

            let (ind1, ind2) = field.indicators();

            let mut complex = Map::new();
            complex.insert("ind1".to_string(), json!(ind1.to_string()));
            complex.insert("ind2".to_string(), json!(ind2.to_string()));
            complex.insert("subfields".to_string(), Value::Array(subfields));

            fields.push(json!({ field.tag(): Value::Object(complex) }));
        }

        json!({
            "leader": self.leader(),
            "fields": fields,
        })
    }

    /// Render as a JSON-MARC string.
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let mut record = Record::new();
        record.push_field(Field::control("001", "12345").unwrap());

        let mut field = Field::data("245").unwrap();
        field.set_indicators('1', ' ').unwrap();
        field.push_subfield('a', "Piano /").unwrap();
        record.push_field(field);

        let parsed = from_json(&record.to_json()).unwrap();

        assert_eq!(parsed.values("245", 'a'), vec!["Piano /"]);
        assert_eq!(parsed.first_field("245").unwrap().indicators(), ('1', ' '));
        assert_eq!(parsed.control_content("001"), Some("12345"));
    }

    #[test]
    fn test_from_bytes_dispatches_on_brace() {
        let json_text = r#"{"leader": "", "fields": [{"245": "A title"}]}"#;
        let record = Record::from_bytes(json_text.as_bytes()).unwrap();

        assert_eq!(record.values("245", 'a'), vec!["A title"]);
    }

    #[test]
    fn test_string_valued_data_field() {
        let json_text = r#"{"fields": [{"020": "ISBN: 0-879-30372-7"}]}"#;
        let record = Record::from_bytes(json_text.as_bytes()).unwrap();

        assert_eq!(
            record.values("020", 'a'),
            vec!["ISBN: 0-879-30372-7"]
        );
    }
}
