//! MARC record model.
//!
//! A record is a 24-byte leader plus one ordered field list, the way
//! the wire frames it: parse keeps directory order and rebuild emits
//! it back unchanged.  Tags addressing "00X" are control fields with
//! flat content; every other tag carries an indicator pair and coded
//! subfields.

const LEADER_LEN: usize = 24;

/// Leader applied to SUTRS (plain text) pseudo-records.
pub const SUTRS_LEADER: &str = "SUTRS";

/// Pseudo-tag carrying the text of a SUTRS record.
pub const SUTRS_TAG: &str = "TXT";

/// A three-byte field tag.
///
/// Only the byte count and ASCII-ness are enforced; out-of-range
/// tags (vendor extensions such as "DAT", or the "TXT" pseudo-tag
/// for wrapped text) frame fine and are accepted.
///
/// # Examples
///
/// ```
/// use marcrec::Tag;
///
/// assert!(Tag::new("245").unwrap() > Tag::new("100").unwrap());
/// assert!(Tag::new("008").unwrap().is_control());
/// assert!(!Tag::new("245").unwrap().is_control());
///
/// assert!(Tag::new("24").is_err());
/// assert!(Tag::new("第24").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag([u8; 3]);

impl Tag {
    pub fn new(tag: &str) -> Result<Tag, String> {
        match <[u8; 3]>::try_from(tag.as_bytes()) {
            Ok(bytes) if tag.is_ascii() => Ok(Tag(bytes)),
            _ => Err(format!("not a usable field tag: {tag:?}")),
        }
    }

    pub fn as_str(&self) -> &str {
        // Validated ASCII at construction.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// True for the "00X" tags, whose fields carry flat content.
    pub fn is_control(&self) -> bool {
        self.0.starts_with(b"00")
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One coded subfield of a data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    code: char,
    value: String,
}

impl Subfield {
    /// Codes occupy a single ASCII byte on the wire.
    pub fn new(code: char, value: impl Into<String>) -> Result<Self, String> {
        if !code.is_ascii() || code.is_ascii_control() {
            return Err(format!("not a usable subfield code: {code:?}"));
        }

        Ok(Subfield {
            code,
            value: value.into(),
        })
    }

    pub fn code(&self) -> char {
        self.code
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }
}

/// The two shapes of field content.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldBody {
    Control(String),
    Data {
        ind1: char,
        ind2: char,
        subfields: Vec<Subfield>,
    },
}

/// One field of a record.
///
/// # Examples
///
/// ```
/// use marcrec::Field;
///
/// let mut field = Field::data("245").unwrap();
/// field.push_subfield('a', "Piano /").unwrap();
/// field.push_subfield('c', "David Crombie.").unwrap();
///
/// assert_eq!(field.subfield('a'), Some("Piano /"));
/// assert_eq!(field.indicators(), (' ', ' '));
///
/// // "00X" tags are control fields and vice versa.
/// assert!(Field::data("001").is_err());
/// assert!(Field::control("245", "flat").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    tag: Tag,
    body: FieldBody,
}

impl Field {
    /// A control field with flat content.
    pub fn control(tag: &str, content: impl Into<String>) -> Result<Self, String> {
        let tag = Tag::new(tag)?;

        if !tag.is_control() {
            return Err(format!("tag {tag} does not address a control field"));
        }

        Ok(Field {
            tag,
            body: FieldBody::Control(content.into()),
        })
    }

    /// An empty data field with blank indicators.
    pub fn data(tag: &str) -> Result<Self, String> {
        let tag = Tag::new(tag)?;

        if tag.is_control() {
            return Err(format!("tag {tag} addresses a control field"));
        }

        Ok(Field {
            tag,
            body: FieldBody::Data {
                ind1: ' ',
                ind2: ' ',
                subfields: Vec::new(),
            },
        })
    }

    pub fn tag(&self) -> &str {
        self.tag.as_str()
    }

    pub(crate) fn tag_value(&self) -> Tag {
        self.tag
    }

    pub fn is_control(&self) -> bool {
        matches!(self.body, FieldBody::Control(_))
    }

    /// Flat content of a control field; None for data fields.
    pub fn control_content(&self) -> Option<&str> {
        match self.body {
            FieldBody::Control(ref content) => Some(content),
            FieldBody::Data { .. } => None,
        }
    }

    /// Indicator pair; blanks for control fields.
    pub fn indicators(&self) -> (char, char) {
        match self.body {
            FieldBody::Data { ind1, ind2, .. } => (ind1, ind2),
            FieldBody::Control(_) => (' ', ' '),
        }
    }

    /// Indicators occupy a single ASCII byte each on the wire.
    pub fn set_indicators(&mut self, i1: char, i2: char) -> Result<(), String> {
        if !i1.is_ascii() || !i2.is_ascii() {
            return Err(format!("not usable indicators: {i1:?} {i2:?}"));
        }

        if let FieldBody::Data {
            ref mut ind1,
            ref mut ind2,
            ..
        } = self.body
        {
            *ind1 = i1;
            *ind2 = i2;
        }

        Ok(())
    }

    /// Subfields in field order; empty for control fields.
    pub fn subfields(&self) -> &[Subfield] {
        match self.body {
            FieldBody::Data { ref subfields, .. } => subfields,
            FieldBody::Control(_) => &[],
        }
    }

    /// Append a subfield.  Control fields have none to append to.
    pub fn push_subfield(&mut self, code: char, value: impl Into<String>) -> Result<(), String> {
        let subfield = Subfield::new(code, value)?;

        match self.body {
            FieldBody::Data {
                ref mut subfields, ..
            } => {
                subfields.push(subfield);
                Ok(())
            }
            FieldBody::Control(_) => {
                Err(format!("control field {} has no subfields", self.tag))
            }
        }
    }

    /// Value of the first subfield with this code.
    pub fn subfield(&self, code: char) -> Option<&str> {
        self.subfields()
            .iter()
            .find(|sf| sf.code == code)
            .map(|sf| sf.value())
    }

    pub fn has_subfield(&self, code: char) -> bool {
        self.subfields().iter().any(|sf| sf.code == code)
    }

    /// Values of every subfield whose code appears in `codes`, in
    /// field order.  This is the shape the profile accessors consume.
    pub fn picked_values<'a>(&'a self, codes: &'a str) -> impl Iterator<Item = &'a str> {
        self.subfields()
            .iter()
            .filter(move |sf| codes.contains(sf.code))
            .map(|sf| sf.value())
    }
}

/// A MARC record: leader plus ordered fields.
///
/// # Examples
///
/// ```
/// use marcrec::{Field, Record};
///
/// let mut record = Record::new();
/// record.insert_field(Field::data("650").unwrap());
/// record.insert_field(Field::data("245").unwrap());
/// record.insert_field(Field::control("001", "42").unwrap());
///
/// let tags: Vec<&str> = record.fields().iter().map(|f| f.tag()).collect();
/// assert_eq!(tags, vec!["001", "245", "650"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    leader: String,
    fields: Vec<Field>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// A record with a blank leader and no fields.
    pub fn new() -> Self {
        Record {
            leader: " ".repeat(LEADER_LEN),
            fields: Vec::new(),
        }
    }

    /// Wrap a plain-text (SUTRS) record.
    ///
    /// The text rides in a single `TXT` pseudo-field and the leader
    /// carries the marker string instead of ISO 2709 framing data.
    ///
    /// # Examples
    ///
    /// ```
    /// let record = marcrec::Record::from_sutrs("title: Piano\n");
    /// assert!(record.is_sutrs());
    /// assert_eq!(record.to_sutrs().as_deref(), Some("title: Piano\n"));
    /// ```
    pub fn from_sutrs(text: &str) -> Self {
        let field = Field {
            tag: Tag(*b"TXT"),
            body: FieldBody::Data {
                ind1: ' ',
                ind2: ' ',
                subfields: vec![Subfield {
                    code: 'a',
                    value: text.to_string(),
                }],
            },
        };

        Record {
            leader: SUTRS_LEADER.to_string(),
            fields: vec![field],
        }
    }

    /// True if this record wraps SUTRS text rather than MARC data.
    pub fn is_sutrs(&self) -> bool {
        self.leader == SUTRS_LEADER
    }

    /// The wrapped text of a SUTRS record.
    pub fn to_sutrs(&self) -> Option<String> {
        if !self.is_sutrs() {
            return None;
        }

        self.value(SUTRS_TAG, 'a').map(|v| v.to_string())
    }

    pub fn leader(&self) -> &str {
        &self.leader
    }

    /// The leader is fixed at 24 bytes; anything else is refused.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut record = marcrec::Record::new();
    /// assert!(record.set_leader("short").is_err());
    /// assert!(record.set_leader("00000nam a22000000a 4500").is_ok());
    /// ```
    pub fn set_leader(&mut self, leader: impl Into<String>) -> Result<(), String> {
        let leader = leader.into();

        if leader.len() != LEADER_LEN {
            return Err(format!(
                "leader must be {LEADER_LEN} bytes, got {}",
                leader.len()
            ));
        }

        self.leader = leader;
        Ok(())
    }

    /// All fields, in record order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Vec<Field> {
        &mut self.fields
    }

    /// Append, preserving wire order.
    pub fn push_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Insert keeping the field list sorted by tag.  Records built
    /// up from column data read better that way; parsed records use
    /// [`Record::push_field`] and keep their original order.
    pub fn insert_field(&mut self, field: Field) -> usize {
        match self
            .fields
            .iter()
            .position(|f| f.tag_value() > field.tag_value())
        {
            Some(idx) => {
                self.fields.insert(idx, field);
                idx
            }
            None => {
                self.fields.push(field);
                self.fields.len() - 1
            }
        }
    }

    pub fn fields_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Field> {
        self.fields.iter().filter(move |f| f.tag() == tag)
    }

    pub fn first_field(&self, tag: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag() == tag)
    }

    /// Content of the first control field with this tag.
    pub fn control_content<'a>(&'a self, tag: &'a str) -> Option<&'a str> {
        self.fields_with_tag(tag).find_map(|f| f.control_content())
    }

    /// First value of `code` under the first `tag` field.
    pub fn value(&self, tag: &str, code: char) -> Option<&str> {
        self.first_field(tag).and_then(|f| f.subfield(code))
    }

    /// Every value of `code` under every `tag` field, in record
    /// order.
    ///
    /// # Examples
    ///
    /// ```
    /// use marcrec::{Field, Record};
    ///
    /// let mut record = Record::new();
    /// for term in ["foo", "bar"] {
    ///     let mut field = Field::data("650").unwrap();
    ///     field.push_subfield('a', term).unwrap();
    ///     record.push_field(field);
    /// }
    ///
    /// assert_eq!(record.values("650", 'a'), vec!["foo", "bar"]);
    /// ```
    pub fn values<'a>(&'a self, tag: &'a str, code: char) -> Vec<&'a str> {
        self.fields_with_tag(tag)
            .flat_map(|f| f.subfields().iter())
            .filter(|sf| sf.code() == code)
            .map(|sf| sf.value())
            .collect()
    }
}
