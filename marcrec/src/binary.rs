//! ISO 2709 binary encoding and decoding.

use crate::json;
use crate::record::{Field, Record, Tag};
use crate::text;

const END_OF_FIELD: u8 = 30; // '\x1E'
const END_OF_RECORD: u8 = 29; // '\x1D'
const RECORD_SIZE_ENTRY: usize = 5;
const LEADER_SIZE: usize = 24;
const DATA_OFFSET_START: usize = 12;
const DATA_OFFSET_SIZE: usize = 5;
const DATA_LENGTH_SIZE: usize = 4;
const DIRECTORY_ENTRY_LEN: usize = 12;
const SUBFIELD_SEPARATOR: char = '\x1F';
const MAX_RECORD_BYTES: usize = 99999;

/// Zero-padded decimal in a directory or leader slot.
fn framing_number(bytes: &[u8]) -> Result<usize, String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| format!("framing bytes are not a number: {bytes:?} {e}"))?;

    text.trim()
        .parse::<usize>()
        .map_err(|e| format!("framing bytes are not a number: {text:?} {e}"))
}

/// One 12-byte directory entry: tag(3) | length(4) | offset(5), with
/// the offset relative to the data area.
///
/// # References
///
/// * <https://www.loc.gov/marc/bibliographic/bddirectory.html>
struct DirectoryEntry {
    tag: Tag,
    start: usize,
    end: usize,
}

impl DirectoryEntry {
    fn parse(entry: &[u8], data_start: usize) -> Result<Self, String> {
        let tag = std::str::from_utf8(&entry[0..3])
            .map_err(|e| format!("directory tag is not text: {e}"))?;

        let length = framing_number(&entry[3..3 + DATA_LENGTH_SIZE])?;
        let offset = framing_number(&entry[3 + DATA_LENGTH_SIZE..])?;

        if length == 0 {
            return Err(format!("zero-length directory entry for tag={tag}"));
        }

        let start = data_start + offset;

        Ok(DirectoryEntry {
            tag: Tag::new(tag)?,
            start,
            // The trailing END_OF_FIELD byte is framing, not content.
            end: start + length - 1,
        })
    }
}

impl Record {
    /// Parse a record from bytes.
    ///
    /// A leading `{` selects the JSON-MARC parser; anything else is
    /// treated as ISO 2709.
    pub fn from_bytes(bytes: &[u8]) -> Result<Record, String> {
        if bytes.first() == Some(&b'{') {
            json::from_json_bytes(bytes)
        } else {
            Record::from_binary(bytes)
        }
    }

    /// Creates a single MARC Record from a series of ISO 2709 bytes.
    ///
    /// # References
    ///
    /// * <https://www.loc.gov/marc/bibliographic/bdleader.html>
    /// * <https://www.loc.gov/marc/bibliographic/bddirectory.html>
    pub fn from_binary(rec_bytes: &[u8]) -> Result<Record, String> {
        if rec_bytes.len() < LEADER_SIZE {
            return Err(format!("binary record is too short: {rec_bytes:?}"));
        }

        let leader_bytes = &rec_bytes[0..LEADER_SIZE];

        // The leader's first slot must agree with the real byte count.
        let reported = framing_number(&leader_bytes[0..RECORD_SIZE_ENTRY])?;
        if reported != rec_bytes.len() {
            return Err(format!(
                "record length mismatch: leader says {reported}, have {}",
                rec_bytes.len()
            ));
        }

        // Where the data area starts, per leader[12..17].
        let data_start =
            framing_number(&leader_bytes[DATA_OFFSET_START..DATA_OFFSET_START + DATA_OFFSET_SIZE])?;

        if data_start <= LEADER_SIZE || data_start > rec_bytes.len() {
            return Err(format!("base address {data_start} is outside the record"));
        }

        let mut record = Record::new();

        let leader = std::str::from_utf8(leader_bytes)
            .map_err(|e| format!("leader is not valid UTF-8: {e}"))?;
        record.set_leader(leader)?;

        // The directory runs from the leader to the data area, less
        // its END_OF_FIELD terminator.
        let dir_bytes = &rec_bytes[LEADER_SIZE..data_start - 1];

        if dir_bytes.is_empty() || dir_bytes.len() % DIRECTORY_ENTRY_LEN != 0 {
            return Err(format!("invalid directory length {}", dir_bytes.len()));
        }

        for entry_bytes in dir_bytes.chunks(DIRECTORY_ENTRY_LEN) {
            let entry = DirectoryEntry::parse(entry_bytes, data_start)?;

            if entry.end >= rec_bytes.len() {
                return Err(format!(
                    "field for tag={} runs past the end of the record",
                    entry.tag
                ));
            }

            record.push_field(unpack_field(&entry, &rec_bytes[entry.start..entry.end])?);
        }

        Ok(record)
    }

    /// Generates the binary form of a MARC record as a vector of bytes.
    ///
    /// # Examples
    /// ```
    /// use marcrec::{Field, Record};
    ///
    /// let mut my_record = Record::new();
    /// let mut field = Field::data("245").unwrap();
    /// field.push_subfield('a', "My favorite book").unwrap();
    /// my_record.push_field(field);
    ///
    /// assert_eq!(
    ///     my_record.to_binary().unwrap(),
    ///     "00059       00037       245002100000\x1E  \x1FaMy favorite book\x1E\x1D".as_bytes()
    /// );
    /// ```
    pub fn to_binary(&self) -> Result<Vec<u8>, String> {
        let mut bytes: Vec<u8> = Vec::new();

        bytes.extend_from_slice(self.leader().as_bytes());

        // Directory, one 12-byte entry per field, offsets accumulating
        // through the data area.
        let mut offset = 0;
        for field in self.fields() {
            let length = field_byte_len(field);

            let entry = format!(
                "{}{:0w1$}{:0w2$}",
                field.tag(),
                length,
                offset,
                w1 = DATA_LENGTH_SIZE,
                w2 = DATA_OFFSET_SIZE
            );
            bytes.extend_from_slice(entry.as_bytes());

            offset += length;
        }

        bytes.push(END_OF_FIELD);

        for field in self.fields() {
            pack_field(field, &mut bytes);
        }

        bytes.push(END_OF_RECORD);

        self.sync_leader(&mut bytes)?;

        Ok(bytes)
    }

    /// Rewrite the leader's length and base-address slots to match
    /// the bytes just produced.
    fn sync_leader(&self, bytes: &mut [u8]) -> Result<(), String> {
        let total = bytes.len();

        if total > MAX_RECORD_BYTES {
            return Err(format!("record of {total} bytes cannot be framed"));
        }

        let size = format!("{:0w$}", total, w = RECORD_SIZE_ENTRY);
        bytes[0..RECORD_SIZE_ENTRY].copy_from_slice(size.as_bytes());

        let data_start = LEADER_SIZE + self.fields().len() * DIRECTORY_ENTRY_LEN + 1;
        let base = format!("{:0w$}", data_start, w = DATA_OFFSET_SIZE);
        bytes[DATA_OFFSET_START..DATA_OFFSET_START + DATA_OFFSET_SIZE]
            .copy_from_slice(base.as_bytes());

        Ok(())
    }
}

/// How many data-area bytes a field occupies, terminator included.
fn field_byte_len(field: &Field) -> usize {
    match field.control_content() {
        Some(content) => content.len() + 1,
        None => {
            // Indicators, then separator + code + value per subfield.
            let mut length = 3;
            for sf in field.subfields() {
                length += 2 + sf.value().len();
            }
            length
        }
    }
}

/// Emit one field's data-area bytes.
fn pack_field(field: &Field, bytes: &mut Vec<u8>) {
    if let Some(content) = field.control_content() {
        bytes.extend_from_slice(content.as_bytes());
        bytes.push(END_OF_FIELD);
        return;
    }

    let (ind1, ind2) = field.indicators();
    bytes.push(ind1 as u8);
    bytes.push(ind2 as u8);

    for sf in field.subfields() {
        bytes.push(SUBFIELD_SEPARATOR as u8);
        bytes.push(sf.code() as u8);
        bytes.extend_from_slice(sf.value().as_bytes());
    }

    bytes.push(END_OF_FIELD);
}

/// Carve one field out of its data-area slice.
///
/// Payloads are usually UTF-8, but CJK records arrive in a variety
/// of legacy encodings, so content goes through the text decoder.
fn unpack_field(entry: &DirectoryEntry, payload: &[u8]) -> Result<Field, String> {
    let content = text::decode(payload);

    if entry.tag.is_control() {
        return Field::control(entry.tag.as_str(), content);
    }

    let mut field = Field::data(entry.tag.as_str())?;

    let mut chars = content.chars();
    let ind1 = chars.next().filter(char::is_ascii).unwrap_or(' ');
    let ind2 = chars.next().filter(char::is_ascii).unwrap_or(' ');
    field.set_indicators(ind1, ind2)?;

    let mut parts = chars.as_str().split(SUBFIELD_SEPARATOR);

    // Anything before the first separator is stray padding.
    parts.next();

    for part in parts {
        let mut part_chars = part.chars();
        let code = part_chars
            .next()
            .filter(|c| c.is_ascii() && !c.is_ascii_control())
            .unwrap_or(' ');
        field.push_subfield(code, part_chars.as_str())?;
    }

    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let mut record = Record::new();

        record.push_field(Field::control("001", "12345").unwrap());
        record
            .push_field(Field::control("008", "950101s1995    xx            000 0 eng d").unwrap());

        let mut field = Field::data("100").unwrap();
        field.push_subfield('a', "Crombie, David.").unwrap();
        record.push_field(field);

        let mut field = Field::data("245").unwrap();
        field.set_indicators('1', '0').unwrap();
        field.push_subfield('a', "Piano /").unwrap();
        field.push_subfield('c', "David Crombie.").unwrap();
        record.push_field(field);

        record
    }

    #[test]
    fn test_binary_round_trip() {
        let record = sample_record();
        let bytes = record.to_binary().unwrap();

        let parsed = Record::from_binary(&bytes).unwrap();

        assert_eq!(parsed.values("245", 'a'), vec!["Piano /"]);
        assert_eq!(parsed.values("100", 'a'), vec!["Crombie, David."]);
        assert_eq!(parsed.control_content("001"), Some("12345"));
        assert_eq!(
            parsed.first_field("245").unwrap().indicators(),
            ('1', '0')
        );

        // Identical framing on a rebuild.
        assert_eq!(bytes, parsed.to_binary().unwrap());
    }

    #[test]
    fn test_leader_arithmetic() {
        let record = sample_record();
        let bytes = record.to_binary().unwrap();

        let reported: usize = std::str::from_utf8(&bytes[0..5]).unwrap().parse().unwrap();
        assert_eq!(reported, bytes.len());

        let base: usize = std::str::from_utf8(&bytes[12..17]).unwrap().parse().unwrap();
        assert_eq!(base, 24 + record.fields().len() * 12 + 1);

        assert_eq!(bytes[base - 1], END_OF_FIELD);
        assert_eq!(*bytes.last().unwrap(), END_OF_RECORD);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let record = sample_record();
        let mut bytes = record.to_binary().unwrap();
        bytes.extend_from_slice(b"junk");

        assert!(Record::from_binary(&bytes).is_err());
    }

    #[test]
    fn test_field_order_preserved() {
        // Parsed records keep their wire order even when it is not
        // tag order.
        let mut record = Record::new();

        let mut field = Field::data("650").unwrap();
        field.push_subfield('a', "Music").unwrap();
        record.push_field(field);

        let mut field = Field::data("245").unwrap();
        field.push_subfield('a', "Piano /").unwrap();
        record.push_field(field);

        let bytes = record.to_binary().unwrap();
        let parsed = Record::from_binary(&bytes).unwrap();

        let tags: Vec<&str> = parsed.fields().iter().map(|f| f.tag()).collect();
        assert_eq!(tags, vec!["650", "245"]);
    }

    #[test]
    fn test_gbk_field_decodes() {
        // "中国" in GBK: D6 D0 B9 FA.
        let mut record = Record::new();
        let mut field = Field::data("245").unwrap();
        field.push_subfield('a', "中国").unwrap();
        record.push_field(field);

        let mut bytes = record.to_binary().unwrap();

        // Swap the UTF-8 title bytes for their GBK form, fixing up the
        // directory length (UTF-8 takes 6 bytes, GBK takes 4).
        let utf8 = "中国".as_bytes().to_vec();
        let pos = bytes
            .windows(utf8.len())
            .position(|w| w == utf8.as_slice())
            .unwrap();
        bytes.splice(pos..pos + utf8.len(), [0xD6, 0xD0, 0xB9, 0xFA]);

        let dir = b"245000900000".to_vec(); // 2 inds + sep + code + 4 bytes + term
        bytes.splice(24..36, dir);

        let size = format!("{:05}", bytes.len());
        bytes.splice(0..5, size.into_bytes());

        let parsed = Record::from_binary(&bytes).unwrap();
        assert_eq!(parsed.values("245", 'a'), vec!["中国"]);
    }
}
