//! MARC profiles: the mapping from semantic bibliographic fields to
//! tag/subfield locations under MARC21, UNIMARC, and CNMARC.

use crate::record::{Field, Record};

use std::str::FromStr;

/// Build the fixed-position 008 field; the publication year is
/// spliced into positions 7..11 when known.
fn control_008(pub_year: &str) -> String {
    // 40 positions: entry date, type 's', dates, place 'xx',
    // filler, language 'eng', source 'd'.
    let mut f008 = format!("{:6}s{:8}xx{:18}eng d", "", "", "");
    if pub_year.len() == 4 && pub_year.is_ascii() {
        f008.replace_range(7..11, pub_year);
    }
    f008
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Marc21,
    Unimarc,
    /// The Chinese MARC format; structurally a UNIMARC derivative.
    Cnmarc,
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MARC21" | "USMARC" => Ok(Self::Marc21),
            "UNIMARC" => Ok(Self::Unimarc),
            "CNMARC" => Ok(Self::Cnmarc),
            _ => Err(format!("Unknown MARC profile: {s}")),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Marc21 => write!(f, "MARC21"),
            Self::Unimarc => write!(f, "UNIMARC"),
            Self::Cnmarc => write!(f, "CNMARC"),
        }
    }
}

/// Semantic fields the profiles can locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    Title,
    Author,
    Isbn,
    Issn,
    Publisher,
    PubYear,
    Subject,
    Summary,
    Toc,
    Edition,
    Physical,
    Series,
    Notes,
    Holdings,
}

impl Profile {
    /// The (tag, subfield codes) address of a semantic field.
    pub fn spec(self, field: Semantic) -> (&'static str, &'static str) {
        match self {
            Self::Marc21 => match field {
                Semantic::Title => ("245", "ab"),
                Semantic::Author => ("100", "a"),
                Semantic::Isbn => ("020", "a"),
                Semantic::Issn => ("022", "a"),
                Semantic::Publisher => ("260", "b"),
                Semantic::PubYear => ("260", "c"),
                Semantic::Subject => ("650", "a"),
                Semantic::Summary => ("520", "a"),
                Semantic::Toc => ("505", "atr"),
                Semantic::Edition => ("250", "a"),
                Semantic::Physical => ("300", "abc"),
                Semantic::Series => ("490", "a"),
                Semantic::Notes => ("500", "a"),
                Semantic::Holdings => ("852", "abhp"),
            },
            // CNMARC keeps the UNIMARC field layout.
            Self::Unimarc | Self::Cnmarc => match field {
                Semantic::Title => ("200", "ae"),
                Semantic::Author => ("700", "ab"),
                Semantic::Isbn => ("010", "a"),
                Semantic::Issn => ("011", "a"),
                Semantic::Publisher => ("210", "c"),
                Semantic::PubYear => ("210", "d"),
                Semantic::Subject => ("606", "a"),
                Semantic::Summary => ("330", "a"),
                Semantic::Toc => ("327", "a"),
                Semantic::Edition => ("205", "a"),
                Semantic::Physical => ("215", "a"),
                Semantic::Series => ("225", "a"),
                Semantic::Notes => ("300", "a"),
                Semantic::Holdings => ("995", "abk"),
            },
        }
    }
}

/// Canonicalize an ISBN value.
///
/// Strips a leading `ISBN` / `ISBN-10` / `ISBN-13` label (any case,
/// optional colon), then keeps only digits and the X check character.
/// Idempotent: cleaning a cleaned value is a no-op.
///
/// # Examples
///
/// ```
/// use marcrec::clean_isbn;
/// assert_eq!(clean_isbn("ISBN: 0-87930-372-7"), "0879303727");
/// assert_eq!(clean_isbn("isbn-13 978-0-87930-372-6"), "9780879303726");
/// assert_eq!(clean_isbn("043942089X (pbk.)"), "043942089X");
/// assert_eq!(clean_isbn(&clean_isbn("ISBN 12-3")), clean_isbn("ISBN 12-3"));
/// ```
pub fn clean_isbn(value: &str) -> String {
    let mut s = value.trim();

    let upper = s.to_uppercase();
    for prefix in ["ISBN-13", "ISBN-10", "ISBN"] {
        if upper.starts_with(prefix) {
            s = &s[prefix.len()..];
            s = s.trim_start();
            s = s.strip_prefix(':').unwrap_or(s);
            break;
        }
    }

    s.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .collect()
}

/// Build an ISO 2709 record from column-style values.
///
/// Empty arguments are skipped.  The record carries a fixed 008
/// control field and the profile-directed data fields, with the
/// leader length and base address synced by the binary writer.
#[allow(clippy::too_many_arguments)]
pub fn build(
    profile: Profile,
    id: &str,
    title: &str,
    author: &str,
    isbn: &str,
    publisher: &str,
    pub_year: &str,
    issn: &str,
    subject: &str,
) -> Result<Vec<u8>, String> {
    let record = build_record(
        profile, id, title, author, isbn, publisher, pub_year, issn, subject,
    )?;
    record.to_binary()
}

/// [`build`], stopping at the record model.
#[allow(clippy::too_many_arguments)]
pub fn build_record(
    profile: Profile,
    id: &str,
    title: &str,
    author: &str,
    isbn: &str,
    publisher: &str,
    pub_year: &str,
    issn: &str,
    subject: &str,
) -> Result<Record, String> {
    let mut record = Record::new();

    if !id.is_empty() {
        record.push_field(Field::control("001", id)?);
    }

    record.push_field(Field::control("008", control_008(pub_year))?);

    let values = [
        (Semantic::Title, title),
        (Semantic::Author, author),
        (Semantic::Isbn, isbn),
        (Semantic::Publisher, publisher),
        (Semantic::PubYear, pub_year),
        (Semantic::Issn, issn),
        (Semantic::Subject, subject),
    ];

    for (semantic, value) in values {
        if value.is_empty() {
            continue;
        }

        let (tag, codes) = profile.spec(semantic);
        let code = codes.chars().next().unwrap_or('a');

        // Publisher and year share a field under both layouts; reuse
        // it rather than emitting the tag twice.
        if let Some(field) = record
            .fields_mut()
            .iter_mut()
            .find(|f| f.tag() == tag && !f.is_control() && !f.has_subfield(code))
        {
            field.push_subfield(code, value)?;
            continue;
        }

        let mut field = Field::data(tag)?;
        field.push_subfield(code, value)?;
        record.insert_field(field);
    }

    Ok(record)
}

impl Record {
    /// Join the addressed subfield values of the first matching field.
    pub fn semantic_value(&self, profile: Profile, semantic: Semantic) -> Option<String> {
        let (tag, codes) = profile.spec(semantic);

        let parts: Vec<&str> = self.first_field(tag)?.picked_values(codes).collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" ").trim().to_string())
        }
    }

    pub fn title(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Title)
    }

    pub fn author(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Author)
    }

    /// ISBN, post-cleaned to its canonical digits-and-X form.
    pub fn isbn(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Isbn)
            .map(|v| clean_isbn(&v))
    }

    pub fn issn(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Issn)
    }

    pub fn publisher(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Publisher)
    }

    pub fn subject(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Subject)
    }

    pub fn summary(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Summary)
    }

    pub fn toc(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Toc)
    }

    pub fn edition(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Edition)
    }

    pub fn physical_description(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Physical)
    }

    pub fn series(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Series)
    }

    pub fn notes(&self, profile: Profile) -> Option<String> {
        self.semantic_value(profile, Semantic::Notes)
    }

    /// One joined string per holdings field.
    pub fn holdings(&self, profile: Profile) -> Vec<String> {
        let (tag, codes) = profile.spec(Semantic::Holdings);

        self.fields_with_tag(tag)
            .map(|field| field.picked_values(codes).collect::<Vec<&str>>().join(" "))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_then_parse() {
        let bytes = build(
            Profile::Marc21,
            "001",
            "Test",
            "A",
            "123",
            "P",
            "2026",
            "1234-5678",
            "S",
        )
        .unwrap();

        // Leader length field equals the total record length.
        let reported: usize = std::str::from_utf8(&bytes[0..5]).unwrap().parse().unwrap();
        assert_eq!(reported, bytes.len());

        let record = Record::from_bytes(&bytes).unwrap();

        assert_eq!(record.title(Profile::Marc21).as_deref(), Some("Test"));
        assert_eq!(record.author(Profile::Marc21).as_deref(), Some("A"));
        assert_eq!(record.isbn(Profile::Marc21).as_deref(), Some("123"));
        assert_eq!(record.issn(Profile::Marc21).as_deref(), Some("1234-5678"));
        assert_eq!(record.publisher(Profile::Marc21).as_deref(), Some("P"));
        assert_eq!(record.subject(Profile::Marc21).as_deref(), Some("S"));

        // The fixed 008 carries the year.
        assert!(record.control_content("008").unwrap().contains("2026"));
    }

    #[test]
    fn test_build_skips_empty_fields() {
        let bytes = build(Profile::Marc21, "001", "Test", "", "", "", "", "", "").unwrap();
        let record = Record::from_bytes(&bytes).unwrap();

        assert!(record.first_field("100").is_none());
        assert!(record.first_field("020").is_none());
        assert_eq!(record.title(Profile::Marc21).as_deref(), Some("Test"));
    }

    #[test]
    fn test_unimarc_layout() {
        let bytes = build(
            Profile::Unimarc,
            "42",
            "Pièce",
            "Dupont",
            "2-07-036822-X",
            "Gallimard",
            "1984",
            "",
            "Poésie",
        )
        .unwrap();

        let record = Record::from_bytes(&bytes).unwrap();

        assert_eq!(record.title(Profile::Unimarc).as_deref(), Some("Pièce"));
        assert_eq!(record.isbn(Profile::Unimarc).as_deref(), Some("207036822X"));
        assert_eq!(
            record.publisher(Profile::Unimarc).as_deref(),
            Some("Gallimard")
        );

        // The same bytes read under the wrong profile miss the title.
        assert_eq!(record.title(Profile::Marc21), None);
    }

    #[test]
    fn test_clean_isbn_idempotent() {
        for raw in [
            "ISBN 0-87930-372-7",
            "isbn-10: 0879303727",
            "ISBN-13: 978-0-87930-372-6",
            "043942089X (pbk.)",
            "",
            "no digits here",
        ] {
            let once = clean_isbn(raw);
            assert_eq!(clean_isbn(&once), once, "{raw}");
            assert!(once.chars().all(|c| c.is_ascii_digit() || c == 'X' || c == 'x'));
        }
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("USMARC".parse::<Profile>().unwrap(), Profile::Marc21);
        assert_eq!("marc21".parse::<Profile>().unwrap(), Profile::Marc21);
        assert_eq!("UNIMARC".parse::<Profile>().unwrap(), Profile::Unimarc);
        assert_eq!("cnmarc".parse::<Profile>().unwrap(), Profile::Cnmarc);
        assert!("MODS".parse::<Profile>().is_err());
    }
}
