//! Minimal DTD reader
//!
//! Supplies the two things a conversion needs from the document's DTD: the
//! declared element names (candidate record types) and general entity
//! declarations, so entity references in the corpus resolve while streaming.

use crate::error::{ConvertError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--.*?-->").unwrap()
});

static ELEMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<!ELEMENT\s+([^\s>]+)").unwrap()
});

// Parameter entities (`<!ENTITY % name ...>`) do not match
static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<!ENTITY\s+([A-Za-z_][\w.\-]*)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).unwrap()
});

static CHAR_REF_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").unwrap()
});

/// Declarations read from a DTD
#[derive(Debug, Clone, Default)]
pub struct Dtd {
    pub elements: BTreeSet<String>,
    pub entities: HashMap<String, String>,
}

impl Dtd {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        let dtd = Self::parse(&text);

        if dtd.elements.is_empty() {
            return Err(ConvertError::Schema {
                path: path.to_path_buf(),
                message: "no element declarations found".to_string(),
            });
        }

        Ok(dtd)
    }

    pub fn parse(text: &str) -> Self {
        let text = COMMENT_REGEX.replace_all(text, "");

        let elements = ELEMENT_REGEX
            .captures_iter(&text)
            .map(|c| c[1].to_string())
            .collect();

        let entities = ENTITY_REGEX
            .captures_iter(&text)
            .map(|c| {
                let raw = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
                (c[1].to_string(), decode_char_refs(raw))
            })
            .collect();

        Dtd { elements, entities }
    }
}

/// Replace numeric character references; unknown code points are kept verbatim
fn decode_char_refs(value: &str) -> String {
    CHAR_REF_REGEX
        .replace_all(value, |caps: &regex::Captures| {
            let reference = &caps[1];
            let code = match reference.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => reference.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DTD: &str = r#"
<!ENTITY % field "author|title|year">
<!ELEMENT dblp (article|inproceedings)*>
<!ELEMENT article (%field;)*>
<!ATTLIST article key CDATA #REQUIRED>
<!ELEMENT inproceedings (%field;)*>
<!-- <!ELEMENT commented (#PCDATA)> -->
<!ELEMENT author (#PCDATA)>
<!ENTITY Agrave "&#192;" ><!-- capital A, grave accent -->
<!ENTITY reg '&#x000AE;'>
"#;

    #[test]
    fn test_element_names() {
        let dtd = Dtd::parse(DTD);
        let names: Vec<&str> = dtd.elements.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["article", "author", "dblp", "inproceedings"]);
    }

    #[test]
    fn test_entities_are_decoded() {
        let dtd = Dtd::parse(DTD);
        assert_eq!(dtd.entities.get("Agrave").map(String::as_str), Some("\u{c0}"));
        assert_eq!(dtd.entities.get("reg").map(String::as_str), Some("\u{ae}"));
        assert!(!dtd.entities.contains_key("field"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Dtd::from_path("/definitely/not/here.dtd").unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}
