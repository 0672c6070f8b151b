//! Mapping of file columns to declared fields.

use crate::config::FieldDef;

/// How the columns of an object feed the declared fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldsMapping {
    /// Column `i` feeds field `i`, for this many fields.
    Positional(usize),
    /// Column `i` feeds the field at `targets[i]`, if any.
    Named(Vec<Option<usize>>),
}

impl FieldsMapping {
    /// Match header names to declared field names.
    ///
    /// Names are compared trimmed, with surrounding enclosures removed and
    /// ignoring ASCII case. Each declared field takes the first column
    /// carrying its name.
    pub fn from_header(header: &[Vec<u8>], fields: &[FieldDef], enclosure: Option<u8>) -> Self {
        let mut claimed = vec![false; fields.len()];
        let targets = header
            .iter()
            .map(|column| {
                let name = normalize(column, enclosure);
                let target = fields
                    .iter()
                    .enumerate()
                    .position(|(i, f)| !claimed[i] && f.name.trim().eq_ignore_ascii_case(&name))?;
                claimed[target] = true;
                Some(target)
            })
            .collect();
        FieldsMapping::Named(targets)
    }

    /// Number of columns to tokenize per row.
    #[must_use]
    pub fn column_count(&self) -> usize {
        match self {
            FieldsMapping::Positional(n) => *n,
            FieldsMapping::Named(targets) => targets.len(),
        }
    }

    /// Declared field fed by `column`.
    #[must_use]
    pub fn target(&self, column: usize) -> Option<usize> {
        match self {
            FieldsMapping::Positional(n) => (column < *n).then_some(column),
            FieldsMapping::Named(targets) => targets.get(column).copied().flatten(),
        }
    }

    /// Number of columns feeding a declared field.
    #[must_use]
    pub fn mapped_count(&self) -> usize {
        match self {
            FieldsMapping::Positional(n) => *n,
            FieldsMapping::Named(targets) => targets.iter().flatten().count(),
        }
    }
}

fn normalize(column: &[u8], enclosure: Option<u8>) -> String {
    let name = String::from_utf8_lossy(column);
    let mut name = name.trim();
    if let Some(enc) = enclosure.map(char::from) {
        name = name.strip_prefix(enc).unwrap_or(name);
        name = name.strip_suffix(enc).unwrap_or(name);
    }
    name.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<Vec<u8>> {
        names.iter().map(|n| n.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_positional() {
        let mapping = FieldsMapping::Positional(2);
        assert_eq!(mapping.column_count(), 2);
        assert_eq!(mapping.target(1), Some(1));
        assert_eq!(mapping.target(2), None);
    }

    #[test]
    fn test_named_matching() {
        let fields = vec![FieldDef::string("id"), FieldDef::string("Name"), FieldDef::string("missing")];
        let mapping = FieldsMapping::from_header(
            &header(&[" NAME ", "extra", "\"Id\"", "id"]),
            &fields,
            Some(b'"'),
        );

        assert_eq!(mapping, FieldsMapping::Named(vec![Some(1), None, Some(0), None]));
        assert_eq!(mapping.column_count(), 4);
        assert_eq!(mapping.mapped_count(), 2);
        assert_eq!(mapping.target(2), Some(0));
        assert_eq!(mapping.target(9), None);
    }

    #[test]
    fn test_nothing_matches() {
        let fields = vec![FieldDef::string("a")];
        let mapping = FieldsMapping::from_header(&header(&["x", "y"]), &fields, None);
        assert_eq!(mapping.mapped_count(), 0);
    }
}
