use crate::models::Example;

/// Selection by CWE and tag. Values are matched case-insensitively.
/// An example is selected when it matches any listed CWE or any listed tag;
/// an empty filter selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub cwes: Vec<String>,
    pub tags: Vec<String>,
}

impl Filter {
    pub fn new(cwes: impl IntoIterator<Item = String>, tags: impl IntoIterator<Item = String>) -> Self {
        let mut filter = Self::default();
        for cwe in cwes {
            push_unique(&mut filter.cwes, normalize_key(&cwe));
        }
        for tag in tags {
            push_unique(&mut filter.tags, normalize_key(&tag));
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.cwes.is_empty() && self.tags.is_empty()
    }

    pub fn matches(&self, example: &Example) -> bool {
        if self.is_empty() {
            return true;
        }
        self.cwes.iter().any(|c| *c == normalize_key(&example.cwe))
            || example.tags.iter().any(|t| self.tags.contains(&normalize_key(t)))
    }
}

/// Index key for CWE and tag values: trimmed, ASCII-uppercased.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}
