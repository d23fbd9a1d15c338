use indexmap::set::IndexSet;

/// String table of a v0.5 payload: every string is written once and spans
/// refer to it by index.
#[derive(Debug, Default)]
pub(crate) struct StringInterner {
    data: IndexSet<String>,
}

impl StringInterner {
    pub(crate) fn new() -> StringInterner {
        StringInterner::default()
    }

    pub(crate) fn intern(&mut self, data: &str) -> u32 {
        let idx = match self.data.get_index_of(data) {
            Some(idx) => idx,
            None => self.data.insert_full(data.to_string()).0,
        };
        idx as u32
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &String> {
        self.data.iter()
    }

    pub(crate) fn len(&self) -> u32 {
        self.data.len() as u32
    }
}
