use std::collections::HashMap;

/// Name of the stage that accounts for time outside every produce region.
pub const OVERHEAD_STAGE: &str = "overhead";

/// Dense stage ids assigned in first-encounter order.
///
/// Id 0 is always the overhead stage. Names are normalized before lookup, so
/// the tuple components `f.0` and `f.1` are both stage `f`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageTable {
    ids: HashMap<String, i32>,
    names: Vec<String>,
}

impl StageTable {
    pub fn new() -> Self {
        StageTable {
            ids: HashMap::from([(OVERHEAD_STAGE.to_owned(), 0)]),
            names: vec![OVERHEAD_STAGE.to_owned()],
        }
    }

    pub fn normalize(name: &str) -> &str {
        name.split_once('.').map_or(name, |(stage, _)| stage)
    }

    /// Id of `name`, assigning the next free id on first sight.
    pub fn id_of(&mut self, name: &str) -> i32 {
        let name = Self::normalize(name);
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.names.len() as i32;
        self.ids.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        id
    }

    pub fn get(&self, name: &str) -> Option<i32> {
        self.ids.get(Self::normalize(name)).copied()
    }

    /// Stage names indexed by id.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether only the overhead stage is known.
    pub fn is_empty(&self) -> bool {
        self.names.len() == 1
    }
}

impl Default for StageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_first_encounter() {
        let mut table = StageTable::new();
        assert_eq!(table.id_of("A"), 1);
        assert_eq!(table.id_of("B"), 2);
        assert_eq!(table.id_of("A"), 1);
        assert_eq!(table.names(), ["overhead", "A", "B"]);
        assert_eq!(table.get("overhead"), Some(0));
        assert_eq!(table.get("C"), None);
    }

    #[test]
    fn test_tuple_components_share_a_stage() {
        let mut table = StageTable::new();
        let f = table.id_of("f.0");
        assert_eq!(table.id_of("f.1"), f);
        assert_eq!(table.id_of("f"), f);
        assert_eq!(table.len(), 2);
        assert_eq!(StageTable::normalize("f.s0.x"), "f");
    }
}
