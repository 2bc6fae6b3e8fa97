use std::collections::{HashMap, HashSet};

/// Generates unique instance names from a prefix.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    name_hash: HashMap<String, i64>,
    generated_names: HashSet<String>,
}

impl NameGenerator {
    /// Create a NameGenerator that will never produce any of `names`.
    pub fn with_prev_defined_names(names: HashSet<String>) -> Self {
        NameGenerator {
            generated_names: names,
            name_hash: HashMap::default(),
        }
    }

    /// Returns a new name that starts with `prefix`.
    /// ```
    /// # use hls_utils::NameGenerator;
    /// let mut namegen = NameGenerator::default();
    /// assert_eq!(namegen.gen_name("add"), "add");
    /// assert_eq!(namegen.gen_name("add"), "add0");
    /// ```
    pub fn gen_name(&mut self, prefix: &str) -> String {
        let mut cur_prefix = prefix.to_string();
        loop {
            let count = self
                .name_hash
                .entry(cur_prefix.clone())
                .and_modify(|v| *v += 1)
                .or_insert(-1);

            let name = if *count == -1 {
                cur_prefix.clone()
            } else {
                format!("{cur_prefix}{count}")
            };

            if self.generated_names.insert(name.clone()) {
                return name;
            }

            // Already taken, derive from the taken name instead.
            cur_prefix = name;
        }
    }
}
