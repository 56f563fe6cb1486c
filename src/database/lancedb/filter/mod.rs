
/// Conjunction of exact-match conditions on tag fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    conditions: Vec<(String, String)>,
}

impl TagFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn eq(mut self, field: &str, value: &str) -> Self {
        self.conditions.push((field.to_string(), value.to_string()));
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render as a LanceDB SQL predicate, `None` when unconstrained
    #[inline]
    pub fn to_sql(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }

        let clauses: Vec<String> = self
            .conditions
            .iter()
            .map(|(field, value)| format!("`{}` = {}", field, quote_literal(value)))
            .collect();
        Some(clauses.join(" AND "))
    }
}

/// Single-quote a string literal, doubling embedded quotes
#[inline]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
