//! Binary operator precedence table.

/// Operator spelling and binding power. Higher binds tighter; everything
/// at 0 is an assignment.
pub const DEFAULT_PRECEDENCE: &[(&str, u8)] = &[
    ("=", 0),
    (":=", 0),
    ("+=", 0),
    ("-=", 0),
    ("*=", 0),
    ("/=", 0),
    ("||", 1),
    ("&&", 1),
    ("^", 1),
    ("==", 2),
    ("!=", 2),
    ("<", 10),
    ("<=", 10),
    (">", 10),
    (">=", 10),
    (">>", 15),
    ("<<", 15),
    ("+", 20),
    ("-", 20),
    ("*", 40),
    ("/", 40),
    ("%", 40),
];

#[derive(Debug, Clone, Copy)]
pub struct PrecedenceTable {
    entries: &'static [(&'static str, u8)],
}

impl PrecedenceTable {
    pub fn get(&self, op: &str) -> Option<u8> {
        self.entries
            .iter()
            .find(|(spelling, _)| *spelling == op)
            .map(|(_, prec)| *prec)
    }
}

impl Default for PrecedenceTable {
    fn default() -> Self {
        PrecedenceTable {
            entries: DEFAULT_PRECEDENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let table = PrecedenceTable::default();
        assert!(table.get("*") > table.get("+"));
        assert!(table.get("+") > table.get("<<"));
        assert!(table.get("<") > table.get("=="));
        assert_eq!(table.get("="), Some(0));
    }

    #[test]
    fn unary_only_operators_are_absent() {
        let table = PrecedenceTable::default();
        assert_eq!(table.get("!"), None);
        assert_eq!(table.get("&"), None);
    }
}
