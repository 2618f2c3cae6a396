use crate::value::SymbolId;
use std::collections::HashMap;

/// Interned symbol table. Each unique spelling maps to a unique SymbolId,
/// so `(eq? 'foo 'foo)` is true because both resolve to the same id.
/// Interned names live for the life of the process.
pub struct SymbolTable {
    name_to_id: HashMap<String, SymbolId>,
    id_to_name: Vec<String>,
}

/// Well-known symbol IDs, pre-interned at startup.
/// These must match the order of interning in SymbolTable::new().
pub mod sym {
    use crate::value::SymbolId;

    pub const QUOTE: SymbolId = SymbolId(0);
    pub const IF: SymbolId = SymbolId(1);
    pub const DEFINE: SymbolId = SymbolId(2);
    pub const SET: SymbolId = SymbolId(3); // set!
    pub const LAMBDA: SymbolId = SymbolId(4);
    pub const BEGIN: SymbolId = SymbolId(5);
    pub const COND: SymbolId = SymbolId(6);
    pub const ELSE: SymbolId = SymbolId(7);
    pub const AND: SymbolId = SymbolId(8);
    pub const OR: SymbolId = SymbolId(9);
}

impl SymbolTable {
    /// Create a new symbol table with the special-form names pre-interned.
    /// The order MUST match the constants in the `sym` module above.
    pub fn new() -> Self {
        let names = [
            "quote", "if", "define", "set!", "lambda", "begin", "cond", "else", "and", "or",
        ];

        let mut table = SymbolTable {
            name_to_id: HashMap::new(),
            id_to_name: Vec::new(),
        };
        for name in names {
            table.intern(name);
        }
        table
    }

    /// Intern a symbol name. Returns the existing ID if already interned,
    /// or creates a new one.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = SymbolId(self.id_to_name.len() as u32);
        self.name_to_id.insert(name.to_string(), id);
        self.id_to_name.push(name.to_string());
        id
    }

    /// Look up a symbol name by its ID.
    pub fn name(&self, id: SymbolId) -> &str {
        &self.id_to_name[id.0 as usize]
    }

    /// Look up a symbol ID by name, without interning.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.name_to_id.get(name).copied()
    }

    /// Total number of interned symbols.
    pub fn count(&self) -> usize {
        self.id_to_name.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{sym, SymbolTable};

    #[test]
    fn interning_is_canonical() {
        let mut table = SymbolTable::new();
        let a = table.intern("boop");
        let b = table.intern("boop");
        let c = table.intern("bap");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(a), "boop");
        assert_eq!(table.name(c), "bap");
    }

    #[test]
    fn well_known_symbols_match_their_constants() {
        let mut table = SymbolTable::new();
        assert_eq!(table.intern("quote"), sym::QUOTE);
        assert_eq!(table.intern("set!"), sym::SET);
        assert_eq!(table.intern("else"), sym::ELSE);
        assert_eq!(table.intern("or"), sym::OR);
    }
}
