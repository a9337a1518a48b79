//
// symbol_locator.rs
//
// Text-heuristic symbol position search, shared by every file type
//

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

// One fixed keyword set for all languages. Files whose declaration syntax
// uses none of these keywords still resolve through the whole-word tier.
const FUNCTION_KEYWORDS: &str = "def|fn|func|function";
const TYPE_KEYWORDS: &str = "class|struct|enum|trait|interface";

/// A protocol-addressable position: 0-based line and character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolPosition {
    pub line: u32,
    pub character: u32,
}

/// Compiled search tiers for one symbol name, reusable across files.
pub struct SymbolPattern {
    symbol: String,
    function_decl: Regex,
    type_decl: Regex,
    word: Regex,
}

impl SymbolPattern {
    pub fn new(symbol: &str) -> Result<Self> {
        let escaped = regex::escape(symbol);
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .with_context(|| format!("cannot build a search pattern for '{}'", symbol))
        };
        Ok(Self {
            symbol: symbol.to_string(),
            function_decl: compile(format!(r"\b(?:{FUNCTION_KEYWORDS})\s+{escaped}\b"))?,
            type_decl: compile(format!(r"\b(?:{TYPE_KEYWORDS})\s+{escaped}\b"))?,
            word: compile(format!(r"\b{escaped}\b"))?,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// First plausible position of the symbol in `text`.
    ///
    /// Lines are scanned in file order; the first line matching any tier
    /// wins. Within a line, a declaration-keyword match resolves to the
    /// first occurrence of the symbol, the whole-word tier to the start of
    /// its first whole-word match.
    pub fn find_position(&self, text: &str) -> Option<SymbolPosition> {
        for (line_number, line) in text.lines().enumerate() {
            if self.function_decl.is_match(line) || self.type_decl.is_match(line) {
                let character = line.find(&self.symbol).unwrap_or(0);
                return Some(SymbolPosition {
                    line: line_number as u32,
                    character: character as u32,
                });
            }
            if let Some(found) = self.word.find(line) {
                return Some(SymbolPosition {
                    line: line_number as u32,
                    character: found.start() as u32,
                });
            }
        }
        None
    }
}

/// One-off position lookup; callers scanning many files should compile a
/// [`SymbolPattern`] once instead.
pub fn find_symbol_position(text: &str, symbol: &str) -> Option<SymbolPosition> {
    SymbolPattern::new(symbol).ok()?.find_position(text)
}

/// Whether a line textually looks like a function/method or type
/// declaration, per the same keyword set the locator uses.
pub fn is_declaration_line(line: &str) -> bool {
    static DECLARATION: OnceLock<Regex> = OnceLock::new();
    let pattern = DECLARATION.get_or_init(|| {
        Regex::new(&format!(r"\b(?:{FUNCTION_KEYWORDS}|{TYPE_KEYWORDS})\s+\w"))
            .expect("declaration keyword pattern is valid")
    });
    pattern.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn function_declaration_wins_over_later_mentions() {
        let text = "import os\n\ndef compute(x):\n    return x\n\ncompute(5)\n";
        let position = find_symbol_position(text, "compute").unwrap();
        assert_eq!(position.line, 2);
        assert_eq!(position.character, 4);
    }

    #[test]
    fn earlier_plain_mention_wins_over_later_declaration() {
        // First matching line wins regardless of tier; declarations only
        // break ties within a single line.
        let text = "result = compute(5)\n\ndef compute(x):\n    return x\n";
        let position = find_symbol_position(text, "compute").unwrap();
        assert_eq!(position.line, 0);
        assert_eq!(position.character, 9);
    }

    #[test]
    fn type_declarations_are_found() {
        let text = "// helpers\nstruct Point {\n    x: f64,\n}\n";
        let position = find_symbol_position(text, "Point").unwrap();
        assert_eq!(position.line, 1);
        assert_eq!(position.character, 7);
    }

    #[test]
    fn partial_words_do_not_match() {
        let text = "def compute_all():\n    pass\n";
        assert!(find_symbol_position(text, "compute").is_none());
    }

    #[test]
    fn missing_symbol_reports_none() {
        assert!(find_symbol_position("x = 1\ny = 2\n", "absent").is_none());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        // A symbol like "a+b" must not be treated as a pattern.
        assert!(find_symbol_position("x = 1\n", "a+b").is_none());
    }

    #[test]
    fn rust_and_go_keywords_are_recognized() {
        let rust = "fn handle(req: Request) {}\n";
        assert_eq!(find_symbol_position(rust, "handle").unwrap().line, 0);
        let go = "func Serve(addr string) error {\n\treturn nil\n}\n";
        assert_eq!(find_symbol_position(go, "Serve").unwrap().line, 0);
    }

    #[test]
    fn declaration_lines_are_detected() {
        assert!(is_declaration_line("def compute(x):"));
        assert!(is_declaration_line("    fn new() -> Self {"));
        assert!(is_declaration_line("class Parser:"));
        assert!(!is_declaration_line("compute(5)"));
        assert!(!is_declaration_line("x = definitely_not"));
    }

    proptest! {
        // Filler identifiers draw from a..m, the symbol from n..z, so the
        // filler lines can never contain the symbol as a word.
        #[test]
        fn declaration_line_is_found_exactly(
            symbol in "[n-z]{4,10}",
            fillers in proptest::collection::vec("[a-m]{3,8}", 0..8),
            after in 0usize..4,
        ) {
            let mut lines: Vec<String> =
                fillers.iter().map(|word| format!("{} = 1", word)).collect();
            let declaration_line = lines.len();
            lines.push(format!("def {}():", symbol));
            for _ in 0..after {
                lines.push(format!("    {}(1)", symbol));
            }
            let text = lines.join("\n");

            let position = find_symbol_position(&text, &symbol).unwrap();
            prop_assert_eq!(position.line as usize, declaration_line);
            prop_assert_eq!(position.character, 4);
        }
    }
}
