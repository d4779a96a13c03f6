//! Import analysis of user source text.
//!
//! Explicit imports come from `import` declarations at the head of the file.
//! The implicit import is the prelude root module, which every file gets
//! unless it opts out with the `prelude` keyword.

use oleander_common::ModuleName;
use serde::{Deserialize, Serialize};

use crate::manifest::WILDCARD_IMPORT;

/// Default line-comment marker.
pub const DEFAULT_COMMENT_MARKER: &str = "--";

/// Default implicitly imported root module.
pub const DEFAULT_PRELUDE_MODULE: &str = "Init";

/// Default token that opts a file out of the implicit prelude.
pub const DEFAULT_OPT_OUT_TOKEN: &str = "prelude";

const VISIBILITY_MODIFIERS: [&str; 2] = ["public", "private"];
const META_MODIFIER: &str = "meta";
const IMPORT_KEYWORD: &str = "import";

/// Lexical conventions used by the import analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRules {
    /// Lines whose trimmed text starts with this marker are skipped.
    pub comment_marker: String,
    /// Module imported implicitly by every file that does not opt out.
    pub prelude_module: ModuleName,
    /// Token whose presence disables the implicit import.
    pub opt_out_token: String,
}

impl Default for ImportRules {
    fn default() -> Self {
        Self {
            comment_marker: DEFAULT_COMMENT_MARKER.to_string(),
            prelude_module: ModuleName::new(DEFAULT_PRELUDE_MODULE),
            opt_out_token: DEFAULT_OPT_OUT_TOKEN.to_string(),
        }
    }
}

impl ImportRules {
    /// Extracts the module named by every `import` line, in source order.
    ///
    /// Accepts `[public|private] [meta] import [all] Name`. Duplicates are
    /// kept; callers deduplicate.
    pub fn parse_explicit(&self, source: &str) -> Vec<ModuleName> {
        self.code_lines(source)
            .filter_map(parse_import_line)
            .map(ModuleName::new)
            .collect()
    }

    /// Returns the prelude module unless the source contains the opt-out
    /// token as a standalone word outside line comments.
    pub fn detect_implicit(&self, source: &str) -> Vec<ModuleName> {
        let opted_out = self
            .code_lines(source)
            .flat_map(str::split_whitespace)
            .any(|token| token == self.opt_out_token);
        if opted_out {
            Vec::new()
        } else {
            vec![self.prelude_module.clone()]
        }
    }

    fn code_lines<'s>(&'s self, source: &'s str) -> impl Iterator<Item = &'s str> + 's {
        source
            .lines()
            .map(str::trim)
            .filter(move |line| !line.starts_with(self.comment_marker.as_str()))
    }
}

/// Returns the module name of a single trimmed `import` line, if it is one.
fn parse_import_line(line: &str) -> Option<&str> {
    let mut tokens = line.split_whitespace().peekable();

    if tokens
        .peek()
        .is_some_and(|t| VISIBILITY_MODIFIERS.contains(t))
    {
        tokens.next();
    }
    if tokens.peek() == Some(&META_MODIFIER) {
        tokens.next();
    }
    if tokens.next()? != IMPORT_KEYWORD {
        return None;
    }

    let mut name = tokens.next()?;
    if name == WILDCARD_IMPORT {
        name = tokens.next()?;
    }
    is_module_name(name).then_some(name)
}

fn is_module_name(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '«')
}

/// [`ImportRules::parse_explicit`] with the default rules.
pub fn parse_explicit_imports(source: &str) -> Vec<ModuleName> {
    ImportRules::default().parse_explicit(source)
}

/// [`ImportRules::detect_implicit`] with the default rules.
pub fn detect_implicit_imports(source: &str) -> Vec<ModuleName> {
    ImportRules::default().detect_implicit(source)
}
