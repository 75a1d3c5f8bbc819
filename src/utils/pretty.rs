//! Pretty printing utilities for source text and metadata trees.
//!
//! Source-shaped output (translation units, LLVM-style metadata listings) goes
//! through [`CodeFormatter`]. Tree-shaped output (followup annotation trees)
//! implements [`PrettyPrint`] on top of the `pretty` crate.

use pretty::BoxDoc;
use std::fmt;

/// Default line width for pretty printing.
pub const DEFAULT_WIDTH: usize = 80;

/// A value that can be laid out as a pretty document.
pub trait PrettyPrint {
    /// Convert to a pretty document.
    fn to_doc(&self) -> BoxDoc<'_>;

    /// Pretty print to a string with the given width.
    fn pretty_print(&self, width: usize) -> String {
        self.to_doc().pretty(width).to_string()
    }

    /// Pretty print with default width.
    fn pretty(&self) -> String {
        self.pretty_print(DEFAULT_WIDTH)
    }
}

/// A `key: value` line.
pub fn field_doc<'a>(key: &'a str, value: String) -> BoxDoc<'a> {
    BoxDoc::text(key).append(BoxDoc::text(": ")).append(BoxDoc::text(value))
}

/// A header followed by an indented list of children, one per line.
pub fn nested_doc<'a>(header: String, children: Vec<BoxDoc<'a>>, indent: isize) -> BoxDoc<'a> {
    if children.is_empty() {
        return BoxDoc::text(header);
    }
    let body = BoxDoc::intersperse(children, BoxDoc::hardline());
    BoxDoc::text(header)
        .append(BoxDoc::hardline().append(body).nest(indent))
}

/// Line-oriented writer for generated text.
///
/// Indentation is applied lazily when the first character of a line is
/// written, so empty lines stay empty.
#[derive(Debug)]
pub struct CodeFormatter {
    output: String,
    depth: usize,
    unit: String,
    line_open: bool,
}

impl CodeFormatter {
    /// A formatter indenting by `unit` per level.
    pub fn new(unit: &str) -> Self {
        Self { output: String::new(), depth: 0, unit: unit.to_string(), line_open: false }
    }

    /// Four spaces per level.
    pub fn default_indent() -> Self {
        Self::new("    ")
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Write text, indenting at the start of each line.
    pub fn write(&mut self, s: &str) {
        let mut lines = s.split('\n').peekable();
        while let Some(line) = lines.next() {
            if !line.is_empty() {
                if !self.line_open {
                    self.output.push_str(&self.unit.repeat(self.depth));
                    self.line_open = true;
                }
                self.output.push_str(line);
            }
            if lines.peek().is_some() {
                self.output.push('\n');
                self.line_open = false;
            }
        }
    }

    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.newline();
    }

    /// Write a whole line in column one (preprocessor lines).
    pub fn write_unindented(&mut self, s: &str) {
        if self.line_open {
            self.newline();
        }
        self.output.push_str(s);
        self.output.push('\n');
    }

    pub fn newline(&mut self) {
        self.output.push('\n');
        self.line_open = false;
    }

    pub fn finish(self) -> String {
        self.output
    }
}

/// Format a list with separators.
pub fn format_list<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Format a list with separators using a custom formatter.
pub fn format_list_with<T, F: Fn(&T) -> String>(items: &[T], sep: &str, f: F) -> String {
    items
        .iter()
        .map(f)
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_formatter() {
        let mut fmt = CodeFormatter::default_indent();
        fmt.writeln("void f() {");
        fmt.indent();
        fmt.writeln("g();");
        fmt.dedent();
        fmt.writeln("}");

        let output = fmt.finish();
        assert_eq!(output, "void f() {\n    g();\n}\n");
    }

    #[test]
    fn test_unindented_pragma_line() {
        let mut fmt = CodeFormatter::default_indent();
        fmt.indent();
        fmt.write_unindented("#pragma clang transform unroll");
        fmt.writeln("for (;;) {}");
        assert_eq!(fmt.finish(), "#pragma clang transform unroll\n    for (;;) {}\n");
    }

    #[test]
    fn test_nested_doc() {
        struct Tree;
        impl PrettyPrint for Tree {
            fn to_doc(&self) -> BoxDoc<'_> {
                nested_doc(
                    "loop".to_string(),
                    vec![field_doc("id", "i".to_string()), field_doc("count", "4".to_string())],
                    2,
                )
            }
        }
        assert_eq!(Tree.pretty(), "loop\n  id: i\n  count: 4");
    }

    #[test]
    fn test_format_list() {
        assert_eq!(format_list(&[1, 2, 3], ", "), "1, 2, 3");
        assert_eq!(format_list_with(&["a", "b"], "|", |s| s.to_uppercase()), "A|B");
    }
}
