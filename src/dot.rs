use std::io::Write;

use crate::{
    backprop::topological_sort,
    tape::{Scalar, ValueId},
};

/// Builder for a graphviz dot rendering of the graph behind a value.
pub struct DotBuilder<'a> {
    root: Scalar<'a>,
    show_values: bool,
    highlights: Option<ValueId>,
}

impl<'a> Scalar<'a> {
    pub fn dot_builder(&self) -> DotBuilder<'a> {
        DotBuilder {
            root: *self,
            show_values: false,
            highlights: None,
        }
    }
}

impl<'a> DotBuilder<'a> {
    /// Print data and derivative in each node's label.
    pub fn show_values(mut self, v: bool) -> Self {
        self.show_values = v;
        self
    }

    /// Fill the node with the given id.
    pub fn highlights(mut self, id: ValueId) -> Self {
        self.highlights = Some(id);
        self
    }

    /// Write graphviz dot file to the given writer.
    pub fn dot(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let vars = topological_sort(self.root);
        writeln!(writer, "digraph G {{\nrankdir=\"LR\";")?;
        for var in vars.iter().rev() {
            let id = var.id();
            let parents = var.parents();
            let shape = if parents.is_empty() { "ellipse" } else { "rect" };
            let mut label = escape(&var.name());
            if self.show_values {
                let derivative = var
                    .derivative()
                    .map_or_else(|| "-".to_string(), |d| d.to_string());
                label += &format!("\\ndata:{}, derivative:{derivative}", var.data());
            }
            let style = if self.highlights == Some(id) {
                " style=filled fillcolor=\"#ffff7f\""
            } else {
                ""
            };
            writeln!(writer, "a{id} [label=\"{label}\" shape={shape}{style}];")?;
            for parent in parents {
                writeln!(writer, "a{} -> a{id};", parent.id())?;
            }
        }
        writeln!(writer, "}}")?;
        Ok(())
    }
}

/// Escape a string for use inside a quoted dot label.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[test]
fn test_dot_escapes_names() {
    let tape = crate::Tape::new();
    let a = tape.term("say \"hi\" \\ bye", 1.);
    let mut buf = vec![];
    a.dot_builder().dot(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains(&format!(
        "a{} [label=\"say \\\"hi\\\" \\\\ bye\" shape=ellipse];",
        a.id()
    )));
}

#[test]
fn test_dot() {
    let tape = crate::Tape::new();
    let a = tape.term("a", 2.);
    let b = a * a;
    b.backward();
    let mut buf = vec![];
    b.dot_builder()
        .show_values(true)
        .highlights(a.id())
        .dot(&mut buf)
        .unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("digraph G {"));
    assert!(text.contains(&format!(
        "a{} [label=\"a\\ndata:2, derivative:4\" shape=ellipse style=filled",
        a.id()
    )));
    assert_eq!(
        text.matches(&format!("a{} -> a{};", a.id(), b.id())).count(),
        2
    );
    assert!(text.trim_end().ends_with('}'));
}
