//! Schema-constrained streaming validator
//!
//! Walks a [`TokenSource`] against a [`SchemaNode`] with one event of
//! lookahead: no backtracking, no materialized DOM. Sequence children are
//! matched with a wrap-once forward search so the whole ordered list can
//! repeat as cycles; Choice children are matched by name alone. Elements with
//! no schema entry are skipped recursively without error. All occurrence
//! counting is per nesting level.

use crate::convert::{self, FromXmlValue};
use crate::error::{ConversionError, ImportError, Result};
use crate::resolver::FileId;
use crate::schema::{ChildRule, DocumentSchema, Occurs, SchemaNode};
use crate::token::{Event, TokenSource};

/// Per-invocation parse state handed to leaf actions.
///
/// Exposes attribute access on the current element, typed conversion helpers,
/// and the importer-defined accumulator. Owned exclusively by the parse call
/// that created it.
pub struct ParseContext<'a, S> {
    source: &'a mut dyn TokenSource,
    file: &'a FileId,
    element: &'a str,
    empty: bool,
    consumed: bool,
    /// Importer-defined per-file accumulator.
    pub state: &'a mut S,
}

impl<'a, S> ParseContext<'a, S> {
    /// File currently being parsed.
    pub fn file(&self) -> &FileId {
        self.file
    }

    /// Local name of the current element.
    pub fn element(&self) -> &str {
        self.element
    }

    /// Whether the current element is self-closing.
    pub fn is_empty_element(&self) -> bool {
        self.empty
    }

    /// Attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.source.attribute(name)
    }

    /// Attribute value by position.
    pub fn attribute_at(&self, index: usize) -> Option<String> {
        self.source.attribute_at(index)
    }

    /// Attribute value by local name, failing if absent.
    pub fn require_attribute(&self, name: &str) -> Result<String> {
        self.attribute(name).ok_or_else(|| ImportError::MissingAttribute {
            file: self.file.to_string(),
            element: self.element.to_string(),
            attribute: name.to_string(),
        })
    }

    /// Optional attribute converted to `T`.
    pub fn attr<T: FromXmlValue>(&self, name: &str) -> Result<Option<T>> {
        match self.attribute(name) {
            None => Ok(None),
            Some(text) => convert::parse(&text)
                .map(Some)
                .map_err(|source| self.conversion_error(source)),
        }
    }

    /// Mandatory attribute converted to `T`.
    pub fn require_attr<T: FromXmlValue>(&self, name: &str) -> Result<T> {
        let text = self.require_attribute(name)?;
        convert::parse(&text).map_err(|source| self.conversion_error(source))
    }

    /// Optional attribute converted to a delimited list of `T`.
    pub fn attr_list<T: FromXmlValue>(&self, name: &str) -> Result<Option<Vec<T>>> {
        match self.attribute(name) {
            None => Ok(None),
            Some(text) => convert::parse_list(&text)
                .map(Some)
                .map_err(|source| self.conversion_error(source)),
        }
    }

    /// Mandatory attribute converted to a delimited list of `T`.
    pub fn require_attr_list<T: FromXmlValue>(&self, name: &str) -> Result<Vec<T>> {
        let text = self.require_attribute(name)?;
        convert::parse_list(&text).map_err(|source| self.conversion_error(source))
    }

    /// Collect the text content of the current element, consuming it.
    ///
    /// Nested child elements are skipped; only text at this element's own
    /// level is returned. After this call the engine will not skip the
    /// element again.
    pub fn text(&mut self) -> Result<String> {
        if self.empty {
            return Ok(String::new());
        }
        let mut out = String::new();
        let mut depth = 0usize;
        loop {
            match self.source.next()? {
                None => {
                    return Err(structural(
                        self.file,
                        format!("unexpected end of document inside <{}>", self.element),
                    ));
                }
                Some(Event::Text(text)) => {
                    if depth == 0 {
                        out.push_str(&text);
                    }
                }
                Some(Event::ElementStart(_)) => {
                    if !self.source.is_empty_element() {
                        depth += 1;
                    }
                }
                Some(Event::ElementEnd(name)) => {
                    if depth == 0 {
                        if name != self.element {
                            return Err(structural(
                                self.file,
                                format!(
                                    "expected closing </{}>, found </{name}>",
                                    self.element
                                ),
                            ));
                        }
                        self.consumed = true;
                        return Ok(out);
                    }
                    depth -= 1;
                }
            }
        }
    }

    fn conversion_error(&self, source: ConversionError) -> ImportError {
        ImportError::Conversion {
            file: self.file.to_string(),
            element: self.element.to_string(),
            source,
        }
    }
}

/// Validate a whole document against `schema`.
///
/// Skips prolog events, requires the first element to be the schema's root
/// name, validates it, and rejects trailing content after the root.
pub fn validate_document<S>(
    schema: &DocumentSchema<S>,
    source: &mut dyn TokenSource,
    file: &FileId,
    state: &mut S,
) -> Result<()> {
    loop {
        match source.next()? {
            None => {
                return Err(structural(
                    file,
                    format!("expected root element <{}>, found end of document", schema.root),
                ));
            }
            Some(Event::Text(_)) => continue,
            Some(Event::ElementEnd(name)) => {
                return Err(structural(
                    file,
                    format!("unexpected closing </{name}> before root element"),
                ));
            }
            Some(Event::ElementStart(name)) => {
                if name != schema.root {
                    return Err(structural(
                        file,
                        format!("expected root element <{}>, found <{name}>", schema.root),
                    ));
                }
                validate_element(&schema.node, &name, source, file, state)?;
                break;
            }
        }
    }
    loop {
        match source.next()? {
            None => return Ok(()),
            Some(Event::Text(_)) => continue,
            Some(event) => {
                return Err(structural(
                    file,
                    format!("unexpected {event} after root element"),
                ));
            }
        }
    }
}

/// Validate one element whose start event has just been consumed.
pub fn validate_element<S>(
    node: &SchemaNode<S>,
    name: &str,
    source: &mut dyn TokenSource,
    file: &FileId,
    state: &mut S,
) -> Result<()> {
    let empty = source.is_empty_element();
    match node {
        SchemaNode::Leaf { action, .. } => {
            let mut ctx = ParseContext {
                source: &mut *source,
                file,
                element: name,
                empty,
                consumed: false,
                state,
            };
            action(&mut ctx)?;
            let consumed = ctx.consumed;
            if !empty && !consumed {
                skip_element(source, name, file)?;
            }
            Ok(())
        }
        SchemaNode::Sequence { occurs, children } => {
            if empty {
                return check_empty(node, name, file);
            }
            validate_sequence(*occurs, children, name, source, file, state)
        }
        SchemaNode::Choice { occurs, children } => {
            if empty {
                return check_empty(node, name, file);
            }
            validate_choice(*occurs, children, name, source, file, state)
        }
    }
}

/// A self-closing container element: valid only if the node admits zero
/// children, detected at the point the empty element is recognized.
fn check_empty<S>(node: &SchemaNode<S>, name: &str, file: &FileId) -> Result<()> {
    if node.admits_empty() {
        return Ok(());
    }
    let occurs = node.occurs();
    if occurs.min > 0 {
        return Err(cardinality(file, name, 0, occurs));
    }
    for child in node.children() {
        let child_occurs = child.node.occurs();
        if child_occurs.min > 0 {
            return Err(cardinality(file, &child.name, 0, child_occurs));
        }
    }
    Ok(())
}

fn validate_sequence<S>(
    occurs: Occurs,
    children: &[ChildRule<S>],
    parent: &str,
    source: &mut dyn TokenSource,
    file: &FileId,
    state: &mut S,
) -> Result<()> {
    let mut counts = vec![0u32; children.len()];
    let mut position = 0usize;
    let mut cycles = 0u32;
    loop {
        match source.next()? {
            None => {
                return Err(structural(
                    file,
                    format!("unexpected end of document inside <{parent}>"),
                ));
            }
            Some(Event::Text(_)) => {}
            Some(Event::ElementEnd(name)) => {
                if name != parent {
                    return Err(structural(
                        file,
                        format!("expected closing </{parent}>, found </{name}>"),
                    ));
                }
                if counts.iter().any(|count| *count > 0) {
                    close_cycle(children, &mut counts, file)?;
                    cycles += 1;
                }
                if !occurs.contains(cycles) {
                    return Err(cardinality(file, parent, cycles, occurs));
                }
                return Ok(());
            }
            Some(Event::ElementStart(name)) => {
                match find_from(children, position, &name) {
                    None => skip_element(source, &name, file)?,
                    Some((index, wrapped)) => {
                        if wrapped {
                            // Crossing back to the start of the list closes
                            // one full cycle.
                            close_cycle(children, &mut counts, file)?;
                            cycles += 1;
                        }
                        validate_element(&children[index].node, &name, source, file, state)?;
                        counts[index] += 1;
                        position = index;
                    }
                }
            }
        }
    }
}

fn validate_choice<S>(
    occurs: Occurs,
    children: &[ChildRule<S>],
    parent: &str,
    source: &mut dyn TokenSource,
    file: &FileId,
    state: &mut S,
) -> Result<()> {
    let mut counts = vec![0u32; children.len()];
    let mut total = 0u32;
    loop {
        match source.next()? {
            None => {
                return Err(structural(
                    file,
                    format!("unexpected end of document inside <{parent}>"),
                ));
            }
            Some(Event::Text(_)) => {}
            Some(Event::ElementEnd(name)) => {
                if name != parent {
                    return Err(structural(
                        file,
                        format!("expected closing </{parent}>, found </{name}>"),
                    ));
                }
                for (rule, count) in children.iter().zip(counts.iter()) {
                    let child_occurs = rule.node.occurs();
                    if !child_occurs.contains(*count) {
                        return Err(cardinality(file, &rule.name, *count, child_occurs));
                    }
                }
                if !occurs.contains(total) {
                    return Err(cardinality(file, parent, total, occurs));
                }
                return Ok(());
            }
            Some(Event::ElementStart(name)) => {
                match children.iter().position(|rule| rule.name == name) {
                    None => skip_element(source, &name, file)?,
                    Some(index) => {
                        validate_element(&children[index].node, &name, source, file, state)?;
                        counts[index] += 1;
                        total = total.saturating_add(1);
                    }
                }
            }
        }
    }
}

/// Forward search from `position`, wrapping once back to the start.
/// Returns the matched index and whether the match was reached by wrapping.
fn find_from<S>(
    children: &[ChildRule<S>],
    position: usize,
    name: &str,
) -> Option<(usize, bool)> {
    for (index, rule) in children.iter().enumerate().skip(position) {
        if rule.name == name {
            return Some((index, false));
        }
    }
    for (index, rule) in children.iter().enumerate().take(position) {
        if rule.name == name {
            return Some((index, true));
        }
    }
    None
}

/// Validate every child's count for the cycle just completed, then reset the
/// counters for the next cycle.
fn close_cycle<S>(
    children: &[ChildRule<S>],
    counts: &mut [u32],
    file: &FileId,
) -> Result<()> {
    for (rule, count) in children.iter().zip(counts.iter_mut()) {
        let occurs = rule.node.occurs();
        if !occurs.contains(*count) {
            return Err(cardinality(file, &rule.name, *count, occurs));
        }
        *count = 0;
    }
    Ok(())
}

/// Skip an unmapped element and all its descendants without error.
/// The element's start event has already been consumed.
fn skip_element(source: &mut dyn TokenSource, name: &str, file: &FileId) -> Result<()> {
    if source.is_empty_element() {
        return Ok(());
    }
    let mut depth = 1usize;
    loop {
        match source.next()? {
            None => {
                return Err(structural(
                    file,
                    format!("unexpected end of document while skipping <{name}>"),
                ));
            }
            Some(Event::Text(_)) => {}
            Some(Event::ElementStart(_)) => {
                if !source.is_empty_element() {
                    depth += 1;
                }
            }
            Some(Event::ElementEnd(_)) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
    }
}

fn structural(file: &FileId, details: String) -> ImportError {
    ImportError::Structural {
        file: file.to_string(),
        details,
    }
}

fn cardinality(file: &FileId, element: &str, actual: u32, occurs: Occurs) -> ImportError {
    ImportError::Cardinality {
        file: file.to_string(),
        element: element.to_string(),
        actual,
        min: occurs.min,
        max: occurs.max,
    }
}
