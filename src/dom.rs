//! HTML tree – a small in-process DOM that can be parsed from markup,
//! queried, mutated, and serialized back.
//!
//! The parser targets well-formed markup of the kind templates and the
//! pagination engine emit. It does not implement HTML5 error recovery
//! (implicit end tags, foster parenting).

use markup5ever::data;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// Tag name of an element. Tags the pipeline inspects get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Body,
    Div,
    Span,
    Table,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Th,
    Td,
    Script,
    Style,
    /// Any other tag, stored lowercase.
    Other(String),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

impl Tag {
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "div" => Tag::Div,
            "span" => Tag::Span,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "th" => Tag::Th,
            "td" => Tag::Td,
            "script" => Tag::Script,
            "style" => Tag::Style,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Body => "body",
            Tag::Div => "div",
            Tag::Span => "span",
            Tag::Table => "table",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tfoot => "tfoot",
            Tag::Tr => "tr",
            Tag::Th => "th",
            Tag::Td => "td",
            Tag::Script => "script",
            Tag::Style => "style",
            Tag::Other(name) => name,
        }
    }

    /// Elements that never have children or an end tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Other(name) if VOID_ELEMENTS.contains(&name.as_str()))
    }

    /// Elements whose content is raw text, not markup.
    pub fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Script | Tag::Style)
    }
}

/// A node in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.set_attribute("class", class);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(DomNode::Text(text.to_string()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self
            .attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attribute("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    /// First descendant (pre-order, excluding `self`) matching `pred`.
    pub fn find_descendant(&self, pred: &dyn Fn(&ElementNode) -> bool) -> Option<&ElementNode> {
        for child in &self.children {
            if let DomNode::Element(e) = child {
                if pred(e) {
                    return Some(e);
                }
                if let Some(found) = e.find_descendant(pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                DomNode::Text(t) => out.push_str(t),
                DomNode::Element(e) => out.push_str(&e.text_content()),
            }
        }
        out
    }
}

/// A parsed document: optional doctype plus top-level nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub doctype: Option<String>,
    pub nodes: Vec<DomNode>,
}

/// Index path from the document's top-level nodes down to an element.
pub type NodePath = Vec<usize>;

impl Document {
    pub fn parse(html: &str) -> Self {
        let mut parser = Parser::new(html);
        let mut doc = Document::default();
        loop {
            doc.nodes.extend(parser.parse_nodes(&mut doc.doctype));
            if parser.eof() {
                break;
            }
            // Stray end tag at top level.
            parser.skip_end_tag();
        }
        doc
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if let Some(doctype) = &self.doctype {
            out.push_str(&format!("<!{doctype}>"));
        }
        for node in &self.nodes {
            write_node(node, false, &mut out);
        }
        out
    }

    /// First `<body>` element, if any.
    pub fn body(&self) -> Option<&ElementNode> {
        let path = self.find_all(&|e| e.tag == Tag::Body, false).into_iter().next()?;
        self.element(&path)
    }

    /// Paths of every element matching `pred`, in document order. When
    /// `descend_into_matches` is false, matches nested inside an earlier
    /// match are skipped.
    pub fn find_all(
        &self,
        pred: &dyn Fn(&ElementNode) -> bool,
        descend_into_matches: bool,
    ) -> Vec<NodePath> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        collect_paths(&self.nodes, pred, descend_into_matches, &mut path, &mut out);
        out
    }

    /// Paths of every element below `root` matching `pred`, in document order.
    pub fn find_all_within(
        &self,
        root: &[usize],
        pred: &dyn Fn(&ElementNode) -> bool,
    ) -> Vec<NodePath> {
        let Some(element) = self.element(root) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut path = root.to_vec();
        collect_paths(&element.children, pred, true, &mut path, &mut out);
        out
    }

    pub fn element(&self, path: &[usize]) -> Option<&ElementNode> {
        let (first, rest) = path.split_first()?;
        let mut current = match self.nodes.get(*first)? {
            DomNode::Element(e) => e,
            DomNode::Text(_) => return None,
        };
        for index in rest {
            current = match current.children.get(*index)? {
                DomNode::Element(e) => e,
                DomNode::Text(_) => return None,
            };
        }
        Some(current)
    }

    pub fn element_mut(&mut self, path: &[usize]) -> Option<&mut ElementNode> {
        let (first, rest) = path.split_first()?;
        let mut current = match self.nodes.get_mut(*first)? {
            DomNode::Element(e) => e,
            DomNode::Text(_) => return None,
        };
        for index in rest {
            current = match current.children.get_mut(*index)? {
                DomNode::Element(e) => e,
                DomNode::Text(_) => return None,
            };
        }
        Some(current)
    }
}

fn collect_paths(
    nodes: &[DomNode],
    pred: &dyn Fn(&ElementNode) -> bool,
    descend_into_matches: bool,
    path: &mut Vec<usize>,
    out: &mut Vec<NodePath>,
) {
    for (i, node) in nodes.iter().enumerate() {
        if let DomNode::Element(e) = node {
            path.push(i);
            let matched = pred(e);
            if matched {
                out.push(path.clone());
            }
            if !matched || descend_into_matches {
                collect_paths(&e.children, pred, descend_into_matches, path, out);
            }
            path.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

fn write_node(node: &DomNode, raw: bool, out: &mut String) {
    match node {
        DomNode::Text(t) if raw => out.push_str(t),
        DomNode::Text(t) => out.push_str(&escape_text(t)),
        DomNode::Element(e) => {
            out.push('<');
            out.push_str(e.tag.name());
            for (k, v) in &e.attributes {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&escape_attribute(v));
                out.push('"');
            }
            out.push('>');
            if e.tag.is_void() {
                return;
            }
            for child in &e.children {
                write_node(child, e.tag.is_raw_text(), out);
            }
            out.push_str("</");
            out.push_str(e.tag.name());
            out.push('>');
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('\u{00A0}', "&nbsp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('\u{00A0}', "&nbsp;")
        .replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Parser – recursive descent over well-formed HTML
// ---------------------------------------------------------------------------

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_nodes(&mut self, doctype: &mut Option<String>) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        loop {
            if self.eof() || self.starts_with("</") {
                break;
            }
            if let Some(node) = self.parse_node(doctype) {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self, doctype: &mut Option<String>) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_past("-->");
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            self.advance(2);
            let start = self.pos;
            self.skip_past(">");
            let body = self.input[start..self.pos].trim_end_matches('>');
            if body.to_ascii_lowercase().starts_with("doctype") && doctype.is_none() {
                *doctype = Some(body.to_string());
            }
            return None;
        }
        if self.starts_with("<") && self.peek_is_tag_start() {
            Some(self.parse_element(doctype))
        } else {
            Some(self.parse_text())
        }
    }

    fn peek_is_tag_start(&self) -> bool {
        self.input[self.pos + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // A lone '<' that does not open a tag is text.
        if self.starts_with("<") {
            self.advance(1);
        }
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos], false))
    }

    fn parse_element(&mut self, doctype: &mut Option<String>) -> DomNode {
        self.advance(1); // '<'
        let tag = Tag::from_name(&self.parse_name());
        let mut elem = ElementNode::new(tag.clone());

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            match self.parse_attribute() {
                Some((key, value)) => elem.attributes.push((key, value)),
                None => self.advance(1),
            }
        }

        if self.starts_with("/>") {
            self.advance(2);
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.advance(1);
        }
        if tag.is_void() {
            return DomNode::Element(elem);
        }

        if tag.is_raw_text() {
            let close = format!("</{}", tag.name());
            let start = self.pos;
            let end = self.input[start..]
                .to_ascii_lowercase()
                .find(&close)
                .map(|i| start + i)
                .unwrap_or(self.input.len());
            if end > start {
                elem.children
                    .push(DomNode::Text(self.input[start..end].to_string()));
            }
            self.pos = end;
        } else {
            elem.children = self.parse_nodes(doctype);
        }

        self.skip_end_tag();
        DomNode::Element(elem)
    }

    fn skip_end_tag(&mut self) {
        if self.starts_with("</") {
            self.advance(2);
            self.parse_name();
            self.skip_past(">");
        }
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.' | '@') {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> Option<(String, String)> {
        let key = self.parse_name();
        if key.is_empty() {
            return None;
        }
        self.skip_whitespace();
        if !self.starts_with("=") {
            return Some((key, String::new()));
        }
        self.advance(1); // '='
        self.skip_whitespace();
        Some((key, self.parse_attr_value()))
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.advance(1);
                let start = self.pos;
                while !self.eof() && !self.starts_with(quote) {
                    self.advance(1);
                }
                let val = decode_entities(&self.input[start..self.pos], true);
                if !self.eof() {
                    self.advance(1);
                }
                return val;
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' {
                break;
            }
            self.advance(1);
        }
        decode_entities(&self.input[start..self.pos], true)
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    /// Advance until just after `needle`, or to the end of input.
    fn skip_past(&mut self, needle: &str) {
        match self.input[self.pos..].find(needle) {
            Some(i) => self.pos += i + needle.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

/// Decode character references the way an HTML tokenizer does: every
/// numeric reference, and every named reference in the WHATWG table.
/// Unknown names stay literal. In attribute values a legacy name without
/// `;` followed by an alphanumeric or `=` is not decoded.
fn decode_entities(s: &str, in_attribute: bool) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = if tail.starts_with('#') {
            decode_numeric(&tail[1..]).map(|(c, used)| (c.to_string(), used + 1))
        } else {
            decode_named(tail, in_attribute)
        };
        match decoded {
            Some((text, used)) => {
                out.push_str(&text);
                rest = &tail[used..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `NNN;` or `xHH;` after `&#`. Returns the character and bytes consumed.
fn decode_numeric(s: &str) -> Option<(char, usize)> {
    let (radix, skip) = match s.as_bytes().first() {
        Some(b'x' | b'X') => (16, 1),
        _ => (10, 0),
    };
    let digits = s[skip..]
        .bytes()
        .take_while(|b| (*b as char).is_digit(radix))
        .count();
    if digits == 0 {
        return None;
    }
    let mut used = skip + digits;
    if s[used..].starts_with(';') {
        used += 1;
    }
    let code = u32::from_str_radix(&s[skip..skip + digits], radix).unwrap_or(u32::MAX);
    let c = match code {
        0x80..=0x9F => data::C1_REPLACEMENTS[(code - 0x80) as usize]
            .or_else(|| char::from_u32(code)),
        0 => None,
        _ => char::from_u32(code),
    };
    Some((c.unwrap_or('\u{FFFD}'), used))
}

/// Longest named reference at the start of `s` (after `&`).
fn decode_named(s: &str, in_attribute: bool) -> Option<(String, usize)> {
    let name_len = s.bytes().take_while(|b| b.is_ascii_alphanumeric()).count();
    if name_len == 0 {
        return None;
    }
    if s[name_len..].starts_with(';') {
        if let Some(text) = lookup_entity(&s[..=name_len]) {
            return Some((text, name_len + 1));
        }
    }
    // Legacy references that may omit the semicolon.
    for len in (1..=name_len).rev() {
        if let Some(text) = lookup_entity(&s[..len]) {
            let next = s[len..].bytes().next();
            if in_attribute && next.is_some_and(|b| b.is_ascii_alphanumeric() || b == b'=') {
                return None;
            }
            return Some((text, len));
        }
    }
    None
}

fn lookup_entity(key: &str) -> Option<String> {
    match data::NAMED_ENTITIES.get(key) {
        // Prefix-only entries map to (0, 0).
        Some(&(0, _)) | None => None,
        Some(&(first, second)) => {
            let mut text = String::new();
            text.extend(char::from_u32(first));
            if second != 0 {
                text.extend(char::from_u32(second));
            }
            Some(text)
        }
    }
}
