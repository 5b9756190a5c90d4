/*
 * types.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The parsed document tree and its document-level metadata.
 */

use crate::dtd::Dtd;

/// A parsed document: the root element plus what the prolog declared.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
    pub docinfo: DocInfo,
}

/// Document-level metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocInfo {
    /// The DOCTYPE declaration without its internal subset, if one was present.
    pub doctype: Option<String>,

    /// Name of the root element as written, including any prefix.
    pub root_name: String,

    /// System identifier of the DOCTYPE.
    pub system_url: Option<String>,

    /// Public identifier of the DOCTYPE.
    pub public_id: Option<String>,

    /// Declarations from the DOCTYPE's internal subset.
    pub internal_dtd: Option<Dtd>,

    /// Declarations from the external subset, when it was fetched.
    pub external_dtd: Option<Dtd>,

    pub xml_version: Option<String>,

    /// The `encoding` of the XML declaration, as written.
    pub encoding: Option<String>,

    pub standalone: Option<bool>,

    /// Location the document was loaded for; relative references resolve against it.
    pub url: Option<String>,
}

impl DocInfo {
    pub fn has_doctype(&self) -> bool {
        self.doctype.is_some()
    }
}

/// An XML element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// The local name of the element (without namespace prefix).
    pub name: String,

    /// Namespace prefix, if any (e.g., "wsdl" in `<wsdl:types>`).
    pub prefix: Option<String>,

    /// Namespace URI the element's prefix resolves to.
    pub namespace: Option<String>,

    /// Namespace declarations made on this element.
    pub namespaces: Vec<NamespaceDecl>,

    /// Attributes of this element, excluding namespace declarations.
    pub attributes: Vec<XmlAttribute>,

    /// Child content in document order.
    pub children: Vec<XmlNode>,
}

/// An attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// The local name of the attribute (without namespace prefix).
    pub name: String,

    pub prefix: Option<String>,

    /// Namespace URI of a prefixed attribute. Unprefixed attributes have none.
    pub namespace: Option<String>,

    /// The attribute value after decoding predefined entities and character
    /// references and normalizing whitespace.
    pub value: String,
}

/// An `xmlns` or `xmlns:prefix` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// `None` for the default namespace.
    pub prefix: Option<String>,
    pub uri: String,
}

/// A node in an element's content.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),

    /// Character data; CDATA sections are merged into text.
    Text(String),

    /// A reference to a custom entity, left unexpanded.
    EntityRef(String),

    ProcessingInstruction { target: String, data: String },
}

impl XmlElement {
    /// Create an element with no attributes or content.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The name as written in the document, `prefix:name` or `name`.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }

    /// Get an attribute value by local name.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Get an attribute value by namespace URI and local name.
    pub fn get_attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// Get child elements by local name.
    pub fn get_children(&self, name: &str) -> Vec<&XmlElement> {
        self.elements().filter(|e| e.name == name).collect()
    }

    /// Get all child elements (ignoring text and other nodes).
    pub fn all_children(&self) -> Vec<&XmlElement> {
        self.elements().collect()
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First descendant element (depth-first, excluding `self`) with this local name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.elements()
            .find_map(|e| if e.name == name { Some(e) } else { e.find(name) })
    }

    /// Text content, if this element contains exactly one text node.
    pub fn text(&self) -> Option<&str> {
        match self.children.as_slice() {
            [XmlNode::Text(text)] => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(text) => out.push_str(text),
                XmlNode::Element(e) => e.collect_text(out),
                XmlNode::EntityRef(_) | XmlNode::ProcessingInstruction { .. } => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl XmlAttribute {
    /// Create an unprefixed attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            namespace: None,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(name: &str, children: Vec<XmlNode>) -> XmlElement {
        XmlElement {
            children,
            ..XmlElement::new(name)
        }
    }

    #[test]
    fn test_element_get_attribute() {
        let mut element = XmlElement::new("import");
        element.attributes.push(XmlAttribute::new("location", "a.xsd"));
        element.attributes.push(XmlAttribute {
            name: "type".to_string(),
            prefix: Some("xsi".to_string()),
            namespace: Some("http://www.w3.org/2001/XMLSchema-instance".to_string()),
            value: "t".to_string(),
        });

        assert_eq!(element.get_attribute("location"), Some("a.xsd"));
        assert_eq!(element.get_attribute("missing"), None);
        assert_eq!(
            element.get_attribute_ns("http://www.w3.org/2001/XMLSchema-instance", "type"),
            Some("t")
        );
        assert_eq!(element.get_attribute_ns("urn:other", "type"), None);
    }

    #[test]
    fn test_element_children() {
        let parent = element(
            "types",
            vec![
                XmlNode::Text("\n  ".to_string()),
                XmlNode::Element(XmlElement::new("schema")),
                XmlNode::EntityRef("custom".to_string()),
                XmlNode::Element(XmlElement::new("schema")),
                XmlNode::Element(XmlElement::new("other")),
            ],
        );

        assert_eq!(parent.all_children().len(), 3);
        assert_eq!(parent.get_children("schema").len(), 2);
        assert_eq!(parent.text(), None);
        assert!(!parent.is_empty());
    }

    #[test]
    fn test_element_text() {
        let leaf = element("doc", vec![XmlNode::Text("Hello, world!".to_string())]);
        assert_eq!(leaf.text(), Some("Hello, world!"));

        let mixed = element(
            "p",
            vec![
                XmlNode::Text("a".to_string()),
                XmlNode::Element(leaf),
                XmlNode::EntityRef("x".to_string()),
                XmlNode::Text("b".to_string()),
            ],
        );
        assert_eq!(mixed.text(), None);
        assert_eq!(mixed.text_content(), "aHello, world!b");
    }

    #[test]
    fn test_find_is_depth_first() {
        let mut inner = XmlElement::new("element");
        inner.attributes.push(XmlAttribute::new("name", "deep"));
        let tree = element(
            "definitions",
            vec![
                XmlNode::Element(element("types", vec![XmlNode::Element(inner)])),
                XmlNode::Element(XmlElement::new("element")),
            ],
        );

        let found = tree.find("element").unwrap();
        assert_eq!(found.get_attribute("name"), Some("deep"));
        assert!(tree.find("missing").is_none());
    }

    #[test]
    fn test_qualified_name() {
        let mut element = XmlElement::new("definitions");
        assert_eq!(element.qualified_name(), "definitions");
        element.prefix = Some("wsdl".to_string());
        assert_eq!(element.qualified_name(), "wsdl:definitions");
    }
}
