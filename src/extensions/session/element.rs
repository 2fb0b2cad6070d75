//! Rendered element trees and their validation.
//!
//! A sandboxed command renders into plain JSON: every node is either text or
//! an element with a type name, props and children. Function props have
//! already been replaced by `{"$callback": "<id>"}` references.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Deepest tree the host will display.
///
/// Each element level nests two JSON values (the object and its `children`
/// array), so this stays well under `serde_json`'s recursion limit of 128
/// and oversized trees surface as [`ElementError::TooDeep`].
pub const MAX_DEPTH: usize = 48;

/// Largest number of nodes in one rendered frame.
pub const MAX_NODES: usize = 10_000;

/// Prop key marking a callback reference.
pub const CALLBACK_KEY: &str = "$callback";

/// One node of a rendered tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Text(String),
    Element(Element),
}

/// A host element such as `List`, `List.Item` or `Detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<Node>,
}

/// Error type for element validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElementError {
    #[error("Element at {path} has an empty type")]
    EmptyType { path: String },

    #[error("Element tree exceeds maximum depth of {0}")]
    TooDeep(usize),

    #[error("Element tree exceeds maximum size of {0} nodes")]
    TooManyNodes(usize),
}

impl Element {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            props: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// The fixed panel shown in place of a failed command or render.
    pub fn error_panel(message: &str) -> Self {
        let markdown = format!("## Something went wrong\n\n```\n{}\n```", message);
        Element::new("Detail")
            .with_prop("navigationTitle", "Error")
            .with_prop("markdown", markdown)
    }

    /// Whether this element is the panel produced by [`Element::error_panel`].
    pub fn is_error_panel(&self) -> bool {
        self.kind == "Detail"
            && self.props.get("navigationTitle").and_then(Value::as_str) == Some("Error")
    }

    /// Callback id of a prop, if it holds a callback reference.
    pub fn callback(&self, prop: &str) -> Option<&str> {
        self.props
            .get(prop)?
            .as_object()?
            .get(CALLBACK_KEY)?
            .as_str()
    }

    /// First element of the given type, depth-first, including `self`.
    pub fn find(&self, kind: &str) -> Option<&Element> {
        if self.kind == kind {
            return Some(self);
        }
        self.children.iter().find_map(|child| match child {
            Node::Element(element) => element.find(kind),
            Node::Text(_) => None,
        })
    }

    /// Check structural limits before the tree is shown.
    pub fn validate(&self) -> Result<(), ElementError> {
        let mut count = 0;
        validate_node(self, &self.kind, 1, &mut count)
    }
}

fn validate_node(
    element: &Element,
    path: &str,
    depth: usize,
    count: &mut usize,
) -> Result<(), ElementError> {
    if depth > MAX_DEPTH {
        return Err(ElementError::TooDeep(MAX_DEPTH));
    }
    *count += 1;
    if *count > MAX_NODES {
        return Err(ElementError::TooManyNodes(MAX_NODES));
    }
    if element.kind.trim().is_empty() {
        return Err(ElementError::EmptyType {
            path: path.to_string(),
        });
    }

    for (index, child) in element.children.iter().enumerate() {
        match child {
            Node::Element(el) => {
                let child_path = format!("{}/{}[{}]", path, el.kind, index);
                validate_node(el, &child_path, depth + 1, count)?;
            }
            Node::Text(_) => {
                *count += 1;
                if *count > MAX_NODES {
                    return Err(ElementError::TooManyNodes(MAX_NODES));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tree() {
        let value = json!({
            "type": "List",
            "props": { "searchBarPlaceholder": "Search..." },
            "children": [
                { "type": "List.Item", "props": { "title": "One", "onAction": { "$callback": "cb_1" } } },
                "plain text"
            ]
        });

        let element: Element = serde_json::from_value(value).unwrap();
        assert_eq!(element.kind, "List");
        assert_eq!(element.children.len(), 2);

        let item = element.find("List.Item").unwrap();
        assert_eq!(item.callback("onAction"), Some("cb_1"));
        assert_eq!(item.callback("title"), None);
        assert_eq!(element.children[1], Node::Text("plain text".to_string()));
        assert!(element.validate().is_ok());
    }

    #[test]
    fn test_missing_props_and_children_default() {
        let element: Element = serde_json::from_str(r#"{ "type": "Detail" }"#).unwrap();
        assert!(element.props.is_empty());
        assert!(element.children.is_empty());
    }

    #[test]
    fn test_rejects_empty_type() {
        let element = Element::new("List").with_child(Node::Element(Element::new(" ")));
        assert!(matches!(
            element.validate(),
            Err(ElementError::EmptyType { .. })
        ));
    }

    #[test]
    fn test_rejects_deep_tree() {
        let mut element = Element::new("Leaf");
        for _ in 0..MAX_DEPTH {
            element = Element::new("Box").with_child(Node::Element(element));
        }
        assert_eq!(element.validate(), Err(ElementError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn test_deep_render_reply_parses_then_fails_validation() {
        let mut tree = json!({ "type": "Leaf" });
        for _ in 0..MAX_DEPTH {
            tree = json!({ "type": "Box", "props": {}, "children": [tree] });
        }
        let reply = json!({ "ok": true, "tree": tree }).to_string();

        #[derive(Deserialize)]
        struct Reply {
            tree: Element,
        }
        let reply: Reply = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply.tree.validate(), Err(ElementError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn test_rejects_huge_tree() {
        let mut element = Element::new("List");
        for i in 0..=MAX_NODES {
            element.children.push(Node::Text(i.to_string()));
        }
        assert_eq!(element.validate(), Err(ElementError::TooManyNodes(MAX_NODES)));
    }

    #[test]
    fn test_error_panel() {
        let panel = Element::error_panel("boom");
        assert!(panel.is_error_panel());
        assert!(panel.props["markdown"].as_str().unwrap().contains("boom"));
        assert!(!Element::new("Detail").is_error_panel());
    }
}
