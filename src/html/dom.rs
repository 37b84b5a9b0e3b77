//! Index arena holding a parsed HTML document.
//!
//! Nodes refer to each other by [`NodeId`] (an index into the arena), so the
//! tree has a single owner and parent links need no reference counting.

use crate::model::html::HtmlNode;

/// Index of a node in its [`Document`].
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// The root of the tree; never has a parent.
    Document,
    /// Element with lowercase name and attributes in source order.
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// The document node is always the first entry of the arena.
    pub const ROOT: NodeId = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Create a detached element. Attach it with [`Document::append`].
    pub fn create_element(&mut self, name: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push(NodeData::Element {
            name: name.to_string(),
            attrs,
        })
    }

    /// Attach `child` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Append text to `parent`, merging with a trailing text child.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.nodes[parent].children.last() {
            if let NodeData::Text(existing) = &mut self.nodes[last].data {
                existing.push_str(text);
                return;
            }
        }
        let id = self.push(NodeData::Text(text.to_string()));
        self.append(parent, id);
    }

    /// Add attributes that `id` does not carry yet (`<html>`/`<body>` merging).
    pub fn merge_attributes(&mut self, id: NodeId, extra: Vec<(String, String)>) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            for (name, value) in extra {
                if !attrs.iter().any(|(n, _)| *n == name) {
                    attrs.push((name, value));
                }
            }
        }
    }

    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All descendants of `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of `id` and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        if let NodeData::Text(text) = &self.nodes[id].data {
            return text.clone();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|d| match &self.nodes[d].data {
                NodeData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Preorder rank of every node, indexed by [`NodeId`]. Arena order is
    /// creation order, which differs from document order once implied
    /// elements get attached late.
    pub fn document_order(&self) -> Vec<usize> {
        let mut ranks = vec![0; self.nodes.len()];
        ranks[Self::ROOT] = 0;
        for (rank, id) in self.descendants(Self::ROOT).into_iter().enumerate() {
            ranks[id] = rank + 1;
        }
        ranks
    }

    /// Serialisable copy of the subtree at `id`. The document node expands to
    /// its children.
    pub fn to_html_nodes(&self, id: NodeId) -> Vec<HtmlNode> {
        if let NodeData::Text(text) = &self.nodes[id].data {
            return vec![HtmlNode::text(text.clone())];
        }
        // (node, next child, converted children)
        let mut stack: Vec<(NodeId, usize, Vec<HtmlNode>)> = vec![(id, 0, Vec::new())];
        loop {
            let Some(frame) = stack.last_mut() else {
                return Vec::new();
            };
            if let Some(&child) = self.nodes[frame.0].children.get(frame.1) {
                frame.1 += 1;
                match &self.nodes[child].data {
                    NodeData::Text(text) => frame.2.push(HtmlNode::text(text.clone())),
                    _ => stack.push((child, 0, Vec::new())),
                }
                continue;
            }
            let Some((node, _, children)) = stack.pop() else {
                return Vec::new();
            };
            let finished = match &self.nodes[node].data {
                NodeData::Element { name, .. } => vec![HtmlNode::element(name.clone(), children)],
                _ => children,
            };
            match stack.last_mut() {
                Some(parent) => parent.2.extend(finished),
                None => return finished,
            }
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        self.nodes.len() - 1
    }
}
