//! Minimal device tree.
//!
//! Just enough of a tree to consume the NPU/link/I2C nodes the firmware
//! describes and to publish the OpenCAPI PHB nodes: named nodes, parent and
//! child links, phandles and cell- or string-valued properties.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Cells(Vec<u32>),
    Strings(Vec<String>),
}

#[derive(Debug, Clone)]
struct Property {
    name: String,
    value: PropValue,
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    phandle: u32,
    props: Vec<Property>,
}

#[derive(Debug, Clone)]
pub struct DeviceTree {
    nodes: Vec<Node>,
}

impl Default for DeviceTree {
    fn default() -> Self {
        Self::new()
    }
}

pub const fn hi32(v: u64) -> u32 {
    (v >> 32) as u32
}

pub const fn lo32(v: u64) -> u32 {
    v as u32
}

impl DeviceTree {
    pub fn new() -> Self {
        Self {
            nodes: alloc::vec![Node {
                name: String::new(),
                parent: None,
                children: Vec::new(),
                phandle: 1,
                props: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_node(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            phandle: id.0 as u32 + 1,
            props: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Adds `name@<addr>` under `parent`.
    pub fn new_addr(&mut self, parent: NodeId, name: &str, addr: u64) -> NodeId {
        self.add_node(parent, &format!("{}@{:x}", name, addr))
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn phandle(&self, node: NodeId) -> u32 {
        self.nodes[node.0].phandle
    }

    pub fn path(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n != self.root() {
                parts.push(self.name(n));
            }
            cur = self.parent(n);
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Sets a property, replacing any previous value.
    pub fn set_property(&mut self, node: NodeId, name: &str, value: PropValue) {
        let props = &mut self.nodes[node.0].props;
        match props.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value,
            None => props.push(Property {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn add_property_cells(&mut self, node: NodeId, name: &str, cells: &[u32]) {
        self.set_property(node, name, PropValue::Cells(cells.to_vec()));
    }

    /// Adds a 64-bit value as two cells.
    pub fn add_property_u64(&mut self, node: NodeId, name: &str, val: u64) {
        self.add_property_cells(node, name, &[hi32(val), lo32(val)]);
    }

    pub fn add_property_strings(&mut self, node: NodeId, name: &str, strings: &[&str]) {
        let v = strings.iter().map(|s| s.to_string()).collect();
        self.set_property(node, name, PropValue::Strings(v));
    }

    pub fn add_property_string(&mut self, node: NodeId, name: &str, s: &str) {
        self.add_property_strings(node, name, &[s]);
    }

    pub fn prop(&self, node: NodeId, name: &str) -> Option<&PropValue> {
        self.nodes[node.0]
            .props
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn prop_cells(&self, node: NodeId, name: &str) -> Option<&[u32]> {
        match self.prop(node, name)? {
            PropValue::Cells(c) => Some(c),
            PropValue::Strings(_) => None,
        }
    }

    pub fn prop_u32(&self, node: NodeId, name: &str) -> Option<u32> {
        self.prop_cells(node, name)?.first().copied()
    }

    pub fn prop_u64(&self, node: NodeId, name: &str) -> Option<u64> {
        match self.prop_cells(node, name)? {
            [hi, lo, ..] => Some(((*hi as u64) << 32) | *lo as u64),
            [lo] => Some(*lo as u64),
            [] => None,
        }
    }

    pub fn prop_str(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.prop(node, name)? {
            PropValue::Strings(s) => s.first().map(String::as_str),
            PropValue::Cells(_) => None,
        }
    }

    pub fn is_compatible(&self, node: NodeId, compat: &str) -> bool {
        matches!(self.prop(node, "compatible"), Some(PropValue::Strings(s)) if s.iter().any(|c| c == compat))
    }

    /// Every node below `start`, in depth-first order.
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(start).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            found.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        found
    }

    /// Descendants of `start` carrying `compat`, in depth-first order.
    pub fn find_compatible(&self, start: NodeId, compat: &str) -> Vec<NodeId> {
        self.descendants(start)
            .into_iter()
            .filter(|&n| self.is_compatible(n, compat))
            .collect()
    }

    /// `ibm,chip-id` of the node or its closest ancestor.
    pub fn chip_id(&self, node: NodeId) -> Option<u32> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if let Some(id) = self.prop_u32(n, "ibm,chip-id") {
                return Some(id);
            }
            cur = self.parent(n);
        }
        None
    }

    /// First address of the node's `reg`, one cell wide.
    pub fn address(&self, node: NodeId) -> Option<u64> {
        self.prop_u32(node, "reg").map(u64::from)
    }
}
