use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{ModelError, NodeId, Position, SheetId, VersionId};

/// Payload-free discriminant of [`NodeBody`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Constant,
    Input,
    Output,
    Function,
    Comment,
    Lut,
    Sheet,
    Option,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Constant => "constant",
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Function => "function",
            NodeKind::Comment => "comment",
            NodeKind::Lut => "lut",
            NodeKind::Sheet => "sheet",
            NodeKind::Option => "option",
        })
    }
}

/// Kind of value a port carries. Connections are not type-checked against it; the
/// calculation backend coerces values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    #[default]
    Any,
    Number,
    Text,
    Table,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSide {
    Input,
    Output,
}

/// A named connection point on a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub key: String,
    #[serde(default)]
    pub socket: SocketKind,
}

impl Port {
    pub fn new(key: impl Into<String>, socket: SocketKind) -> Self {
        Self {
            key: key.into(),
            socket,
        }
    }

    pub fn any(key: impl Into<String>) -> Self {
        Self::new(key, SocketKind::Any)
    }
}

/// Addresses a single editable string on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "field")]
pub enum Field {
    /// Constant/input default value, or the selected option.
    Value,
    /// Per-case override of an input's value (e.g. from URL query parameters).
    Override,
    /// Function source code.
    Code,
    /// Comment text.
    Text,
    Description,
    LutCell { row: usize, col: usize },
}

/// Kind-specific node payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeBody {
    Constant {
        #[serde(default)]
        value: String,
    },
    Input {
        #[serde(default)]
        value: String,
        #[serde(default, rename = "overrideValue", skip_serializing_if = "Option::is_none")]
        override_value: Option<String>,
        #[serde(default)]
        socket: SocketKind,
    },
    Output {
        #[serde(default)]
        socket: SocketKind,
    },
    Function {
        #[serde(default)]
        code: String,
    },
    Comment {
        #[serde(default)]
        text: String,
    },
    Lut {
        #[serde(default)]
        rows: Vec<Vec<String>>,
    },
    Sheet {
        #[serde(rename = "sheetId")]
        sheet_id: SheetId,
        /// `None` tracks the live draft.
        #[serde(default, rename = "versionId", skip_serializing_if = "Option::is_none")]
        version_id: Option<VersionId>,
    },
    Option {
        #[serde(default)]
        choices: Vec<String>,
        #[serde(default)]
        value: String,
    },
}

impl NodeBody {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Constant { .. } => NodeKind::Constant,
            NodeBody::Input { .. } => NodeKind::Input,
            NodeBody::Output { .. } => NodeKind::Output,
            NodeBody::Function { .. } => NodeKind::Function,
            NodeBody::Comment { .. } => NodeKind::Comment,
            NodeBody::Lut { .. } => NodeKind::Lut,
            NodeBody::Sheet { .. } => NodeKind::Sheet,
            NodeBody::Option { .. } => NodeKind::Option,
        }
    }

    /// Ports a freshly created node of this kind starts with.
    ///
    /// Function nodes declare their own ports and nested-sheet nodes receive theirs
    /// from the version port resolver, so both start empty.
    fn default_ports(&self) -> (Vec<Port>, Vec<Port>) {
        match self {
            NodeBody::Constant { .. } | NodeBody::Option { .. } => {
                (Vec::new(), vec![Port::any("value")])
            }
            NodeBody::Input { socket, .. } => (Vec::new(), vec![Port::new("value", *socket)]),
            NodeBody::Output { socket } => (vec![Port::new("value", *socket)], Vec::new()),
            NodeBody::Lut { .. } => (vec![Port::any("key")], vec![Port::any("value")]),
            NodeBody::Function { .. } | NodeBody::Comment { .. } | NodeBody::Sheet { .. } => {
                (Vec::new(), Vec::new())
            }
        }
    }
}

/// A node of the computation graph: shared envelope plus a typed body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl Node {
    /// Create a node with a generated id and the default ports of its kind.
    pub fn new(label: impl Into<String>, position: Position, body: NodeBody) -> Self {
        Self::with_id(NodeId::generate(), label, position, body)
    }

    pub fn with_id(
        id: impl Into<NodeId>,
        label: impl Into<String>,
        position: Position,
        body: NodeBody,
    ) -> Self {
        let (inputs, outputs) = body.default_ports();
        Self {
            id: id.into(),
            label: label.into(),
            position,
            description: None,
            attachments: Vec::new(),
            inputs,
            outputs,
            body,
        }
    }

    pub fn with_ports(mut self, inputs: Vec<Port>, outputs: Vec<Port>) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.body.kind()
    }

    pub fn ports(&self, side: PortSide) -> &[Port] {
        match side {
            PortSide::Input => &self.inputs,
            PortSide::Output => &self.outputs,
        }
    }

    pub fn ports_mut(&mut self, side: PortSide) -> &mut Vec<Port> {
        match side {
            PortSide::Input => &mut self.inputs,
            PortSide::Output => &mut self.outputs,
        }
    }

    pub fn has_port(&self, side: PortSide, key: &str) -> bool {
        self.ports(side).iter().any(|p| p.key == key)
    }

    /// The nested-sheet target, if this is a sheet reference node.
    pub fn sheet_target(&self) -> Option<(&SheetId, Option<&VersionId>)> {
        match &self.body {
            NodeBody::Sheet {
                sheet_id,
                version_id,
            } => Some((sheet_id, version_id.as_ref())),
            _ => None,
        }
    }

    /// The value an input node currently feeds into the calculation.
    pub fn effective_input_value(&self) -> Option<&str> {
        match &self.body {
            NodeBody::Input {
                value,
                override_value,
                ..
            } => Some(override_value.as_deref().unwrap_or(value)),
            _ => None,
        }
    }

    pub fn field(&self, field: Field) -> Result<String, ModelError> {
        let not_applicable = || ModelError::FieldNotApplicable {
            kind: self.kind(),
            field,
        };
        match (field, &self.body) {
            (Field::Description, _) => Ok(self.description.clone().unwrap_or_default()),
            (Field::Value, NodeBody::Constant { value })
            | (Field::Value, NodeBody::Input { value, .. })
            | (Field::Value, NodeBody::Option { value, .. }) => Ok(value.clone()),
            (Field::Override, NodeBody::Input { override_value, .. }) => {
                Ok(override_value.clone().unwrap_or_default())
            }
            (Field::Code, NodeBody::Function { code }) => Ok(code.clone()),
            (Field::Text, NodeBody::Comment { text }) => Ok(text.clone()),
            (Field::LutCell { row, col }, NodeBody::Lut { rows }) => {
                let cells = rows.get(row).ok_or(ModelError::LutCellOutOfBounds {
                    row,
                    col,
                    rows: rows.len(),
                })?;
                Ok(cells.get(col).cloned().unwrap_or_default())
            }
            _ => Err(not_applicable()),
        }
    }

    /// Replace the addressed string. Empty descriptions and overrides are stored
    /// as absent.
    pub fn set_field(&mut self, field: Field, new_value: String) -> Result<(), ModelError> {
        let kind = self.kind();
        match (field, &mut self.body) {
            (Field::Description, _) => {
                self.description = (!new_value.is_empty()).then_some(new_value);
            }
            (Field::Value, NodeBody::Constant { value })
            | (Field::Value, NodeBody::Input { value, .. }) => *value = new_value,
            (Field::Value, NodeBody::Option { choices, value }) => {
                if !choices.is_empty() && !new_value.is_empty() && !choices.contains(&new_value) {
                    return Err(ModelError::UnknownChoice { value: new_value });
                }
                *value = new_value;
            }
            (Field::Override, NodeBody::Input { override_value, .. }) => {
                *override_value = (!new_value.is_empty()).then_some(new_value);
            }
            (Field::Code, NodeBody::Function { code }) => *code = new_value,
            (Field::Text, NodeBody::Comment { text }) => *text = new_value,
            (Field::LutCell { row, col }, NodeBody::Lut { rows }) => {
                let row_count = rows.len();
                let cells = rows.get_mut(row).ok_or(ModelError::LutCellOutOfBounds {
                    row,
                    col,
                    rows: row_count,
                })?;
                if cells.len() <= col {
                    cells.resize(col + 1, String::new());
                }
                cells[col] = new_value;
            }
            _ => return Err(ModelError::FieldNotApplicable { kind, field }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_follow_kind() {
        let input = Node::new(
            "x",
            Position::default(),
            NodeBody::Input {
                value: "1".into(),
                override_value: None,
                socket: SocketKind::Number,
            },
        );
        assert!(input.inputs.is_empty());
        assert_eq!(input.outputs, vec![Port::new("value", SocketKind::Number)]);

        let lut = Node::new("t", Position::default(), NodeBody::Lut { rows: vec![] });
        assert!(lut.has_port(PortSide::Input, "key"));
        assert!(lut.has_port(PortSide::Output, "value"));
    }

    #[test]
    fn override_shadows_default_value() {
        let mut node = Node::new(
            "x",
            Position::default(),
            NodeBody::Input {
                value: "1".into(),
                override_value: None,
                socket: SocketKind::Any,
            },
        );
        assert_eq!(node.effective_input_value(), Some("1"));
        node.set_field(Field::Override, "123".into()).unwrap();
        assert_eq!(node.effective_input_value(), Some("123"));
        node.set_field(Field::Override, String::new()).unwrap();
        assert_eq!(node.effective_input_value(), Some("1"));
    }

    #[test]
    fn fields_are_checked_against_kind() {
        let mut node = Node::new(
            "c",
            Position::default(),
            NodeBody::Comment {
                text: "hi".into(),
            },
        );
        assert_eq!(
            node.set_field(Field::Code, "x".into()),
            Err(ModelError::FieldNotApplicable {
                kind: NodeKind::Comment,
                field: Field::Code
            })
        );
        node.set_field(Field::Text, "bye".into()).unwrap();
        assert_eq!(node.field(Field::Text).unwrap(), "bye");
    }

    #[test]
    fn lut_cells_pad_columns_but_not_rows() {
        let mut node = Node::new(
            "t",
            Position::default(),
            NodeBody::Lut {
                rows: vec![vec!["a".into()]],
            },
        );
        node.set_field(Field::LutCell { row: 0, col: 2 }, "c".into())
            .unwrap();
        assert_eq!(node.field(Field::LutCell { row: 0, col: 1 }).unwrap(), "");
        assert_eq!(node.field(Field::LutCell { row: 0, col: 2 }).unwrap(), "c");
        assert!(matches!(
            node.set_field(Field::LutCell { row: 3, col: 0 }, "x".into()),
            Err(ModelError::LutCellOutOfBounds { row: 3, .. })
        ));
    }

    #[test]
    fn option_value_must_be_a_choice() {
        let mut node = Node::new(
            "mode",
            Position::default(),
            NodeBody::Option {
                choices: vec!["fast".into(), "slow".into()],
                value: "fast".into(),
            },
        );
        assert!(node.set_field(Field::Value, "slow".into()).is_ok());
        assert_eq!(
            node.set_field(Field::Value, "medium".into()),
            Err(ModelError::UnknownChoice {
                value: "medium".into()
            })
        );
    }
}
