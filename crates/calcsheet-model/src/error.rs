use thiserror::Error;

use crate::{Field, NodeKind};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("field {field:?} is not editable on {kind} nodes")]
    FieldNotApplicable { kind: NodeKind, field: Field },
    #[error("lookup table cell ({row},{col}) is out of bounds ({rows} rows)")]
    LutCellOutOfBounds { row: usize, col: usize, rows: usize },
    #[error("option value {value:?} is not one of the declared choices")]
    UnknownChoice { value: String },
}
