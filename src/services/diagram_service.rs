//! Diagram transforms handed to the update pipeline.
//!
//! Each builder captures the request and returns a pure function of the
//! current snapshot. None of them touch storage.

use crate::colab::{DiagramTransform, TransformOutput};
use crate::error::TransformError;
use crate::models::{
    CellOperation, CellOperationKind, DiagramSnapshot, PatchDiagramRequest, UpdateDiagramRequest,
};

/// Full replacement of name, description and cells
pub fn replace_transform(request: UpdateDiagramRequest) -> DiagramTransform {
    Box::new(move |mut snapshot: DiagramSnapshot| {
        let changed = snapshot.cells != request.cells;
        snapshot.name = request.name;
        snapshot.description = request.description;
        snapshot.cells = request.cells;
        Ok(TransformOutput { snapshot, changed })
    })
}

/// Merge-patch, absent fields stay as they are
pub fn patch_transform(request: PatchDiagramRequest) -> DiagramTransform {
    Box::new(move |mut snapshot: DiagramSnapshot| {
        if let Some(name) = request.name {
            snapshot.name = name;
        }
        if request.description.is_some() {
            snapshot.description = request.description;
        }
        let mut changed = false;
        if let Some(cells) = request.cells {
            changed = snapshot.cells != cells;
            snapshot.cells = cells;
        }
        Ok(TransformOutput { snapshot, changed })
    })
}

/// Apply live cell operations in order, all or nothing
pub fn cell_operations_transform(operations: Vec<CellOperation>) -> DiagramTransform {
    Box::new(move |snapshot: DiagramSnapshot| apply_cell_operations(snapshot, &operations))
}

fn apply_cell_operations(
    mut snapshot: DiagramSnapshot,
    operations: &[CellOperation],
) -> Result<TransformOutput, TransformError> {
    if operations.is_empty() {
        return Err(TransformError::Invalid("patch contains no cell operations".to_string()));
    }

    let mut changed = false;
    for op in operations {
        let position = snapshot.cells.iter().position(|cell| cell.id == op.id);
        match op.operation {
            CellOperationKind::Add => {
                if position.is_some() {
                    return Err(TransformError::Conflict {
                        cell_id: op.id,
                        message: "cell already exists".to_string(),
                    });
                }
                let cell = cell_payload(op)?;
                snapshot.cells.push(cell);
                changed = true;
            }
            CellOperationKind::Update => {
                let Some(index) = position else {
                    return Err(TransformError::Conflict {
                        cell_id: op.id,
                        message: "cell does not exist".to_string(),
                    });
                };
                let cell = cell_payload(op)?;
                if snapshot.cells[index] != cell {
                    snapshot.cells[index] = cell;
                    changed = true;
                }
            }
            CellOperationKind::Remove => {
                let Some(index) = position else {
                    return Err(TransformError::Conflict {
                        cell_id: op.id,
                        message: "cell does not exist".to_string(),
                    });
                };
                snapshot.cells.remove(index);
                changed = true;
            }
        }
    }
    Ok(TransformOutput { snapshot, changed })
}

fn cell_payload(op: &CellOperation) -> Result<crate::models::Cell, TransformError> {
    let cell = op
        .data
        .clone()
        .ok_or_else(|| TransformError::Invalid(format!("{:?} of cell {} carries no data", op.operation, op.id)))?;
    if cell.id != op.id {
        return Err(TransformError::Invalid(format!(
            "cell data id {} does not match operation id {}",
            cell.id, op.id
        )));
    }
    Ok(cell)
}
