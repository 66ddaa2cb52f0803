//! # Record Snapshots
//!
//! Per-record field capture for serialization. A snapshot names each field
//! by its component type name and stores its raw bytes, together with the
//! stable hash of the partition the record came from, so that another
//! process can find the same partition through
//! [`LatticeHandle::partition_by_stable_hash`](crate::LatticeHandle::partition_by_stable_hash).

use crate::ecs::{Component, ComponentType, Egid, PartitionTable, RecordValues};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// One captured field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    /// Component type name.
    pub component: String,
    /// Raw value bytes.
    pub bytes: Vec<u8>,
}

/// Every field of one record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// Local id of the captured record.
    pub entity_id: u32,
    /// Stable hash of the source partition, if it has one.
    pub partition_hash: Option<u32>,
    /// Fields in layout order.
    pub fields: Vec<FieldSnapshot>,
}

impl RecordSnapshot {
    pub(crate) fn capture(
        table: &PartitionTable,
        egid: Egid,
        partition_hash: Option<u32>,
    ) -> EngineResult<Self> {
        let fields = table
            .field_bytes(egid.entity_id)
            .ok_or(EngineError::RecordNotFound(egid))?
            .into_iter()
            .map(|(ty, bytes)| FieldSnapshot {
                component: ty.name().to_owned(),
                bytes,
            })
            .collect();
        Ok(Self {
            entity_id: egid.entity_id,
            partition_hash,
            fields,
        })
    }

    /// Captured field for a component type name.
    #[must_use]
    pub fn field(&self, component: &str) -> Option<&FieldSnapshot> {
        self.fields.iter().find(|f| f.component == component)
    }

    /// Decodes the captured value of `C`, if present and well-sized.
    #[must_use]
    pub fn field_of<C: Component>(&self) -> Option<C> {
        let field = self.field(ComponentType::of::<C>().name())?;
        bytemuck::try_pod_read_unaligned(&field.bytes).ok()
    }

    /// Values for every field of `layout` the snapshot carries.
    ///
    /// Fields whose name is unknown to `layout`, or whose size no longer
    /// matches, are skipped.
    pub(crate) fn to_values(&self, layout: &[ComponentType]) -> RecordValues {
        let mut values = RecordValues::new();
        for &ty in layout {
            match self.field(ty.name()) {
                Some(field) if values.set_bytes(ty, &field.bytes) => {}
                Some(field) => tracing::warn!(
                    component = ty.name(),
                    expected = ty.size(),
                    found = field.bytes.len(),
                    "snapshot field size mismatch, using default"
                ),
                None => {}
            }
        }
        values
    }
}
