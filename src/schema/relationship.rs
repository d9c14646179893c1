//! Relationships between result sources

use super::ResultSource;
use crate::error::Result;
use rsql::{ColumnRef, Join, JoinKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// This source holds the foreign key
    BelongsTo,
    /// The target holds the foreign key, many rows per owner
    HasMany,
    /// The target holds the foreign key, exactly one row per owner
    HasOne,
    /// The target holds the foreign key, zero or one row per owner
    MightHave,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
}

impl From<JoinType> for JoinKind {
    fn from(t: JoinType) -> Self {
        match t {
            JoinType::Inner => JoinKind::Inner,
            JoinType::Left => JoinKind::Left,
        }
    }
}

/// A named link from one source to another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    /// Accessor name, also used as the join alias
    pub name: String,
    pub kind: RelationshipKind,
    /// Target source name
    pub source: String,
    /// Column on the child side (this source for belongs_to, the target otherwise)
    pub foreign_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,
}

impl Relationship {
    pub fn new(
        name: impl Into<String>,
        kind: RelationshipKind,
        source: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source: source.into(),
            foreign_key: foreign_key.into(),
            join_type: None,
        }
    }

    pub fn belongs_to(name: impl Into<String>, source: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::BelongsTo, source, foreign_key)
    }

    pub fn has_many(name: impl Into<String>, source: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::HasMany, source, foreign_key)
    }

    pub fn has_one(name: impl Into<String>, source: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::HasOne, source, foreign_key)
    }

    pub fn might_have(name: impl Into<String>, source: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::MightHave, source, foreign_key)
    }

    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn join_kind(&self) -> JoinKind {
        match (self.join_type, self.kind) {
            (Some(t), _) => t.into(),
            (None, RelationshipKind::BelongsTo) => JoinKind::Inner,
            (None, _) => JoinKind::Left,
        }
    }

    /// Key pair `(owner column, target column)` linking a row of `owner`
    /// to its related rows in `target`
    pub fn key_columns(&self, owner: &ResultSource, target: &ResultSource) -> Result<(String, String)> {
        Ok(match self.kind {
            RelationshipKind::BelongsTo => (
                self.foreign_key.clone(),
                target.single_primary_key("relationship")?.to_string(),
            ),
            _ => (
                owner.single_primary_key("relationship")?.to_string(),
                self.foreign_key.clone(),
            ),
        })
    }

    /// The JOIN clause bringing `target` in under this relationship's name
    pub fn join(&self, owner: &ResultSource, target: &ResultSource) -> Result<Join> {
        let (owner_col, target_col) = self.key_columns(owner, target)?;
        Ok(Join {
            kind: self.join_kind(),
            table: target.table_name(),
            alias: self.name.clone(),
            on: vec![(ColumnRef::new(owner_col), ColumnRef::qualified(&self.name, target_col))],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType};

    fn artist() -> ResultSource {
        ResultSource::new("Artist")
            .primary_key(["artistid"])
            .column(ColumnDef::new("artistid", ColumnType::Int))
    }

    fn album() -> ResultSource {
        ResultSource::new("Album")
            .primary_key(["albumid"])
            .column(ColumnDef::new("albumid", ColumnType::Int))
            .column(ColumnDef::new("artist", ColumnType::Int))
    }

    #[test]
    fn test_belongs_to_join() {
        let rel = Relationship::belongs_to("artist", "Artist", "artist");
        let join = rel.join(&album(), &artist()).unwrap();
        assert_eq!(join.kind, JoinKind::Inner);
        assert_eq!(join.table, "artist");
        assert_eq!(
            join.on,
            vec![(ColumnRef::new("artist"), ColumnRef::qualified("artist", "artistid"))]
        );
    }

    #[test]
    fn test_has_many_join() {
        let rel = Relationship::has_many("albums", "Album", "artist");
        let join = rel.join(&artist(), &album()).unwrap();
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(
            join.on,
            vec![(ColumnRef::new("artistid"), ColumnRef::qualified("albums", "artist"))]
        );

        let inner = rel.with_join_type(JoinType::Inner);
        assert_eq!(inner.join_kind(), JoinKind::Inner);
    }

    #[test]
    fn test_yaml_kind_names() {
        let rel: Relationship =
            serde_yaml::from_str("{ name: cover, kind: might_have, source: Cover, foreign_key: album }").unwrap();
        assert_eq!(rel.kind, RelationshipKind::MightHave);
        assert_eq!(rel.join_type, None);
    }
}
