//! Artist / Album / Track sample schema and data
//!
//! Written out by `rset init` and used throughout the tests.

use crate::error::Result;
use crate::schema::{ColumnDef, ColumnType, Relationship, ResultSource, SchemaRegistry};
use crate::storage::Storage;
use crate::value::Value;
use rsql::{InsertSpec, Literal};

pub fn sources() -> Vec<ResultSource> {
    vec![
        ResultSource::new("Artist")
            .primary_key(["artistid"])
            .column(ColumnDef::new("artistid", ColumnType::Int).auto_increment())
            .column(ColumnDef::new("name", ColumnType::String).required())
            .column(ColumnDef::new("rank", ColumnType::Int).default_value(13i64))
            .relationship(Relationship::has_many("albums", "Album", "artist")),
        ResultSource::new("Album")
            .primary_key(["albumid"])
            .column(ColumnDef::new("albumid", ColumnType::Int).auto_increment())
            .column(ColumnDef::new("artist", ColumnType::Int).required())
            .column(ColumnDef::new("title", ColumnType::String).required())
            .column(ColumnDef::new("year", ColumnType::Int))
            .relationship(Relationship::belongs_to("artist", "Artist", "artist"))
            .relationship(Relationship::has_many("tracks", "Track", "album")),
        ResultSource::new("Track")
            .primary_key(["trackid"])
            .column(ColumnDef::new("trackid", ColumnType::Int).auto_increment())
            .column(ColumnDef::new("album", ColumnType::Int).required())
            .column(ColumnDef::new("title", ColumnType::String).required())
            .column(ColumnDef::new("position", ColumnType::Int).default_value(1i64))
            .relationship(Relationship::belongs_to("album", "Album", "album")),
    ]
}

/// In-memory registry holding the sample sources
pub fn registry() -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    for source in sources() {
        registry.register(source)?;
    }
    registry.check_references()?;
    Ok(registry)
}

/// Insert the sample rows
pub async fn seed(storage: &dyn Storage) -> Result<()> {
    let artists: [(&str, Value); 3] = [
        ("Blur", Value::Null),
        ("Pulp", Value::Int(2)),
        ("Elastica", Value::Int(5)),
    ];
    for (name, rank) in artists {
        insert(storage, "artist", &[("name", name.into()), ("rank", rank)]).await?;
    }

    let albums = [
        (1i64, "Parklife", 1994i64),
        (1, "The Great Escape", 1995),
        (2, "Separations", 1992),
        (2, "Different Class", 1995),
    ];
    for (artist, title, year) in albums {
        insert(
            storage,
            "album",
            &[("artist", artist.into()), ("title", title.into()), ("year", year.into())],
        )
        .await?;
    }

    let tracks = [
        (1i64, "Girls & Boys", 1i64),
        (1, "Parklife", 2),
        (2, "Country House", 1),
        (3, "Love Is Blind", 1),
        (4, "Common People", 1),
        (4, "Disco 2000", 2),
    ];
    for (album, title, position) in tracks {
        insert(
            storage,
            "track",
            &[("album", album.into()), ("title", title.into()), ("position", position.into())],
        )
        .await?;
    }

    Ok(())
}

async fn insert(storage: &dyn Storage, table: &str, values: &[(&str, Value)]) -> Result<()> {
    let spec = InsertSpec {
        table: table.to_string(),
        columns: values.iter().map(|(c, _)| c.to_string()).collect(),
        values: values.iter().map(|(_, v)| Literal::from(v.clone())).collect(),
    };
    storage.insert(&spec).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_are_consistent() {
        let registry = registry().unwrap();
        assert_eq!(registry.list().len(), 3);
        let album = registry.get("Album").unwrap();
        assert_eq!(album.table_name(), "album");
        assert!(album.relationship_def("tracks").is_some());
    }
}
