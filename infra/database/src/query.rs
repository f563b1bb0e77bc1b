use crate::error::DatabaseError;
use crate::rows::ENTRY_COLUMNS;
use fxhash::FxHashSet;
use ndisk_domain::EntryId;
use sqlx::{QueryBuilder, Sqlite};

/// A typed filter over namespace entries.
///
/// Filters are combined with AND and rendered to SQL with bound parameters. An empty
/// query selects every entry. Results are always returned in id order.
///
/// ```rust
/// use ndisk_database::EntryQuery;
///
/// let query = EntryQuery::new().owner("u-1").parent(0).limit(10);
/// assert_eq!(query.filters().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    filters: Vec<EntryFilter>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryFilter {
    Owner(String),
    Parent(EntryId),
    Uuids(FxHashSet<String>),
    Blob(String),
    Name { name: String, extension: String },
    /// Joined on the referenced blob's storage key.
    StorageKey(String),
}

impl EntryQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.filters.push(EntryFilter::Owner(owner.into()));
        self
    }

    #[must_use]
    pub fn parent(mut self, parent: EntryId) -> Self {
        self.filters.push(EntryFilter::Parent(parent));
        self
    }

    #[must_use]
    pub fn uuids<I, S>(mut self, uuids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(EntryFilter::Uuids(uuids.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn blob(mut self, blob_uuid: impl Into<String>) -> Self {
        self.filters.push(EntryFilter::Blob(blob_uuid.into()));
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>, extension: impl Into<String>) -> Self {
        self.filters.push(EntryFilter::Name { name: name.into(), extension: extension.into() });
        self
    }

    #[must_use]
    pub fn storage_key(mut self, storage_key: impl Into<String>) -> Self {
        self.filters.push(EntryFilter::StorageKey(storage_key.into()));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn filters(&self) -> &[EntryFilter] {
        &self.filters
    }

    #[must_use]
    pub const fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Renders the query as one `SELECT` over `namespace_entry`, values bound as parameters.
    ///
    /// # Errors
    /// [`DatabaseError::Validation`] for a limit beyond the SQLite integer range.
    pub(crate) fn to_sql(&self) -> Result<QueryBuilder<'static, Sqlite>, DatabaseError> {
        let mut sql = QueryBuilder::new(format!("SELECT {ENTRY_COLUMNS} FROM namespace_entry e"));
        if self.filters.iter().any(|f| matches!(f, EntryFilter::StorageKey(_))) {
            sql.push(" JOIN blob b ON b.uuid = e.blob_uuid");
        }

        for (index, filter) in self.filters.iter().enumerate() {
            sql.push(if index == 0 { " WHERE " } else { " AND " });
            match filter {
                EntryFilter::Owner(owner) => {
                    sql.push("e.owner_uuid = ").push_bind(owner.clone());
                },
                EntryFilter::Parent(parent) => {
                    sql.push("e.parent_id = ").push_bind(*parent);
                },
                EntryFilter::Uuids(uuids) if uuids.is_empty() => {
                    sql.push("0 = 1");
                },
                EntryFilter::Uuids(uuids) => {
                    sql.push("e.uuid IN (");
                    let mut list = sql.separated(", ");
                    for uuid in uuids {
                        list.push_bind(uuid.clone());
                    }
                    list.push_unseparated(")");
                },
                EntryFilter::Blob(uuid) => {
                    sql.push("e.blob_uuid = ").push_bind(uuid.clone());
                },
                EntryFilter::Name { name, extension } => {
                    sql.push("e.name = ").push_bind(name.clone());
                    sql.push(" AND e.extension = ").push_bind(extension.clone());
                },
                EntryFilter::StorageKey(key) => {
                    sql.push("b.storage_key = ").push_bind(key.clone());
                },
            }
        }

        sql.push(" ORDER BY e.id");
        if let Some(limit) = self.limit {
            let limit = i64::try_from(limit).map_err(|_| DatabaseError::Validation {
                message: format!("limit {limit} is out of range").into(),
                context: None,
            })?;
            sql.push(" LIMIT ").push_bind(limit);
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(query: &EntryQuery) -> String {
        query.to_sql().unwrap().sql().to_owned()
    }

    #[test]
    fn empty_query_selects_everything_in_id_order() {
        assert_eq!(sql(&EntryQuery::new()), format!("SELECT {ENTRY_COLUMNS} FROM namespace_entry e ORDER BY e.id"));
    }

    #[test]
    fn filters_are_conjunctive() {
        let rendered = sql(&EntryQuery::new().owner("u-1").parent(3).named("report", "pdf").limit(1));
        assert!(rendered.ends_with(
            "WHERE e.owner_uuid = ? AND e.parent_id = ? AND e.name = ? AND e.extension = ? ORDER BY e.id LIMIT ?"
        ));
        assert!(!rendered.contains("JOIN"));
    }

    #[test]
    fn uuid_lists_expand_to_one_placeholder_each() {
        let rendered = sql(&EntryQuery::new().uuids(["a", "b", "c"]));
        assert!(rendered.ends_with("WHERE e.uuid IN (?, ?, ?) ORDER BY e.id"));

        let none: [&str; 0] = [];
        assert!(sql(&EntryQuery::new().uuids(none)).contains("WHERE 0 = 1"));
    }

    #[test]
    fn storage_key_joins_through_the_blob() {
        let rendered = sql(&EntryQuery::new().owner("u-1").storage_key("key-1"));
        assert!(rendered.contains(" JOIN blob b ON b.uuid = e.blob_uuid WHERE e.owner_uuid = ? AND b.storage_key = ?"));
    }
}
