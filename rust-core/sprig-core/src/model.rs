//! # Models
//!
//! Active-record style persistence on top of [`QueryBuilder`].
//!
//! A [`ModelDef`] describes a table (name, primary key, timestamp columns);
//! an [`Entity`] is one row of it with change tracking. Both take the
//! executor explicitly, there is no ambient connection.
//!
//! ```ignore
//! let users = ModelDef::new("users");
//! let mut ada = users.create(&db, [("name", "Ada")]).await?;
//! ada.set("name", "Ada Lovelace");
//! ada.save(&db).await?;
//! ```

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::query::QueryBuilder;
use crate::value::{DbValue, Row};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Table metadata for a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    /// Table name
    pub table: String,
    /// Primary key column
    pub primary_key: String,
    /// Whether inserts and updates stamp the timestamp columns
    pub timestamps: bool,
    /// Creation timestamp column
    pub created_at: String,
    /// Update timestamp column
    pub updated_at: String,
}

impl ModelDef {
    /// Describe `table` with an `id` key and timestamps enabled
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            timestamps: true,
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
        }
    }

    /// Describe the table conventionally named after a type (`BlogPost` → `blog_posts`)
    #[must_use]
    pub fn for_type(type_name: &str) -> Self {
        Self::new(table_name_for(type_name))
    }

    /// Use a different primary key column
    #[must_use]
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Disable automatic timestamps
    #[must_use]
    pub const fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Rename the timestamp columns
    #[must_use]
    pub fn with_timestamp_columns(
        mut self,
        created_at: impl Into<String>,
        updated_at: impl Into<String>,
    ) -> Self {
        self.created_at = created_at.into();
        self.updated_at = updated_at.into();
        self
    }

    /// Start a query on this model's table
    #[must_use]
    pub fn query(&self, executor: &Arc<dyn Executor>) -> QueryBuilder {
        QueryBuilder::new(self.table.clone(), Arc::clone(executor))
    }

    /// A new, unsaved entity
    #[must_use]
    pub fn make<K, V>(&self, attributes: impl IntoIterator<Item = (K, V)>) -> Entity
    where
        K: Into<String>,
        V: Into<DbValue>,
    {
        let mut entity = Entity {
            model: self.clone(),
            attributes: BTreeMap::new(),
            original: BTreeMap::new(),
            exists: false,
        };
        entity.fill(attributes);
        entity
    }

    fn hydrate(&self, row: Row) -> Entity {
        let attributes: BTreeMap<String, DbValue> = row.into_iter().collect();
        Entity {
            model: self.clone(),
            original: attributes.clone(),
            attributes,
            exists: true,
        }
    }

    /// Load every row
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn all(&self, executor: &Arc<dyn Executor>) -> Result<Vec<Entity>> {
        let rows = self.query(executor).get().await?;
        Ok(rows.into_iter().map(|row| self.hydrate(row)).collect())
    }

    /// Load the row with the given primary key
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn find(
        &self,
        executor: &Arc<dyn Executor>,
        id: impl Into<DbValue>,
    ) -> Result<Option<Entity>> {
        let row = self
            .query(executor)
            .where_eq(&self.primary_key, id)
            .first()
            .await?;
        Ok(row.map(|row| self.hydrate(row)))
    }

    /// Load the first row where `column operator value`
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn find_where(
        &self,
        executor: &Arc<dyn Executor>,
        column: &str,
        operator: &str,
        value: impl Into<DbValue>,
    ) -> Result<Option<Entity>> {
        let row = self
            .query(executor)
            .where_op(column, operator, value)
            .first()
            .await?;
        Ok(row.map(|row| self.hydrate(row)))
    }

    /// Load every row where `column operator value`
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn find_all_where(
        &self,
        executor: &Arc<dyn Executor>,
        column: &str,
        operator: &str,
        value: impl Into<DbValue>,
    ) -> Result<Vec<Entity>> {
        let rows = self
            .query(executor)
            .where_op(column, operator, value)
            .get()
            .await?;
        Ok(rows.into_iter().map(|row| self.hydrate(row)).collect())
    }

    /// Insert a new row and return it as an entity
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` for empty attributes (when timestamps
    /// are off), otherwise propagates executor failures.
    pub async fn create<K, V>(
        &self,
        executor: &Arc<dyn Executor>,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Entity>
    where
        K: Into<String>,
        V: Into<DbValue>,
    {
        let mut entity = self.make(attributes);
        entity.save(executor).await?;
        Ok(entity)
    }
}

/// Conventional table name for a type name: snake case plus `s`
#[must_use]
pub fn table_name_for(type_name: &str) -> String {
    let mut table = String::with_capacity(type_name.len() + 4);
    for (i, c) in type_name.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            table.push('_');
        }
        table.push(c.to_ascii_lowercase());
    }
    table.push('s');
    table
}

/// One row of a model, with change tracking
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    model: ModelDef,
    attributes: BTreeMap<String, DbValue>,
    original: BTreeMap<String, DbValue>,
    exists: bool,
}

impl Entity {
    /// The model this entity belongs to
    #[must_use]
    pub const fn model(&self) -> &ModelDef {
        &self.model
    }

    /// Whether the entity is persisted
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    /// Primary key value, if set
    #[must_use]
    pub fn id(&self) -> Option<&DbValue> {
        self.get(&self.model.primary_key)
    }

    /// Attribute value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DbValue> {
        self.attributes.get(key)
    }

    /// Set an attribute
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<DbValue>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Remove an attribute
    pub fn remove(&mut self, key: &str) -> Option<DbValue> {
        self.attributes.remove(key)
    }

    /// Set several attributes
    pub fn fill<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<DbValue>,
    {
        for (key, value) in attributes {
            self.set(key, value);
        }
        self
    }

    /// Whether `key` (or, with `None`, any attribute) changed since load
    #[must_use]
    pub fn is_dirty(&self, key: Option<&str>) -> bool {
        match key {
            None => self.attributes != self.original,
            Some(key) => self.attributes.get(key) != self.original.get(key),
        }
    }

    /// Attributes that are new or changed since load
    #[must_use]
    pub fn dirty(&self) -> BTreeMap<String, DbValue> {
        self.attributes
            .iter()
            .filter(|(key, value)| self.original.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Attributes as a row map
    #[must_use]
    pub fn to_map(&self) -> Row {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Insert or update this entity
    ///
    /// New entities are inserted with both timestamps and receive the
    /// generated key. Persisted entities write only their dirty columns,
    /// and nothing at all when clean.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` when a persisted entity has no primary
    /// key value, otherwise propagates executor failures.
    pub async fn save(&mut self, executor: &Arc<dyn Executor>) -> Result<()> {
        if self.exists {
            self.perform_update(executor).await
        } else {
            self.perform_insert(executor).await
        }
    }

    async fn perform_insert(&mut self, executor: &Arc<dyn Executor>) -> Result<()> {
        if self.model.timestamps {
            let now = timestamp();
            self.set(self.model.created_at.clone(), now.clone());
            self.set(self.model.updated_at.clone(), now);
        }

        let id = self
            .model
            .query(executor)
            .insert(self.attributes.clone())
            .await?;
        if id != 0 || self.id().is_none() {
            let key = self.model.primary_key.clone();
            self.set(key, id);
        }

        debug!(table = %self.model.table, id, "Entity inserted");
        self.exists = true;
        self.original = self.attributes.clone();
        Ok(())
    }

    async fn perform_update(&mut self, executor: &Arc<dyn Executor>) -> Result<()> {
        let mut dirty = self.dirty();
        if dirty.is_empty() {
            return Ok(());
        }

        let id = self.key_value()?;
        if self.model.timestamps {
            dirty.insert(self.model.updated_at.clone(), DbValue::String(timestamp()));
        }

        let affected = self
            .model
            .query(executor)
            .where_eq(&self.model.primary_key, id)
            .update(dirty.clone())
            .await?;

        debug!(table = %self.model.table, affected, "Entity updated");
        self.fill(dirty);
        self.original = self.attributes.clone();
        Ok(())
    }

    /// Delete this entity by primary key
    ///
    /// Returns `false` for entities that were never saved or whose row is
    /// already gone.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` when the entity has no primary key
    /// value, otherwise propagates executor failures.
    pub async fn delete(&mut self, executor: &Arc<dyn Executor>) -> Result<bool> {
        if !self.exists {
            return Ok(false);
        }

        let id = self.key_value()?;
        let affected = self
            .model
            .query(executor)
            .where_eq(&self.model.primary_key, id)
            .delete()
            .await?;

        self.exists = false;
        Ok(affected > 0)
    }

    fn key_value(&self) -> Result<DbValue> {
        match self.id() {
            Some(id) if !id.is_null() => Ok(id.clone()),
            _ => Err(Error::invalid_query(format!(
                "{} entity has no '{}' value",
                self.model.table, self.model.primary_key
            ))),
        }
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.attributes.serialize(serializer)
    }
}

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
