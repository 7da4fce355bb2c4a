//! Modify engine: applies row inserts, updates, and deletes to the store.
//!
//! A [`Modify`] is begun for one [`Operation`]. Column layout and kind
//! support are checked up front, before any row is touched; per-row
//! checks (NULLs, key prefix, uniqueness, array shape) run before the
//! first write for that row.
//!
//! Each row is applied as a sequence of independent commands. If one of
//! them fails, earlier commands for the same row stay applied; the key set
//! index in particular is written last and can lag behind the data keys.

use keyrel_db::{Command, CommandExecutor, RedisConnection, Reply, Session};
use keyrel_types::{
    CollectionKind, ColumnType, KeyOrganization, ScalarType, TableConfig, TableSchema, Value,
};

use crate::codec::{decompose_array, element_text, encode_scalar};
use crate::error::EngineError;

/// The kind of modification a [`Modify`] was begun for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Row inserts.
    Insert,
    /// Row updates assigning the listed zero-based columns.
    Update {
        /// Columns the update assigns.
        targets: Vec<usize>,
    },
    /// Row deletes.
    Delete,
}

impl Operation {
    const fn name(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
        }
    }
}

/// An open modification session over one table.
#[derive(Debug)]
pub struct Modify<E: CommandExecutor> {
    session: Session<E>,
    config: TableConfig,
    schema: TableSchema,
    operation: Operation,
}

impl Modify<RedisConnection> {
    /// Validate, connect to the store described by `config`, and begin.
    pub async fn connect(
        config: TableConfig,
        schema: TableSchema,
        operation: Operation,
    ) -> Result<Self, EngineError> {
        validate(&config, &schema, &operation)?;
        let session = keyrel_db::connect(&config).await?;
        Self::begin(session, config, schema, operation).await
    }
}

/// Check that `operation` is possible on a table of this shape.
pub fn validate(
    config: &TableConfig,
    schema: &TableSchema,
    operation: &Operation,
) -> Result<(), EngineError> {
    let singleton = config.organization.is_singleton();
    let kind = config.kind;

    match operation {
        Operation::Insert => {
            if singleton && kind == CollectionKind::SortedSet && schema.len() < 2 {
                return Err(EngineError::Unsupported(
                    "insert on a singleton sorted-set table without a priorities column",
                ));
            }
            check_width(config, schema)?;
            if !singleton {
                check_value_column(kind, schema)?;
            }
        }
        Operation::Update { targets } => {
            if singleton && kind == CollectionKind::List {
                return Err(EngineError::Unsupported("update"));
            }
            check_width(config, schema)?;
            for &target in targets {
                let column = schema.column(target).ok_or(EngineError::ColumnCount {
                    actual: target.saturating_add(1),
                    expected: schema.len(),
                })?;
                if target > 0
                    && !singleton
                    && kind != CollectionKind::Scalar
                    && !column.ty.is_array()
                {
                    return Err(EngineError::Unsupported("value update"));
                }
            }
        }
        Operation::Delete => {
            if singleton && kind == CollectionKind::List {
                return Err(EngineError::Unsupported("delete"));
            }
        }
    }
    Ok(())
}

fn check_width(config: &TableConfig, schema: &TableSchema) -> Result<(), EngineError> {
    let expected = config.row_width();
    if schema.len() == expected {
        Ok(())
    } else {
        Err(EngineError::ColumnCount {
            actual: schema.len(),
            expected,
        })
    }
}

/// Scoped scalar tables take a scalar value; every other kind an array.
fn check_value_column(kind: CollectionKind, schema: &TableSchema) -> Result<(), EngineError> {
    let is_array = schema.value_type().is_some_and(ColumnType::is_array);
    match (kind, is_array) {
        (CollectionKind::Scalar, true) => Err(EngineError::ValueShape(
            "cannot insert array into a scalar table".to_owned(),
        )),
        (CollectionKind::Scalar, false) | (_, true) => Ok(()),
        (_, false) => Err(EngineError::ValueShape(format!(
            "cannot insert into a {kind} table - value column needs an array type"
        ))),
    }
}

impl<E: CommandExecutor> Modify<E> {
    /// Begin a modification on an established session.
    ///
    /// On validation failure the session is closed before the error is
    /// returned.
    pub async fn begin(
        session: Session<E>,
        config: TableConfig,
        schema: TableSchema,
        operation: Operation,
    ) -> Result<Self, EngineError> {
        if let Err(err) = validate(&config, &schema, &operation) {
            session.close().await;
            return Err(err);
        }
        tracing::debug!(
            operation = operation.name(),
            kind = %config.kind,
            organization = %config.organization,
            "Modify started"
        );
        Ok(Self {
            session,
            config,
            schema,
            operation,
        })
    }

    /// Release the session.
    pub async fn close(self) {
        self.session.close().await;
    }

    fn expect_operation(&self, wanted: &'static str) -> Result<(), EngineError> {
        if self.operation.name() == wanted {
            Ok(())
        } else {
            Err(EngineError::WrongOperation {
                called: wanted,
                begun: self.operation.name(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    /// Insert one row.
    pub async fn insert(&mut self, row: &[Value]) -> Result<(), EngineError> {
        self.expect_operation("insert")?;
        if row.len() != self.schema.len() {
            return Err(EngineError::ColumnCount {
                actual: row.len(),
                expected: self.schema.len(),
            });
        }
        let key_value = row.first().ok_or(EngineError::NullValue)?;
        let key = encode_scalar(key_value)?;

        if let KeyOrganization::Singleton(singleton) = &self.config.organization {
            let singleton = singleton.clone();
            let paired = row.get(1).map(encode_scalar).transpose()?;
            return self.insert_member(&singleton, &key, paired).await;
        }

        let value = row.get(1).ok_or(EngineError::NullValue)?;
        let elements = self.decompose(value)?;
        if let Some(prefix) = self.config.organization.key_prefix() {
            check_prefix(&key, prefix)?;
        }
        if self.exists(&key).await? {
            return Err(EngineError::UniqueViolation(key));
        }
        self.write_value(&key, elements).await?;
        if let Some(set) = self.config.organization.key_set().map(str::to_owned) {
            self.index_add(&set, &key).await?;
        }
        Ok(())
    }

    /// Insert a member into the singleton collection.
    async fn insert_member(
        &mut self,
        singleton: &str,
        member: &str,
        paired: Option<String>,
    ) -> Result<(), EngineError> {
        if self.member_exists(singleton, member).await? {
            return Err(EngineError::UniqueViolation(match self.config.kind {
                CollectionKind::Scalar => singleton.to_owned(),
                _ => member.to_owned(),
            }));
        }

        let key = singleton.to_owned();
        let command = match (self.config.kind, paired) {
            (CollectionKind::Scalar, _) => Command::Set {
                key,
                value: member.to_owned(),
            },
            (CollectionKind::Set, _) => Command::SAdd {
                key,
                member: member.to_owned(),
            },
            (CollectionKind::List, _) => Command::RPush {
                key,
                value: member.to_owned(),
            },
            (CollectionKind::Hash, Some(value)) => Command::HSet {
                key,
                field: member.to_owned(),
                value,
            },
            (CollectionKind::SortedSet, Some(score)) => Command::ZAdd {
                key,
                score,
                member: member.to_owned(),
            },
            (CollectionKind::Hash | CollectionKind::SortedSet, None) => {
                return Err(EngineError::ColumnCount {
                    actual: 1,
                    expected: 2,
                });
            }
        };
        self.session
            .run(&command, "failed to insert {}", Some(member))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Update the row whose key is `old_key`, taking assigned columns from
    /// `new_row`.
    pub async fn update(&mut self, old_key: &str, new_row: &[Value]) -> Result<(), EngineError> {
        self.expect_operation("update")?;
        let Operation::Update { targets } = &self.operation else {
            return Ok(());
        };

        let mut new_key = None;
        let mut new_scalar = None;
        let mut new_elements = None;
        for &target in targets {
            let value = new_row.get(target).ok_or(EngineError::ColumnCount {
                actual: new_row.len(),
                expected: self.schema.len(),
            })?;
            if value.is_null() {
                return Err(EngineError::NullValue);
            }
            if target == 0 {
                new_key = Some(encode_scalar(value)?);
            } else if self.config.organization.is_singleton()
                || self.config.kind == CollectionKind::Scalar
            {
                new_scalar = Some(encode_scalar(value)?);
            } else {
                new_elements = Some(self.decompose(value)?);
            }
        }

        let new_key = new_key.filter(|key| key != old_key);
        if let Some(new_key) = &new_key {
            if self.config.kind == CollectionKind::List {
                return Err(EngineError::Unsupported("key update"));
            }
            self.rename(old_key, new_key, new_scalar.as_deref()).await?;
        } else if let Some(value) = &new_scalar {
            self.assign(old_key, value).await?;
        }

        if let Some(elements) = new_elements {
            let key = new_key.as_deref().unwrap_or(old_key);
            self.session
                .run(
                    &Command::Del {
                        key: key.to_owned(),
                    },
                    "failed to clear {}",
                    Some(key),
                )
                .await?;
            self.write_value(key, elements).await?;
        }
        Ok(())
    }

    /// Move a row to a new key, carrying its value along.
    async fn rename(
        &mut self,
        old_key: &str,
        new_key: &str,
        new_scalar: Option<&str>,
    ) -> Result<(), EngineError> {
        if let Some(singleton) = self.config.organization.singleton_key().map(str::to_owned) {
            return self.rename_member(&singleton, old_key, new_key, new_scalar).await;
        }

        if self.exists(new_key).await? {
            return Err(EngineError::UniqueViolation(new_key.to_owned()));
        }
        if let Some(prefix) = self.config.organization.key_prefix() {
            check_prefix(new_key, prefix)?;
        }
        self.session
            .run(
                &Command::Rename {
                    from: old_key.to_owned(),
                    to: new_key.to_owned(),
                },
                "failed to rename {}",
                Some(old_key),
            )
            .await?;
        if let Some(value) = new_scalar {
            self.set(new_key, value).await?;
        }
        if let Some(set) = self.config.organization.key_set().map(str::to_owned) {
            self.index_remove(&set, old_key).await?;
            self.index_add(&set, new_key).await?;
        }
        Ok(())
    }

    /// Rename a member of the singleton collection.
    async fn rename_member(
        &mut self,
        singleton: &str,
        old_key: &str,
        new_key: &str,
        new_scalar: Option<&str>,
    ) -> Result<(), EngineError> {
        let kind = self.config.kind;
        if kind != CollectionKind::Scalar && self.member_exists(singleton, new_key).await? {
            return Err(EngineError::UniqueViolation(new_key.to_owned()));
        }
        let key = singleton.to_owned();
        match kind {
            CollectionKind::Scalar => self.set(singleton, new_key).await,
            CollectionKind::Set => {
                self.run(
                    Command::SRem {
                        key: key.clone(),
                        member: old_key.to_owned(),
                    },
                    old_key,
                )
                .await?;
                self.run(
                    Command::SAdd {
                        key,
                        member: new_key.to_owned(),
                    },
                    new_key,
                )
                .await
            }
            CollectionKind::SortedSet => {
                let score = match new_scalar {
                    Some(score) => score.to_owned(),
                    None => {
                        self.carried_value(
                            Command::ZScore {
                                key: key.clone(),
                                member: old_key.to_owned(),
                            },
                            "sorted-set member",
                            old_key,
                        )
                        .await?
                    }
                };
                self.run(
                    Command::ZRem {
                        key: key.clone(),
                        member: old_key.to_owned(),
                    },
                    old_key,
                )
                .await?;
                self.run(
                    Command::ZAdd {
                        key,
                        score,
                        member: new_key.to_owned(),
                    },
                    new_key,
                )
                .await
            }
            CollectionKind::Hash => {
                let value = match new_scalar {
                    Some(value) => value.to_owned(),
                    None => {
                        self.carried_value(
                            Command::HGet {
                                key: key.clone(),
                                field: old_key.to_owned(),
                            },
                            "hash field",
                            old_key,
                        )
                        .await?
                    }
                };
                self.run(
                    Command::HDel {
                        key: key.clone(),
                        field: old_key.to_owned(),
                    },
                    old_key,
                )
                .await?;
                self.run(
                    Command::HSet {
                        key,
                        field: new_key.to_owned(),
                        value,
                    },
                    new_key,
                )
                .await
            }
            CollectionKind::List => Err(EngineError::Unsupported("key update")),
        }
    }

    /// Replace the value stored for an unchanged key.
    async fn assign(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        let Some(singleton) = self.config.organization.singleton_key().map(str::to_owned) else {
            return self.set(key, value).await;
        };
        let command = match self.config.kind {
            CollectionKind::SortedSet => Command::ZAdd {
                key: singleton,
                score: value.to_owned(),
                member: key.to_owned(),
            },
            CollectionKind::Hash => Command::HSet {
                key: singleton,
                field: key.to_owned(),
                value: value.to_owned(),
            },
            CollectionKind::Scalar | CollectionKind::List | CollectionKind::Set => {
                return Err(EngineError::Unsupported("value update"));
            }
        };
        self.run(command, key).await
    }

    /// Read the value an old member carries over to its new name.
    async fn carried_value(
        &mut self,
        command: Command,
        what: &'static str,
        member: &str,
    ) -> Result<String, EngineError> {
        let reply = self
            .session
            .run(&command, "failed to read {}", Some(member))
            .await?;
        match reply {
            Reply::Nil => Err(EngineError::NotFound {
                what,
                key: member.to_owned(),
            }),
            Reply::Integer(n) => Ok(n.to_string()),
            other => element_text(&other)?.ok_or_else(|| {
                EngineError::UnexpectedReply(format!("{} reply reading {what}", other.kind()))
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Delete the row whose key is `old_key`.
    pub async fn delete(&mut self, old_key: &str) -> Result<(), EngineError> {
        self.expect_operation("delete")?;
        let member = old_key.to_owned();
        let command = match (&self.config.organization, self.config.kind) {
            (KeyOrganization::Singleton(key), CollectionKind::Scalar) => {
                Command::Del { key: key.clone() }
            }
            (KeyOrganization::Singleton(key), CollectionKind::Set) => Command::SRem {
                key: key.clone(),
                member,
            },
            (KeyOrganization::Singleton(key), CollectionKind::Hash) => Command::HDel {
                key: key.clone(),
                field: member,
            },
            (KeyOrganization::Singleton(key), CollectionKind::SortedSet) => Command::ZRem {
                key: key.clone(),
                member,
            },
            (KeyOrganization::Singleton(_), CollectionKind::List) => {
                return Err(EngineError::Unsupported("delete"));
            }
            _ => Command::Del { key: member },
        };
        self.run(command, old_key).await?;

        if let Some(set) = self.config.organization.key_set().map(str::to_owned) {
            self.index_remove(&set, old_key).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    /// Element texts for a scoped value column.
    fn decompose(&self, value: &Value) -> Result<Vec<String>, EngineError> {
        match (self.config.kind, value) {
            (_, Value::Null) => Err(EngineError::NullValue),
            (CollectionKind::Scalar, Value::Array(_)) => Err(EngineError::ValueShape(
                "cannot insert array into a scalar table".to_owned(),
            )),
            (CollectionKind::Scalar, scalar) => Ok(vec![encode_scalar(scalar)?]),
            (kind, array) => {
                let element = self
                    .schema
                    .value_type()
                    .map_or(ScalarType::Text, ColumnType::element_type);
                let elements = decompose_array(array, element)?;
                if kind == CollectionKind::Hash && elements.len() % 2 != 0 {
                    return Err(EngineError::OddHashArity(elements.len()));
                }
                Ok(elements)
            }
        }
    }

    /// Write a whole scoped value under `key`.
    async fn write_value(&mut self, key: &str, elements: Vec<String>) -> Result<(), EngineError> {
        let owned = key.to_owned();
        match self.config.kind {
            CollectionKind::Scalar => {
                let value = elements.into_iter().next().unwrap_or_default();
                self.set(key, &value).await
            }
            CollectionKind::Set => {
                for member in elements {
                    self.run(
                        Command::SAdd {
                            key: owned.clone(),
                            member,
                        },
                        key,
                    )
                    .await?;
                }
                Ok(())
            }
            CollectionKind::List => {
                for value in elements {
                    self.run(
                        Command::RPush {
                            key: owned.clone(),
                            value,
                        },
                        key,
                    )
                    .await?;
                }
                Ok(())
            }
            CollectionKind::Hash => {
                let mut items = elements.into_iter();
                while let (Some(field), Some(value)) = (items.next(), items.next()) {
                    self.run(
                        Command::HSet {
                            key: owned.clone(),
                            field,
                            value,
                        },
                        key,
                    )
                    .await?;
                }
                Ok(())
            }
            CollectionKind::SortedSet => {
                for (score, member) in elements.into_iter().enumerate() {
                    self.run(
                        Command::ZAdd {
                            key: owned.clone(),
                            score: score.to_string(),
                            member,
                        },
                        key,
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    /// Whether `member` is already present in the singleton collection.
    /// Lists allow duplicates and never report a member.
    async fn member_exists(&mut self, singleton: &str, member: &str) -> Result<bool, EngineError> {
        let key = singleton.to_owned();
        let command = match self.config.kind {
            CollectionKind::Scalar => Command::Exists { key },
            CollectionKind::Hash => Command::HExists {
                key,
                field: member.to_owned(),
            },
            CollectionKind::Set => Command::SIsMember {
                key,
                member: member.to_owned(),
            },
            CollectionKind::SortedSet => Command::ZRank {
                key,
                member: member.to_owned(),
            },
            CollectionKind::List => return Ok(false),
        };
        let reply = self
            .session
            .run(&command, "failed to check existence of {}", Some(member))
            .await?;
        Ok(match reply {
            Reply::Nil => false,
            Reply::Integer(n) => self.config.kind == CollectionKind::SortedSet || n > 0,
            _ => true,
        })
    }

    async fn exists(&mut self, key: &str) -> Result<bool, EngineError> {
        let reply = self
            .session
            .run(
                &Command::Exists {
                    key: key.to_owned(),
                },
                "failed to check existence of key {}",
                Some(key),
            )
            .await?;
        Ok(matches!(reply.as_integer(), Some(n) if n > 0))
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        self.run(
            Command::Set {
                key: key.to_owned(),
                value: value.to_owned(),
            },
            key,
        )
        .await
    }

    async fn index_add(&mut self, set: &str, key: &str) -> Result<(), EngineError> {
        self.session
            .run(
                &Command::SAdd {
                    key: set.to_owned(),
                    member: key.to_owned(),
                },
                "failed to add {} to key set",
                Some(key),
            )
            .await?;
        Ok(())
    }

    async fn index_remove(&mut self, set: &str, key: &str) -> Result<(), EngineError> {
        self.session
            .run(
                &Command::SRem {
                    key: set.to_owned(),
                    member: key.to_owned(),
                },
                "failed to remove {} from key set",
                Some(key),
            )
            .await?;
        Ok(())
    }

    async fn run(&mut self, command: Command, subject: &str) -> Result<(), EngineError> {
        let message = format!("failed to {} {{}}", command.name());
        self.session.run(&command, &message, Some(subject)).await?;
        Ok(())
    }
}

fn check_prefix(key: &str, prefix: &str) -> Result<(), EngineError> {
    if key.starts_with(prefix) {
        Ok(())
    } else {
        Err(EngineError::KeyPrefixMismatch {
            key: key.to_owned(),
            prefix: prefix.to_owned(),
        })
    }
}
