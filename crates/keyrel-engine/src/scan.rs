//! Scan engine: produces the rows of a table, one at a time.
//!
//! A scan runs in exactly one [`ScanMode`], chosen when it begins:
//!
//! | Mode | When | Store traffic |
//! |------|------|---------------|
//! | `Singleton` | table option `singleton_key` | one read, rows cut from the reply |
//! | `Lookup` | a `key = 'x'` restriction | scope check, `EXISTS`, one read |
//! | `KeySet` | table option `tablekeyset` | `SSCAN` pages, one read per key |
//! | `Prefix` | table option `tablekeyprefix` | `SCAN MATCH prefix*` pages, one read per key |
//! | `Full` | no scoping | `SCAN` pages, one read per key |
//!
//! During enumeration a key whose read returns nil, a status, or an error
//! (for example `WRONGTYPE` on a key of another kind) is skipped silently.
//! A transport failure ends the scan with an error.
//!
//! Rows never carry more values than the table has columns: a one-column
//! table over a hash or sorted set sees only the fields or members.

use std::fmt;

use futures::Stream;
use keyrel_db::command::prefix_pattern;
use keyrel_db::{CURSOR_START, Command, CommandExecutor, RedisConnection, Reply, Session};
use keyrel_types::{CollectionKind, KeyOrganization, Row, TableConfig, TableSchema};

use crate::codec::{element_text, reply_text};
use crate::error::EngineError;
use crate::qualifier::{Expr, Qualifier, extract_first};

/// How a scan finds its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// The whole table is one remote key.
    Singleton,
    /// Direct lookup of one key from a pushed-down restriction.
    Lookup,
    /// Cursor enumeration of a key-set collection.
    KeySet,
    /// Cursor enumeration of keys matching a prefix.
    Prefix,
    /// Cursor enumeration of the whole database.
    Full,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Singleton => "singleton key read",
            Self::Lookup => "direct key lookup",
            Self::KeySet => "key set enumeration",
            Self::Prefix => "key prefix enumeration",
            Self::Full => "full keyspace enumeration",
        };
        f.write_str(name)
    }
}

/// An open scan over one table.
#[derive(Debug)]
pub struct Scan<E: CommandExecutor> {
    session: Session<E>,
    kind: CollectionKind,
    width: usize,
    state: State,
}

#[derive(Debug)]
enum State {
    Singleton(SingletonRows),
    Lookup(Lookup),
    Cursor(CursorScan),
}

impl Scan<RedisConnection> {
    /// Connect to the store described by `config` and begin a scan.
    pub async fn connect(
        config: &TableConfig,
        schema: &TableSchema,
        clauses: &[Expr],
    ) -> Result<Self, EngineError> {
        let session = keyrel_db::connect(config).await?;
        Self::begin(session, config, schema, clauses).await
    }
}

impl<E: CommandExecutor> Scan<E> {
    /// Begin a scan on an established session.
    ///
    /// The first eligible restriction in `clauses` is pushed down; the rest
    /// are left to the caller. On failure the session is closed before the
    /// error is returned.
    pub async fn begin(
        mut session: Session<E>,
        config: &TableConfig,
        schema: &TableSchema,
        clauses: &[Expr],
    ) -> Result<Self, EngineError> {
        let qualifier = extract_first(clauses, schema);
        match start(&mut session, config, qualifier).await {
            Ok(state) => {
                let scan = Self {
                    session,
                    kind: config.kind,
                    width: schema.len(),
                    state,
                };
                tracing::debug!(mode = %scan.mode(), kind = %config.kind, "Scan started");
                Ok(scan)
            }
            Err(err) => {
                session.close().await;
                Err(err)
            }
        }
    }

    /// The mode this scan runs in.
    pub const fn mode(&self) -> ScanMode {
        match &self.state {
            State::Singleton(_) => ScanMode::Singleton,
            State::Lookup(_) => ScanMode::Lookup,
            State::Cursor(cursor) => match cursor.scope {
                CursorScope::KeySet(_) => ScanMode::KeySet,
                CursorScope::Prefix(_) => ScanMode::Prefix,
                CursorScope::Full => ScanMode::Full,
            },
        }
    }

    /// Produce the next row, or `None` once the table is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<Row>, EngineError> {
        let kind = self.kind;
        let row = match &mut self.state {
            State::Singleton(rows) => rows.next(kind)?,
            State::Lookup(lookup) => lookup.next(&mut self.session, kind).await?,
            State::Cursor(cursor) => cursor.next(&mut self.session, kind).await?,
        };
        Ok(row.map(|row| row.truncated(self.width)))
    }

    /// Restart iteration from the first row.
    ///
    /// Singleton and lookup scans replay their single fetch. Cursor scans
    /// replay the first page and then continue from the cursor that page
    /// returned, so a re-scan sees the whole table again.
    pub fn rescan(&mut self) {
        match &mut self.state {
            State::Singleton(rows) => rows.position = 0,
            State::Lookup(lookup) => lookup.emitted = false,
            State::Cursor(cursor) => cursor.restart(),
        }
    }

    /// Release the session.
    pub async fn close(self) {
        self.session.close().await;
    }

    /// Drain every remaining row, then release the session.
    pub async fn into_rows(mut self) -> Result<Vec<Row>, EngineError> {
        let mut rows = Vec::new();
        let outcome = loop {
            match self.next_row().await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break Ok(rows),
                Err(err) => break Err(err),
            }
        };
        self.close().await;
        outcome
    }

    /// Turn the scan into a stream of rows. The session is released when
    /// the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row, EngineError>> {
        futures::stream::try_unfold(self, |mut scan| async move {
            match scan.next_row().await {
                Ok(Some(row)) => Ok(Some((row, scan))),
                Ok(None) => {
                    scan.close().await;
                    Ok(None)
                }
                Err(err) => {
                    scan.close().await;
                    Err(err)
                }
            }
        })
    }
}

async fn start<E: CommandExecutor>(
    session: &mut Session<E>,
    config: &TableConfig,
    qualifier: Option<Qualifier>,
) -> Result<State, EngineError> {
    if let KeyOrganization::Singleton(key) = &config.organization {
        // Only a hash can answer a single member directly.
        let field = qualifier
            .filter(|_| config.kind == CollectionKind::Hash)
            .map(|q| q.value);
        let command = match &field {
            Some(field) => Command::HGet {
                key: key.clone(),
                field: field.clone(),
            },
            None => read_command(config.kind, key),
        };
        let reply = session
            .run(&command, "failed to read singleton key {}", Some(key.as_str()))
            .await?;
        return Ok(State::Singleton(SingletonRows {
            reply,
            field,
            position: 0,
        }));
    }

    if let Some(qualifier) = qualifier {
        let available = key_in_table(session, &config.organization, &qualifier.value).await?;
        return Ok(State::Lookup(Lookup {
            key: qualifier.value,
            available,
            emitted: false,
        }));
    }

    let scope = match &config.organization {
        KeyOrganization::KeySet(set) => CursorScope::KeySet(set.clone()),
        KeyOrganization::KeyPrefix(prefix) => CursorScope::Prefix(prefix_pattern(prefix)),
        KeyOrganization::Unscoped | KeyOrganization::Singleton(_) => CursorScope::Full,
    };
    let (page, next_cursor) = fetch_page(session, &scope, CURSOR_START).await?;
    Ok(State::Cursor(CursorScan {
        scope,
        first_page: page.clone(),
        first_cursor: next_cursor.clone(),
        page,
        position: 0,
        next_cursor,
    }))
}

/// Whether `key` belongs to the table's scope and exists.
async fn key_in_table<E: CommandExecutor>(
    session: &mut Session<E>,
    organization: &KeyOrganization,
    key: &str,
) -> Result<bool, EngineError> {
    match organization {
        KeyOrganization::KeySet(set) => {
            let member = session
                .run(
                    &Command::SIsMember {
                        key: set.clone(),
                        member: key.to_owned(),
                    },
                    "failed to check key set membership of {}",
                    Some(key),
                )
                .await?;
            if member.as_integer() != Some(1) {
                return Ok(false);
            }
        }
        KeyOrganization::KeyPrefix(prefix) => {
            if !key.starts_with(prefix.as_str()) {
                return Ok(false);
            }
        }
        KeyOrganization::Unscoped | KeyOrganization::Singleton(_) => {}
    }
    let exists = session
        .run(
            &Command::Exists {
                key: key.to_owned(),
            },
            "failed to check existence of key {}",
            Some(key),
        )
        .await?;
    Ok(matches!(exists.as_integer(), Some(n) if n > 0))
}

/// The command that reads a whole value of the given kind.
pub(crate) fn read_command(kind: CollectionKind, key: &str) -> Command {
    let key = key.to_owned();
    match kind {
        CollectionKind::Scalar => Command::Get { key },
        CollectionKind::Hash => Command::HGetAll { key },
        CollectionKind::List => Command::LRangeAll { key },
        CollectionKind::Set => Command::SMembers { key },
        CollectionKind::SortedSet => Command::ZRangeWithScores { key },
    }
}

// ---------------------------------------------------------------------------
// Singleton tables
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SingletonRows {
    reply: Reply,
    field: Option<String>,
    position: usize,
}

impl SingletonRows {
    fn next(&mut self, kind: CollectionKind) -> Result<Option<Row>, EngineError> {
        if kind == CollectionKind::Scalar || self.field.is_some() {
            return self.next_single_value();
        }

        let reply = match &self.reply {
            Reply::Array(elements) => elements,
            Reply::Nil => return Ok(None),
            other => {
                return Err(EngineError::UnexpectedReply(format!(
                    "expected an array for a singleton {kind} table, got {}",
                    other.kind()
                )));
            }
        };
        let Some(first) = reply.get(self.position) else {
            return Ok(None);
        };
        let key = member_text(first)?;

        if kind.has_paired_column() {
            let value = self
                .position
                .checked_add(1)
                .and_then(|i| reply.get(i))
                .ok_or_else(|| {
                    EngineError::UnexpectedReply(
                        "odd number of elements in a hash or sorted-set reply".to_owned(),
                    )
                })?;
            if matches!(value, Reply::Array(_)) {
                return Err(EngineError::UnexpectedReply(
                    "not expecting an array for a hash value or sorted-set score".to_owned(),
                ));
            }
            let value = member_text(value)?;
            self.position = self.position.saturating_add(2);
            return Ok(Some(Row::pair(key, value)));
        }

        self.position = self.position.saturating_add(1);
        Ok(Some(Row::single(key)))
    }

    /// Scalar tables and single hash members yield at most one row.
    fn next_single_value(&mut self) -> Result<Option<Row>, EngineError> {
        if self.position > 0 {
            return Ok(None);
        }
        self.position = 1;
        if matches!(self.reply, Reply::Array(_)) {
            let message = match &self.field {
                Some(field) => format!("not expecting an array for a single hash property: {field}"),
                None => "not expecting an array for a singleton scalar table".to_owned(),
            };
            return Err(EngineError::UnexpectedReply(message));
        }
        let Some(text) = element_text(&self.reply)? else {
            return Ok(None);
        };
        Ok(Some(match &self.field {
            Some(field) => Row::pair(field.clone(), text),
            None => Row::single(text),
        }))
    }
}

fn member_text(element: &Reply) -> Result<String, EngineError> {
    if matches!(element, Reply::Array(_)) {
        return Err(EngineError::NestedArray);
    }
    element_text(element)?.ok_or_else(|| {
        EngineError::UnexpectedReply(format!(
            "unexpected {} element in collection reply",
            element.kind()
        ))
    })
}

// ---------------------------------------------------------------------------
// Direct lookup
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Lookup {
    key: String,
    available: bool,
    emitted: bool,
}

impl Lookup {
    async fn next<E: CommandExecutor>(
        &mut self,
        session: &mut Session<E>,
        kind: CollectionKind,
    ) -> Result<Option<Row>, EngineError> {
        if !self.available || self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        let reply = session
            .run(&read_command(kind, &self.key), "failed to read key {}", Some(self.key.as_str()))
            .await?;
        if let Reply::Status(status) = &reply {
            return Err(EngineError::UnexpectedReply(format!(
                "status reply '{status}' reading key {}",
                self.key
            )));
        }
        Ok(reply_text(&reply)?.map(|text| Row::pair(self.key.clone(), text)))
    }
}

// ---------------------------------------------------------------------------
// Cursor enumeration
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum CursorScope {
    KeySet(String),
    Prefix(String),
    Full,
}

impl CursorScope {
    fn command(&self, cursor: &str) -> Command {
        let cursor = cursor.to_owned();
        match self {
            Self::KeySet(set) => Command::SScan {
                key: set.clone(),
                cursor,
            },
            Self::Prefix(pattern) => Command::Scan {
                cursor,
                pattern: Some(pattern.clone()),
            },
            Self::Full => Command::Scan {
                cursor,
                pattern: None,
            },
        }
    }
}

#[derive(Debug)]
struct CursorScan {
    scope: CursorScope,
    page: Vec<String>,
    position: usize,
    /// `None` once the store has reported the enumeration complete.
    next_cursor: Option<String>,
    first_page: Vec<String>,
    first_cursor: Option<String>,
}

impl CursorScan {
    async fn next<E: CommandExecutor>(
        &mut self,
        session: &mut Session<E>,
        kind: CollectionKind,
    ) -> Result<Option<Row>, EngineError> {
        loop {
            if let Some(key) = self.page.get(self.position) {
                self.position = self.position.saturating_add(1);
                let reply = session.send(&read_command(kind, key)).await?;
                match reply_text(&reply)? {
                    Some(text) => return Ok(Some(Row::pair(key.clone(), text))),
                    None => {
                        tracing::warn!(key = %key, reply = %reply.kind(), "Skipping key");
                        continue;
                    }
                }
            }

            let Some(cursor) = &self.next_cursor else {
                return Ok(None);
            };
            let (page, next_cursor) = fetch_page(session, &self.scope, cursor).await?;
            self.page = page;
            self.position = 0;
            self.next_cursor = next_cursor;
        }
    }

    fn restart(&mut self) {
        self.page.clone_from(&self.first_page);
        self.position = 0;
        self.next_cursor.clone_from(&self.first_cursor);
    }
}

/// Request one enumeration page. Returns the keys and the cursor for the
/// next page, or `None` when the store signalled completion.
async fn fetch_page<E: CommandExecutor>(
    session: &mut Session<E>,
    scope: &CursorScope,
    cursor: &str,
) -> Result<(Vec<String>, Option<String>), EngineError> {
    let reply = session
        .run(&scope.command(cursor), "failed to list keys at cursor {}", Some(cursor))
        .await?;
    let malformed = || EngineError::UnexpectedReply("malformed cursor reply".to_owned());

    let Reply::Array(parts) = reply else {
        return Err(malformed());
    };
    let [next, Reply::Array(keys)] = parts.as_slice() else {
        return Err(malformed());
    };
    let next = element_text(next)?.ok_or_else(malformed)?;
    let keys = keys
        .iter()
        .map(|key| match key {
            Reply::String(_) => element_text(key)?.ok_or_else(malformed),
            _ => Err(malformed()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::trace!(cursor, next = %next, keys = keys.len(), "Fetched page");
    let next = (next != CURSOR_START).then_some(next);
    Ok((keys, next))
}
