//! In-memory store speaking the keyrel command set.
//!
//! [`MemoryStore`] holds a keyspace shared by every connection opened from
//! it, which makes it a stand-in for a live server in tests and offline
//! runs. It follows the store's observable behavior closely enough for the
//! engines: wrong-type errors, `NOAUTH`, empty collections disappearing,
//! and `SCAN`/`SSCAN` cursors that may return empty pages before they
//! finish.
//!
//! Failure injection ([`MemoryStore::fail_next`]) simulates lost replies.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::command::{CURSOR_START, Command, PAGE_SIZE};
use crate::error::TransportError;
use crate::reply::Reply;
use crate::session::{CommandExecutor, Session};

/// Number of databases `SELECT` accepts.
pub const DATABASES: u32 = 16;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A value stored under one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Plain string.
    String(String),
    /// Field/value map.
    Hash(BTreeMap<String, String>),
    /// Ordered list.
    List(Vec<String>),
    /// Unordered set.
    Set(BTreeSet<String>),
    /// Members with scores, kept sorted by `(score, member)`.
    SortedSet(Vec<(f64, String)>),
}

impl Entry {
    fn is_empty_collection(&self) -> bool {
        match self {
            Self::String(_) => false,
            Self::Hash(map) => map.is_empty(),
            Self::List(list) => list.is_empty(),
            Self::Set(set) => set.is_empty(),
            Self::SortedSet(zset) => zset.is_empty(),
        }
    }
}

#[derive(Debug)]
struct State {
    databases: Vec<BTreeMap<String, Entry>>,
    password: Option<String>,
    page_limit: usize,
    fail_next: Vec<&'static str>,
    log: Vec<String>,
    open: usize,
}

/// Shared in-memory keyspace. Cloning yields another handle to the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store with no password.
    pub fn new() -> Self {
        let databases = (0..DATABASES).map(|_| BTreeMap::new()).collect();
        Self {
            state: Arc::new(Mutex::new(State {
                databases,
                password: None,
                page_limit: PAGE_SIZE as usize,
                fail_next: Vec::new(),
                log: Vec::new(),
                open: 0,
            })),
        }
    }

    /// Require `AUTH password` before any other command.
    #[must_use]
    pub fn with_password(self, password: impl Into<String>) -> Self {
        self.lock().password = Some(password.into());
        self
    }

    /// Cap the number of keys examined per `SCAN`/`SSCAN` page, regardless
    /// of the requested `COUNT`. Must be at least 1.
    #[must_use]
    pub fn with_page_limit(self, limit: usize) -> Self {
        self.lock().page_limit = limit.max(1);
        self
    }

    /// Make the next command with this name get no reply.
    pub fn fail_next(&self, command_name: &'static str) {
        self.lock().fail_next.push(command_name);
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.lock().open
    }

    /// Open a new connection to the store.
    pub fn connect(&self) -> MemoryConnection {
        {
            let mut state = self.lock();
            state.open = state.open.saturating_add(1);
        }
        MemoryConnection {
            store: self.clone(),
            database: 0,
            authenticated: false,
            closed: false,
        }
    }

    /// Open a connection and establish a session on `database`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Session::establish`].
    pub async fn session(
        &self,
        credential: Option<&str>,
        database: u32,
    ) -> Result<Session<MemoryConnection>, crate::DbError> {
        Session::establish(self.connect(), credential, database).await
    }

    /// Store an entry directly, bypassing the command set.
    pub fn put(&self, database: u32, key: impl Into<String>, entry: Entry) {
        if let Some(db) = self.lock().databases.get_mut(database as usize) {
            db.insert(key.into(), entry);
        }
    }

    /// Read an entry directly.
    pub fn get(&self, database: u32, key: &str) -> Option<Entry> {
        self.lock()
            .databases
            .get(database as usize)
            .and_then(|db| db.get(key).cloned())
    }

    /// Every key in `database`, sorted.
    pub fn keys(&self, database: u32) -> Vec<String> {
        self.lock()
            .databases
            .get(database as usize)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Commands received so far, rendered as in logs.
    pub fn command_log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Forget the command log.
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One connection to a [`MemoryStore`], with its own selected database and
/// authentication state.
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    database: u32,
    authenticated: bool,
    closed: bool,
}

impl CommandExecutor for MemoryConnection {
    async fn execute(&mut self, command: &Command) -> Result<Reply, TransportError> {
        if self.closed {
            return Err(TransportError::new("connection already closed"));
        }
        let mut state = self.store.lock();
        state.log.push(command.to_string());
        if let Some(pos) = state.fail_next.iter().position(|name| *name == command.name()) {
            state.fail_next.remove(pos);
            return Err(TransportError::new(format!(
                "connection lost while waiting for {}",
                command.name()
            )));
        }

        if let Command::Auth { password } = command {
            return Ok(match &state.password {
                None => Reply::Error(
                    "ERR AUTH <password> called without any password configured".to_owned(),
                ),
                Some(expected) if expected == password => {
                    self.authenticated = true;
                    Reply::ok()
                }
                Some(_) => Reply::Error("WRONGPASS invalid username-password pair".to_owned()),
            });
        }
        if state.password.is_some() && !self.authenticated {
            return Ok(Reply::Error("NOAUTH Authentication required.".to_owned()));
        }
        if let Command::Select { index } = command {
            if *index >= DATABASES {
                return Ok(Reply::Error("ERR DB index is out of range".to_owned()));
            }
            self.database = *index;
            return Ok(Reply::ok());
        }

        let page_limit = state.page_limit;
        let Some(db) = state.databases.get_mut(self.database as usize) else {
            return Ok(Reply::Error("ERR DB index is out of range".to_owned()));
        };
        Ok(apply(db, command, page_limit))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.store.lock();
            state.open = state.open.saturating_sub(1);
        }
    }
}

fn apply(db: &mut BTreeMap<String, Entry>, command: &Command, page_limit: usize) -> Reply {
    match command {
        Command::Auth { .. } | Command::Select { .. } => Reply::ok(),
        Command::Get { key } => match db.get(key) {
            None => Reply::Nil,
            Some(Entry::String(value)) => Reply::string(value.clone()),
            Some(_) => wrong_type(),
        },
        Command::Set { key, value } => {
            db.insert(key.clone(), Entry::String(value.clone()));
            Reply::ok()
        }
        Command::Del { key } => Reply::Integer(i64::from(db.remove(key).is_some())),
        Command::Exists { key } => Reply::Integer(i64::from(db.contains_key(key))),
        Command::Rename { from, to } => match db.remove(from) {
            None => Reply::Error("ERR no such key".to_owned()),
            Some(entry) => {
                db.insert(to.clone(), entry);
                Reply::ok()
            }
        },
        Command::HGet { key, field } => match db.get(key) {
            None => Reply::Nil,
            Some(Entry::Hash(map)) => map.get(field).map_or(Reply::Nil, |v| Reply::string(v.clone())),
            Some(_) => wrong_type(),
        },
        Command::HGetAll { key } => match db.get(key) {
            None => Reply::Array(Vec::new()),
            Some(Entry::Hash(map)) => Reply::Array(
                map.iter()
                    .flat_map(|(f, v)| [Reply::string(f.clone()), Reply::string(v.clone())])
                    .collect(),
            ),
            Some(_) => wrong_type(),
        },
        Command::HSet { key, field, value } => {
            match db.entry(key.clone()).or_insert_with(|| Entry::Hash(BTreeMap::new())) {
                Entry::Hash(map) => {
                    let added = map.insert(field.clone(), value.clone()).is_none();
                    Reply::Integer(i64::from(added))
                }
                _ => wrong_type(),
            }
        }
        Command::HExists { key, field } => match db.get(key) {
            None => Reply::Integer(0),
            Some(Entry::Hash(map)) => Reply::Integer(i64::from(map.contains_key(field))),
            Some(_) => wrong_type(),
        },
        Command::HDel { key, field } => remove_member(db, key, |entry| match entry {
            Entry::Hash(map) => Some(map.remove(field).is_some()),
            _ => None,
        }),
        Command::LRangeAll { key } => match db.get(key) {
            None => Reply::Array(Vec::new()),
            Some(Entry::List(list)) => {
                Reply::Array(list.iter().map(|v| Reply::string(v.clone())).collect())
            }
            Some(_) => wrong_type(),
        },
        Command::RPush { key, value } => {
            match db.entry(key.clone()).or_insert_with(|| Entry::List(Vec::new())) {
                Entry::List(list) => {
                    list.push(value.clone());
                    Reply::Integer(i64::try_from(list.len()).unwrap_or(i64::MAX))
                }
                _ => wrong_type(),
            }
        }
        Command::SMembers { key } => match db.get(key) {
            None => Reply::Array(Vec::new()),
            Some(Entry::Set(set)) => {
                Reply::Array(set.iter().map(|m| Reply::string(m.clone())).collect())
            }
            Some(_) => wrong_type(),
        },
        Command::SAdd { key, member } => {
            match db.entry(key.clone()).or_insert_with(|| Entry::Set(BTreeSet::new())) {
                Entry::Set(set) => Reply::Integer(i64::from(set.insert(member.clone()))),
                _ => wrong_type(),
            }
        }
        Command::SRem { key, member } => remove_member(db, key, |entry| match entry {
            Entry::Set(set) => Some(set.remove(member)),
            _ => None,
        }),
        Command::SIsMember { key, member } => match db.get(key) {
            None => Reply::Integer(0),
            Some(Entry::Set(set)) => Reply::Integer(i64::from(set.contains(member))),
            Some(_) => wrong_type(),
        },
        Command::SScan { key, cursor } => match db.get(key) {
            None => scan_reply(CURSOR_START.to_owned(), Vec::new()),
            Some(Entry::Set(set)) => {
                let members: Vec<&String> = set.iter().collect();
                scan_page(&members, cursor, page_limit, None)
            }
            Some(_) => wrong_type(),
        },
        Command::Scan { cursor, pattern } => {
            let keys: Vec<&String> = db.keys().collect();
            scan_page(&keys, cursor, page_limit, pattern.as_deref())
        }
        Command::ZRangeWithScores { key } => match db.get(key) {
            None => Reply::Array(Vec::new()),
            Some(Entry::SortedSet(zset)) => Reply::Array(
                zset.iter()
                    .flat_map(|(score, m)| [Reply::string(m.clone()), Reply::string(score.to_string())])
                    .collect(),
            ),
            Some(_) => wrong_type(),
        },
        Command::ZAdd { key, score, member } => {
            let Ok(score) = score.trim().parse::<f64>() else {
                return Reply::Error("ERR value is not a valid float".to_owned());
            };
            if score.is_nan() {
                return Reply::Error("ERR value is not a valid float".to_owned());
            }
            match db.entry(key.clone()).or_insert_with(|| Entry::SortedSet(Vec::new())) {
                Entry::SortedSet(zset) => {
                    let existed = zset.iter().position(|(_, m)| m == member);
                    if let Some(pos) = existed {
                        zset.remove(pos);
                    }
                    zset.push((score, member.clone()));
                    zset.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                    Reply::Integer(i64::from(existed.is_none()))
                }
                _ => wrong_type(),
            }
        }
        Command::ZRem { key, member } => remove_member(db, key, |entry| match entry {
            Entry::SortedSet(zset) => {
                let pos = zset.iter().position(|(_, m)| m == member);
                Some(pos.map(|p| zset.remove(p)).is_some())
            }
            _ => None,
        }),
        Command::ZRank { key, member } => match db.get(key) {
            None => Reply::Nil,
            Some(Entry::SortedSet(zset)) => zset
                .iter()
                .position(|(_, m)| m == member)
                .map_or(Reply::Nil, |rank| Reply::Integer(i64::try_from(rank).unwrap_or(i64::MAX))),
            Some(_) => wrong_type(),
        },
        Command::ZScore { key, member } => match db.get(key) {
            None => Reply::Nil,
            Some(Entry::SortedSet(zset)) => zset
                .iter()
                .find(|(_, m)| m == member)
                .map_or(Reply::Nil, |(score, _)| Reply::string(score.to_string())),
            Some(_) => wrong_type(),
        },
    }
}

fn wrong_type() -> Reply {
    Reply::Error(WRONGTYPE.to_owned())
}

/// Remove a member from a collection, dropping the key once it is empty.
/// `remove` returns `None` when the entry has the wrong kind.
fn remove_member<F>(db: &mut BTreeMap<String, Entry>, key: &str, remove: F) -> Reply
where
    F: FnOnce(&mut Entry) -> Option<bool>,
{
    let Some(entry) = db.get_mut(key) else {
        return Reply::Integer(0);
    };
    let Some(removed) = remove(entry) else {
        return wrong_type();
    };
    if entry.is_empty_collection() {
        db.remove(key);
    }
    Reply::Integer(i64::from(removed))
}

fn scan_reply(cursor: String, items: Vec<Reply>) -> Reply {
    Reply::Array(vec![Reply::string(cursor), Reply::Array(items)])
}

/// One page of a cursor enumeration. The cursor is an offset into `items`;
/// filtering happens after the page is cut, so a page may come back empty
/// while the cursor is still live.
fn scan_page(items: &[&String], cursor: &str, page_limit: usize, pattern: Option<&str>) -> Reply {
    let Ok(start) = cursor.parse::<usize>() else {
        return Reply::Error("ERR invalid cursor".to_owned());
    };
    let end = start.saturating_add(page_limit).min(items.len());
    let page = items
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .filter(|item| pattern.is_none_or(|p| glob_match(p, item)))
        .map(|item| Reply::string((*item).clone()))
        .collect();
    let next = if end >= items.len() {
        CURSOR_START.to_owned()
    } else {
        end.to_string()
    };
    scan_reply(next, page)
}

/// Glob matching for `MATCH` patterns: `*`, `?`, and backslash escapes.
/// Other characters, including `[`, match themselves.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_from(&pattern, &text)
}

fn glob_match_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|skip| {
            text.get(skip..)
                .is_some_and(|tail| glob_match_from(rest, tail))
        }),
        Some(('?', rest)) => text
            .split_first()
            .is_some_and(|(_, tail)| glob_match_from(rest, tail)),
        Some(('\\', rest)) => match rest.split_first() {
            Some((literal, rest)) => text.split_first().is_some_and(|(c, tail)| {
                c == literal && glob_match_from(rest, tail)
            }),
            None => text.split_first().is_some_and(|(c, tail)| *c == '\\' && tail.is_empty()),
        },
        Some((literal, rest)) => text
            .split_first()
            .is_some_and(|(c, tail)| c == literal && glob_match_from(rest, tail)),
    }
}
